// src/notify.rs

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AppError;

/// Who a notification is addressed to.
#[derive(Debug, Clone)]
pub enum Audience {
    Student(i64),
    Faculty(i64),
    Course(i64),
}

/// Outbound notification dispatch. Delivery itself (email, push) is an
/// external service; this trait is the seam it is consumed through.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, title: &str, message: &str, audience: Audience)
    -> Result<(), AppError>;
}

/// Default dispatcher: records the notification in the log stream.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        title: &str,
        message: &str,
        audience: Audience,
    ) -> Result<(), AppError> {
        tracing::info!(?audience, title, message, "notification dispatched");
        Ok(())
    }
}

/// Fire-and-forget send. Failures are logged and swallowed so a failed
/// notification never rolls back the state transition that triggered it.
pub fn send_async(notifier: Arc<dyn Notifier>, title: String, message: String, audience: Audience) {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&title, &message, audience).await {
            tracing::warn!("Failed to dispatch notification '{}': {:?}", title, e);
        }
    });
}
