// src/registry.rs

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::AppError;

/// Course/identity registry consumed by the assessment engine.
///
/// Enrollment and course management live outside this service; handlers
/// only ask the narrow questions below, once per request.
#[async_trait]
pub trait CourseRegistry: Send + Sync {
    async fn course_exists(&self, course_id: i64) -> Result<bool, AppError>;
    async fn is_enrolled(&self, course_id: i64, student_id: i64) -> Result<bool, AppError>;
    async fn owns_course(&self, course_id: i64, faculty_id: i64) -> Result<bool, AppError>;
    async fn admin_ids(&self) -> Result<Vec<i64>, AppError>;
}

/// Registry backed by the shared Postgres instance.
pub struct PgCourseRegistry {
    pool: PgPool,
}

impl PgCourseRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CourseRegistry for PgCourseRegistry {
    async fn course_exists(&self, course_id: i64) -> Result<bool, AppError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM courses WHERE id = $1")
            .bind(course_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn is_enrolled(&self, course_id: i64, student_id: i64) -> Result<bool, AppError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT course_id FROM enrollments WHERE course_id = $1 AND student_id = $2",
        )
        .bind(course_id)
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn owns_course(&self, course_id: i64, faculty_id: i64) -> Result<bool, AppError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM courses WHERE id = $1 AND faculty_id = $2")
                .bind(course_id)
                .bind(faculty_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    async fn admin_ids(&self) -> Result<Vec<i64>, AppError> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE role = 'admin'")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
