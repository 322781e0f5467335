// src/models/quiz.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

use crate::models::question::{PublicQuestion, Question};

/// Represents the 'quizzes' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub title: String,
    pub course_id: i64,

    /// Ordered question references. Stored as a JSON array.
    pub question_ids: Json<Vec<i64>>,

    pub duration_minutes: i32,

    /// Sum of the referenced questions' marks, fixed at creation.
    pub total_marks: i32,

    /// Availability window: the quiz may be started in [open_at, close_at).
    pub open_at: chrono::DateTime<chrono::Utc>,
    pub close_at: chrono::DateTime<chrono::Utc>,

    pub active: bool,

    /// Short human-typeable code, unique among quizzes.
    pub access_code: String,

    pub created_by: i64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Quiz {
    /// Whether the quiz can be started at `now`: it must be active and
    /// `now` must fall inside the half-open availability window.
    pub fn is_open_at(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.active && now >= self.open_at && now < self.close_at
    }
}

/// DTO for creating a new quiz.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub course_id: i64,
    #[validate(length(min = 1))]
    pub question_ids: Vec<i64>,
    #[validate(range(min = 1, max = 600))]
    pub duration_minutes: i32,
    pub open_at: chrono::DateTime<chrono::Utc>,
    pub close_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for updating a quiz. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateQuizRequest {
    pub title: Option<String>,
    pub question_ids: Option<Vec<i64>>,
    pub duration_minutes: Option<i32>,
    pub open_at: Option<chrono::DateTime<chrono::Utc>>,
    pub close_at: Option<chrono::DateTime<chrono::Utc>>,
    pub active: Option<bool>,
}

/// Authoring view: full quiz with full questions (correctness included).
#[derive(Debug, Serialize)]
pub struct QuizDetail {
    #[serde(flatten)]
    pub quiz: Quiz,
    pub questions: Vec<Question>,
}

/// Student view: correctness flags stripped, access code withheld.
#[derive(Debug, Serialize)]
pub struct StudentQuizDetail {
    pub id: i64,
    pub title: String,
    pub course_id: i64,
    pub duration_minutes: i32,
    pub total_marks: i32,
    pub open_at: chrono::DateTime<chrono::Utc>,
    pub close_at: chrono::DateTime<chrono::Utc>,
    pub active: bool,
    pub questions: Vec<PublicQuestion>,
}

impl StudentQuizDetail {
    pub fn redact(quiz: Quiz, questions: Vec<Question>) -> Self {
        StudentQuizDetail {
            id: quiz.id,
            title: quiz.title,
            course_id: quiz.course_id,
            duration_minutes: quiz.duration_minutes,
            total_marks: quiz.total_marks,
            open_at: quiz.open_at,
            close_at: quiz.close_at,
            active: quiz.active,
            questions: questions.into_iter().map(PublicQuestion::from).collect(),
        }
    }
}

/// DTO for resolving an access code to a quiz.
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyCodeRequest {
    #[validate(length(min = 1, max = 16))]
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn quiz(active: bool) -> Quiz {
        let now = Utc::now();
        Quiz {
            id: 1,
            title: "t".to_string(),
            course_id: 1,
            question_ids: Json(vec![1, 2]),
            duration_minutes: 10,
            total_marks: 5,
            open_at: now,
            close_at: now + Duration::hours(1),
            active,
            access_code: "ABC123".to_string(),
            created_by: 1,
            created_at: None,
        }
    }

    #[test]
    fn window_is_half_open() {
        let q = quiz(true);
        assert!(q.is_open_at(q.open_at));
        assert!(q.is_open_at(q.close_at - Duration::seconds(1)));
        assert!(!q.is_open_at(q.close_at));
        assert!(!q.is_open_at(q.open_at - Duration::seconds(1)));
    }

    #[test]
    fn inactive_quiz_is_never_open() {
        let q = quiz(false);
        assert!(!q.is_open_at(q.open_at + Duration::minutes(1)));
    }
}
