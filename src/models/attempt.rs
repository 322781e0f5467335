// src/models/attempt.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

/// Attempt status values stored in the 'status' column.
pub const STATUS_IN_PROGRESS: &str = "in_progress";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_EVALUATED: &str = "evaluated";

/// One scored answer, snapshotted into the attempt at submission time.
///
/// `marks_possible` freezes the question's marks as they were when the
/// attempt was scored, so later edits to the question do not change what
/// an evaluation override may be clamped against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: i64,
    /// Indices into the question's option list, as submitted.
    pub selected: Vec<usize>,
    pub correct: bool,
    pub marks_awarded: i32,
    pub marks_possible: i32,
}

/// Represents the 'attempts' table: one row per (student, quiz) pair.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub quiz_id: i64,
    pub student_id: i64,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    /// 'in_progress', 'completed' or 'evaluated'.
    pub status: String,
    pub answers: Json<Vec<AnswerRecord>>,
    pub marks_obtained: i32,
    pub evaluated_by: Option<i64>,
    pub evaluated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// One submitted answer in a submit request.
#[derive(Debug, Deserialize)]
pub struct SubmittedAnswer {
    pub question_id: i64,
    /// Indices of the selected options.
    pub selected: Vec<usize>,
}

/// DTO for submitting an attempt.
#[derive(Debug, Deserialize)]
pub struct SubmitAttemptRequest {
    pub answers: Vec<SubmittedAnswer>,
}

/// One per-question correction in an evaluation request.
#[derive(Debug, Deserialize)]
pub struct AnswerOverride {
    pub question_id: i64,
    pub correct: bool,
    pub marks_obtained: i32,
}

/// DTO for a faculty evaluation pass over a completed attempt.
#[derive(Debug, Deserialize)]
pub struct EvaluateAttemptRequest {
    pub overrides: Vec<AnswerOverride>,
}

/// DTO returned from start: the new attempt plus the redacted paper.
#[derive(Debug, Serialize)]
pub struct StartAttemptResponse {
    pub attempt_id: i64,
    pub quiz_id: i64,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub duration_minutes: i32,
    pub questions: Vec<crate::models::question::PublicQuestion>,
}

/// DTO returned from submit and evaluate.
#[derive(Debug, Serialize)]
pub struct ScoreResponse {
    pub attempt_id: i64,
    pub marks_obtained: i32,
    pub total_marks: i32,
    pub status: String,
}
