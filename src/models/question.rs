// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

/// One selectable option of a question, with its correctness flag.
/// Stored inside the question's `options` JSONB column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionOption {
    pub text: String,
    pub correct: bool,
}

/// Question type: exactly one correct option, or an exact set of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Single,
    Multiple,
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    /// Faculty/admin user who authored the question.
    pub author_id: i64,

    /// The text content of the question.
    pub content: String,

    /// Question type: 'single' or 'multiple'.
    /// Mapped from the database column 'type' since `type` is a reserved keyword in Rust.
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub question_type: String,

    /// Ordered option list with correctness flags.
    /// Stored as a JSON array in the database.
    pub options: Json<Vec<QuestionOption>>,

    /// Marks awarded for an exact-match answer.
    pub marks: i32,

    /// Difficulty: 'easy', 'medium' or 'hard'.
    pub difficulty: String,

    /// Free-text tags for authoring-side filtering.
    pub tags: Option<String>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Question {
    /// Parses the stored type string into the typed variant.
    /// Unknown strings fall back to single-correct, the stricter rule.
    pub fn kind(&self) -> QuestionType {
        if self.question_type == "multiple" {
            QuestionType::Multiple
        } else {
            QuestionType::Single
        }
    }

    /// Indices of the options flagged correct, in option order.
    pub fn correct_indices(&self) -> Vec<usize> {
        self.options
            .iter()
            .enumerate()
            .filter(|(_, o)| o.correct)
            .map(|(i, _)| i)
            .collect()
    }
}

/// DTO for sending a question to a student (correctness flags stripped).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    #[serde(rename = "type")]
    pub question_type: String,
    pub content: String,
    /// Option texts only, in the stored order.
    pub options: Vec<String>,
    pub marks: i32,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        PublicQuestion {
            id: q.id,
            question_type: q.question_type,
            content: q.content,
            options: q.options.0.into_iter().map(|o| o.text).collect(),
            marks: q.marks,
        }
    }
}

/// Query filters for the authoring listing. All optional; tags match
/// as a substring.
#[derive(Debug, Default, Deserialize)]
pub struct QuestionFilter {
    pub difficulty: Option<String>,
    #[serde(rename = "type")]
    pub question_type: Option<QuestionType>,
    pub tags: Option<String>,
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 2000))]
    pub content: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[validate(custom(function = validate_options))]
    pub options: Vec<QuestionOption>,
    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_marks")]
    pub marks: i32,
    #[validate(custom(function = validate_difficulty))]
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[validate(length(max = 500))]
    pub tags: Option<String>,
}

fn default_marks() -> i32 {
    1
}

fn default_difficulty() -> String {
    "medium".to_string()
}

fn validate_options(options: &[QuestionOption]) -> Result<(), validator::ValidationError> {
    if options.len() < 2 {
        return Err(validator::ValidationError::new("at_least_two_options"));
    }
    if !options.iter().any(|o| o.correct) {
        return Err(validator::ValidationError::new("no_correct_option"));
    }
    for opt in options {
        if opt.text.is_empty() || opt.text.len() > 500 {
            return Err(validator::ValidationError::new("option_text_length"));
        }
    }
    Ok(())
}

fn validate_difficulty(difficulty: &str) -> Result<(), validator::ValidationError> {
    match difficulty {
        "easy" | "medium" | "hard" => Ok(()),
        _ => Err(validator::ValidationError::new("unknown_difficulty")),
    }
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Single => "single",
            QuestionType::Multiple => "multiple",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opt(text: &str, correct: bool) -> QuestionOption {
        QuestionOption {
            text: text.to_string(),
            correct,
        }
    }

    #[test]
    fn options_require_two_entries() {
        let err = validate_options(&[opt("A", true)]).unwrap_err();
        assert_eq!(err.code, "at_least_two_options");
    }

    #[test]
    fn options_require_a_correct_flag() {
        let err = validate_options(&[opt("A", false), opt("B", false)]).unwrap_err();
        assert_eq!(err.code, "no_correct_option");
    }

    #[test]
    fn options_accept_valid_set() {
        assert!(validate_options(&[opt("A", true), opt("B", false)]).is_ok());
    }

    #[test]
    fn correct_indices_follow_option_order() {
        let q = Question {
            id: 1,
            author_id: 1,
            content: "q".to_string(),
            question_type: "multiple".to_string(),
            options: Json(vec![opt("A", true), opt("B", false), opt("C", true)]),
            marks: 3,
            difficulty: "easy".to_string(),
            tags: None,
            created_at: None,
        };
        assert_eq!(q.correct_indices(), vec![0, 2]);
        assert_eq!(q.kind(), QuestionType::Multiple);
    }
}
