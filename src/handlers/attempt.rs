// src/handlers/attempt.rs

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;

use crate::{
    error::AppError,
    models::{
        attempt::{
            Attempt, EvaluateAttemptRequest, ScoreResponse, StartAttemptResponse,
            SubmitAttemptRequest, STATUS_COMPLETED, STATUS_EVALUATED, STATUS_IN_PROGRESS,
        },
        question::{PublicQuestion, Question},
        quiz::Quiz,
    },
    notify::{Audience, send_async},
    scoring,
    state::AppState,
    utils::jwt::Claims,
};

use super::quiz::fetch_quiz;

const ATTEMPT_COLUMNS: &str = "id, quiz_id, student_id, started_at, ended_at, status, answers, \
     marks_obtained, evaluated_by, evaluated_at";

async fn fetch_attempt(state: &AppState, id: i64) -> Result<Attempt, AppError> {
    let attempt: Option<Attempt> = sqlx::query_as(&format!(
        "SELECT {} FROM attempts WHERE id = $1",
        ATTEMPT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&state.pool)
    .await?;

    attempt.ok_or(AppError::NotFound("Attempt not found".to_string()))
}

/// Fetches the quiz's questions keyed by id, as currently stored.
async fn quiz_questions(state: &AppState, quiz: &Quiz) -> Result<HashMap<i64, Question>, AppError> {
    let rows: Vec<Question> = sqlx::query_as(
        "SELECT id, author_id, content, type, options, marks, difficulty, tags, created_at
         FROM questions WHERE id = ANY($1)",
    )
    .bind(&quiz.question_ids[..])
    .fetch_all(&state.pool)
    .await?;

    Ok(rows.into_iter().map(|q| (q.id, q)).collect())
}

/// Starts the caller's one attempt at a quiz.
///
/// Admission checks, in order, each a distinct failure: quiz exists,
/// quiz active, now inside [open, close), caller enrolled, no prior
/// attempt. The insert itself is guarded by the unique (quiz, student)
/// constraint, so the loser of a concurrent start still gets a 409.
pub async fn start_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if !claims.is_student() {
        return Err(AppError::Forbidden(
            "Only students may attempt quizzes".to_string(),
        ));
    }
    let student_id = claims.user_id()?;

    let quiz = fetch_quiz(&state, quiz_id).await?;

    if !quiz.active {
        return Err(AppError::WindowClosed("Quiz is not active".to_string()));
    }
    let now = Utc::now();
    if now < quiz.open_at || now >= quiz.close_at {
        return Err(AppError::WindowClosed(
            "Quiz is outside its availability window".to_string(),
        ));
    }
    if !state.registry.is_enrolled(quiz.course_id, student_id).await? {
        return Err(AppError::Forbidden(
            "Not enrolled in this quiz's course".to_string(),
        ));
    }

    let existing: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM attempts WHERE quiz_id = $1 AND student_id = $2")
            .bind(quiz_id)
            .bind(student_id)
            .fetch_optional(&state.pool)
            .await?;
    if existing.is_some() {
        return Err(AppError::Conflict("Quiz already attempted".to_string()));
    }

    // The read above is not atomic with this insert; ON CONFLICT settles
    // the race and the missing row marks the loser.
    let started_at = Utc::now();
    let inserted: Option<(i64,)> = sqlx::query_as(
        r#"
        INSERT INTO attempts (quiz_id, student_id, started_at, status)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (quiz_id, student_id) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(quiz_id)
    .bind(student_id)
    .bind(started_at)
    .bind(STATUS_IN_PROGRESS)
    .fetch_optional(&state.pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create attempt: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let (attempt_id,) = inserted.ok_or(AppError::Conflict("Quiz already attempted".to_string()))?;

    let mut questions = quiz_questions(&state, &quiz).await?;
    let paper: Vec<PublicQuestion> = quiz
        .question_ids
        .iter()
        .filter_map(|id| questions.remove(id))
        .map(PublicQuestion::from)
        .collect();

    Ok((
        StatusCode::CREATED,
        Json(StartAttemptResponse {
            attempt_id,
            quiz_id,
            started_at,
            duration_minutes: quiz.duration_minutes,
            questions: paper,
        }),
    ))
}

/// Submits the caller's in-progress attempt and scores it.
///
/// A late submission is accepted; the recorded end time is clamped to
/// start + duration. Scoring is exact-match against the questions as
/// currently stored; each scored answer is snapshotted into the attempt.
pub async fn submit_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    Json(payload): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;
    let attempt = fetch_attempt(&state, attempt_id).await?;

    if attempt.student_id != student_id {
        return Err(AppError::Forbidden(
            "Attempt belongs to another student".to_string(),
        ));
    }
    if attempt.status != STATUS_IN_PROGRESS {
        return Err(AppError::Conflict("Attempt already submitted".to_string()));
    }

    let quiz = fetch_quiz(&state, attempt.quiz_id).await?;
    let questions = quiz_questions(&state, &quiz).await?;

    let (records, marks_obtained) = scoring::score_submission(&questions, &payload.answers);
    let ended_at = scoring::effective_end(attempt.started_at, quiz.duration_minutes, Utc::now());
    let answers_json = serde_json::to_value(&records)?;

    // Compare-and-swap on the status column: a concurrent submit of the
    // same attempt leaves rows_affected at zero.
    let result = sqlx::query(
        r#"
        UPDATE attempts
        SET status = $1, ended_at = $2, answers = $3, marks_obtained = $4
        WHERE id = $5 AND status = $6
        "#,
    )
    .bind(STATUS_COMPLETED)
    .bind(ended_at)
    .bind(answers_json)
    .bind(marks_obtained)
    .bind(attempt_id)
    .bind(STATUS_IN_PROGRESS)
    .execute(&state.pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to submit attempt: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::Conflict("Attempt already submitted".to_string()));
    }

    send_async(
        state.notifier.clone(),
        "Quiz submission received".to_string(),
        format!(
            "Student {} scored {}/{} on quiz '{}'",
            student_id, marks_obtained, quiz.total_marks, quiz.title
        ),
        Audience::Faculty(quiz.created_by),
    );

    Ok(Json(ScoreResponse {
        attempt_id,
        marks_obtained,
        total_marks: quiz.total_marks,
        status: STATUS_COMPLETED.to_string(),
    }))
}

/// Applies faculty corrections to a completed attempt.
///
/// Overridden records take the supplied correctness and marks (clamped to
/// the snapshot's ceiling); the total is recomputed over all records.
/// Evaluated is terminal, so a second evaluation gets a 409.
pub async fn evaluate_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    Json(payload): Json<EvaluateAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let evaluator_id = claims.user_id()?;
    let attempt = fetch_attempt(&state, attempt_id).await?;
    let quiz = fetch_quiz(&state, attempt.quiz_id).await?;

    if !claims.is_admin() && quiz.created_by != evaluator_id {
        return Err(AppError::Forbidden(
            "Only the quiz owner may evaluate attempts".to_string(),
        ));
    }
    if attempt.status != STATUS_COMPLETED {
        return Err(AppError::Conflict(
            "Only completed attempts can be evaluated".to_string(),
        ));
    }

    let mut records = attempt.answers.0;
    let marks_obtained = scoring::apply_overrides(&mut records, &payload.overrides);
    let answers_json = serde_json::to_value(&records)?;
    let evaluated_at = Utc::now();

    let result = sqlx::query(
        r#"
        UPDATE attempts
        SET status = $1, answers = $2, marks_obtained = $3,
            evaluated_by = $4, evaluated_at = $5
        WHERE id = $6 AND status = $7
        "#,
    )
    .bind(STATUS_EVALUATED)
    .bind(answers_json)
    .bind(marks_obtained)
    .bind(evaluator_id)
    .bind(evaluated_at)
    .bind(attempt_id)
    .bind(STATUS_COMPLETED)
    .execute(&state.pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to evaluate attempt: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::Conflict("Attempt already evaluated".to_string()));
    }

    send_async(
        state.notifier.clone(),
        "Quiz re-evaluated".to_string(),
        format!(
            "Your attempt at '{}' was re-evaluated: {}/{}",
            quiz.title, marks_obtained, quiz.total_marks
        ),
        Audience::Student(attempt.student_id),
    );

    Ok(Json(ScoreResponse {
        attempt_id,
        marks_obtained,
        total_marks: quiz.total_marks,
        status: STATUS_EVALUATED.to_string(),
    }))
}

/// Lists every attempt at a quiz. Quiz owner or admin only.
pub async fn list_quiz_attempts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = fetch_quiz(&state, quiz_id).await?;
    let caller_id = claims.user_id()?;

    if !claims.is_admin() && quiz.created_by != caller_id {
        return Err(AppError::Forbidden(
            "Only the quiz owner may list its attempts".to_string(),
        ));
    }

    let attempts: Vec<Attempt> = sqlx::query_as(&format!(
        "SELECT {} FROM attempts WHERE quiz_id = $1 ORDER BY started_at",
        ATTEMPT_COLUMNS
    ))
    .bind(quiz_id)
    .fetch_all(&state.pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list attempts: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(attempts))
}

/// Lists the calling student's own attempts.
pub async fn my_attempts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;

    let attempts: Vec<Attempt> = sqlx::query_as(&format!(
        "SELECT {} FROM attempts WHERE student_id = $1 ORDER BY started_at DESC",
        ATTEMPT_COLUMNS
    ))
    .bind(student_id)
    .fetch_all(&state.pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list attempts: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(attempts))
}
