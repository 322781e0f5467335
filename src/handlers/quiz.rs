// src/handlers/quiz.rs

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::{Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    access_code,
    config::ACCESS_CODE_MAX_RETRIES,
    error::AppError,
    models::{
        question::Question,
        quiz::{
            CreateQuizRequest, Quiz, QuizDetail, StudentQuizDetail, UpdateQuizRequest,
            VerifyCodeRequest,
        },
    },
    notify::{Audience, send_async},
    state::AppState,
    utils::jwt::Claims,
};

const QUIZ_COLUMNS: &str = "id, title, course_id, question_ids, duration_minutes, total_marks, \
     open_at, close_at, active, access_code, created_by, created_at";

/// Fetches a quiz by id or fails with 404.
pub async fn fetch_quiz(state: &AppState, id: i64) -> Result<Quiz, AppError> {
    let quiz: Option<Quiz> =
        sqlx::query_as(&format!("SELECT {} FROM quizzes WHERE id = $1", QUIZ_COLUMNS))
            .bind(id)
            .fetch_optional(&state.pool)
            .await?;

    quiz.ok_or(AppError::NotFound("Quiz not found".to_string()))
}

/// Resolves the referenced questions and returns them in quiz order.
/// Fails with 404 if any id does not resolve. Duplicate references are
/// accepted (the model does not prevent them) and resolve per occurrence.
async fn resolve_questions(state: &AppState, ids: &[i64]) -> Result<Vec<Question>, AppError> {
    let rows: Vec<Question> = sqlx::query_as(
        "SELECT id, author_id, content, type, options, marks, difficulty, tags, created_at
         FROM questions WHERE id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(&state.pool)
    .await?;

    let by_id: HashMap<i64, Question> = rows.into_iter().map(|q| (q.id, q)).collect();

    let mut ordered = Vec::with_capacity(ids.len());
    for id in ids {
        let q = by_id
            .get(id)
            .cloned()
            .ok_or(AppError::NotFound(format!("Question {} not found", id)))?;
        ordered.push(q);
    }
    Ok(ordered)
}

/// Creates a quiz for a course the caller owns (or as admin).
///
/// Computes the total marks from the resolved questions and generates a
/// unique access code, retrying on collision up to the bounded limit.
/// Faculty/admin only (enforced by route middleware).
pub async fn create_quiz(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    if payload.open_at >= payload.close_at {
        return Err(AppError::BadRequest(
            "Quiz must open before it closes".to_string(),
        ));
    }

    let caller_id = claims.user_id()?;

    if !state.registry.course_exists(payload.course_id).await? {
        return Err(AppError::NotFound("Course not found".to_string()));
    }
    if !claims.is_admin() && !state.registry.owns_course(payload.course_id, caller_id).await? {
        return Err(AppError::Forbidden(
            "Only the course owner may schedule quizzes for it".to_string(),
        ));
    }

    let questions = resolve_questions(&state, &payload.question_ids).await?;
    let total_marks: i32 = questions.iter().map(|q| q.marks).sum();
    let question_ids_json = serde_json::to_value(&payload.question_ids)?;

    // The unique constraint on access_code arbitrates concurrent creations;
    // each collision gets a fresh code, up to the retry bound.
    let mut retries = 0;
    let (quiz_id, code) = loop {
        let code = access_code::generate_code();
        let inserted: Result<(i64,), sqlx::Error> = sqlx::query_as(
            r#"
            INSERT INTO quizzes
            (title, course_id, question_ids, duration_minutes, total_marks,
             open_at, close_at, access_code, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(&payload.title)
        .bind(payload.course_id)
        .bind(&question_ids_json)
        .bind(payload.duration_minutes)
        .bind(total_marks)
        .bind(payload.open_at)
        .bind(payload.close_at)
        .bind(&code)
        .bind(caller_id)
        .fetch_one(&state.pool)
        .await;

        match inserted {
            Ok((id,)) => break (id, code),
            Err(e)
                if (e.to_string().contains("unique constraint")
                    || e.to_string().contains("23505"))
                    && e.to_string().contains("access_code") =>
            {
                retries += 1;
                if retries >= ACCESS_CODE_MAX_RETRIES {
                    tracing::error!("Access code space exhausted after {} retries", retries);
                    return Err(AppError::Capacity(
                        "Could not allocate a unique access code".to_string(),
                    ));
                }
                tracing::warn!("Access code collision, retrying ({})", retries);
            }
            Err(e) => {
                tracing::error!("Failed to create quiz: {:?}", e);
                return Err(AppError::InternalServerError(e.to_string()));
            }
        }
    };

    send_async(
        state.notifier.clone(),
        "New quiz scheduled".to_string(),
        format!(
            "Quiz '{}' opens at {} (access code {})",
            payload.title, payload.open_at, code
        ),
        Audience::Course(payload.course_id),
    );

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": quiz_id,
            "access_code": code,
            "total_marks": total_marks,
        })),
    ))
}

/// Retrieves one quiz with its questions.
///
/// Students must be enrolled in the quiz's course and always receive the
/// questions with correctness flags stripped; faculty/admin get the full
/// authoring view.
pub async fn get_quiz(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = fetch_quiz(&state, id).await?;
    let questions = resolve_questions(&state, &quiz.question_ids).await?;

    if claims.is_student() {
        let student_id = claims.user_id()?;
        if !state.registry.is_enrolled(quiz.course_id, student_id).await? {
            return Err(AppError::Forbidden(
                "Not enrolled in this quiz's course".to_string(),
            ));
        }
        return Ok(Json(StudentQuizDetail::redact(quiz, questions)).into_response());
    }

    Ok(Json(QuizDetail { quiz, questions }).into_response())
}

/// Updates a quiz's window, active flag, question set or title.
/// Owner or admin only. Recomputes total marks if the question set changes.
pub async fn update_quiz(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = fetch_quiz(&state, id).await?;

    let caller_id = claims.user_id()?;
    if !claims.is_admin() && quiz.created_by != caller_id {
        return Err(AppError::Forbidden(
            "Only the quiz owner may modify it".to_string(),
        ));
    }

    let new_open = payload.open_at.unwrap_or(quiz.open_at);
    let new_close = payload.close_at.unwrap_or(quiz.close_at);
    if new_open >= new_close {
        return Err(AppError::BadRequest(
            "Quiz must open before it closes".to_string(),
        ));
    }

    if payload.title.is_none()
        && payload.question_ids.is_none()
        && payload.duration_minutes.is_none()
        && payload.open_at.is_none()
        && payload.close_at.is_none()
        && payload.active.is_none()
    {
        return Ok(StatusCode::OK);
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE quizzes SET ");
    let mut separated = builder.separated(", ");

    if let Some(title) = payload.title {
        separated.push("title = ");
        separated.push_bind_unseparated(title);
    }

    if let Some(question_ids) = payload.question_ids {
        if question_ids.is_empty() {
            return Err(AppError::BadRequest(
                "A quiz needs at least one question".to_string(),
            ));
        }
        let questions = resolve_questions(&state, &question_ids).await?;
        let total_marks: i32 = questions.iter().map(|q| q.marks).sum();

        separated.push("question_ids = ");
        separated.push_bind_unseparated(serde_json::to_value(question_ids)?);
        separated.push("total_marks = ");
        separated.push_bind_unseparated(total_marks);
    }

    if let Some(duration) = payload.duration_minutes {
        if duration < 1 {
            return Err(AppError::BadRequest("Duration must be positive".to_string()));
        }
        separated.push("duration_minutes = ");
        separated.push_bind_unseparated(duration);
    }

    if let Some(open_at) = payload.open_at {
        separated.push("open_at = ");
        separated.push_bind_unseparated(open_at);
    }

    if let Some(close_at) = payload.close_at {
        separated.push("close_at = ");
        separated.push_bind_unseparated(close_at);
    }

    if let Some(active) = payload.active {
        separated.push("active = ");
        separated.push_bind_unseparated(active);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    builder.build().execute(&state.pool).await.map_err(|e| {
        tracing::error!("Failed to update quiz: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(StatusCode::OK)
}

/// Resolves an access code to a quiz id for the calling student.
///
/// Follows the admission rules for starting an attempt: the quiz must be
/// active and inside its window (404 otherwise, the code behaves as if it
/// did not exist), the student enrolled, and no prior attempt on record.
pub async fn verify_code(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<VerifyCodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    if !claims.is_student() {
        return Err(AppError::Forbidden(
            "Only students may redeem access codes".to_string(),
        ));
    }
    let student_id = claims.user_id()?;

    let quiz: Option<Quiz> = sqlx::query_as(&format!(
        "SELECT {} FROM quizzes WHERE access_code = $1 AND active = TRUE",
        QUIZ_COLUMNS
    ))
    .bind(payload.code.trim().to_uppercase())
    .fetch_optional(&state.pool)
    .await?;

    let quiz = quiz.ok_or(AppError::NotFound(
        "No active quiz matches that code".to_string(),
    ))?;

    if !quiz.is_open_at(Utc::now()) {
        return Err(AppError::NotFound(
            "No active quiz matches that code".to_string(),
        ));
    }

    if !state.registry.is_enrolled(quiz.course_id, student_id).await? {
        return Err(AppError::Forbidden(
            "Not enrolled in this quiz's course".to_string(),
        ));
    }

    let existing: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM attempts WHERE quiz_id = $1 AND student_id = $2")
            .bind(quiz.id)
            .bind(student_id)
            .fetch_optional(&state.pool)
            .await?;

    if existing.is_some() {
        return Err(AppError::Conflict(
            "Quiz already attempted".to_string(),
        ));
    }

    Ok(Json(serde_json::json!({ "quiz_id": quiz.id })))
}
