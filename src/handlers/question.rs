// src/handlers/question.rs

use axum::{
    Json,
    extract::{Extension, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::AppError,
    models::question::{CreateQuestionRequest, Question, QuestionFilter},
    state::AppState,
    utils::jwt::Claims,
};

/// Creates a new graded question owned by the caller.
/// Faculty/admin only (enforced by route middleware).
pub async fn create_question(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let author_id = claims.user_id()?;
    let options_json = serde_json::to_value(&payload.options)?;

    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO questions
        (author_id, content, type, options, marks, difficulty, tags)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(author_id)
    .bind(&payload.content)
    .bind(payload.question_type.as_str())
    .bind(options_json)
    .bind(payload.marks)
    .bind(&payload.difficulty)
    .bind(&payload.tags)
    .fetch_one(&state.pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// Lists questions for the authoring view (correctness included).
///
/// A faculty caller sees questions authored by themself or by any admin;
/// an admin sees everything. Optional query filters narrow the result by
/// difficulty, type and tag substring.
pub async fn list_questions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(filter): Query<QuestionFilter>,
) -> Result<impl IntoResponse, AppError> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "SELECT id, author_id, content, type, options, marks, difficulty, tags, created_at
         FROM questions WHERE TRUE",
    );

    if !claims.is_admin() {
        let caller_id = claims.user_id()?;
        let admin_ids = state.registry.admin_ids().await?;

        builder.push(" AND (author_id = ");
        builder.push_bind(caller_id);
        builder.push(" OR author_id = ANY(");
        builder.push_bind(admin_ids);
        builder.push("))");
    }

    if let Some(difficulty) = filter.difficulty {
        builder.push(" AND difficulty = ");
        builder.push_bind(difficulty);
    }

    if let Some(question_type) = filter.question_type {
        builder.push(" AND type = ");
        builder.push_bind(question_type.as_str());
    }

    if let Some(tags) = filter.tags {
        builder.push(" AND tags ILIKE ");
        builder.push_bind(format!("%{}%", tags));
    }

    builder.push(" ORDER BY id DESC");

    let questions: Vec<Question> = builder
        .build_query_as()
        .fetch_all(&state.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list questions: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(Json(questions))
}
