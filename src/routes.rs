// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{attempt, question, quiz},
    state::AppState,
    utils::jwt::{auth_middleware, faculty_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (questions, quizzes, attempts).
/// * Applies global middleware (Trace, CORS) and Bearer auth.
/// * Injects global state (pool, config, registry, notifier).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let question_routes = Router::new()
        .route(
            "/",
            post(question::create_question).get(question::list_questions),
        )
        .layer(middleware::from_fn(faculty_middleware));

    let quiz_routes = Router::new()
        .route("/{id}", get(quiz::get_quiz))
        .route("/{id}/attempts/start", post(attempt::start_attempt))
        .route("/verify-code", post(quiz::verify_code))
        // Authoring routes: faculty or admin only
        .merge(
            Router::new()
                .route("/", post(quiz::create_quiz))
                .route("/{id}", put(quiz::update_quiz))
                .route("/{id}/attempts", get(attempt::list_quiz_attempts))
                .layer(middleware::from_fn(faculty_middleware)),
        );

    let attempt_routes = Router::new()
        .route("/mine", get(attempt::my_attempts))
        .route("/{id}/submit", post(attempt::submit_attempt))
        .route(
            "/{id}/evaluate",
            post(attempt::evaluate_attempt).layer(middleware::from_fn(faculty_middleware)),
        );

    Router::new()
        .nest("/api/questions", question_routes)
        .nest("/api/quizzes", quiz_routes)
        .nest("/api/attempts", attempt_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
