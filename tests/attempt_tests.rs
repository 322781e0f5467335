// tests/attempt_tests.rs

use std::sync::Arc;

use assess_backend::{
    config::Config, notify::LogNotifier, registry::PgCourseRegistry, routes, state::AppState,
    utils::jwt::sign_jwt,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

const TEST_SECRET: &str = "test_secret_for_integration_tests";

struct TestApp {
    address: String,
    pool: PgPool,
}

async fn spawn_app() -> Option<TestApp> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping integration test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: database_url.clone(),
        jwt_secret: TEST_SECRET.to_string(),
        rust_log: "error".to_string(),
    };

    let state = AppState {
        pool: pool.clone(),
        config,
        registry: Arc::new(PgCourseRegistry::new(pool.clone())),
        notifier: Arc::new(LogNotifier),
    };

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Some(TestApp { address, pool })
}

async fn seed_user(pool: &PgPool, role: &str) -> i64 {
    let name = format!("u_{}", &uuid::Uuid::new_v4().to_string()[..8]);
    let (id,): (i64,) =
        sqlx::query_as("INSERT INTO users (display_name, role) VALUES ($1, $2) RETURNING id")
            .bind(name)
            .bind(role)
            .fetch_one(pool)
            .await
            .unwrap();
    id
}

async fn seed_course(pool: &PgPool, faculty_id: i64) -> i64 {
    let (id,): (i64,) =
        sqlx::query_as("INSERT INTO courses (title, faculty_id) VALUES ($1, $2) RETURNING id")
            .bind("Course")
            .bind(faculty_id)
            .fetch_one(pool)
            .await
            .unwrap();
    id
}

async fn enroll(pool: &PgPool, course_id: i64, student_id: i64) {
    sqlx::query("INSERT INTO enrollments (course_id, student_id) VALUES ($1, $2)")
        .bind(course_id)
        .bind(student_id)
        .execute(pool)
        .await
        .unwrap();
}

fn bearer(id: i64, role: &str) -> String {
    format!("Bearer {}", sign_jwt(id, role, TEST_SECRET, 600).unwrap())
}

/// Seeds a single-correct question where option 0 is the right answer.
async fn seed_question(app: &TestApp, client: &reqwest::Client, faculty: i64, marks: i32) -> i64 {
    let resp: serde_json::Value = client
        .post(&format!("{}/api/questions", app.address))
        .header("Authorization", bearer(faculty, "faculty"))
        .json(&serde_json::json!({
            "content": format!("Worth {} marks", marks),
            "type": "single",
            "options": [{"text": "A", "correct": true}, {"text": "B", "correct": false}],
            "marks": marks,
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    resp["id"].as_i64().unwrap()
}

struct QuizFixture {
    quiz_id: i64,
    q1: i64,
    q2: i64,
    access_code: String,
}

/// Seeds a quiz of two single-correct questions (2 and 3 marks, total 5),
/// open now for an hour, with a 10-minute duration.
async fn seed_open_quiz_in(
    app: &TestApp,
    client: &reqwest::Client,
    faculty: i64,
    course: i64,
) -> QuizFixture {
    let q1 = seed_question(app, client, faculty, 2).await;
    let q2 = seed_question(app, client, faculty, 3).await;

    let now = chrono::Utc::now();
    let resp: serde_json::Value = client
        .post(&format!("{}/api/quizzes", app.address))
        .header("Authorization", bearer(faculty, "faculty"))
        .json(&serde_json::json!({
            "title": "Weekly quiz",
            "course_id": course,
            "question_ids": [q1, q2],
            "duration_minutes": 10,
            "open_at": now,
            "close_at": now + chrono::Duration::hours(1),
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    QuizFixture {
        quiz_id: resp["id"].as_i64().unwrap(),
        q1,
        q2,
        access_code: resp["access_code"].as_str().unwrap().to_string(),
    }
}

#[tokio::test]
async fn full_attempt_lifecycle_with_evaluation() {
    let Some(app) = spawn_app().await else { return };
    let client = reqwest::Client::new();
    let faculty = seed_user(&app.pool, "faculty").await;
    let student = seed_user(&app.pool, "student").await;
    let course = seed_course(&app.pool, faculty).await;
    enroll(&app.pool, course, student).await;
    let fx = seed_open_quiz_in(&app, &client, faculty, course).await;

    // Start: 201, paper is redacted.
    let response = client
        .post(&format!(
            "{}/api/quizzes/{}/attempts/start",
            app.address, fx.quiz_id
        ))
        .header("Authorization", bearer(student, "student"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let started: serde_json::Value = response.json().await.unwrap();
    let attempt_id = started["attempt_id"].as_i64().unwrap();
    assert_eq!(started["questions"].as_array().unwrap().len(), 2);
    assert_eq!(started["questions"][0]["options"][0], "A");

    // Submit: q1 correct, q2 wrong -> 2/5 completed.
    let response = client
        .post(&format!("{}/api/attempts/{}/submit", app.address, attempt_id))
        .header("Authorization", bearer(student, "student"))
        .json(&serde_json::json!({
            "answers": [
                {"question_id": fx.q1, "selected": [0]},
                {"question_id": fx.q2, "selected": [1]},
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let scored: serde_json::Value = response.json().await.unwrap();
    assert_eq!(scored["marks_obtained"], 2);
    assert_eq!(scored["total_marks"], 5);
    assert_eq!(scored["status"], "completed");

    // Double submit is refused.
    let response = client
        .post(&format!("{}/api/attempts/{}/submit", app.address, attempt_id))
        .header("Authorization", bearer(student, "student"))
        .json(&serde_json::json!({"answers": []}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);

    // Evaluate: override q2 to full marks -> 5/5 evaluated.
    let response = client
        .post(&format!(
            "{}/api/attempts/{}/evaluate",
            app.address, attempt_id
        ))
        .header("Authorization", bearer(faculty, "faculty"))
        .json(&serde_json::json!({
            "overrides": [
                {"question_id": fx.q2, "correct": true, "marks_obtained": 3},
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let evaluated: serde_json::Value = response.json().await.unwrap();
    assert_eq!(evaluated["marks_obtained"], 5);
    assert_eq!(evaluated["status"], "evaluated");

    // Evaluated is terminal.
    let response = client
        .post(&format!(
            "{}/api/attempts/{}/evaluate",
            app.address, attempt_id
        ))
        .header("Authorization", bearer(faculty, "faculty"))
        .json(&serde_json::json!({"overrides": []}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);

    // The student sees the evaluated attempt in their own listing.
    let mine: Vec<serde_json::Value> = client
        .get(&format!("{}/api/attempts/mine", app.address))
        .header("Authorization", bearer(student, "student"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let row = mine
        .iter()
        .find(|a| a["id"].as_i64() == Some(attempt_id))
        .expect("attempt missing from student listing");
    assert_eq!(row["marks_obtained"], 5);
    assert_eq!(row["status"], "evaluated");
}

#[tokio::test]
async fn answers_for_unknown_questions_are_skipped() {
    let Some(app) = spawn_app().await else { return };
    let client = reqwest::Client::new();
    let faculty = seed_user(&app.pool, "faculty").await;
    let student = seed_user(&app.pool, "student").await;
    let course = seed_course(&app.pool, faculty).await;
    enroll(&app.pool, course, student).await;
    let fx = seed_open_quiz_in(&app, &client, faculty, course).await;

    let started: serde_json::Value = client
        .post(&format!(
            "{}/api/quizzes/{}/attempts/start",
            app.address, fx.quiz_id
        ))
        .header("Authorization", bearer(student, "student"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let attempt_id = started["attempt_id"].as_i64().unwrap();

    let scored: serde_json::Value = client
        .post(&format!("{}/api/attempts/{}/submit", app.address, attempt_id))
        .header("Authorization", bearer(student, "student"))
        .json(&serde_json::json!({
            "answers": [
                {"question_id": fx.q1, "selected": [0]},
                {"question_id": i64::MAX - 1, "selected": [0]},
            ]
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(scored["marks_obtained"], 2);
}

#[tokio::test]
async fn window_and_enrollment_gate_the_start() {
    let Some(app) = spawn_app().await else { return };
    let client = reqwest::Client::new();
    let faculty = seed_user(&app.pool, "faculty").await;
    let student = seed_user(&app.pool, "student").await;
    let course = seed_course(&app.pool, faculty).await;
    enroll(&app.pool, course, student).await;

    let q1 = seed_question(&app, &client, faculty, 2).await;
    let now = chrono::Utc::now();

    // Not yet open.
    let future_quiz: serde_json::Value = client
        .post(&format!("{}/api/quizzes", app.address))
        .header("Authorization", bearer(faculty, "faculty"))
        .json(&serde_json::json!({
            "title": "Tomorrow",
            "course_id": course,
            "question_ids": [q1],
            "duration_minutes": 10,
            "open_at": now + chrono::Duration::hours(24),
            "close_at": now + chrono::Duration::hours(25),
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let response = client
        .post(&format!(
            "{}/api/quizzes/{}/attempts/start",
            app.address, future_quiz["id"]
        ))
        .header("Authorization", bearer(student, "student"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 423);

    // Deactivated.
    let fx = seed_open_quiz_in(&app, &client, faculty, course).await;
    client
        .put(&format!("{}/api/quizzes/{}", app.address, fx.quiz_id))
        .header("Authorization", bearer(faculty, "faculty"))
        .json(&serde_json::json!({"active": false}))
        .send()
        .await
        .unwrap();

    let response = client
        .post(&format!(
            "{}/api/quizzes/{}/attempts/start",
            app.address, fx.quiz_id
        ))
        .header("Authorization", bearer(student, "student"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 423);

    // Open quiz, but the caller is not enrolled.
    let outsider = seed_user(&app.pool, "student").await;
    let fx = seed_open_quiz_in(&app, &client, faculty, course).await;
    let response = client
        .post(&format!(
            "{}/api/quizzes/{}/attempts/start",
            app.address, fx.quiz_id
        ))
        .header("Authorization", bearer(outsider, "student"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    // Unknown quiz.
    let response = client
        .post(&format!(
            "{}/api/quizzes/{}/attempts/start",
            app.address,
            i64::MAX - 1
        ))
        .header("Authorization", bearer(student, "student"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn one_attempt_per_student_even_under_concurrency() {
    let Some(app) = spawn_app().await else { return };
    let client = reqwest::Client::new();
    let faculty = seed_user(&app.pool, "faculty").await;
    let student = seed_user(&app.pool, "student").await;
    let course = seed_course(&app.pool, faculty).await;
    enroll(&app.pool, course, student).await;
    let fx = seed_open_quiz_in(&app, &client, faculty, course).await;

    let url = format!("{}/api/quizzes/{}/attempts/start", app.address, fx.quiz_id);
    let auth = bearer(student, "student");

    let (a, b) = tokio::join!(
        client.post(&url).header("Authorization", &auth).send(),
        client.post(&url).header("Authorization", &auth).send(),
    );

    let mut statuses = [a.unwrap().status().as_u16(), b.unwrap().status().as_u16()];
    statuses.sort();
    assert_eq!(statuses, [201, 409]);

    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM attempts WHERE quiz_id = $1 AND student_id = $2")
            .bind(fx.quiz_id)
            .bind(student)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn access_code_resolves_with_admission_checks() {
    let Some(app) = spawn_app().await else { return };
    let client = reqwest::Client::new();
    let faculty = seed_user(&app.pool, "faculty").await;
    let student = seed_user(&app.pool, "student").await;
    let outsider = seed_user(&app.pool, "student").await;
    let course = seed_course(&app.pool, faculty).await;
    enroll(&app.pool, course, student).await;
    let fx = seed_open_quiz_in(&app, &client, faculty, course).await;

    let url = format!("{}/api/quizzes/verify-code", app.address);

    // Unknown code.
    let response = client
        .post(&url)
        .header("Authorization", bearer(student, "student"))
        .json(&serde_json::json!({"code": "??????"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    // Not enrolled.
    let response = client
        .post(&url)
        .header("Authorization", bearer(outsider, "student"))
        .json(&serde_json::json!({"code": fx.access_code}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    // Good code resolves to the quiz.
    let response = client
        .post(&url)
        .header("Authorization", bearer(student, "student"))
        .json(&serde_json::json!({"code": fx.access_code}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["quiz_id"].as_i64(), Some(fx.quiz_id));

    // After the attempt exists the code reports a conflict.
    client
        .post(&format!(
            "{}/api/quizzes/{}/attempts/start",
            app.address, fx.quiz_id
        ))
        .header("Authorization", bearer(student, "student"))
        .send()
        .await
        .unwrap();

    let response = client
        .post(&url)
        .header("Authorization", bearer(student, "student"))
        .json(&serde_json::json!({"code": fx.access_code}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn only_the_quiz_owner_or_admin_evaluates() {
    let Some(app) = spawn_app().await else { return };
    let client = reqwest::Client::new();
    let faculty = seed_user(&app.pool, "faculty").await;
    let other_faculty = seed_user(&app.pool, "faculty").await;
    let admin = seed_user(&app.pool, "admin").await;
    let student = seed_user(&app.pool, "student").await;
    let course = seed_course(&app.pool, faculty).await;
    enroll(&app.pool, course, student).await;
    let fx = seed_open_quiz_in(&app, &client, faculty, course).await;

    let started: serde_json::Value = client
        .post(&format!(
            "{}/api/quizzes/{}/attempts/start",
            app.address, fx.quiz_id
        ))
        .header("Authorization", bearer(student, "student"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let attempt_id = started["attempt_id"].as_i64().unwrap();

    client
        .post(&format!("{}/api/attempts/{}/submit", app.address, attempt_id))
        .header("Authorization", bearer(student, "student"))
        .json(&serde_json::json!({
            "answers": [{"question_id": fx.q1, "selected": [0]}]
        }))
        .send()
        .await
        .unwrap();

    // A different faculty member is refused.
    let response = client
        .post(&format!(
            "{}/api/attempts/{}/evaluate",
            app.address, attempt_id
        ))
        .header("Authorization", bearer(other_faculty, "faculty"))
        .json(&serde_json::json!({"overrides": []}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    // Admin may evaluate any quiz's attempts.
    let response = client
        .post(&format!(
            "{}/api/attempts/{}/evaluate",
            app.address, attempt_id
        ))
        .header("Authorization", bearer(admin, "admin"))
        .json(&serde_json::json!({"overrides": []}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}
