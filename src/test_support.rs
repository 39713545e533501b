use std::sync::{Arc, OnceLock};

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::json;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tower::ServiceExt;

use crate::api;
use crate::core::security::{self, CallerRole};
use crate::core::{config::Settings, state::AppState};
use crate::store::MemoryStore;

const TEST_SECRET_KEY: &str = "test-secret";

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) app: Router,
    _guard: OwnedMutexGuard<()>,
}

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("ACADEMIA_ENV", "test");
    std::env::set_var("ACADEMIA_STRICT_CONFIG", "0");
    std::env::set_var("SECRET_KEY", TEST_SECRET_KEY);
    std::env::set_var("STORE_BACKEND", "memory");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    std::env::remove_var("ALGORITHM");
    std::env::remove_var("JWT_AUDIENCE");
    std::env::remove_var("SUBMIT_GRACE_SECONDS");
    std::env::remove_var("PROJECT_NAME");
    std::env::remove_var("API_V1_STR");
    std::env::remove_var("VERSION");
    std::env::remove_var("DATABASE_URL");
}

pub(crate) async fn setup_test_context() -> TestContext {
    let guard = env_lock().await;
    set_test_env();

    let settings = Settings::load().expect("settings");
    let state = AppState::new(settings, Arc::new(MemoryStore::new()));
    let app = api::router::router(state.clone());

    TestContext { state, app, _guard: guard }
}

/// Signs a token the way the identity provider does; the service itself only verifies.
pub(crate) fn mint_token(
    user_id: &str,
    role: CallerRole,
    settings: &Settings,
    expires_in: time::Duration,
) -> String {
    let role = match role {
        CallerRole::Student => "student",
        CallerRole::Teacher => "teacher",
        CallerRole::Admin => "admin",
    };
    let claims = security::Claims {
        sub: user_id.to_string(),
        exp: (time::OffsetDateTime::now_utc() + expires_in).unix_timestamp(),
        role: Some(role.to_string()),
    };
    let algorithm = security::algorithm_from_settings(settings).expect("algorithm");

    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(algorithm),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(settings.security().secret_key.as_bytes()),
    )
    .expect("token")
}

pub(crate) fn bearer_token(user_id: &str, role: CallerRole, settings: &Settings) -> String {
    mint_token(user_id, role, settings, time::Duration::hours(1))
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}

pub(crate) async fn send_json(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let response =
        app.clone().oneshot(json_request(method, uri, token, body)).await.expect("response");
    let status = response.status();
    if status == StatusCode::NO_CONTENT {
        return (status, serde_json::Value::Null);
    }
    (status, read_json(response).await)
}

/// Question bank entries used by the HTTP flow tests: a multiple-choice
/// question (10 points, correct option "Paris"), a short answer ("Pacific",
/// 5 points) and a true/false statement ("True", 5 points).
pub(crate) async fn seed_question_bank(app: &Router, teacher_token: &str) -> Vec<String> {
    let payloads = [
        json!({
            "bank_id": "geo",
            "question_type": "multiple_choice",
            "text": "Which city is the capital of France?",
            "options": [
                {"text": "Berlin", "isCorrect": false},
                {"text": "Paris", "isCorrect": true},
                {"text": "Rome", "isCorrect": false},
                {"text": "Madrid", "isCorrect": false}
            ],
            "points": 10,
            "explanation": "Paris has been the capital since 987."
        }),
        json!({
            "bank_id": "geo",
            "question_type": "short_answer",
            "text": "Name the largest ocean.",
            "correct_answer": "Pacific",
            "points": 5
        }),
        json!({
            "bank_id": "geo",
            "question_type": "true_false",
            "text": "Water boils at 100 degrees Celsius at sea level.",
            "correct_answer": "True",
            "points": 5
        }),
    ];

    let mut ids = Vec::with_capacity(payloads.len());
    for payload in payloads {
        let (status, body) =
            send_json(app, Method::POST, "/api/v1/questions", Some(teacher_token), Some(payload))
                .await;
        assert_eq!(status, StatusCode::CREATED, "create question: {body}");
        ids.push(body["id"].as_str().expect("question id").to_string());
    }
    ids
}

/// Creates and publishes an exam over the seeded bank. `overrides` is merged
/// into the creation payload.
pub(crate) async fn seed_published_exam(
    app: &Router,
    teacher_token: &str,
    overrides: serde_json::Value,
) -> String {
    let question_ids = seed_question_bank(app, teacher_token).await;
    let mut payload = json!({
        "title": "Geography quiz",
        "duration_minutes": 30,
        "passing_score": 50.0,
        "questions": question_ids
            .iter()
            .map(|id| json!({"question_id": id}))
            .collect::<Vec<_>>(),
    });
    if let (Some(target), Some(extra)) = (payload.as_object_mut(), overrides.as_object()) {
        for (key, value) in extra {
            target.insert(key.clone(), value.clone());
        }
    }

    let (status, body) =
        send_json(app, Method::POST, "/api/v1/exams", Some(teacher_token), Some(payload)).await;
    assert_eq!(status, StatusCode::CREATED, "create exam: {body}");
    let exam_id = body["id"].as_str().expect("exam id").to_string();

    let (status, body) = send_json(
        app,
        Method::POST,
        &format!("/api/v1/exams/{exam_id}/publish"),
        Some(teacher_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "publish exam: {body}");
    exam_id
}

/// In-memory rows for unit tests that bypass the HTTP layer.
pub(crate) mod fixtures {
    use sqlx::types::Json;
    use time::macros::datetime;
    use time::PrimitiveDateTime;

    use crate::db::models::{
        AttemptLayout, Exam, ExamAnswer, ExamAttempt, ExamQuestion, ExamQuestionDetail, Question,
        QuestionOption,
    };
    use crate::db::types::{AttemptStatus, ExamStatus, QuestionType};
    use crate::store::AttemptStore;

    pub(crate) const TEACHER_ID: &str = "teacher-1";
    pub(crate) const EXAM_ID: &str = "exam-1";
    const CREATED_AT: PrimitiveDateTime = datetime!(2025-01-01 08:00:00);

    pub(crate) fn exam(shuffle_questions: bool, shuffle_options: bool) -> Exam {
        Exam {
            id: EXAM_ID.to_string(),
            title: "Geography quiz".to_string(),
            description: None,
            subject_id: None,
            class_id: None,
            duration_minutes: 60,
            total_points: 20,
            passing_score: 50.0,
            start_time: None,
            end_time: None,
            shuffle_questions,
            shuffle_options,
            show_results_immediately: true,
            allow_review: false,
            max_attempts: 1,
            status: ExamStatus::Published,
            created_by: TEACHER_ID.to_string(),
            created_at: CREATED_AT,
            updated_at: CREATED_AT,
            published_at: Some(CREATED_AT),
        }
    }

    fn detail(
        exam_question_id: &str,
        position: i32,
        points: i32,
        question_type: QuestionType,
        text: &str,
        options: Vec<QuestionOption>,
        correct_answer: Option<&str>,
    ) -> ExamQuestionDetail {
        let question = Question {
            id: format!("q-{exam_question_id}"),
            bank_id: "bank-1".to_string(),
            question_type,
            text: text.to_string(),
            options: Json(options),
            correct_answer: correct_answer.map(str::to_string),
            points,
            explanation: Some("See chapter 3".to_string()),
            difficulty: None,
            is_active: true,
            created_by: TEACHER_ID.to_string(),
            created_at: CREATED_AT,
            updated_at: CREATED_AT,
        };

        ExamQuestionDetail {
            binding: ExamQuestion {
                id: exam_question_id.to_string(),
                exam_id: EXAM_ID.to_string(),
                question_id: question.id.clone(),
                position,
                points,
            },
            question,
        }
    }

    pub(crate) fn multiple_choice(
        exam_question_id: &str,
        position: i32,
        points: i32,
        options: &[&str],
        correct_index: usize,
    ) -> ExamQuestionDetail {
        let options = options
            .iter()
            .enumerate()
            .map(|(idx, text)| QuestionOption {
                text: (*text).to_string(),
                is_correct: idx == correct_index,
            })
            .collect();
        detail(
            exam_question_id,
            position,
            points,
            QuestionType::MultipleChoice,
            "Pick the matching option.",
            options,
            None,
        )
    }

    pub(crate) fn short_answer(
        exam_question_id: &str,
        position: i32,
        points: i32,
        answer: &str,
    ) -> ExamQuestionDetail {
        detail(
            exam_question_id,
            position,
            points,
            QuestionType::ShortAnswer,
            "Name the capital city.",
            Vec::new(),
            Some(answer),
        )
    }

    pub(crate) fn true_false(
        exam_question_id: &str,
        position: i32,
        points: i32,
        answer: &str,
    ) -> ExamQuestionDetail {
        detail(
            exam_question_id,
            position,
            points,
            QuestionType::TrueFalse,
            "The statement holds.",
            Vec::new(),
            Some(answer),
        )
    }

    pub(crate) fn essay(exam_question_id: &str, position: i32, points: i32) -> ExamQuestionDetail {
        detail(
            exam_question_id,
            position,
            points,
            QuestionType::Essay,
            "Explain your reasoning.",
            Vec::new(),
            None,
        )
    }

    pub(crate) fn answer(
        exam_question_id: &str,
        answer_text: Option<&str>,
        selected_option: Option<i32>,
    ) -> ExamAnswer {
        ExamAnswer {
            id: format!("answer-{exam_question_id}"),
            attempt_id: "attempt-1".to_string(),
            exam_question_id: exam_question_id.to_string(),
            answer_text: answer_text.map(str::to_string),
            selected_option,
            time_spent_seconds: 0,
            answered_at: CREATED_AT,
            is_correct: None,
            points_earned: None,
            graded_by: None,
            feedback: None,
        }
    }

    pub(crate) fn attempt(
        exam: &Exam,
        started_at: PrimitiveDateTime,
        expires_at: PrimitiveDateTime,
    ) -> ExamAttempt {
        ExamAttempt {
            id: "attempt-1".to_string(),
            exam_id: exam.id.clone(),
            student_id: "student-1".to_string(),
            attempt_number: 1,
            status: AttemptStatus::InProgress,
            shuffle_seed: 0,
            layout: Json(AttemptLayout::default()),
            started_at,
            expires_at,
            submitted_at: None,
            time_spent_seconds: None,
            total_score: None,
            percentage: None,
            passed: None,
            graded_at: None,
            created_at: started_at,
            updated_at: started_at,
        }
    }

    /// Stores the question behind `detail` and returns its id.
    pub(crate) async fn seed_question(store: &dyn AttemptStore, detail: ExamQuestionDetail) -> String {
        store.create_question(detail.question).await.expect("seed question").id
    }

    pub(crate) async fn seed_exam(
        store: &dyn AttemptStore,
        exam: Exam,
        questions: Vec<ExamQuestionDetail>,
    ) -> Exam {
        let mut bindings = Vec::with_capacity(questions.len());
        for detail in questions {
            let mut binding = detail.binding.clone();
            binding.exam_id = exam.id.clone();
            store.create_question(detail.question).await.expect("seed question");
            bindings.push(binding);
        }
        store.create_exam(exam, bindings).await.expect("seed exam")
    }
}
