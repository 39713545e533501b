use axum::http::{Method, StatusCode};
use serde_json::json;

use crate::core::security::CallerRole;
use crate::test_support::{self, send_json};

#[tokio::test]
async fn teacher_creates_and_publishes_exam() {
    let ctx = test_support::setup_test_context().await;
    let settings = ctx.state.settings();
    let teacher = test_support::bearer_token("teacher-1", CallerRole::Teacher, settings);
    let student = test_support::bearer_token("student-1", CallerRole::Student, settings);
    let question_ids = test_support::seed_question_bank(&ctx.app, &teacher).await;

    let (status, created) = send_json(
        &ctx.app,
        Method::POST,
        "/api/v1/exams",
        Some(&teacher),
        Some(json!({
            "title": "Geography midterm",
            "durationMinutes": 40,
            "startTime": "2025-03-01T09:00:00Z",
            "endTime": "2025-03-01T12:00:00Z",
            "questions": [
                {"question_id": question_ids[0]},
                {"question_id": question_ids[1], "points": 7}
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["status"], "draft");
    assert_eq!(created["total_points"], 17);
    assert_eq!(created["max_attempts"], 1);
    assert_eq!(created["passing_score"], 50.0);
    assert_eq!(created["questions"][0]["position"], 1);
    assert_eq!(created["questions"][1]["points"], 7);
    let exam_id = created["id"].as_str().expect("exam id");

    let (status, _) = send_json(
        &ctx.app,
        Method::GET,
        &format!("/api/v1/exams/{exam_id}"),
        Some(&student),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, published) = send_json(
        &ctx.app,
        Method::POST,
        &format!("/api/v1/exams/{exam_id}/publish"),
        Some(&teacher),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{published}");
    assert_eq!(published["status"], "published");
    assert!(published["published_at"].is_string());

    let (status, summary) = send_json(
        &ctx.app,
        Method::GET,
        &format!("/api/v1/exams/{exam_id}"),
        Some(&student),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{summary}");
    assert_eq!(summary["title"], "Geography midterm");
    assert!(summary.get("questions").is_none());

    let (status, full) = send_json(
        &ctx.app,
        Method::GET,
        &format!("/api/v1/exams/{exam_id}"),
        Some(&teacher),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(full["questions"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn students_cannot_author_exams() {
    let ctx = test_support::setup_test_context().await;
    let student =
        test_support::bearer_token("student-1", CallerRole::Student, ctx.state.settings());

    let (status, body) = send_json(
        &ctx.app,
        Method::POST,
        "/api/v1/exams",
        Some(&student),
        Some(json!({"title": "Sneaky", "duration_minutes": 10})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
    assert_eq!(body["code"], "forbidden");
}

#[tokio::test]
async fn exam_payload_is_validated() {
    let ctx = test_support::setup_test_context().await;
    let teacher =
        test_support::bearer_token("teacher-1", CallerRole::Teacher, ctx.state.settings());

    let (status, body) = send_json(
        &ctx.app,
        Method::POST,
        "/api/v1/exams",
        Some(&teacher),
        Some(json!({"title": "", "duration_minutes": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, body) = send_json(
        &ctx.app,
        Method::POST,
        "/api/v1/exams",
        Some(&teacher),
        Some(json!({
            "title": "Backwards window",
            "duration_minutes": 30,
            "start_time": "2025-03-02T09:00:00Z",
            "end_time": "2025-03-01T09:00:00Z"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, body) = send_json(
        &ctx.app,
        Method::POST,
        "/api/v1/exams",
        Some(&teacher),
        Some(json!({
            "title": "Ghost question",
            "duration_minutes": 30,
            "questions": [{"question_id": "missing"}]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");
}

#[tokio::test]
async fn publishing_requires_questions() {
    let ctx = test_support::setup_test_context().await;
    let teacher =
        test_support::bearer_token("teacher-1", CallerRole::Teacher, ctx.state.settings());

    let (_, created) = send_json(
        &ctx.app,
        Method::POST,
        "/api/v1/exams",
        Some(&teacher),
        Some(json!({"title": "Empty", "duration_minutes": 15})),
    )
    .await;
    let exam_id = created["id"].as_str().expect("exam id");

    let (status, body) = send_json(
        &ctx.app,
        Method::POST,
        &format!("/api/v1/exams/{exam_id}/publish"),
        Some(&teacher),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
}

#[tokio::test]
async fn raising_max_attempts_allows_another_start() {
    let ctx = test_support::setup_test_context().await;
    let settings = ctx.state.settings();
    let teacher = test_support::bearer_token("teacher-1", CallerRole::Teacher, settings);
    let other_teacher = test_support::bearer_token("teacher-2", CallerRole::Teacher, settings);
    let student = test_support::bearer_token("student-1", CallerRole::Student, settings);
    let exam_id = test_support::seed_published_exam(&ctx.app, &teacher, json!({})).await;
    let start_uri = format!("/api/v1/exams/{exam_id}/attempts");

    let (status, first) = send_json(&ctx.app, Method::POST, &start_uri, Some(&student), None).await;
    assert_eq!(status, StatusCode::CREATED, "{first}");
    let (status, _) = send_json(&ctx.app, Method::POST, &start_uri, Some(&student), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send_json(
        &ctx.app,
        Method::PATCH,
        &format!("/api/v1/exams/{exam_id}"),
        Some(&other_teacher),
        Some(json!({"max_attempts": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, patched) = send_json(
        &ctx.app,
        Method::PATCH,
        &format!("/api/v1/exams/{exam_id}"),
        Some(&teacher),
        Some(json!({"maxAttempts": 2, "title": "Geography quiz (retake)"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{patched}");
    assert_eq!(patched["max_attempts"], 2);
    assert_eq!(patched["title"], "Geography quiz (retake)");

    let (status, second) =
        send_json(&ctx.app, Method::POST, &start_uri, Some(&student), None).await;
    assert_eq!(status, StatusCode::CREATED, "{second}");
    assert_eq!(second["attempt"]["attempt_number"], 2);

    let (status, page) = send_json(
        &ctx.app,
        Method::GET,
        &format!("{start_uri}?skip=1&limit=1"),
        Some(&teacher),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{page}");
    assert_eq!(page["total_count"], 2);
    assert_eq!(page["items"].as_array().map(Vec::len), Some(1));

    let (status, _) = send_json(&ctx.app, Method::GET, &start_uri, Some(&student), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn archived_exam_rejects_new_attempts() {
    let ctx = test_support::setup_test_context().await;
    let settings = ctx.state.settings();
    let teacher = test_support::bearer_token("teacher-1", CallerRole::Teacher, settings);
    let student = test_support::bearer_token("student-1", CallerRole::Student, settings);
    let exam_id = test_support::seed_published_exam(&ctx.app, &teacher, json!({})).await;

    let (status, archived) = send_json(
        &ctx.app,
        Method::POST,
        &format!("/api/v1/exams/{exam_id}/archive"),
        Some(&teacher),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{archived}");
    assert_eq!(archived["status"], "archived");

    let (status, body) = send_json(
        &ctx.app,
        Method::POST,
        &format!("/api/v1/exams/{exam_id}/attempts"),
        Some(&student),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert_eq!(body["code"], "not_available");

    let (status, body) = send_json(
        &ctx.app,
        Method::PATCH,
        &format!("/api/v1/exams/{exam_id}"),
        Some(&teacher),
        Some(json!({"title": "Too late"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert_eq!(body["code"], "invalid_state");
}

#[tokio::test]
async fn question_bank_endpoints() {
    let ctx = test_support::setup_test_context().await;
    let settings = ctx.state.settings();
    let teacher = test_support::bearer_token("teacher-1", CallerRole::Teacher, settings);
    let student = test_support::bearer_token("student-1", CallerRole::Student, settings);

    let (status, body) = send_json(
        &ctx.app,
        Method::POST,
        "/api/v1/questions",
        Some(&teacher),
        Some(json!({
            "bank_id": "geo",
            "type": "multiple_choice",
            "text": "Pick the river",
            "options": [
                {"text": "Nile", "isCorrect": true},
                {"text": "Alps", "isCorrect": true}
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let ids = test_support::seed_question_bank(&ctx.app, &teacher).await;

    let (status, listed) =
        send_json(&ctx.app, Method::GET, "/api/v1/questions?bank_id=geo", Some(&teacher), None)
            .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().map(Vec::len), Some(3));
    let short_answer = listed
        .as_array()
        .and_then(|items| items.iter().find(|item| item["question_type"] == "short_answer"))
        .expect("short answer question");
    assert_eq!(short_answer["correct_answer"], "Pacific");

    let (status, _) =
        send_json(&ctx.app, Method::GET, "/api/v1/questions", Some(&student), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let other_teacher = test_support::bearer_token("teacher-2", CallerRole::Teacher, settings);
    let (status, _) = send_json(
        &ctx.app,
        Method::DELETE,
        &format!("/api/v1/questions/{}", ids[0]),
        Some(&other_teacher),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send_json(
        &ctx.app,
        Method::DELETE,
        &format!("/api/v1/questions/{}", ids[0]),
        Some(&teacher),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, listed) =
        send_json(&ctx.app, Method::GET, "/api/v1/questions", Some(&teacher), None).await;
    assert_eq!(listed.as_array().map(Vec::len), Some(2));

    let (status, _) = send_json(
        &ctx.app,
        Method::DELETE,
        "/api/v1/questions/missing",
        Some(&teacher),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
