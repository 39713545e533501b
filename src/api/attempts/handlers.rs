use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::schemas::attempt::{
    AnswerResponse, AttemptDetailResponse, AttemptResponse, ExamSummary, ManualGradeRequest,
    QuestionSet, RecordAnswerRequest, StartAttemptResponse, SubmitAttemptRequest,
    SubmitAttemptResponse,
};
use crate::services::attempts::AttemptQuestions;
use crate::services::exams::{self, ManualGradeInput};

pub(crate) async fn start_attempt(
    Path(exam_id): Path<String>,
    CurrentUser(caller): CurrentUser,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<StartAttemptResponse>), ApiError> {
    let started = state.attempts().start_attempt(&caller, &exam_id, primitive_now_utc()).await?;

    Ok((
        StatusCode::CREATED,
        Json(StartAttemptResponse {
            attempt: AttemptResponse::from_attempt(&started.attempt, false),
            exam: ExamSummary::from(&started.exam),
            questions: started.questions,
        }),
    ))
}

pub(super) async fn record_answer(
    Path(attempt_id): Path<String>,
    CurrentUser(caller): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<RecordAnswerRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let answer = state
        .attempts()
        .record_answer(
            &caller,
            &attempt_id,
            &payload.exam_question_id,
            payload.answer,
            payload.time_spent_seconds,
            primitive_now_utc(),
        )
        .await?;

    Ok(Json(AnswerResponse::from_answer(&answer, false)))
}

pub(super) async fn submit_attempt(
    Path(attempt_id): Path<String>,
    CurrentUser(caller): CurrentUser,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SubmitAttemptResponse>, ApiError> {
    let payload = parse_submit_body(&body)?;
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let submitted = state
        .attempts()
        .submit_attempt(
            &caller,
            &attempt_id,
            payload.time_spent_seconds,
            payload.include_review,
            primitive_now_utc(),
        )
        .await?;

    let show_scores = submitted.show_scores;
    Ok(Json(SubmitAttemptResponse {
        attempt: AttemptResponse::from_attempt(&submitted.attempt, show_scores),
        answers: show_scores.then(|| {
            submitted
                .answers
                .iter()
                .map(|answer| AnswerResponse::from_answer(answer, true))
                .collect()
        }),
        review: submitted.review,
    }))
}

/// An empty body submits with defaults; anything else must be a valid request.
fn parse_submit_body(body: &[u8]) -> Result<SubmitAttemptRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(SubmitAttemptRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(e.to_string()))
}

pub(super) async fn get_attempt(
    Path(attempt_id): Path<String>,
    CurrentUser(caller): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptDetailResponse>, ApiError> {
    let view = state.attempts().get_attempt(&caller, &attempt_id, primitive_now_utc()).await?;

    let questions = match view.questions {
        AttemptQuestions::Sanitized(items) => QuestionSet::Sanitized(items),
        AttemptQuestions::Review(items) => QuestionSet::Review(items),
    };

    Ok(Json(AttemptDetailResponse {
        attempt: AttemptResponse::from_attempt(&view.attempt, view.show_scores),
        exam: ExamSummary::from(&view.exam),
        questions,
        answers: view
            .answers
            .iter()
            .map(|answer| AnswerResponse::from_answer(answer, view.show_scores))
            .collect(),
    }))
}

pub(super) async fn list_my_attempts(
    CurrentUser(caller): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<AttemptResponse>>, ApiError> {
    let attempts = state.attempts().list_my_attempts(&caller).await?;

    Ok(Json(
        attempts
            .iter()
            .map(|summary| AttemptResponse::from_attempt(&summary.attempt, summary.show_scores))
            .collect(),
    ))
}

pub(super) async fn grade_answer(
    Path((attempt_id, exam_question_id)): Path<(String, String)>,
    CurrentUser(caller): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<ManualGradeRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let (_, answer) = exams::grade_answer(
        state.store(),
        &caller,
        &attempt_id,
        &exam_question_id,
        ManualGradeInput {
            points_earned: payload.points_earned,
            is_correct: payload.is_correct,
            feedback: payload.feedback,
        },
        primitive_now_utc(),
    )
    .await?;

    Ok(Json(AnswerResponse::from_answer(&answer, true)))
}
