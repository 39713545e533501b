use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::api::pagination::{PageQuery, PaginatedResponse};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::schemas::attempt::AttemptResponse;
use crate::schemas::exam::{ExamCreate, ExamResponse, ExamUpdate};
use crate::services::exams::{self, ExamView};

pub(super) async fn create_exam(
    CurrentUser(caller): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<ExamCreate>,
) -> Result<(StatusCode, Json<ExamResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let (exam, bindings) =
        exams::create_exam(state.store(), &caller, payload, primitive_now_utc()).await?;

    Ok((StatusCode::CREATED, Json(ExamResponse::from_exam(&exam, Some(&bindings)))))
}

pub(super) async fn get_exam(
    Path(exam_id): Path<String>,
    CurrentUser(caller): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ExamResponse>, ApiError> {
    let response = match exams::get_exam(state.store(), &caller, &exam_id).await? {
        ExamView::Full { exam, bindings } => ExamResponse::from_exam(&exam, Some(&bindings)),
        ExamView::Summary(exam) => ExamResponse::from_exam(&exam, None),
    };

    Ok(Json(response))
}

pub(super) async fn update_exam(
    Path(exam_id): Path<String>,
    CurrentUser(caller): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<ExamUpdate>,
) -> Result<Json<ExamResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let exam =
        exams::update_exam(state.store(), &caller, &exam_id, payload, primitive_now_utc()).await?;

    Ok(Json(ExamResponse::from_exam(&exam, None)))
}

pub(super) async fn publish_exam(
    Path(exam_id): Path<String>,
    CurrentUser(caller): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = exams::publish_exam(state.store(), &caller, &exam_id, primitive_now_utc()).await?;
    Ok(Json(ExamResponse::from_exam(&exam, None)))
}

pub(super) async fn archive_exam(
    Path(exam_id): Path<String>,
    CurrentUser(caller): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = exams::archive_exam(state.store(), &caller, &exam_id, primitive_now_utc()).await?;
    Ok(Json(ExamResponse::from_exam(&exam, None)))
}

pub(super) async fn list_exam_attempts(
    Path(exam_id): Path<String>,
    Query(page): Query<PageQuery>,
    CurrentUser(caller): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<PaginatedResponse<AttemptResponse>>, ApiError> {
    let (skip, limit) = page.normalized();
    let (attempts, total_count) =
        exams::list_exam_attempts(state.store(), &caller, &exam_id, skip, limit).await?;

    Ok(Json(PaginatedResponse {
        items: attempts.iter().map(|attempt| AttemptResponse::from_attempt(attempt, true)).collect(),
        total_count,
        skip,
        limit,
    }))
}
