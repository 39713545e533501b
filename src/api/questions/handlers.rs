use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::schemas::question::{QuestionCreate, QuestionListQuery, QuestionResponse};
use crate::services::questions;

pub(super) async fn create_question(
    CurrentUser(caller): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<QuestionCreate>,
) -> Result<(StatusCode, Json<QuestionResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let question =
        questions::create_question(state.store(), &caller, payload, primitive_now_utc()).await?;

    Ok((StatusCode::CREATED, Json(QuestionResponse::from(question))))
}

pub(super) async fn list_questions(
    Query(query): Query<QuestionListQuery>,
    CurrentUser(caller): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<QuestionResponse>>, ApiError> {
    let items =
        questions::list_questions(state.store(), &caller, query.bank_id, query.include_inactive)
            .await?;

    Ok(Json(items.into_iter().map(QuestionResponse::from).collect()))
}

pub(super) async fn delete_question(
    Path(question_id): Path<String>,
    CurrentUser(caller): CurrentUser,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    questions::delete_question(state.store(), &caller, &question_id, primitive_now_utc()).await?;
    Ok(StatusCode::NO_CONTENT)
}
