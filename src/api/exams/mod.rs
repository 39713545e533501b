mod handlers;

use axum::{routing::get, routing::post, Router};

use crate::api::attempts;
use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_exam))
        .route("/:exam_id", get(handlers::get_exam).patch(handlers::update_exam))
        .route("/:exam_id/publish", post(handlers::publish_exam))
        .route("/:exam_id/archive", post(handlers::archive_exam))
        .route(
            "/:exam_id/attempts",
            post(attempts::start_attempt).get(handlers::list_exam_attempts),
        )
}

#[cfg(test)]
mod tests;
