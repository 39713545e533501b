mod handlers;

use axum::{routing::get, routing::post, routing::put, Router};

use crate::core::state::AppState;

pub(crate) use handlers::start_attempt;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/mine", get(handlers::list_my_attempts))
        .route("/:attempt_id", get(handlers::get_attempt))
        .route("/:attempt_id/answers", put(handlers::record_answer))
        .route("/:attempt_id/submit", post(handlers::submit_attempt))
        .route(
            "/:attempt_id/answers/:exam_question_id/grade",
            post(handlers::grade_answer),
        )
}
