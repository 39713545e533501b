mod handlers;

use axum::{routing::delete, routing::post, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_question).get(handlers::list_questions))
        .route("/:question_id", delete(handlers::delete_question))
}
