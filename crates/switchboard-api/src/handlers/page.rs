//! Landing page.

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};

use super::ApiState;

pub async fn handle_home(State(state): State<ApiState>, uri: Uri) -> Response {
    tracing::info!(%uri, "page request");
    match tokio::fs::read_to_string(&state.index_path).await {
        Ok(body) => Html(body).into_response(),
        Err(e) => {
            tracing::error!(path = %state.index_path.display(), error = %e, "failed to read index page");
            (StatusCode::INTERNAL_SERVER_ERROR, "page unavailable").into_response()
        }
    }
}

pub async fn handle_not_found(uri: Uri) -> (StatusCode, &'static str) {
    tracing::info!(%uri, "page request");
    (StatusCode::NOT_FOUND, "Not found")
}
