use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::post,
    Router,
};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/connector/api", post(handle_request))
}

/// The partner endpoint. The dispatcher always produces a well-formed XML
/// document, so this handler never maps failures to HTTP status codes.
async fn handle_request(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let response = state.connector.handle(&body).await;
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/xml")],
        response,
    )
}
