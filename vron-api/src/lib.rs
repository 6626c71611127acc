use axum::Router;
use tower_http::trace::TraceLayer;

pub mod connector;
pub mod state;
pub mod worker;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(connector::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
