use crate::state::AppState;
use crate::{api, logging, middleware};
use axum::Router;

/// Composes the HTTP surface: handlers wrapped by the envelope layer, all of
/// it wrapped by request logging (which assigns the trace id).
pub fn build_http_app(state: AppState) -> Router {
    api::routes()
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::envelope_middleware,
        ))
        .layer(axum::middleware::from_fn(logging::request_logging))
        .with_state(state)
}
