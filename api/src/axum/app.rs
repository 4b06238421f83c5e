use axum::Router;
use promptline::{config, Config, Result};
use tower_http::{
    cors::CorsLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::{
    axum::{
        request_id::RequestIdMaker,
        state::{self, AppState},
    },
    http::routes,
};

const REQUIRED_ENV_VARS: &[&str] = &["OPENAI_API_KEY"];

/// # Errors
///
/// Returns [`promptline::Error::ConfigurationMissing`] naming the first required variable
/// that is unset.
pub fn create(config: &Config) -> Result<Router> {
    config::require(REQUIRED_ENV_VARS)?;

    Ok(router(state::create(config)?))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::mount())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(RequestIdMaker::default()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
