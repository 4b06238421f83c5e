use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use std::env;

mod chain;

use crate::axum::state::AppState;

pub fn mount() -> Router<AppState> {
    Router::new()
        .merge(chain::mount())
        .route("/version", get(version))
        .route("/", get(health))
}

#[derive(serde::Serialize)]
struct PromptlineVersion {
    semver: String,
    rev: Option<String>,
    compile_time: String,
}

#[allow(clippy::unused_async)]
async fn version() -> Json<PromptlineVersion> {
    Json(PromptlineVersion {
        rev: env::var("GIT_REV").ok(),
        semver: env!("CARGO_PKG_VERSION").to_string(),
        compile_time: env!("STATIC_BUILD_DATE").to_string(),
    })
}

#[allow(clippy::unused_async)]
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
