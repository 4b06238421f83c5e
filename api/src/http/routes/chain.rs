use axum::{
    routing::{get, post},
    Router,
};

use crate::{axum::state::AppState, http::controllers::ChainController};

pub fn mount() -> Router<AppState> {
    Router::new()
        .route("/:chain/invoke", post(ChainController::invoke))
        .route("/:chain/batch", post(ChainController::batch))
        .route("/:chain/input_schema", get(ChainController::input_schema))
}
