use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::request::Parts,
    RequestPartsExt,
};
use promptline::Chain;
use std::sync::Arc;

use crate::axum::{errors::ApiError, state::AppState};

/// The chain named by the `:chain` path segment.
pub struct NamedChain {
    pub name: String,
    pub chain: Arc<Chain>,
}

#[async_trait]
impl FromRequestParts<AppState> for NamedChain {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Path(name) = parts
            .extract::<Path<String>>()
            .await
            .map_err(|_| ApiError::ClientError("Invalid chain name.".to_string()))?;

        let Some(chain) = state.chains.get(&name).cloned() else {
            return Err(ApiError::ChainNotFound(name));
        };

        Ok(Self { name, chain })
    }
}
