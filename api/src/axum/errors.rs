use axum::http::StatusCode;
use axum_derive_error::ErrorResponse;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Error, ErrorResponse)]
pub enum ApiError {
    #[error("Chain `{0}` not found.")]
    #[status(StatusCode::NOT_FOUND)]
    ChainNotFound(String),

    #[error("{0}")]
    #[status(StatusCode::BAD_REQUEST)]
    ClientError(String),

    #[error("{0}")]
    #[status(StatusCode::BAD_GATEWAY)]
    BackendError(String),

    #[error(transparent)]
    ServerError(#[from] anyhow::Error),
}

impl From<promptline::Error> for ApiError {
    fn from(err: promptline::Error) -> Self {
        match err {
            promptline::Error::MissingVariable(_) => Self::ClientError(err.to_string()),
            err if err.is_backend() => Self::BackendError(err.to_string()),
            err => Self::ServerError(err.into()),
        }
    }
}

impl PartialEq for ApiError {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string() && self.status_code() == other.status_code()
    }
}
