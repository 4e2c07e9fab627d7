use axum::{http::StatusCode, response::{IntoResponse, Response}};
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("{0} has expired")]
    Gone(&'static str),
    #[error("storage unavailable: {0}")]
    Transient(anyhow::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()).into_response(),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()).into_response(),
            AppError::Gone(_) => (StatusCode::GONE, self.to_string()).into_response(),
            AppError::Transient(err) => {
                tracing::warn!(error = %err, "transient storage failure");
                (StatusCode::BAD_GATEWAY, format!("storage unavailable: {err}")).into_response()
            }
            AppError::Internal(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("{}\n\n{}", err, err.backtrace()),
            )
                .into_response(),
        }
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self::Internal(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(serde_json::Error);
apperr_impl!(axum::Error);
apperr_impl!(axum::extract::multipart::MultipartError);
apperr_impl!(std::io::Error);
