use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use shared::ApiResponse;

use crate::auth::TokenError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    AuthError(String),
    #[error("{0}")]
    NotFound(String),
    #[error("upstream failure: {0}")]
    Upstream(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the caller. Store and upstream details stay in the
    /// logs unless this is a debug build.
    fn public_message(&self) -> String {
        match self {
            AppError::BadRequest(msg) | AppError::AuthError(msg) | AppError::NotFound(msg) => {
                msg.clone()
            }
            AppError::Upstream(detail) if cfg!(debug_assertions) => {
                format!("Upstream service failed: {detail}")
            }
            AppError::Upstream(_) => "Upstream service failed".to_string(),
            AppError::Internal(detail) if cfg!(debug_assertions) => {
                format!("Internal server error: {detail}")
            }
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Upstream(detail) => tracing::error!("Upstream error: {}", detail),
            AppError::Internal(detail) => tracing::error!("Internal error: {}", detail),
            other => tracing::debug!("Request rejected: {}", other),
        }

        let body = ApiResponse::failure(self.public_message());
        (self.status(), Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(format!("{err:#}"))
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(detail) => AppError::Internal(detail),
            other => AppError::AuthError(other.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_status_codes() {
        assert_eq!(AppError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::AuthError("x".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Upstream("x".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            AppError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn token_errors_become_auth_errors() {
        let err: AppError = TokenError::Expired.into();
        assert!(matches!(err, AppError::AuthError(ref m) if m == "Token has expired"));

        let err: AppError = TokenError::Signing("boom".into()).into();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
