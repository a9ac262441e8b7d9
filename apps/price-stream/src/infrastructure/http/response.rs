//! HTTP error responses.

use axum::{
    Json,
    http::{StatusCode, header::WWW_AUTHENTICATE},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::application::ports::{AuthError, StoreError};

/// JSON body of every rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable reason.
    pub message: String,
}

/// Request rejection.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Rate governor denied the request.
    #[error("too many requests, slow down")]
    TooManyRequests,

    /// Caller could not be authenticated.
    #[error("unauthorized: {0}")]
    Unauthorized(#[from] AuthError),

    /// Price store failed.
    #[error("price store error: {0}")]
    Store(#[from] StoreError),

    /// Broadcast hub is not running.
    #[error("price stream unavailable")]
    Unavailable,
}

impl ApiError {
    /// HTTP status for this rejection.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::Store(ref e) => {
                tracing::error!(error = %e, "Price store request failed");
                let body = Json(ErrorResponse {
                    message: "internal error".to_string(),
                });
                (status, body).into_response()
            }
            Self::Unauthorized(_) => {
                let body = Json(ErrorResponse {
                    message: self.to_string(),
                });
                (status, [(WWW_AUTHENTICATE, "Bearer")], body).into_response()
            }
            Self::TooManyRequests | Self::Unavailable => {
                let body = Json(ErrorResponse {
                    message: self.to_string(),
                });
                (status, body).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(
            ApiError::TooManyRequests.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::Unauthorized(AuthError::InvalidCredentials).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Store(StoreError::Unavailable {
                message: "down".to_string()
            })
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Unavailable.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn unauthorized_carries_challenge() {
        let response = ApiError::Unauthorized(AuthError::MissingCredentials).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[WWW_AUTHENTICATE], "Bearer");
    }
}
