use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::error;
use thiserror::Error;
use waveband_core::{HubError, PairingError, RateLimited, TokenError};

use crate::serialized::ErrorBody;

pub type ServerResult<T> = Result<T, ServerError>;

/// The closed error vocabulary of the HTTP surface. Every rejection leaves
/// the server as `{ok: false, error: <code>}` with one of these codes.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Missing or wrong shared server key
    #[error("unauthorized")]
    Unauthorized,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("token_user_mismatch")]
    TokenUserMismatch,
    #[error("not_in_game")]
    NotInGame,
    /// Names the missing or invalid part of the request
    #[error("{0}")]
    BadRequest(&'static str),
    #[error("rate_limited")]
    RateLimited,
    #[error("code_generation_failed")]
    CodeGeneration,
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized | Self::Token(_) => StatusCode::UNAUTHORIZED,
            Self::TokenUserMismatch | Self::NotInGame => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::CodeGeneration => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.as_status_code();

        // Log server errors when they happen
        if status.as_u16() >= 500 {
            error!("Request failed: {}", self);
        }

        (status, Json(ErrorBody::new(self.to_string()))).into_response()
    }
}

impl From<RateLimited> for ServerError {
    fn from(_: RateLimited) -> Self {
        Self::RateLimited
    }
}

impl From<HubError> for ServerError {
    fn from(_: HubError) -> Self {
        Self::RateLimited
    }
}

impl From<PairingError> for ServerError {
    fn from(value: PairingError) -> Self {
        match value {
            PairingError::NotInGame => Self::NotInGame,
            PairingError::CodeGeneration => Self::CodeGeneration,
            PairingError::InvalidOrExpired => Self::BadRequest("invalid_or_expired"),
        }
    }
}

/// Unwraps a request field the caller was required to send
pub fn require<T>(value: Option<T>, missing: &'static str) -> ServerResult<T> {
    value.ok_or(ServerError::BadRequest(missing))
}
