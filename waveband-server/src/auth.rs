use std::{convert::Infallible, net::SocketAddr};

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRef, FromRequestParts, Query},
    http::request::Parts,
};
use serde::Deserialize;
use waveband_core::{normalize_username, TokenError};

use crate::{context::ServerContext, errors::ServerError};

/// Proof that the request carried the shared game-server key.
///
/// When no key is configured every game-server call is refused; there is no
/// open mode on this side of the boundary.
pub struct ServerKey;

#[async_trait]
impl FromRequestParts<ServerContext> for ServerKey {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerContext,
    ) -> Result<Self, Self::Rejection> {
        let context = ServerContext::from_ref(state);

        let presented = parts
            .headers
            .get("x-roblox-key")
            .and_then(|value| value.to_str().ok());

        match (context.server_key.as_deref(), presented) {
            (Some(expected), Some(given)) if expected == given => Ok(Self),
            _ => Err(ServerError::Unauthorized),
        }
    }
}

/// The client address, preferring the first `x-forwarded-for` entry
pub struct ClientIp(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        let ip = forwarded.unwrap_or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip().to_string())
                .unwrap_or_else(|| "unknown".to_string())
        });

        Ok(Self(ip))
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// A token picked up from the request header or query string. Bodies are
/// consulted last, by the handlers that have one.
pub struct TokenCandidate(pub Option<String>);

impl TokenCandidate {
    /// Applies the header -> query -> body precedence
    pub fn or_body(self, body: Option<&str>) -> Option<String> {
        self.0.or_else(|| body.map(str::to_string))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for TokenCandidate
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("x-radio-token")
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        let token = header.or_else(|| {
            Query::<TokenQuery>::try_from_uri(&parts.uri)
                .ok()
                .and_then(|query| query.0.token)
                .filter(|value| !value.is_empty())
        });

        Ok(Self(token))
    }
}

/// Checks a presented token against the user a request wants to act as.
///
/// With token auth disabled (no secret configured) the caller is trusted
/// outright; that is the dev-mode policy, applied here so every operation
/// shares it explicitly.
pub fn authorize(
    context: &ServerContext,
    token: Option<String>,
    username: &str,
) -> Result<(), ServerError> {
    let radio = &context.radio;

    match radio.tokens.verify(token.as_deref(), radio.now_ms()) {
        Ok(claims) => {
            if claims.username == normalize_username(username) {
                Ok(())
            } else {
                Err(ServerError::TokenUserMismatch)
            }
        }
        Err(TokenError::Disabled) => Ok(()),
        Err(error) => Err(error.into()),
    }
}
