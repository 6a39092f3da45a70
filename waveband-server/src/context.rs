use std::{convert::Infallible, sync::Arc};

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use waveband_core::Radio;

#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub radio: Arc<Radio>,
    /// Shared secret for game-server calls. All such calls fail when unset.
    pub server_key: Option<String>,
}

#[async_trait]
impl FromRequestParts<ServerContext> for ServerContext {
    type Rejection = Infallible;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &ServerContext,
    ) -> Result<Self, Self::Rejection> {
        let context = ServerContext::from_ref(state);

        Ok(context)
    }
}
