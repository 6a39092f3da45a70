use axum::{response::IntoResponse, response::Response, routing::post, Json};
use waveband_core::{PairingError, Scope};

use crate::{
    auth::{ClientIp, ServerKey},
    context::ServerContext,
    errors::{require, ServerResult},
    schemas::{CreateSessionSchema, ValidatedJson, VerifySessionSchema},
    serialized::{CreatedSessionBody, ErrorBody, VerifiedSessionBody},
    Router,
};

#[utoipa::path(
    post,
    path = "/session/create",
    tag = "session",
    request_body = CreateSessionSchema,
    security(
        ("ServerKey" = [])
    ),
    responses(
        (status = 200, body = CreatedSessionBody),
        (status = 403, description = "User is not in a game session", body = ErrorBody)
    )
)]
async fn create(
    _key: ServerKey,
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<CreateSessionSchema>,
) -> ServerResult<Json<CreatedSessionBody>> {
    let username = require(body.username, "missing_username")?;

    let issued = context
        .radio
        .pairing
        .issue(&username, body.have_pass.unwrap_or(false))?;

    Ok(Json(CreatedSessionBody {
        ok: true,
        code: issued.code,
        exp: issued.exp,
    }))
}

#[utoipa::path(
    post,
    path = "/session/verify",
    tag = "session",
    request_body = VerifySessionSchema,
    responses(
        (status = 200, body = VerifiedSessionBody),
        (status = 429, description = "Too many attempts", body = ErrorBody)
    )
)]
async fn verify(
    context: ServerContext,
    ClientIp(ip): ClientIp,
    ValidatedJson(body): ValidatedJson<VerifySessionSchema>,
) -> ServerResult<Response> {
    context.radio.limiter.hit(Scope::Verify, &ip)?;

    let code = require(body.code, "missing_code")?;

    match context.radio.pairing.redeem(&code) {
        Ok(session) => Ok(Json(VerifiedSessionBody {
            ok: true,
            username: session.username,
            have_pass: session.have_pass,
            token: session.token,
            token_exp: session.token_exp,
        })
        .into_response()),
        // Losing the race for a code is a business outcome, not a fault
        Err(error @ (PairingError::InvalidOrExpired | PairingError::NotInGame)) => {
            Ok(Json(ErrorBody::new(error.to_string())).into_response())
        }
        Err(error) => Err(error.into()),
    }
}

pub fn router() -> Router {
    Router::new()
        .route("/create", post(create))
        .route("/verify", post(verify))
}
