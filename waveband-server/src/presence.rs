use axum::{
    extract::Path,
    routing::{get, post},
    Json,
};
use waveband_core::Scope;

use crate::{
    auth::ClientIp,
    context::ServerContext,
    errors::{require, ServerResult},
    schemas::{PresenceSchema, ValidatedJson},
    serialized::{OkBody, PresenceBody},
    Router,
};

#[utoipa::path(
    post,
    path = "/presence",
    tag = "presence",
    request_body = PresenceSchema,
    responses(
        (status = 200, body = OkBody)
    )
)]
async fn publish(
    context: ServerContext,
    ClientIp(ip): ClientIp,
    ValidatedJson(body): ValidatedJson<PresenceSchema>,
) -> ServerResult<Json<OkBody>> {
    context.radio.limiter.hit(Scope::PresenceIp, &ip)?;

    let username = require(body.username, "missing_username")?;
    let in_game = require(body.in_game, "missing_in_game")?;

    context
        .radio
        .presence
        .publish(&username, in_game, body.have_pass.unwrap_or(false));

    Ok(Json(OkBody::ok()))
}

#[utoipa::path(
    get,
    path = "/presence/{username}",
    tag = "presence",
    responses(
        (status = 200, body = PresenceBody)
    )
)]
async fn lookup(context: ServerContext, Path(username): Path<String>) -> Json<PresenceBody> {
    let record = context.radio.presence.get(&username);

    Json(PresenceBody {
        ok: true,
        exists: record.is_some(),
        in_game: record.as_ref().map(|r| r.in_game).unwrap_or(false),
        have_pass: record.map(|r| r.have_pass).unwrap_or(false),
    })
}

pub fn router() -> Router {
    Router::new()
        .route("/", post(publish))
        .route("/:username", get(lookup))
}
