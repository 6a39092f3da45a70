use axum::{
    extract::Path,
    routing::{get, post},
    Json,
};
use waveband_core::{Audience, RadioEvent, Scope, StateUpdate};

use crate::{
    auth::{authorize, ClientIp, ServerKey, TokenCandidate},
    context::ServerContext,
    errors::{require, ServerError, ServerResult},
    schemas::{JoinSchema, MuteSchema, StateSchema, ValidatedJson},
    serialized::{ActiveBody, EventsBody, ToSerialized, WriteBody},
    Router,
};

#[utoipa::path(
    post,
    path = "/radio/join",
    tag = "radio",
    request_body = JoinSchema,
    security(
        ("RadioToken" = [])
    ),
    responses(
        (status = 200, body = WriteBody)
    )
)]
async fn join(
    context: ServerContext,
    ClientIp(ip): ClientIp,
    token: TokenCandidate,
    ValidatedJson(body): ValidatedJson<JoinSchema>,
) -> ServerResult<Json<WriteBody>> {
    context.radio.limiter.hit(Scope::JoinIp, &ip)?;

    let username = require(body.username, "missing_username")?;
    authorize(&context, token.or_body(body.token.as_deref()), &username)?;

    if !context.radio.presence.is_in_game(&username) {
        return Err(ServerError::NotInGame);
    }

    let outcome = context
        .radio
        .events
        .append(&username, Audience::Roblox, RadioEvent::RadioJoin);

    Ok(Json(if outcome.is_ignored() {
        WriteBody::ignored()
    } else {
        WriteBody::stored()
    }))
}

fn apply_mute(context: &ServerContext, username: &str, muted: bool) -> WriteBody {
    let event = RadioEvent::mute(muted);

    // The pull queue always gets the record, so a subscriber that was
    // momentarily gone can still learn the current flag via the drain path
    let outcome = context
        .radio
        .events
        .append(username, Audience::Web, event.clone());

    if outcome.is_ignored() {
        return WriteBody::ignored();
    }

    let pushed = context.radio.hub.push(username, &event);
    WriteBody::pushed(pushed)
}

#[utoipa::path(
    post,
    path = "/radio/mute",
    tag = "radio",
    request_body = MuteSchema,
    security(
        ("RadioToken" = [])
    ),
    responses(
        (status = 200, body = WriteBody)
    )
)]
async fn mute(
    context: ServerContext,
    ClientIp(ip): ClientIp,
    token: TokenCandidate,
    ValidatedJson(body): ValidatedJson<MuteSchema>,
) -> ServerResult<Json<WriteBody>> {
    context.radio.limiter.hit(Scope::MuteIp, &ip)?;

    let username = require(body.username, "missing_username")?;
    let muted = require(body.muted, "missing_muted")?;
    authorize(&context, token.or_body(body.token.as_deref()), &username)?;

    if !context.radio.presence.is_in_game(&username) {
        return Err(ServerError::NotInGame);
    }

    Ok(Json(apply_mute(&context, &username, muted)))
}

#[utoipa::path(
    post,
    path = "/radio/mute/server",
    tag = "radio",
    request_body = MuteSchema,
    security(
        ("ServerKey" = [])
    ),
    responses(
        (status = 200, body = WriteBody)
    )
)]
async fn mute_server(
    _key: ServerKey,
    context: ServerContext,
    ClientIp(ip): ClientIp,
    ValidatedJson(body): ValidatedJson<MuteSchema>,
) -> ServerResult<Json<WriteBody>> {
    context.radio.limiter.hit(Scope::MuteIp, &ip)?;

    let username = require(body.username, "missing_username")?;
    let muted = require(body.muted, "missing_muted")?;

    if !context.radio.presence.is_in_game(&username) {
        return Err(ServerError::NotInGame);
    }

    Ok(Json(apply_mute(&context, &username, muted)))
}

#[utoipa::path(
    get,
    path = "/radio/sync/{username}",
    tag = "radio",
    security(
        ("RadioToken" = [])
    ),
    responses(
        (status = 200, body = EventsBody)
    )
)]
async fn sync(
    context: ServerContext,
    ClientIp(ip): ClientIp,
    token: TokenCandidate,
    Path(username): Path<String>,
) -> ServerResult<Json<EventsBody>> {
    context.radio.limiter.hit(Scope::SyncIp, &ip)?;
    authorize(&context, token.0, &username)?;

    Ok(Json(EventsBody {
        ok: true,
        events: context.radio.events.drain_web(&username),
    }))
}

#[utoipa::path(
    get,
    path = "/radio/poll/{username}",
    tag = "radio",
    security(
        ("ServerKey" = [])
    ),
    responses(
        (status = 200, body = EventsBody)
    )
)]
async fn poll(
    _key: ServerKey,
    context: ServerContext,
    ClientIp(ip): ClientIp,
    Path(username): Path<String>,
) -> ServerResult<Json<EventsBody>> {
    context.radio.limiter.hit(Scope::PollIp, &ip)?;

    Ok(Json(EventsBody {
        ok: true,
        events: context.radio.events.drain_roblox(&username),
    }))
}

#[utoipa::path(
    post,
    path = "/radio/state",
    tag = "radio",
    request_body = StateSchema,
    security(
        ("RadioToken" = [])
    ),
    responses(
        (status = 200, body = WriteBody)
    )
)]
async fn state(
    context: ServerContext,
    ClientIp(ip): ClientIp,
    token: TokenCandidate,
    ValidatedJson(body): ValidatedJson<StateSchema>,
) -> ServerResult<Json<WriteBody>> {
    context.radio.limiter.hit(Scope::StateIp, &ip)?;

    let username = require(body.username, "missing_username")?;
    authorize(&context, token.or_body(body.token.as_deref()), &username)?;

    if !context.radio.presence.is_in_game(&username) {
        return Err(ServerError::NotInGame);
    }

    let outcome = context.radio.states.update(
        &username,
        StateUpdate {
            track_index: body.track_index,
            track_name: body.track_name,
            position_sec: body.position_sec,
            is_playing: body.is_playing,
            muted: body.muted,
        },
    );

    Ok(Json(if outcome.is_ignored() {
        WriteBody::ignored()
    } else {
        WriteBody::stored()
    }))
}

#[utoipa::path(
    get,
    path = "/radio/active",
    tag = "radio",
    responses(
        (status = 200, body = ActiveBody)
    )
)]
async fn active(context: ServerContext, ClientIp(ip): ClientIp) -> ServerResult<Json<ActiveBody>> {
    context.radio.limiter.hit(Scope::ActiveIp, &ip)?;

    let listeners = context.radio.states.active(context.radio.now_ms());

    Ok(Json(ActiveBody {
        ok: true,
        listeners: listeners.to_serialized(),
    }))
}

pub fn router() -> Router {
    Router::new()
        .route("/join", post(join))
        .route("/mute", post(mute))
        .route("/mute/server", post(mute_server))
        .route("/sync/:username", get(sync))
        .route("/poll/:username", get(poll))
        .route("/state", post(state))
        .route("/active", get(active))
}
