use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
};

use axum::{
    extract::Path,
    response::{sse::Event, Sse},
    routing::get,
};
use futures_util::Stream;
use waveband_core::{normalize_username, Scope, Subscription};

use crate::{
    auth::{authorize, ClientIp, TokenCandidate},
    context::ServerContext,
    errors::ServerResult,
    Router,
};

/// Adapts an open push subscription into a server-sent event stream.
///
/// Dropping the stream (the transport closing the response) releases the
/// subscription, so membership and the per-address count go with it.
pub struct EventStream {
    subscription: Subscription,
}

impl Stream for EventStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.get_mut().subscription.poll_frame(cx) {
            Poll::Ready(Some(frame)) => {
                let data =
                    serde_json::to_string(&frame.data).expect("frame data serializes");

                Poll::Ready(Some(Ok(Event::default().event(frame.name).data(data))))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[utoipa::path(
    get,
    path = "/events/{username}",
    tag = "events",
    security(
        ("RadioToken" = [])
    ),
    responses(
        (
            status = 200,
            content_type = "text/event-stream",
            description = "A stream of radio events for one user"
        )
    )
)]
async fn events(
    context: ServerContext,
    ClientIp(ip): ClientIp,
    token: TokenCandidate,
    Path(username): Path<String>,
) -> ServerResult<Sse<EventStream>> {
    let radio = &context.radio;

    radio.limiter.hit(Scope::SseOpenIp, &ip)?;
    radio
        .limiter
        .hit(Scope::SseOpenUser, &normalize_username(&username))?;

    authorize(&context, token.0, &username)?;

    let subscription = radio.hub.subscribe(&username, &ip)?;

    Ok(Sse::new(EventStream { subscription }))
}

pub fn router() -> Router {
    Router::new().route("/:username", get(events))
}
