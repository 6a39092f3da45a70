use std::{
    env,
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    routing::get,
    Router as AxumRouter,
};
use context::ServerContext;
use log::{info, warn};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use waveband_core::Radio;

mod auth;
mod context;
mod docs;
mod errors;
mod presence;
mod radio;
mod schemas;
mod serialized;
mod session;
mod sse;

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 3000;

type Router = AxumRouter<ServerContext>;

async fn banner() -> &'static str {
    "waveband is up. Pair a code to tune in."
}

/// Starts the waveband server
pub async fn run_server(radio: Arc<Radio>) {
    let server_key = env::var("ROBLOX_SERVER_KEY")
        .ok()
        .filter(|key| !key.is_empty());

    if server_key.is_none() {
        warn!("ROBLOX_SERVER_KEY is not set, game-server calls will be refused");
    }

    let context = ServerContext { radio, server_key };

    let port = env::var("PORT")
        .map(|x| x.parse::<u16>().expect("Port must be a number"))
        .unwrap_or(DEFAULT_PORT);

    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();

    let root_router = Router::new()
        .route("/", get(banner))
        .route("/api.json", get(docs::docs))
        .nest("/presence", presence::router())
        .nest("/session", session::router())
        .nest("/events", sse::router())
        .nest("/radio", radio::router())
        .with_state(context)
        .layer(cors_layer());

    info!("Listening on port {port}");

    let listener = TcpListener::bind(&addr).await.expect("listens on address");

    axum::serve(
        listener,
        root_router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}

/// Allows any origin when no allowlist is configured, otherwise echoes
/// only matching origins back
fn cors_layer() -> CorsLayer {
    let origins: Vec<HeaderValue> = env::var("ALLOWED_ORIGINS")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static("x-roblox-key"),
            HeaderName::from_static("x-radio-token"),
        ])
        .max_age(Duration::from_secs(86400))
}
