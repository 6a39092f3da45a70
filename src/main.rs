use std::{env, sync::Arc};

use log::{info, warn};
use tokio::runtime;
use waveband_core::{Radio, RadioConfig};

mod logging;

fn main() {
    logging::init_logger();

    let radio = Arc::new(Radio::new(config_from_env()));
    info!("Initialized radio core");

    let runtime = runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("waveband-async")
        .build()
        .expect("builds async runtime");

    runtime.block_on(async {
        radio.spawn_gc_tasks();
        waveband_server::run_server(radio).await
    });
}

fn config_from_env() -> RadioConfig {
    let mut config = RadioConfig::default();

    config.web_token_secret = env::var("WEB_TOKEN_SECRET")
        .ok()
        .filter(|secret| !secret.is_empty());

    if config.web_token_secret.is_none() {
        warn!("WEB_TOKEN_SECRET is not set, browser tokens are disabled");
    }

    if let Ok(value) = env::var("MAX_SSE_PER_USER") {
        config.max_sse_per_user = value.parse().expect("MAX_SSE_PER_USER must be a number");
    }

    if let Ok(value) = env::var("MAX_SSE_PER_IP") {
        config.max_sse_per_ip = value.parse().expect("MAX_SSE_PER_IP must be a number");
    }

    config
}
