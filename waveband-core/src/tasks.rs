use std::time::Duration;

use log::debug;
use tokio::time::sleep;

use crate::{
    events::EventStore, limiter::RateLimiter, pairing::Pairing, state::StateTable,
    token::TokenMint, RadioContext,
};

const PAIRING_GC_INTERVAL: Duration = Duration::from_secs(30);
const EVENT_GC_INTERVAL: Duration = Duration::from_secs(60);
const STATE_GC_INTERVAL: Duration = Duration::from_secs(5);
const EPOCH_GC_INTERVAL: Duration = Duration::from_secs(60);
const LIMITER_GC_INTERVAL: Duration = Duration::from_secs(60);

/// Spawns the periodic sweeps over every TTL-indexed structure.
///
/// The tasks are independent; each takes the same store handles as the
/// request paths and never holds a guard across an await.
pub fn spawn_gc_tasks(context: &RadioContext) {
    spawn_pairing_gc_task(context);
    spawn_event_gc_task(context);
    spawn_state_gc_task(context);
    spawn_epoch_gc_task(context);
    spawn_limiter_gc_task(context);
}

fn spawn_pairing_gc_task(context: &RadioContext) {
    let pairing = Pairing::new(context);
    let clock = context.clock.clone();

    tokio::spawn(async move {
        loop {
            sleep(PAIRING_GC_INTERVAL).await;

            let removed = pairing.gc(clock.now_ms());
            if removed > 0 {
                debug!("Cleared {removed} expired pairing codes");
            }
        }
    });
}

fn spawn_event_gc_task(context: &RadioContext) {
    let events = EventStore::new(context);
    let clock = context.clock.clone();

    tokio::spawn(async move {
        loop {
            sleep(EVENT_GC_INTERVAL).await;

            let removed = events.gc(clock.now_ms());
            if removed > 0 {
                debug!("Cleared {removed} undelivered radio events");
            }
        }
    });
}

fn spawn_state_gc_task(context: &RadioContext) {
    let states = StateTable::new(context);
    let clock = context.clock.clone();

    tokio::spawn(async move {
        loop {
            sleep(STATE_GC_INTERVAL).await;

            let removed = states.gc(clock.now_ms());
            if removed > 0 {
                debug!("Cleared {removed} stale playback snapshots");
            }
        }
    });
}

fn spawn_epoch_gc_task(context: &RadioContext) {
    let tokens = TokenMint::new(context);
    let clock = context.clock.clone();

    tokio::spawn(async move {
        loop {
            sleep(EPOCH_GC_INTERVAL).await;

            let removed = tokens.gc_epochs(clock.now_ms());
            if removed > 0 {
                debug!("Cleared {removed} settled revocation epochs");
            }
        }
    });
}

fn spawn_limiter_gc_task(context: &RadioContext) {
    let limiter = RateLimiter::new(context);
    let clock = context.clock.clone();

    tokio::spawn(async move {
        loop {
            sleep(LIMITER_GC_INTERVAL).await;

            let removed = limiter.sweep(clock.now_ms());
            if removed > 0 {
                debug!("Cleared {removed} expired rate-limit windows");
            }
        }
    });
}
