use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

mod clock;
mod config;
mod events;
mod hub;
mod limiter;
mod pairing;
mod presence;
mod state;
mod tasks;
mod token;
mod util;

pub use clock::*;
pub use config::*;
pub use events::*;
pub use hub::*;
pub use limiter::*;
pub use pairing::*;
pub use presence::*;
pub use state::*;
pub use token::*;
pub use util::*;

// Reduces verbosity
pub type Store<Id, T> = Arc<DashMap<Id, T>>;

/// The waveband radio core, bridging game-server presence and browser
/// playback around one-shot pairing and self-contained tokens.
pub struct Radio {
    context: RadioContext,

    pub presence: Presence,
    pub pairing: Pairing,
    pub tokens: TokenMint,
    pub events: EventStore,
    pub states: StateTable,
    pub hub: PushHub,
    pub limiter: RateLimiter,
}

/// A type passed to every component of the core, carrying the shared maps.
///
/// Each map is its own unit of synchronization; the pairing table sits
/// behind a mutex because its two halves must move together.
#[derive(Clone)]
pub struct RadioContext {
    pub config: RadioConfig,
    pub clock: Arc<dyn Clock>,

    pub presence: Store<String, PresenceRecord>,
    pub codes: Arc<Mutex<PairingTable>>,
    pub epochs: Store<String, u64>,
    pub queues: Store<String, Vec<StoredEvent>>,
    pub snapshots: Store<String, Snapshot>,
    pub counters: Store<(Scope, String), Window>,
    pub subscribers: Store<String, Vec<PushSubscriber>>,
    pub ip_counts: Store<String, usize>,
}

impl Radio {
    pub fn new(config: RadioConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RadioConfig, clock: Arc<dyn Clock>) -> Self {
        let context = RadioContext {
            config,
            clock,

            presence: Default::default(),
            codes: Default::default(),
            epochs: Default::default(),
            queues: Default::default(),
            snapshots: Default::default(),
            counters: Default::default(),
            subscribers: Default::default(),
            ip_counts: Default::default(),
        };

        Self {
            presence: Presence::new(&context),
            pairing: Pairing::new(&context),
            tokens: TokenMint::new(&context),
            events: EventStore::new(&context),
            states: StateTable::new(&context),
            hub: PushHub::new(&context),
            limiter: RateLimiter::new(&context),
            context,
        }
    }

    pub fn context(&self) -> &RadioContext {
        &self.context
    }

    pub fn now_ms(&self) -> u64 {
        self.context.clock.now_ms()
    }

    /// Spawns the periodic sweeps. Must be called inside a tokio runtime.
    pub fn spawn_gc_tasks(&self) {
        tasks::spawn_gc_tasks(&self.context);
    }
}
