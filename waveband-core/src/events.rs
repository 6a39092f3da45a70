use serde::Serialize;

use crate::{util::normalize_username, RadioContext};

/// A radio control event. The kind set is closed; every variant carries
/// only the fields legal for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RadioEvent {
    RadioJoin,
    RadioMute { muted: bool },
    RadioUnmute { muted: bool },
    Kick { reason: String },
}

impl RadioEvent {
    /// The mute kind matching a desired flag
    pub fn mute(muted: bool) -> Self {
        if muted {
            Self::RadioMute { muted }
        } else {
            Self::RadioUnmute { muted }
        }
    }

    /// The mute flag this event asserts, if it is a mute kind
    fn muted_flag(&self) -> Option<bool> {
        match self {
            Self::RadioMute { muted } | Self::RadioUnmute { muted } => Some(*muted),
            _ => None,
        }
    }
}

/// Which consumer population a queued event is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Roblox,
    Web,
}

/// An event as it sits in a user's pull queue
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredEvent {
    pub ts: u64,
    pub audience: Audience,
    #[serde(flatten)]
    pub event: RadioEvent,
}

/// Whether an append (or a snapshot write) took effect or was coalesced away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Append {
    Stored,
    Ignored,
}

impl Append {
    pub fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored)
    }
}

/// Per-user ordered queues of pending events, partitioned by audience on
/// the way out. Append order is total within one user and preserved across
/// drains; nothing is promised across users.
#[derive(Clone)]
pub struct EventStore {
    context: RadioContext,
}

impl EventStore {
    pub fn new(context: &RadioContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Appends an event to a user's queue, coalescing repeats.
    ///
    /// A join directly after a join, or a mute asserting the flag the queue
    /// tail already asserts, is dropped inside the respective dedup window.
    pub fn append(&self, username: &str, audience: Audience, event: RadioEvent) -> Append {
        let username = normalize_username(username);
        let now = self.context.clock.now_ms();
        let config = &self.context.config;

        let mut queue = self.context.queues.entry(username).or_default();

        if let Some(last) = queue.last() {
            let age = now.saturating_sub(last.ts);

            let duplicate_join = event == RadioEvent::RadioJoin
                && last.event == RadioEvent::RadioJoin
                && age <= config.join_dedup_window_ms;

            let duplicate_mute = event.muted_flag().is_some()
                && event.muted_flag() == last.event.muted_flag()
                && age <= config.mute_dedup_window_ms;

            if duplicate_join || duplicate_mute {
                return Append::Ignored;
            }
        }

        queue.push(StoredEvent {
            ts: now,
            audience,
            event,
        });

        Append::Stored
    }

    /// Removes and returns the browser-facing events for a user
    pub fn drain_web(&self, username: &str) -> Vec<StoredEvent> {
        self.drain(username, Audience::Web)
    }

    /// Removes and returns the game-server-facing events for a user
    pub fn drain_roblox(&self, username: &str) -> Vec<StoredEvent> {
        self.drain(username, Audience::Roblox)
    }

    fn drain(&self, username: &str, audience: Audience) -> Vec<StoredEvent> {
        let username = normalize_username(username);

        let Some(mut queue) = self.context.queues.get_mut(&username) else {
            return Vec::new();
        };

        let (taken, kept): (Vec<_>, Vec<_>) =
            queue.drain(..).partition(|e| e.audience == audience);
        *queue = kept;

        let emptied = queue.is_empty();
        drop(queue);

        if emptied {
            self.context
                .queues
                .remove_if(&username, |_, queue| queue.is_empty());
        }

        taken
    }

    /// Drops events past their retention window, and queues emptied by it
    pub fn gc(&self, now: u64) -> usize {
        let cutoff = now.saturating_sub(self.context.config.radio_ttl_ms);
        let mut removed = 0;

        self.context.queues.retain(|_, queue| {
            let before = queue.len();
            queue.retain(|event| event.ts >= cutoff);
            removed += before - queue.len();

            !queue.is_empty()
        });

        removed
    }
}
