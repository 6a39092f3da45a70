use serde::Serialize;

use crate::{events::Append, util::normalize_username, RadioContext};

/// The last playback state a user reported
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub track_index: i64,
    pub track_name: String,
    /// Playback position at the moment of the report, in seconds
    pub position_at: f64,
    pub is_playing: bool,
    pub muted: bool,
    /// Wall time of the report
    pub server_ts: u64,
    /// Last accepted mutation
    pub updated_at: u64,
}

/// A partial snapshot write. Absent fields fall back to the stored value.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub track_index: Option<i64>,
    pub track_name: Option<String>,
    pub position_sec: Option<f64>,
    pub is_playing: Option<bool>,
    pub muted: Option<bool>,
}

/// One row of the "who's currently listening" view
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveListener {
    pub username: String,
    pub track_index: i64,
    pub track_name: String,
    /// Position advanced to the time of the query when still playing
    pub position_sec: f64,
    pub is_playing: bool,
    pub muted: bool,
    pub last_seen_ms: u64,
}

/// Per-user playback snapshots with a minimum write gap and a short TTL
#[derive(Clone)]
pub struct StateTable {
    context: RadioContext,
}

impl StateTable {
    pub fn new(context: &RadioContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Applies a partial write to a user's snapshot.
    ///
    /// Writes arriving faster than the configured gap are ignored. Missing
    /// or non-finite fields keep the previous value; the position is
    /// clamped to zero or above.
    pub fn update(&self, username: &str, update: StateUpdate) -> Append {
        let username = normalize_username(username);
        let now = self.context.clock.now_ms();
        let min_gap = self.context.config.state_min_gap_ms;

        let mut entry = self
            .context
            .snapshots
            .entry(username)
            .or_insert_with(|| Snapshot {
                track_index: 0,
                track_name: String::new(),
                position_at: 0.0,
                is_playing: false,
                muted: false,
                server_ts: 0,
                updated_at: 0,
            });

        if entry.updated_at != 0 && now.saturating_sub(entry.updated_at) < min_gap {
            return Append::Ignored;
        }

        let position = update
            .position_sec
            .filter(|p| p.is_finite())
            .unwrap_or(entry.position_at)
            .max(0.0);

        if let Some(index) = update.track_index {
            entry.track_index = index;
        }
        if let Some(name) = update.track_name {
            entry.track_name = name;
        }
        if let Some(playing) = update.is_playing {
            entry.is_playing = playing;
        }
        if let Some(muted) = update.muted {
            entry.muted = muted;
        }
        entry.position_at = position;
        entry.server_ts = now;
        entry.updated_at = now;

        Append::Stored
    }

    /// Drops a user's snapshot entirely
    pub fn remove(&self, username: &str) {
        self.context.snapshots.remove(&normalize_username(username));
    }

    pub fn get(&self, username: &str) -> Option<Snapshot> {
        self.context
            .snapshots
            .get(&normalize_username(username))
            .map(|s| s.clone())
    }

    /// The currently-listening view: in-game users only, positions advanced
    /// to `now`, most recently updated first.
    pub fn active(&self, now: u64) -> Vec<ActiveListener> {
        let mut listeners: Vec<_> = self
            .context
            .snapshots
            .iter()
            .filter(|entry| {
                self.context
                    .presence
                    .get(entry.key())
                    .map(|p| p.in_game)
                    .unwrap_or(false)
            })
            .map(|entry| {
                let snapshot = entry.value();

                let position_sec = if snapshot.is_playing {
                    snapshot.position_at + now.saturating_sub(snapshot.server_ts) as f64 / 1000.0
                } else {
                    snapshot.position_at
                };

                ActiveListener {
                    username: entry.key().clone(),
                    track_index: snapshot.track_index,
                    track_name: snapshot.track_name.clone(),
                    position_sec,
                    is_playing: snapshot.is_playing,
                    muted: snapshot.muted,
                    last_seen_ms: now.saturating_sub(snapshot.updated_at),
                }
            })
            .collect();

        listeners.sort_by_key(|l| l.last_seen_ms);
        listeners
    }

    /// Drops snapshots whose owner has gone quiet
    pub fn gc(&self, now: u64) -> usize {
        let ttl = self.context.config.state_ttl_ms;
        let before = self.context.snapshots.len();

        self.context
            .snapshots
            .retain(|_, snapshot| now.saturating_sub(snapshot.updated_at) <= ttl);

        before - self.context.snapshots.len()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::StateUpdate;
    use crate::{clock::{Clock, ManualClock}, Radio, RadioConfig};

    fn state_radio() -> (Radio, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let radio = Radio::with_clock(RadioConfig::default(), clock.clone());
        (radio, clock)
    }

    fn playing(track: &str, position: f64) -> StateUpdate {
        StateUpdate {
            track_index: Some(1),
            track_name: Some(track.to_string()),
            position_sec: Some(position),
            is_playing: Some(true),
            muted: Some(false),
        }
    }

    #[test]
    fn writes_below_min_gap_are_ignored() {
        let (radio, clock) = state_radio();

        assert!(!radio.states.update("alice", playing("a", 1.0)).is_ignored());

        clock.advance(300);
        assert!(radio.states.update("alice", playing("a", 2.0)).is_ignored());

        clock.advance(400);
        assert!(!radio.states.update("alice", playing("a", 3.0)).is_ignored());
    }

    #[test]
    fn missing_fields_fall_back_to_previous() {
        let (radio, clock) = state_radio();

        radio.states.update("alice", playing("first", 10.0));
        clock.advance(1_000);
        radio.states.update(
            "alice",
            StateUpdate {
                position_sec: Some(12.0),
                ..Default::default()
            },
        );

        let snapshot = radio.states.get("alice").unwrap();
        assert_eq!(snapshot.track_name, "first");
        assert_eq!(snapshot.track_index, 1);
        assert_eq!(snapshot.position_at, 12.0);
        assert!(snapshot.is_playing);
    }

    #[test]
    fn position_clamped_to_zero() {
        let (radio, _clock) = state_radio();

        radio.states.update("alice", playing("a", -5.0));

        assert_eq!(radio.states.get("alice").unwrap().position_at, 0.0);
    }

    #[test]
    fn non_finite_position_falls_back() {
        let (radio, clock) = state_radio();

        radio.states.update("alice", playing("a", 7.0));
        clock.advance(1_000);
        radio.states.update("alice", playing("a", f64::NAN));

        assert_eq!(radio.states.get("alice").unwrap().position_at, 7.0);
    }

    #[test]
    fn active_skips_users_out_of_game() {
        let (radio, clock) = state_radio();

        radio.presence.publish("alice", true, false);
        radio.presence.publish("bob", false, false);

        radio.states.update("alice", playing("a", 1.0));
        radio.states.update("bob", playing("b", 1.0));

        let active = radio.states.active(clock.now_ms());
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].username, "alice");
    }

    #[test]
    fn active_sorts_most_recent_first() {
        let (radio, clock) = state_radio();

        radio.presence.publish("alice", true, false);
        radio.presence.publish("bob", true, false);

        radio.states.update("alice", playing("a", 1.0));
        clock.advance(5_000);
        radio.states.update("bob", playing("b", 1.0));

        let active = radio.states.active(clock.now_ms());
        assert_eq!(active[0].username, "bob");
        assert_eq!(active[1].username, "alice");
        assert!(active[0].last_seen_ms < active[1].last_seen_ms);
    }

    #[test]
    fn active_advances_playing_positions() {
        let (radio, clock) = state_radio();

        radio.presence.publish("alice", true, false);
        radio.presence.publish("bob", true, false);

        radio.states.update("alice", playing("a", 10.0));
        radio.states.update(
            "bob",
            StateUpdate {
                position_sec: Some(10.0),
                is_playing: Some(false),
                ..Default::default()
            },
        );

        clock.advance(4_000);
        let active = radio.states.active(clock.now_ms());

        let alice = active.iter().find(|l| l.username == "alice").unwrap();
        let bob = active.iter().find(|l| l.username == "bob").unwrap();

        assert_eq!(alice.position_sec, 14.0);
        assert_eq!(bob.position_sec, 10.0);
    }

    #[test]
    fn gc_expires_stale_snapshots() {
        let (radio, clock) = state_radio();

        radio.presence.publish("alice", true, false);
        radio.states.update("alice", playing("a", 1.0));

        clock.advance(25_001);
        assert_eq!(radio.states.gc(clock.now_ms()), 1);
        assert!(radio.states.active(clock.now_ms()).is_empty());
    }
}
