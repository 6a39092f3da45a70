use std::fmt::{self, Debug};

/// The configuration of the radio coordination core
#[derive(Clone)]
pub struct RadioConfig {
    /// How long a pairing code stays redeemable, in milliseconds
    pub session_ttl_ms: u64,
    /// How long undelivered radio events are retained, in milliseconds
    pub radio_ttl_ms: u64,
    /// How long a playback snapshot counts as live, in milliseconds
    pub state_ttl_ms: u64,
    /// The minimum gap between two accepted snapshot writes for one user
    pub state_min_gap_ms: u64,
    /// How long a minted browser token stays valid, in milliseconds
    pub web_token_ttl_ms: u64,
    /// Window in which repeated join events collapse into one
    pub join_dedup_window_ms: u64,
    /// Window in which repeated mute events with the same flag collapse
    pub mute_dedup_window_ms: u64,
    /// Interval between heartbeat frames on a push subscription
    pub push_heartbeat_ms: u64,
    /// How many push subscriptions one user may hold open
    pub max_sse_per_user: usize,
    /// How many push subscriptions one client address may hold open
    pub max_sse_per_ip: usize,
    /// HMAC key for browser tokens. Token auth is disabled when unset.
    pub web_token_secret: Option<String>,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            // Two minutes is plenty to type a 7-character code
            session_ttl_ms: 120_000,
            // Events the game server never polls for die after 5 minutes
            radio_ttl_ms: 300_000,
            // Clients report every few seconds, so 25s of silence means gone
            state_ttl_ms: 25_000,
            // Collapse bursts of snapshot writes below ~1.5 per second
            state_min_gap_ms: 700,
            // Browser tokens are re-minted on every pairing
            web_token_ttl_ms: 600_000,
            join_dedup_window_ms: 10_000,
            mute_dedup_window_ms: 1_500,
            // Well under common proxy idle timeouts
            push_heartbeat_ms: 20_000,
            max_sse_per_user: 3,
            max_sse_per_ip: 10,
            web_token_secret: None,
        }
    }
}

impl Debug for RadioConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RadioConfig")
            .field("session_ttl_ms", &self.session_ttl_ms)
            .field("radio_ttl_ms", &self.radio_ttl_ms)
            .field("state_ttl_ms", &self.state_ttl_ms)
            .field("state_min_gap_ms", &self.state_min_gap_ms)
            .field("web_token_ttl_ms", &self.web_token_ttl_ms)
            .field("join_dedup_window_ms", &self.join_dedup_window_ms)
            .field("mute_dedup_window_ms", &self.mute_dedup_window_ms)
            .field("push_heartbeat_ms", &self.push_heartbeat_ms)
            .field("max_sse_per_user", &self.max_sse_per_user)
            .field("max_sse_per_ip", &self.max_sse_per_ip)
            .field("web_token_secret", &self.web_token_secret.as_ref().map(|_| "<set>"))
            .finish()
    }
}
