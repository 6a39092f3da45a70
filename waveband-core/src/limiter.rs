use thiserror::Error;

use crate::RadioContext;

/// How many stale counters one sweep may evict before yielding
const SWEEP_LIMIT: usize = 5000;

/// A rate-limited operation class. Each scope carries its own fixed window
/// and quota; the principal (an address or a username) is supplied per hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Verify,
    SseOpenIp,
    SseOpenUser,
    JoinIp,
    MuteIp,
    SyncIp,
    StateIp,
    ActiveIp,
    PollIp,
    PresenceIp,
}

impl Scope {
    pub fn window_ms(self) -> u64 {
        match self {
            Self::Verify => 15_000,
            Self::SseOpenIp | Self::SseOpenUser => 60_000,
            Self::JoinIp
            | Self::MuteIp
            | Self::SyncIp
            | Self::StateIp
            | Self::ActiveIp
            | Self::PollIp
            | Self::PresenceIp => 10_000,
        }
    }

    pub fn max(self) -> u32 {
        match self {
            Self::Verify => 12,
            Self::SseOpenIp | Self::SseOpenUser => 60,
            Self::JoinIp | Self::MuteIp => 25,
            Self::SyncIp | Self::ActiveIp => 40,
            Self::StateIp | Self::PollIp => 80,
            Self::PresenceIp => 200,
        }
    }
}

/// A fixed-window counter
#[derive(Debug, Clone)]
pub struct Window {
    pub count: u32,
    pub reset_at: u64,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("rate_limited")]
pub struct RateLimited;

/// Fixed-window rate limiting keyed by `(scope, principal)`
#[derive(Clone)]
pub struct RateLimiter {
    context: RadioContext,
}

impl RateLimiter {
    pub fn new(context: &RadioContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Counts one hit against a scope, rejecting past the scope's quota
    pub fn hit(&self, scope: Scope, principal: &str) -> Result<(), RateLimited> {
        let now = self.context.clock.now_ms();

        let mut window = self
            .context
            .counters
            .entry((scope, principal.to_string()))
            .or_insert_with(|| Window {
                count: 0,
                reset_at: 0,
            });

        if window.reset_at <= now {
            window.count = 0;
            window.reset_at = now + scope.window_ms();
        }

        window.count += 1;

        if window.count > scope.max() {
            Err(RateLimited)
        } else {
            Ok(())
        }
    }

    /// Evicts counters whose window has passed, bounded per pass
    pub fn sweep(&self, now: u64) -> usize {
        let mut stale = Vec::new();

        for entry in self.context.counters.iter() {
            if entry.value().reset_at <= now {
                stale.push(entry.key().clone());

                if stale.len() == SWEEP_LIMIT {
                    break;
                }
            }
        }

        for key in &stale {
            self.context
                .counters
                .remove_if(key, |_, window| window.reset_at <= now);
        }

        stale.len()
    }
}
