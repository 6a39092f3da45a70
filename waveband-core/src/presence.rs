use serde::Serialize;

use crate::{util::normalize_username, RadioContext};

/// The game server's latest claim about one user
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub in_game: bool,
    pub have_pass: bool,
    pub updated_at: u64,
}

/// Tracks which users are currently inside a game session.
///
/// Presence has no TTL of its own; it is overwritten by every publication
/// and consulted as a precondition by most write paths.
#[derive(Clone)]
pub struct Presence {
    context: RadioContext,
}

impl Presence {
    pub fn new(context: &RadioContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Creates or overwrites a user's presence record
    pub fn publish(&self, username: &str, in_game: bool, have_pass: bool) {
        let username = normalize_username(username);
        let updated_at = self.context.clock.now_ms();

        self.context.presence.insert(
            username,
            PresenceRecord {
                in_game,
                have_pass,
                updated_at,
            },
        );
    }

    pub fn get(&self, username: &str) -> Option<PresenceRecord> {
        self.context
            .presence
            .get(&normalize_username(username))
            .map(|record| record.clone())
    }

    pub fn is_in_game(&self, username: &str) -> bool {
        self.get(username).map(|r| r.in_game).unwrap_or(false)
    }
}

#[cfg(test)]
mod test {
    use crate::{Radio, RadioConfig};

    #[test]
    fn publish_then_lookup() {
        let radio = Radio::new(RadioConfig::default());

        radio.presence.publish("Alice", true, false);

        let record = radio.presence.get("alice").unwrap();
        assert!(record.in_game);
        assert!(!record.have_pass);
        assert!(radio.presence.is_in_game("ALICE"));
    }

    #[test]
    fn overwritten_by_later_publication() {
        let radio = Radio::new(RadioConfig::default());

        radio.presence.publish("alice", true, true);
        radio.presence.publish("alice", false, true);

        assert!(!radio.presence.is_in_game("alice"));
    }

    #[test]
    fn unknown_user_is_not_in_game() {
        let radio = Radio::new(RadioConfig::default());

        assert!(radio.presence.get("nobody").is_none());
        assert!(!radio.presence.is_in_game("nobody"));
    }
}
