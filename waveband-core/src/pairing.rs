use std::collections::HashMap;

use log::info;
use rand::{thread_rng, Rng};
use thiserror::Error;

use crate::{
    events::RadioEvent,
    hub::PushHub,
    presence::Presence,
    state::StateTable,
    token::TokenMint,
    util::{normalize_code, normalize_username},
    RadioContext,
};

/// Code symbols, with the easily-confused ones (0/O, 1/I) left out
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const CODE_LENGTH: usize = 7;

/// How many collisions code generation tolerates before giving up
const CODE_ATTEMPTS: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingRecord {
    pub username: String,
    pub have_pass: bool,
    pub exp: u64,
}

/// The two-way `code <-> username` mapping.
///
/// Kept behind one mutex so the secondary index can never point at a code
/// the primary table doesn't hold.
#[derive(Debug, Default)]
pub struct PairingTable {
    by_code: HashMap<String, PairingRecord>,
    by_user: HashMap<String, String>,
}

impl PairingTable {
    fn insert(&mut self, code: String, record: PairingRecord) {
        self.by_user.insert(record.username.clone(), code.clone());
        self.by_code.insert(code, record);
    }

    fn remove_user(&mut self, username: &str) -> Option<String> {
        let code = self.by_user.remove(username)?;
        self.by_code.remove(&code);
        Some(code)
    }

    fn remove_code(&mut self, code: &str) -> Option<PairingRecord> {
        let record = self.by_code.remove(code)?;
        self.by_user.remove(&record.username);
        Some(record)
    }

    pub fn code_for_user(&self, username: &str) -> Option<String> {
        self.by_user.get(username).cloned()
    }

    pub fn record(&self, code: &str) -> Option<PairingRecord> {
        self.by_code.get(code).cloned()
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PairingError {
    /// The user is not inside a game session
    #[error("not_in_game")]
    NotInGame,
    #[error("invalid_or_expired")]
    InvalidOrExpired,
    /// Every generation attempt collided with a live code
    #[error("code_generation_failed")]
    CodeGeneration,
}

#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub code: String,
    pub exp: u64,
}

#[derive(Debug, Clone)]
pub struct RedeemedSession {
    pub username: String,
    pub have_pass: bool,
    pub token: Option<String>,
    pub token_exp: Option<u64>,
}

/// The pairing state machine: one live code per user, one-shot redemption.
///
/// Issuing for a user pre-empts their previous code, revokes every token
/// they hold, drops their playback snapshot, and kicks their open push
/// subscriptions, in that order.
#[derive(Clone)]
pub struct Pairing {
    context: RadioContext,
    presence: Presence,
    tokens: TokenMint,
    states: StateTable,
    hub: PushHub,
}

impl Pairing {
    pub fn new(context: &RadioContext) -> Self {
        Self {
            context: context.clone(),
            presence: Presence::new(context),
            tokens: TokenMint::new(context),
            states: StateTable::new(context),
            hub: PushHub::new(context),
        }
    }

    /// Issues a fresh pairing code for an in-game user
    pub fn issue(&self, username: &str, have_pass: bool) -> Result<IssuedCode, PairingError> {
        let username = normalize_username(username);

        if !self.presence.is_in_game(&username) {
            return Err(PairingError::NotInGame);
        }

        let now = self.context.clock.now_ms();
        let mut table = self.context.codes.lock();

        table.remove_user(&username);
        self.tokens.revoke(&username, now);
        self.states.remove(&username);
        self.hub.push(
            &username,
            &RadioEvent::Kick {
                reason: "new_code".to_string(),
            },
        );

        let code = (0..CODE_ATTEMPTS)
            .map(|_| random_code())
            .find(|candidate| table.record(candidate).is_none())
            .ok_or(PairingError::CodeGeneration)?;

        let exp = now + self.context.config.session_ttl_ms;

        table.insert(
            code.clone(),
            PairingRecord {
                username: username.clone(),
                have_pass,
                exp,
            },
        );
        drop(table);

        info!("Issued pairing code for {username}");

        Ok(IssuedCode { code, exp })
    }

    /// Redeems a code for a browser token.
    ///
    /// The code is consumed even when the in-game check fails afterwards;
    /// a second attempt always reports it gone.
    pub fn redeem(&self, code: &str) -> Result<RedeemedSession, PairingError> {
        let code = normalize_code(code);
        let now = self.context.clock.now_ms();

        let record = self
            .context
            .codes
            .lock()
            .remove_code(&code)
            .filter(|record| record.exp > now)
            .ok_or(PairingError::InvalidOrExpired)?;

        if !self.presence.is_in_game(&record.username) {
            return Err(PairingError::NotInGame);
        }

        let minted = self.tokens.mint(&record.username, now);

        info!("Pairing code redeemed for {}", record.username);

        Ok(RedeemedSession {
            username: record.username,
            have_pass: record.have_pass,
            token: minted.as_ref().map(|m| m.token.clone()),
            token_exp: minted.map(|m| m.expires_at),
        })
    }

    /// Drops codes past their expiry, with their secondary-index entries
    pub fn gc(&self, now: u64) -> usize {
        let mut table = self.context.codes.lock();

        let expired: Vec<_> = table
            .by_code
            .iter()
            .filter(|(_, record)| record.exp <= now)
            .map(|(code, _)| code.clone())
            .collect();

        for code in &expired {
            table.remove_code(code);
        }

        expired.len()
    }
}

fn random_code() -> String {
    let mut rng = thread_rng();

    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::{random_code, PairingError, CODE_ALPHABET, CODE_LENGTH};
    use crate::{clock::{Clock, ManualClock}, Radio, RadioConfig};

    fn paired_radio() -> (Radio, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let config = RadioConfig {
            web_token_secret: Some("hunter2".to_string()),
            ..Default::default()
        };

        let radio = Radio::with_clock(config, clock.clone());
        radio.presence.publish("alice", true, false);
        (radio, clock)
    }

    #[test]
    fn codes_use_the_safe_alphabet() {
        for _ in 0..64 {
            let code = random_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn issue_requires_in_game() {
        let (radio, _clock) = paired_radio();
        radio.presence.publish("bob", false, false);

        assert_eq!(
            radio.pairing.issue("bob", false).unwrap_err(),
            PairingError::NotInGame
        );
        assert_eq!(
            radio.pairing.issue("nobody", false).unwrap_err(),
            PairingError::NotInGame
        );
    }

    #[test]
    fn happy_pairing_roundtrip() {
        let (radio, clock) = paired_radio();

        let issued = radio.pairing.issue("Alice", true).unwrap();
        assert_eq!(issued.exp, clock.now_ms() + 120_000);

        // Codes redeem case-insensitively with whitespace ignored
        let session = radio
            .pairing
            .redeem(&format!(" {} ", issued.code.to_lowercase()))
            .unwrap();

        assert_eq!(session.username, "alice");
        assert!(session.have_pass);

        let token = session.token.unwrap();
        let claims = radio.tokens.verify(Some(&token), clock.now_ms()).unwrap();
        assert_eq!(claims.username, "alice");
    }

    #[test]
    fn codes_are_one_shot() {
        let (radio, _clock) = paired_radio();

        let issued = radio.pairing.issue("alice", false).unwrap();
        radio.pairing.redeem(&issued.code).unwrap();

        assert_eq!(
            radio.pairing.redeem(&issued.code).unwrap_err(),
            PairingError::InvalidOrExpired
        );
    }

    #[test]
    fn expired_codes_do_not_redeem() {
        let (radio, clock) = paired_radio();

        let issued = radio.pairing.issue("alice", false).unwrap();
        clock.advance(120_001);

        assert_eq!(
            radio.pairing.redeem(&issued.code).unwrap_err(),
            PairingError::InvalidOrExpired
        );
    }

    #[test]
    fn redeem_consumes_the_code_even_when_user_left() {
        let (radio, _clock) = paired_radio();

        let issued = radio.pairing.issue("alice", false).unwrap();
        radio.presence.publish("alice", false, false);

        assert_eq!(
            radio.pairing.redeem(&issued.code).unwrap_err(),
            PairingError::NotInGame
        );
        // The code is gone regardless
        assert_eq!(
            radio.pairing.redeem(&issued.code).unwrap_err(),
            PairingError::InvalidOrExpired
        );
    }

    #[test]
    fn one_live_code_per_user() {
        let (radio, _clock) = paired_radio();

        let first = radio.pairing.issue("alice", false).unwrap();
        let second = radio.pairing.issue("alice", false).unwrap();

        assert_eq!(
            radio.pairing.redeem(&first.code).unwrap_err(),
            PairingError::InvalidOrExpired
        );
        assert!(radio.pairing.redeem(&second.code).is_ok());
    }

    #[test]
    fn secondary_index_tracks_the_live_code() {
        let (radio, _clock) = paired_radio();

        let issued = radio.pairing.issue("alice", false).unwrap();
        {
            let table = radio.context().codes.lock();
            assert_eq!(table.code_for_user("alice").as_deref(), Some(issued.code.as_str()));
        }

        radio.pairing.redeem(&issued.code).unwrap();
        {
            let table = radio.context().codes.lock();
            assert!(table.code_for_user("alice").is_none());
        }
    }

    #[test]
    fn reissue_revokes_outstanding_tokens() {
        let (radio, clock) = paired_radio();

        let first = radio.pairing.issue("alice", false).unwrap();
        let old_token = radio.pairing.redeem(&first.code).unwrap().token.unwrap();

        clock.advance(50);
        let second = radio.pairing.issue("alice", false).unwrap();

        assert_eq!(
            radio
                .tokens
                .verify(Some(&old_token), clock.now_ms())
                .unwrap_err(),
            crate::token::TokenError::Revoked
        );

        let new_token = radio.pairing.redeem(&second.code).unwrap().token.unwrap();
        assert!(radio.tokens.verify(Some(&new_token), clock.now_ms()).is_ok());
    }

    #[test]
    fn reissue_drops_the_playback_snapshot() {
        let (radio, _clock) = paired_radio();

        radio.states.update(
            "alice",
            crate::state::StateUpdate {
                position_sec: Some(5.0),
                ..Default::default()
            },
        );

        radio.pairing.issue("alice", false).unwrap();
        assert!(radio.states.get("alice").is_none());
    }

    #[tokio::test]
    async fn reissue_kicks_open_subscriptions() {
        let (radio, _clock) = paired_radio();

        let mut subscription = radio.hub.subscribe("alice", "10.0.0.1").unwrap();
        assert_eq!(subscription.recv().await.unwrap().name, "hello");

        radio.pairing.issue("alice", false).unwrap();

        let frame = subscription.recv().await.unwrap();
        assert_eq!(frame.name, "radio");
        assert_eq!(frame.data["type"], "KICK");
        assert_eq!(frame.data["reason"], "new_code");
    }

    #[test]
    fn redeem_without_secret_returns_no_token() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let radio = Radio::with_clock(RadioConfig::default(), clock);
        radio.presence.publish("alice", true, false);

        let issued = radio.pairing.issue("alice", false).unwrap();
        let session = radio.pairing.redeem(&issued.code).unwrap();

        assert!(session.token.is_none());
        assert!(session.token_exp.is_none());
    }

    #[test]
    fn gc_drops_expired_codes_and_index_entries() {
        let (radio, clock) = paired_radio();
        radio.presence.publish("bob", true, false);

        radio.pairing.issue("alice", false).unwrap();
        clock.advance(60_000);
        let fresh = radio.pairing.issue("bob", false).unwrap();

        clock.advance(60_001);
        assert_eq!(radio.pairing.gc(clock.now_ms()), 1);

        {
            let table = radio.context().codes.lock();
            assert!(table.code_for_user("alice").is_none());
            assert_eq!(table.code_for_user("bob").as_deref(), Some(fresh.code.as_str()));
        }
    }
}
