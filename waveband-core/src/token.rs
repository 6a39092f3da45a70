use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::{util::normalize_username, RadioContext};

type HmacSha256 = Hmac<Sha256>;

/// The claims carried inside a browser token.
///
/// Tokens are self-contained: `payload.signature`, where the payload is the
/// URL-safe base64 of these claims and the signature is HMAC-SHA256 over the
/// encoded payload. There is no server-side token table; revocation works by
/// advancing the per-user epoch instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    pub username: String,
    pub issued_at: u64,
    pub expires_at: u64,
}

#[derive(Debug, Clone)]
pub struct MintedToken {
    pub token: String,
    pub expires_at: u64,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    /// No signing secret is configured
    #[error("token_disabled")]
    Disabled,
    #[error("missing_token")]
    Missing,
    #[error("bad_token_format")]
    BadFormat,
    #[error("bad_signature")]
    BadSignature,
    #[error("bad_payload")]
    BadPayload,
    #[error("token_expired")]
    Expired,
    /// Issued before the user's revocation epoch
    #[error("token_revoked")]
    Revoked,
}

/// Mints and verifies browser capability tokens
#[derive(Clone)]
pub struct TokenMint {
    context: RadioContext,
}

impl TokenMint {
    pub fn new(context: &RadioContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.context.config.web_token_secret.is_some()
    }

    /// Mints a token for a user, or None when token auth is disabled
    pub fn mint(&self, username: &str, now: u64) -> Option<MintedToken> {
        let secret = self.context.config.web_token_secret.as_deref()?;

        let claims = TokenClaims {
            username: normalize_username(username),
            issued_at: now,
            expires_at: now + self.context.config.web_token_ttl_ms,
        };

        let payload =
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).expect("claims serialize"));
        let signature = URL_SAFE_NO_PAD.encode(sign(secret, payload.as_bytes()));

        Some(MintedToken {
            token: format!("{payload}.{signature}"),
            expires_at: claims.expires_at,
        })
    }

    /// Verifies a presented token and returns its claims.
    ///
    /// Checks run cheapest-first: format, signature, payload, expiry, and
    /// finally the user's revocation epoch. The signature comparison is
    /// length-checked, then constant-time.
    pub fn verify(&self, token: Option<&str>, now: u64) -> Result<TokenClaims, TokenError> {
        let secret = self
            .context
            .config
            .web_token_secret
            .as_deref()
            .ok_or(TokenError::Disabled)?;

        let token = token.filter(|t| !t.is_empty()).ok_or(TokenError::Missing)?;

        let (payload, signature) = token.split_once('.').ok_or(TokenError::BadFormat)?;

        if payload.is_empty() || signature.is_empty() {
            return Err(TokenError::BadFormat);
        }

        let presented = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::BadSignature)?;
        let expected = sign(secret, payload.as_bytes());

        if presented.len() != expected.len() || expected.ct_eq(&presented).unwrap_u8() == 0 {
            return Err(TokenError::BadSignature);
        }

        let claims: TokenClaims = URL_SAFE_NO_PAD
            .decode(payload)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or(TokenError::BadPayload)?;

        if claims.expires_at <= now {
            return Err(TokenError::Expired);
        }

        let revoked_at = self
            .context
            .epochs
            .get(&claims.username)
            .map(|at| *at)
            .unwrap_or(0);

        if claims.issued_at < revoked_at {
            return Err(TokenError::Revoked);
        }

        Ok(claims)
    }

    /// Invalidates every token issued to a user before `now`.
    ///
    /// The epoch never moves backwards.
    pub fn revoke(&self, username: &str, now: u64) {
        let username = normalize_username(username);

        self.context
            .epochs
            .entry(username)
            .and_modify(|at| *at = (*at).max(now))
            .or_insert(now);
    }

    /// Drops revocation epochs too old to matter to any live token
    pub fn gc_epochs(&self, now: u64) -> usize {
        let keep_ms = self.context.config.web_token_ttl_ms.max(600_000);
        let before = self.context.epochs.len();

        self.context
            .epochs
            .retain(|_, at| now.saturating_sub(*at) <= keep_ms);

        before - self.context.epochs.len()
    }
}

fn sign(secret: &str, message: &[u8]) -> Vec<u8> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::{TokenError, TokenMint};
    use crate::{clock::{Clock, ManualClock}, Radio, RadioConfig};

    fn mint_with_secret(secret: Option<&str>) -> (TokenMint, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let config = RadioConfig {
            web_token_secret: secret.map(str::to_string),
            ..Default::default()
        };

        let radio = Radio::with_clock(config, clock.clone());
        (radio.tokens.clone(), clock)
    }

    #[test]
    fn mint_verify_roundtrip() {
        let (tokens, clock) = mint_with_secret(Some("hunter2"));

        let minted = tokens.mint("Alice", clock.now_ms()).unwrap();
        let claims = tokens.verify(Some(&minted.token), clock.now_ms()).unwrap();

        assert_eq!(claims.username, "alice");
        assert_eq!(claims.expires_at, minted.expires_at);
    }

    #[test]
    fn expires_after_ttl() {
        let (tokens, clock) = mint_with_secret(Some("hunter2"));

        let minted = tokens.mint("alice", clock.now_ms()).unwrap();
        clock.advance(600_001);

        assert_eq!(
            tokens.verify(Some(&minted.token), clock.now_ms()),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn revocation_epoch_kills_older_tokens() {
        let (tokens, clock) = mint_with_secret(Some("hunter2"));

        let old = tokens.mint("alice", clock.now_ms()).unwrap();
        clock.advance(50);
        tokens.revoke("alice", clock.now_ms());

        assert_eq!(
            tokens.verify(Some(&old.token), clock.now_ms()),
            Err(TokenError::Revoked)
        );

        let fresh = tokens.mint("alice", clock.now_ms()).unwrap();
        assert!(tokens.verify(Some(&fresh.token), clock.now_ms()).is_ok());
    }

    #[test]
    fn epoch_never_moves_backwards() {
        let (tokens, clock) = mint_with_secret(Some("hunter2"));

        tokens.revoke("alice", clock.now_ms());
        let minted = tokens.mint("alice", clock.now_ms()).unwrap();

        // A stale revoke with an earlier timestamp must not re-enable old tokens
        tokens.revoke("alice", clock.now_ms() - 500);

        assert!(tokens.verify(Some(&minted.token), clock.now_ms()).is_ok());
    }

    #[test]
    fn tampered_signature_rejected() {
        let (tokens, clock) = mint_with_secret(Some("hunter2"));

        let minted = tokens.mint("alice", clock.now_ms()).unwrap();
        let tampered = format!("{}x", minted.token);

        assert_eq!(
            tokens.verify(Some(&tampered), clock.now_ms()),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn malformed_tokens_rejected() {
        let (tokens, clock) = mint_with_secret(Some("hunter2"));
        let now = clock.now_ms();

        assert_eq!(tokens.verify(None, now), Err(TokenError::Missing));
        assert_eq!(tokens.verify(Some(""), now), Err(TokenError::Missing));
        assert_eq!(
            tokens.verify(Some("no-separator"), now),
            Err(TokenError::BadFormat)
        );
        assert_eq!(
            tokens.verify(Some(".signature-only"), now),
            Err(TokenError::BadFormat)
        );
    }

    #[test]
    fn disabled_without_secret() {
        let (tokens, clock) = mint_with_secret(None);

        assert!(tokens.mint("alice", clock.now_ms()).is_none());
        assert_eq!(
            tokens.verify(Some("anything.at-all"), clock.now_ms()),
            Err(TokenError::Disabled)
        );
    }

    #[test]
    fn epoch_gc_keeps_recent_entries() {
        let (tokens, clock) = mint_with_secret(Some("hunter2"));

        tokens.revoke("alice", clock.now_ms());
        clock.advance(1_000);
        tokens.revoke("bob", clock.now_ms());

        clock.advance(600_000);
        let removed = tokens.gc_epochs(clock.now_ms());

        assert_eq!(removed, 1);
    }
}
