//! `Token` — the cached Azure OAuth2 bearer token, per `spec.md` §3.

use chrono::{DateTime, Duration, Utc};

/// The 60-second safety margin subtracted from the server-reported expiry,
/// per `spec.md` §3's `Token` invariant.
pub const EXPIRY_SAFETY_MARGIN_SECS: i64 = 60;

#[derive(Clone)]
pub struct Token {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"***")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Token {
    /// Builds a `Token` from the server's `expires_in` (seconds), applying
    /// the safety margin. `expires_in == 0` yields a token that is already
    /// expired, per `spec.md` §8's boundary behavior.
    pub fn from_expires_in(access_token: String, expires_in_secs: i64, now: DateTime<Utc>) -> Self {
        let expires_at = now + Duration::seconds(expires_in_secs - EXPIRY_SAFETY_MARGIN_SECS);
        Self {
            access_token,
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_expiry_is_immediately_expired() {
        let now = Utc::now();
        let token = Token::from_expires_in("x".into(), 0, now);
        assert!(token.is_expired(now));
    }

    #[test]
    fn margin_is_subtracted() {
        let now = Utc::now();
        let token = Token::from_expires_in("x".into(), 3600, now);
        assert_eq!(token.expires_at, now + Duration::seconds(3600 - 60));
    }
}
