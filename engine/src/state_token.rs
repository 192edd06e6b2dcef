//! Signed connect-flow state tokens.
//!
//! The provider-connect handshake needs a pending-operation marker
//! that survives between redirect and callback. Instead of a shared
//! in-process map, the claims ride in the token itself: an
//! HMAC-SHA256-signed, time-bounded string carrying the team id. Any
//! engine instance holding the secret can verify a callback.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Default token lifetime: ten minutes, enough for a human to finish
/// an authorization redirect.
pub const DEFAULT_TTL_SECS: i64 = 600;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StateTokenError {
    #[error("state token is malformed")]
    Malformed,
    #[error("state token signature mismatch")]
    BadSignature,
    #[error("state token expired")]
    Expired,
}

/// Verified claims carried by a state token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateClaims {
    pub team_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Issue a signed state token for a team.
pub fn issue(secret: &str, team_id: Uuid, ttl_secs: i64) -> String {
    let expires_at = (Utc::now() + Duration::seconds(ttl_secs)).timestamp();
    let payload = format!("{team_id}.{expires_at}");
    format!("{payload}.{}", sign(secret, &payload))
}

/// Verify a state token and return its claims.
pub fn verify(secret: &str, token: &str) -> Result<StateClaims, StateTokenError> {
    let (payload, signature) = token.rsplit_once('.').ok_or(StateTokenError::Malformed)?;
    let (team_part, expiry_part) = payload.split_once('.').ok_or(StateTokenError::Malformed)?;

    let team_id: Uuid = team_part.parse().map_err(|_| StateTokenError::Malformed)?;
    let expires_ts: i64 = expiry_part.parse().map_err(|_| StateTokenError::Malformed)?;

    let sig_bytes = hex::decode(signature).map_err(|_| StateTokenError::Malformed)?;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| StateTokenError::BadSignature)?;
    mac.update(payload.as_bytes());
    mac.verify_slice(&sig_bytes)
        .map_err(|_| StateTokenError::BadSignature)?;

    let expires_at = DateTime::from_timestamp(expires_ts, 0).ok_or(StateTokenError::Malformed)?;
    if expires_at < Utc::now() {
        return Err(StateTokenError::Expired);
    }

    Ok(StateClaims {
        team_id,
        expires_at,
    })
}

fn sign(secret: &str, payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_the_team_claim() {
        let team = Uuid::new_v4();
        let token = issue("secret", team, DEFAULT_TTL_SECS);
        let claims = verify("secret", &token).unwrap();
        assert_eq!(claims.team_id, team);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue("secret", Uuid::new_v4(), DEFAULT_TTL_SECS);
        assert_eq!(
            verify("other", &token).unwrap_err(),
            StateTokenError::BadSignature
        );
    }

    #[test]
    fn tampered_claims_are_rejected() {
        let team = Uuid::new_v4();
        let token = issue("secret", team, DEFAULT_TTL_SECS);
        let tampered = token.replacen(&team.to_string(), &Uuid::new_v4().to_string(), 1);
        assert_eq!(
            verify("secret", &tampered).unwrap_err(),
            StateTokenError::BadSignature
        );
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = issue("secret", Uuid::new_v4(), -1);
        assert_eq!(verify("secret", &token).unwrap_err(), StateTokenError::Expired);
    }

    #[test]
    fn garbage_is_malformed() {
        assert_eq!(
            verify("secret", "not-a-token").unwrap_err(),
            StateTokenError::Malformed
        );
        assert_eq!(
            verify("secret", "a.b.c").unwrap_err(),
            StateTokenError::Malformed
        );
    }
}
