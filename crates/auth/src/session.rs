//! Session tokens and the events that change them.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A token inside this window of its expiry already counts as expired, so a
/// request started now does not die mid-flight on a lapsed credential.
const TOKEN_EXPIRY_BUFFER_SECS: i64 = 30;

/// The signed-in account, as the provider reports it.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct SessionUser {
    pub id: Uuid,
    pub email: String,
}

/// A signed-in session, passed explicitly to everything that needs one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    access_token: String,
    refresh_token: Option<String>,
    user: SessionUser,
    expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        user: SessionUser,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            user,
            expires_at,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn user(&self) -> &SessionUser {
        &self.user
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the session can still authenticate a request started now.
    pub fn is_valid(&self) -> bool {
        Utc::now() + Duration::seconds(TOKEN_EXPIRY_BUFFER_SECS) < self.expires_at
    }
}

/// Reads the expiry instant out of a JWT access token without verifying it.
///
/// Verification belongs to the provider; locally the expiry only decides
/// whether a request is worth sending at all.
pub(crate) fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&decoded).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    DateTime::from_timestamp(exp, 0)
}

/// What happened to the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn,
    SignedOut,
    /// The password was changed through the recovery flow.
    PasswordRecovery,
}

/// One session transition, as broadcast to observers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionChange {
    pub event: SessionEvent,
    pub session: Option<Session>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> SessionUser {
        SessionUser {
            id: Uuid::nil(),
            email: "ana@example.com".to_owned(),
        }
    }

    fn session_expiring_in(seconds: i64) -> Session {
        Session::new(
            "token".to_owned(),
            None,
            user(),
            Utc::now() + Duration::seconds(seconds),
        )
    }

    #[test]
    fn session_well_before_expiry_is_valid() {
        assert!(session_expiring_in(3600).is_valid());
    }

    #[test]
    fn session_inside_the_expiry_buffer_is_invalid() {
        assert!(!session_expiring_in(10).is_valid());
    }

    #[test]
    fn session_past_expiry_is_invalid() {
        assert!(!session_expiring_in(-60).is_valid());
    }

    #[test]
    fn token_expiry_reads_the_exp_claim() {
        let claims = serde_json::json!({ "exp": 1_900_000_000, "sub": "abc" });
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        let token = format!("e30.{payload}.signature");

        let expiry = token_expiry(&token).expect("well-formed token should yield an expiry");
        assert_eq!(expiry.timestamp(), 1_900_000_000);
    }

    #[test]
    fn token_without_three_parts_has_no_expiry() {
        assert!(token_expiry("not-a-jwt").is_none());
    }

    #[test]
    fn token_with_undecodable_payload_has_no_expiry() {
        assert!(token_expiry("e30.!!!.sig").is_none());
    }
}
