//! Identity provider access and session state.
//!
//! Responsibilities:
//! - Sign-in, sign-up, password recovery and sign-out against the hosted
//!   identity endpoints under `{project}/auth/v1`.
//! - Carry the resulting [`Session`] explicitly; nothing here persists
//!   tokens or keeps ambient global state.
//! - Broadcast [`SessionChange`] events to interested observers.
//!
//! Notes:
//! - Session validity is judged locally from the token expiry with a small
//!   buffer, so a token about to lapse counts as signed out.

pub mod client;
pub mod session;

use thiserror::Error;

pub use client::{IdentityClient, SignUp};
pub use session::{Session, SessionChange, SessionEvent, SessionUser};

/// Failures raised by the identity provider or by local session checks.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("email address has not been confirmed yet")]
    EmailNotConfirmed,

    #[error("the session has expired; sign in again")]
    SessionExpired,

    #[error("the access token is not a readable JWT")]
    MalformedToken,

    /// Any other refusal from the provider.
    #[error("identity provider refused the request ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("identity request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("identity response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("identity configuration invalid: {0}")]
    Config(String),
}

pub type AuthResult<T> = Result<T, AuthError>;
