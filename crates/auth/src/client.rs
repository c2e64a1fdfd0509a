//! Client for the hosted identity endpoints.

use crate::session::{token_expiry, Session, SessionChange, SessionEvent, SessionUser};
use crate::{AuthError, AuthResult};
use chrono::{Duration, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration as StdDuration;
use tokio::sync::watch;
use uuid::Uuid;

const CONNECT_TIMEOUT: StdDuration = StdDuration::from_secs(10);
const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// Access token grant as the provider returns it from sign-in and sign-up.
#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
    user: ProviderUser,
}

/// The account object embedded in grants and returned by the user endpoint.
#[derive(Debug, Deserialize)]
struct ProviderUser {
    id: Uuid,
    email: Option<String>,
}

impl From<ProviderUser> for SessionUser {
    fn from(user: ProviderUser) -> Self {
        Self {
            id: user.id,
            email: user.email.unwrap_or_default(),
        }
    }
}

/// Outcome of a sign-up attempt.
///
/// Providers configured to verify addresses answer without a token; the
/// account exists but cannot sign in until the emailed link is followed.
#[derive(Clone, Debug)]
pub enum SignUp {
    SignedIn(Session),
    ConfirmationRequired { email: String },
}

/// Client for `{project}/auth/v1`.
///
/// Methods that change the session broadcast a [`SessionChange`] through a
/// watch channel; [`IdentityClient::subscribe`] hands out receivers.
pub struct IdentityClient {
    http: Client,
    auth_url: String,
    api_key: String,
    changes: watch::Sender<Option<SessionChange>>,
}

impl IdentityClient {
    /// Builds a client for one project's identity endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] for an unparseable base URL, a non-HTTP
    /// scheme or an empty API key.
    pub fn new(base_url: &str, api_key: &str) -> AuthResult<Self> {
        let base = base_url.trim().trim_end_matches('/');
        let parsed =
            Url::parse(base).map_err(|e| AuthError::Config(format!("invalid project url: {e}")))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(AuthError::Config(format!(
                "unsupported url scheme: {}",
                parsed.scheme()
            )));
        }
        if api_key.trim().is_empty() {
            return Err(AuthError::Config("api key is empty".to_owned()));
        }

        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let (changes, _) = watch::channel(None);

        Ok(Self {
            http,
            auth_url: format!("{base}/auth/v1"),
            api_key: api_key.to_owned(),
            changes,
        })
    }

    /// A receiver of session transitions. Holds `None` until the first one.
    pub fn subscribe(&self) -> watch::Receiver<Option<SessionChange>> {
        self.changes.subscribe()
    }

    /// Signs in with an email and password.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidCredentials`] for a wrong pair,
    /// [`AuthError::EmailNotConfirmed`] for an unverified address.
    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Session> {
        let response = self
            .authed(self.http.post(format!("{}/token", self.auth_url)))
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let grant: TokenGrant = handle_response(response).await?;
        let session = self.grant_session(grant);
        self.notify(SessionEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    /// Registers a new account.
    ///
    /// Projects without address verification sign the account straight in;
    /// otherwise the caller gets [`SignUp::ConfirmationRequired`] back.
    pub async fn sign_up(&self, email: &str, password: &str) -> AuthResult<SignUp> {
        let response = self
            .authed(self.http.post(format!("{}/signup", self.auth_url)))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let body: serde_json::Value = handle_response(response).await?;

        if body.get("access_token").is_some() {
            let grant: TokenGrant = serde_json::from_value(body)?;
            let session = self.grant_session(grant);
            self.notify(SessionEvent::SignedIn, Some(session.clone()));
            return Ok(SignUp::SignedIn(session));
        }
        Ok(SignUp::ConfirmationRequired {
            email: email.to_owned(),
        })
    }

    /// Emails a password recovery link for this address.
    ///
    /// `redirect_to` is where the emailed link lands, typically the caller's
    /// password update page.
    pub async fn request_password_reset(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> AuthResult<()> {
        let mut request = self
            .authed(self.http.post(format!("{}/recover", self.auth_url)))
            .json(&json!({ "email": email }));
        if let Some(target) = redirect_to {
            request = request.query(&[("redirect_to", target)]);
        }
        let response = request.send().await?;
        expect_success(response).await
    }

    /// Sets a new password for the signed-in account.
    ///
    /// The session usually comes from the recovery link; any valid session
    /// works.
    pub async fn update_password(&self, session: &Session, new_password: &str) -> AuthResult<()> {
        let response = self
            .authed(self.http.put(format!("{}/user", self.auth_url)))
            .bearer_auth(session.access_token())
            .json(&json!({ "password": new_password }))
            .send()
            .await?;
        let _: ProviderUser = handle_response(response).await?;
        self.notify(SessionEvent::PasswordRecovery, Some(session.clone()));
        Ok(())
    }

    /// Rebuilds a session from a bare access token by asking the provider
    /// who it belongs to.
    ///
    /// # Errors
    ///
    /// [`AuthError::MalformedToken`] when the token carries no readable
    /// expiry, [`AuthError::SessionExpired`] when it has already lapsed or
    /// the provider no longer accepts it.
    pub async fn current_user(&self, access_token: &str) -> AuthResult<Session> {
        let expires_at = token_expiry(access_token).ok_or(AuthError::MalformedToken)?;
        if expires_at <= Utc::now() {
            return Err(AuthError::SessionExpired);
        }

        let response = self
            .authed(self.http.get(format!("{}/user", self.auth_url)))
            .bearer_auth(access_token)
            .send()
            .await?;
        let user: ProviderUser = handle_response(response).await?;
        Ok(Session::new(
            access_token.to_owned(),
            None,
            user.into(),
            expires_at,
        ))
    }

    /// Revokes the session with the provider.
    pub async fn sign_out(&self, session: &Session) -> AuthResult<()> {
        let response = self
            .authed(self.http.post(format!("{}/logout", self.auth_url)))
            .bearer_auth(session.access_token())
            .send()
            .await?;
        expect_success(response).await?;
        self.notify(SessionEvent::SignedOut, None);
        Ok(())
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("apikey", &self.api_key)
    }

    fn grant_session(&self, grant: TokenGrant) -> Session {
        let expires_at = token_expiry(&grant.access_token)
            .unwrap_or_else(|| Utc::now() + Duration::seconds(grant.expires_in));
        Session::new(
            grant.access_token,
            grant.refresh_token,
            grant.user.into(),
            expires_at,
        )
    }

    fn notify(&self, event: SessionEvent, session: Option<Session>) {
        tracing::debug!("session change: {:?}", event);
        self.changes.send_replace(Some(SessionChange { event, session }));
    }
}

// ============================================================================
// RESPONSE HANDLING
// ============================================================================

async fn handle_response<T: serde::de::DeserializeOwned>(response: Response) -> AuthResult<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(status_error(status, response).await);
    }
    let body = response.text().await?;
    Ok(serde_json::from_str(&body)?)
}

async fn expect_success(response: Response) -> AuthResult<()> {
    let status = response.status();
    if !status.is_success() {
        return Err(status_error(status, response).await);
    }
    Ok(())
}

async fn status_error(status: StatusCode, response: Response) -> AuthError {
    if status == StatusCode::UNAUTHORIZED {
        return AuthError::SessionExpired;
    }

    let body = response.text().await.unwrap_or_default();
    let message = provider_message(&body);
    if message.contains("Invalid login credentials") {
        return AuthError::InvalidCredentials;
    }
    if message.contains("Email not confirmed") {
        return AuthError::EmailNotConfirmed;
    }
    AuthError::Provider {
        status: status.as_u16(),
        message,
    }
}

/// The human-readable message out of a provider error body. The provider is
/// inconsistent about the field name across endpoints.
fn provider_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["error_description", "msg", "message"] {
            if let Some(message) = value.get(key).and_then(|m| m.as_str()) {
                return message.to_owned();
            }
        }
    }
    body.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_http_scheme_is_rejected() {
        let result = IdentityClient::new("ftp://example.com", "key");
        assert!(matches!(result, Err(AuthError::Config(_))));
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let result = IdentityClient::new("https://example.com", "  ");
        assert!(matches!(result, Err(AuthError::Config(_))));
    }

    #[test]
    fn provider_message_tries_each_known_field() {
        assert_eq!(
            provider_message(r#"{"error_description":"Invalid login credentials"}"#),
            "Invalid login credentials"
        );
        assert_eq!(provider_message(r#"{"msg":"Email not confirmed"}"#), "Email not confirmed");
        assert_eq!(provider_message(r#"{"message":"over quota"}"#), "over quota");
        assert_eq!(provider_message("plain text"), "plain text");
    }

    #[test]
    fn grant_without_readable_expiry_falls_back_to_expires_in() {
        let client =
            IdentityClient::new("https://example.com", "key").expect("client should build");
        let grant = TokenGrant {
            access_token: "opaque-token".to_owned(),
            refresh_token: None,
            expires_in: 3600,
            user: ProviderUser {
                id: Uuid::nil(),
                email: Some("ana@example.com".to_owned()),
            },
        };

        let session = client.grant_session(grant);
        assert!(session.is_valid());
        assert_eq!(session.user().email, "ana@example.com");
    }

    #[tokio::test]
    async fn subscribers_see_session_changes() {
        let client =
            IdentityClient::new("https://example.com", "key").expect("client should build");
        let mut changes = client.subscribe();
        assert!(changes.borrow().is_none());

        client.notify(SessionEvent::SignedOut, None);

        changes.changed().await.expect("sender should still be alive");
        let change = changes.borrow_and_update().clone().expect("a change was sent");
        assert_eq!(change.event, SessionEvent::SignedOut);
        assert!(change.session.is_none());
    }

    /// Signs in against a real project. Needs `PRONTUARIO_PROJECT_URL`,
    /// `PRONTUARIO_API_KEY`, `PRONTUARIO_EMAIL` and `PRONTUARIO_PASSWORD`.
    #[tokio::test]
    #[ignore]
    async fn live_sign_in_yields_a_valid_session() {
        let url = std::env::var("PRONTUARIO_PROJECT_URL").expect("project url env var");
        let key = std::env::var("PRONTUARIO_API_KEY").expect("api key env var");
        let email = std::env::var("PRONTUARIO_EMAIL").expect("email env var");
        let password = std::env::var("PRONTUARIO_PASSWORD").expect("password env var");

        let client = IdentityClient::new(&url, &key).expect("live settings should build a client");
        let session = client
            .sign_in(&email, &password)
            .await
            .expect("live sign-in should succeed");
        assert!(session.is_valid());
    }
}
