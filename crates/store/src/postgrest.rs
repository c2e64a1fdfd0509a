//! Hosted-table client speaking the PostgREST wire conventions.
//!
//! Responsibilities:
//! - Translate [`RecordStore`] operations into REST calls against
//!   `{project}/rest/v1/{table}`.
//! - Map transport and status failures onto [`StoreError`].
//!
//! Notes:
//! - Every request carries the project `apikey` header plus the session
//!   access token as a bearer credential.
//! - Row filters use the `column=eq.value` query syntax; counts come back in
//!   the `Content-Range` header rather than the body.

use crate::{RecordStore, StoreError, StoreResult};
use async_trait::async_trait;
use prontuario_model::{NewPatient, PatientId, PatientPatch, PatientRecord, PatientReports, Report};
use reqwest::header::{CONTENT_RANGE, HeaderMap};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Requests exactly one row as a bare JSON object instead of an array.
/// The store answers 406 when the filter matches anything but one row.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// How much of an undecodable error body is kept for the error message.
const ERROR_BODY_LIMIT: usize = 200;

/// [`RecordStore`] backed by a hosted PostgREST table.
pub struct PostgrestStore {
    http: Client,
    table_url: String,
    api_key: String,
    access_token: String,
}

impl PostgrestStore {
    /// Builds a client for one patients table.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Project root, e.g. `https://xyz.supabase.co`.
    /// * `api_key` - The project's anonymous API key.
    /// * `table` - Name of the patients table.
    /// * `access_token` - Access token of the signed-in session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] for an unparseable base URL, a
    /// non-HTTP scheme or an empty table name.
    pub fn new(
        base_url: &str,
        api_key: &str,
        table: &str,
        access_token: &str,
    ) -> StoreResult<Self> {
        let base = base_url.trim().trim_end_matches('/');
        let parsed = Url::parse(base)
            .map_err(|e| StoreError::Config(format!("invalid project url: {e}")))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(StoreError::Config(format!(
                "unsupported url scheme: {}",
                parsed.scheme()
            )));
        }
        if table.trim().is_empty() {
            return Err(StoreError::Config("table name is empty".to_owned()));
        }
        if api_key.trim().is_empty() {
            return Err(StoreError::Config("api key is empty".to_owned()));
        }

        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            table_url: format!("{base}/rest/v1/{table}"),
            api_key: api_key.to_owned(),
            access_token: access_token.to_owned(),
        })
    }

    /// Attaches the project key and session credential to a request.
    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.access_token)
    }

    fn id_filter(id: PatientId) -> (&'static str, String) {
        ("id", format!("eq.{id}"))
    }
}

#[async_trait]
impl RecordStore for PostgrestStore {
    async fn list_all(&self) -> StoreResult<Vec<PatientRecord>> {
        let response = self
            .authed(self.http.get(&self.table_url))
            .query(&[("select", "*"), ("order", "name.asc")])
            .send()
            .await?;
        decode_body(response).await
    }

    async fn fetch_reports(&self, id: PatientId) -> StoreResult<PatientReports> {
        let response = self
            .authed(self.http.get(&self.table_url))
            .query(&[("select", "id,name,reports".to_owned()), Self::id_filter(id)])
            .header(reqwest::header::ACCEPT, SINGLE_OBJECT)
            .send()
            .await?;
        decode_body(response).await
    }

    async fn count_by_doc(&self, doc: &str) -> StoreResult<u64> {
        let response = self
            .authed(self.http.get(&self.table_url))
            .query(&[("select", "id".to_owned()), ("doc", format!("eq.{doc}"))])
            .header("Prefer", "count=exact")
            .header(reqwest::header::RANGE, "0-0")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }
        count_from_headers(response.headers())
    }

    async fn insert(&self, new: &NewPatient) -> StoreResult<PatientRecord> {
        let response = self
            .authed(self.http.post(&self.table_url))
            .header("Prefer", "return=representation")
            .json(&[new])
            .send()
            .await?;
        let mut rows: Vec<PatientRecord> = decode_body(response).await?;
        rows.pop()
            .ok_or_else(|| StoreError::Malformed("insert returned no rows".to_owned()))
    }

    async fn update(&self, id: PatientId, patch: &PatientPatch) -> StoreResult<PatientRecord> {
        let response = self
            .authed(self.http.patch(&self.table_url))
            .query(&[Self::id_filter(id)])
            .header("Prefer", "return=representation")
            .json(patch)
            .send()
            .await?;
        let mut rows: Vec<PatientRecord> = decode_body(response).await?;
        // An update that matched no row still answers 200 with an empty array.
        rows.pop().ok_or(StoreError::NotFound)
    }

    async fn replace_reports(&self, id: PatientId, reports: &[Report]) -> StoreResult<()> {
        let response = self
            .authed(self.http.patch(&self.table_url))
            .query(&[Self::id_filter(id)])
            .header("Prefer", "return=minimal")
            .json(&json!({ "reports": reports }))
            .send()
            .await?;
        expect_success(response).await
    }

    async fn delete(&self, id: PatientId) -> StoreResult<()> {
        let response = self
            .authed(self.http.delete(&self.table_url))
            .query(&[Self::id_filter(id)])
            .send()
            .await?;
        expect_success(response).await
    }
}

// ============================================================================
// RESPONSE HANDLING
// ============================================================================

/// Decodes a successful JSON body, or maps the failure status.
async fn decode_body<T: DeserializeOwned>(response: Response) -> StoreResult<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(status_error(status, response).await);
    }
    let body = response.text().await?;
    Ok(serde_json::from_str(&body)?)
}

/// Checks the status of a write that returns no body.
async fn expect_success(response: Response) -> StoreResult<()> {
    let status = response.status();
    if !status.is_success() {
        return Err(status_error(status, response).await);
    }
    Ok(())
}

async fn status_error(status: StatusCode, response: Response) -> StoreError {
    match status {
        StatusCode::UNAUTHORIZED => StoreError::Unauthorized,
        // 406 is the single-object Accept header matching zero rows.
        StatusCode::NOT_FOUND | StatusCode::NOT_ACCEPTABLE => StoreError::NotFound,
        _ => {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!("could not read the store error body - {e}");
                    String::new()
                }
            };
            StoreError::Rejected {
                status: status.as_u16(),
                message: error_message(&body),
            }
        }
    }
}

/// Pulls the `message` field out of a PostgREST error body, falling back to
/// a truncated copy of the raw body.
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
            return message.to_owned();
        }
    }
    body.chars().take(ERROR_BODY_LIMIT).collect()
}

/// Row total announced in a count response's `Content-Range` header.
fn count_from_headers(headers: &HeaderMap) -> StoreResult<u64> {
    let header = headers
        .get(CONTENT_RANGE)
        .and_then(|value| value.to_str().ok());
    let Some(header) = header else {
        tracing::warn!("count response carried no readable Content-Range header");
        return Err(StoreError::Malformed(
            "count response without Content-Range".to_owned(),
        ));
    };
    content_range_total(header).ok_or_else(|| {
        tracing::warn!("count response Content-Range is unparseable - {header}");
        StoreError::Malformed(format!("unparseable Content-Range: {header}"))
    })
}

/// Total row count from a `Content-Range` header such as `0-0/57` or `*/0`.
fn content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn store() -> PostgrestStore {
        PostgrestStore::new("https://example.supabase.co/", "anon-key", "pacientes", "token")
            .expect("valid settings should build a store")
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let store = store();
        assert_eq!(store.table_url, "https://example.supabase.co/rest/v1/pacientes");
    }

    #[test]
    fn non_http_scheme_is_rejected() {
        let result = PostgrestStore::new("ftp://example.com", "key", "pacientes", "token");
        assert!(matches!(result, Err(StoreError::Config(_))));
    }

    #[test]
    fn unparseable_url_is_rejected() {
        let result = PostgrestStore::new("not a url", "key", "pacientes", "token");
        assert!(matches!(result, Err(StoreError::Config(_))));
    }

    #[test]
    fn empty_table_name_is_rejected() {
        let result = PostgrestStore::new("https://example.com", "key", "  ", "token");
        assert!(matches!(result, Err(StoreError::Config(_))));
    }

    #[test]
    fn content_range_totals_parse() {
        assert_eq!(content_range_total("0-0/57"), Some(57));
        assert_eq!(content_range_total("*/0"), Some(0));
        assert_eq!(content_range_total("0-24/*"), None);
        assert_eq!(content_range_total("garbage"), None);
    }

    #[test]
    fn count_reads_the_total_from_the_content_range_header() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_RANGE, HeaderValue::from_static("0-0/3"));

        let total = count_from_headers(&headers).expect("a well-formed header should parse");
        assert_eq!(total, 3);
    }

    #[test]
    fn count_without_a_usable_content_range_is_malformed() {
        let missing = count_from_headers(&HeaderMap::new());
        assert!(matches!(missing, Err(StoreError::Malformed(_))));

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_RANGE, HeaderValue::from_static("0-24/*"));
        let unparseable = count_from_headers(&headers);
        assert!(matches!(unparseable, Err(StoreError::Malformed(_))));
    }

    #[test]
    fn error_message_prefers_the_json_message_field() {
        let body = r#"{"code":"23505","message":"duplicate key value"}"#;
        assert_eq!(error_message(body), "duplicate key value");
    }

    #[test]
    fn error_message_falls_back_to_the_raw_body() {
        assert_eq!(error_message("<html>gateway timeout</html>"), "<html>gateway timeout</html>");
    }

    /// Lists rows against a real project. Needs `PRONTUARIO_PROJECT_URL`,
    /// `PRONTUARIO_API_KEY` and `PRONTUARIO_ACCESS_TOKEN`.
    #[tokio::test]
    #[ignore]
    async fn live_list_returns_rows_ordered_by_name() {
        let url = std::env::var("PRONTUARIO_PROJECT_URL").expect("project url env var");
        let key = std::env::var("PRONTUARIO_API_KEY").expect("api key env var");
        let token = std::env::var("PRONTUARIO_ACCESS_TOKEN").expect("access token env var");

        let store = PostgrestStore::new(&url, &key, "pacientes", &token)
            .expect("live settings should build a store");
        let rows = store.list_all().await.expect("live list should succeed");

        let names: Vec<&str> = rows.iter().map(|row| row.name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted, "rows should arrive ordered by name");
    }
}
