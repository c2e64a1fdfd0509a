//! Record store access for the patient roster.
//!
//! Responsibilities:
//! - Define the [`RecordStore`] trait the services program against.
//! - Provide [`PostgrestStore`], the hosted-table client used in production.
//! - Provide [`MemoryStore`], an instrumented in-process store for tests.
//!
//! Notes:
//! - Every operation is scoped to one patients table; the caller picks the
//!   table name through configuration.
//! - Implementations return rows exactly as the store persisted them. The
//!   roster treats those rows as authoritative and never re-derives them.

pub mod memory;
pub mod postgrest;

use async_trait::async_trait;
use prontuario_model::{NewPatient, PatientId, PatientPatch, PatientRecord, PatientReports, Report};
use thiserror::Error;

pub use memory::{MemoryStore, StoreOp};
pub use postgrest::PostgrestStore;

// ============================================================================
// ERRORS
// ============================================================================

/// Failures raised by a record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The query matched no row.
    #[error("no matching record")]
    NotFound,

    /// The access token was missing, expired or rejected.
    #[error("the store rejected the session credentials")]
    Unauthorized,

    /// The store refused the request for any other reason.
    #[error("store rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The request never completed.
    #[error("store request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The store answered with a body this client cannot decode.
    #[error("store response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    /// The store endpoint configuration is unusable.
    #[error("store configuration invalid: {0}")]
    Config(String),

    /// The store answered successfully but the payload broke the contract.
    #[error("store response malformed: {0}")]
    Malformed(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// STORE CONTRACT
// ============================================================================

/// Operations the roster and report services need from a record store.
///
/// Writes that return a row return it as the store persisted it, including
/// store-assigned fields such as the id.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All patient rows, ordered by name ascending.
    async fn list_all(&self) -> StoreResult<Vec<PatientRecord>>;

    /// The report slice of exactly one patient row.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when no row has this id.
    async fn fetch_reports(&self, id: PatientId) -> StoreResult<PatientReports>;

    /// How many rows carry this document number.
    async fn count_by_doc(&self, doc: &str) -> StoreResult<u64>;

    /// Inserts a new patient and returns the stored row.
    async fn insert(&self, new: &NewPatient) -> StoreResult<PatientRecord>;

    /// Applies a partial update and returns the stored row.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when no row has this id.
    async fn update(&self, id: PatientId, patch: &PatientPatch) -> StoreResult<PatientRecord>;

    /// Replaces the whole report column of one patient row.
    ///
    /// Matching no row is not an error; the write simply touches nothing.
    async fn replace_reports(&self, id: PatientId, reports: &[Report]) -> StoreResult<()>;

    /// Deletes the row with this id. Matching no row is not an error.
    async fn delete(&self, id: PatientId) -> StoreResult<()>;
}
