//! Error taxonomy for the patient services.

use prontuario_auth::AuthError;
use prontuario_model::TextError;
use prontuario_store::StoreError;
use thiserror::Error;

/// Failures a caller of the patient services can observe.
///
/// Validation failures carry enough to tell the user what to fix. Store and
/// identity failures pass through with their own detail; the services log
/// that detail before returning, so callers can show a generic message.
#[derive(Debug, Error)]
pub enum PatientError {
    /// The duplicate-document check found an existing row.
    #[error("a patient with this document number already exists")]
    DuplicateDocument,

    /// The requested patient does not exist or could not be loaded.
    #[error("patient not found")]
    PatientNotFound,

    /// Form input failed validation before any store call.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl From<TextError> for PatientError {
    fn from(err: TextError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

pub type PatientResult<T> = Result<T, PatientError>;
