//! Patient roster services.
//!
//! Responsibilities:
//! - The roster and report-log services the interface drives.
//! - The session gate deciding which surface a visit reaches.
//! - Configuration and the error taxonomy shared by the services.
//!
//! Notes:
//! - Services take their [`RecordStore`](prontuario_store::RecordStore) as
//!   an `Arc<dyn RecordStore>`, so the hosted store and the in-memory one
//!   are interchangeable.
//! - Sessions are passed in explicitly; this crate never holds one.

pub mod config;
pub mod constants;
pub mod error;
pub mod gate;
pub mod report_log;
pub mod roster;

pub use config::CoreConfig;
pub use error::{PatientError, PatientResult};
pub use gate::{decide, GateDecision, Route};
pub use report_log::ReportLogService;
pub use roster::{RosterService, SaveOutcome};
