//! Domain model for the patient records client.
//!
//! This crate defines the rows exchanged with the record store, the draft
//! types held by edit forms, and the payload types for inserts and partial
//! updates. It carries no I/O; the store and service crates build on it.
//!
//! Responsibilities:
//! - Define `PatientRecord` and its embedded `Report` log
//! - Define draft types (`PatientDraft`, `ReportDraft`) with validated fields
//! - Define wire payloads (`NewPatient`, `PatientPatch`) including the
//!   conditional `doc`/`cid` keys used by partial updates
//! - Provide validated text primitives (`NonEmptyText`)

pub mod patient;
pub mod report;
pub mod text;

pub use patient::{NewPatient, PatientDraft, PatientId, PatientPatch, PatientRecord};
pub use report::{today, PatientReports, Report, ReportDraft, ReportId};
pub use text::{NonEmptyText, TextError};
