//! Evolution reports and the per-patient report log.
//!
//! Reports live embedded in the patient row as a JSON array column. The
//! array is append-only in storage order; readers that want newest-first
//! reverse at render time instead of reordering the stored sequence.

use crate::patient::{null_as_default, PatientId};
use crate::text::{NonEmptyText, TextError};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Report identifier, the creation instant in milliseconds rendered as a
/// decimal string. Unique enough for a log appended by one clinician at a
/// time; collisions would need two appends inside the same millisecond.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ReportId(String);

impl ReportId {
    pub fn generate() -> Self {
        Self(Utc::now().timestamp_millis().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One evolution report entry.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Report {
    pub id: ReportId,
    pub date: NaiveDate,
    pub content: String,
}

/// The slice of a patient row the report page works with.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct PatientReports {
    pub id: PatientId,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reports: Vec<Report>,
}

/// A report being composed, validated before it ever reaches the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportDraft {
    date: NaiveDate,
    content: NonEmptyText,
}

impl ReportDraft {
    /// Validates the form input for a new report.
    ///
    /// A missing date falls back to today. Content is trimmed and must be
    /// non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Empty`] when the content is blank.
    pub fn new(date: Option<NaiveDate>, content: impl AsRef<str>) -> Result<Self, TextError> {
        Ok(Self {
            date: date.unwrap_or_else(today),
            content: NonEmptyText::new(content)?,
        })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn content(&self) -> &str {
        self.content.as_str()
    }

    /// Mints the stored report, assigning a fresh timestamp id.
    pub fn into_report(self) -> Report {
        Report {
            id: ReportId::generate(),
            date: self.date,
            content: self.content.into_inner(),
        }
    }
}

/// Today's date in UTC, the default for a new report form.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}
