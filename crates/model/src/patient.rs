//! Patient rows, drafts and update payloads.
//!
//! A `PatientRecord` is one row of the hosted patients table. Edits happen on
//! a `PatientDraft` and are sent to the store either as a full `NewPatient`
//! insert or as a `PatientPatch` partial update. The patch always carries the
//! demographic fields but includes `doc` and `cid` only when they differ from
//! the currently-known row, so an unedited identifier never overwrites a
//! stored value with a blank.

use crate::report::Report;
use crate::text::{NonEmptyText, TextError};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// Identifier assigned by the record store on insert, immutable afterwards.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct PatientId(i64);

impl PatientId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for PatientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PatientId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(Self)
    }
}

/// Deserializes an explicit JSON `null` as the type's default value.
///
/// The store leaves text and array columns as `null` until first written;
/// rows read back normalize those to `""` and `[]`.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Deserializes a date column that may hold `null` or an empty string.
fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<NaiveDate>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// One row of the patients table.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct PatientRecord {
    pub id: PatientId,
    pub name: String,
    #[serde(default)]
    pub age: u32,
    /// National identifier number. Unique across rows, enforced by the
    /// pre-insert duplicate check rather than a store constraint.
    #[serde(default, deserialize_with = "null_as_default")]
    pub doc: String,
    /// Diagnosis code.
    #[serde(default)]
    pub cid: Option<String>,
    #[serde(default, deserialize_with = "lenient_date")]
    pub birthday: Option<NaiveDate>,
    #[serde(default)]
    pub guardian: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub doctor: Option<String>,
    /// The doctor's license id.
    #[serde(default)]
    pub doc_doctor: Option<String>,
    #[serde(default)]
    pub expertise: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    /// Two-letter state code.
    #[serde(default)]
    pub uf: Option<String>,
    /// Append-ordered report log. Display order is computed at render time;
    /// this sequence is never reordered.
    #[serde(default, deserialize_with = "null_as_default")]
    pub reports: Vec<Report>,
}

/// The in-progress edit state of a patient, as held by the edit form.
///
/// `id` is `None` for a record that has not been created yet; saving such a
/// draft runs the duplicate-document check and inserts, while a draft with an
/// id becomes a partial update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientDraft {
    pub id: Option<PatientId>,
    pub name: NonEmptyText,
    pub age: u32,
    pub doc: String,
    pub cid: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub guardian: Option<String>,
    pub gender: Option<String>,
    pub doctor: Option<String>,
    pub doc_doctor: Option<String>,
    pub expertise: Option<String>,
    pub city: Option<String>,
    pub uf: Option<String>,
}

impl PatientDraft {
    /// Prefills a draft from a stored row, the starting point for an edit.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Empty`] if the stored row somehow carries an
    /// empty name; rows created through this client cannot.
    pub fn from_record(record: &PatientRecord) -> Result<Self, TextError> {
        Ok(Self {
            id: Some(record.id),
            name: NonEmptyText::new(&record.name)?,
            age: record.age,
            doc: record.doc.clone(),
            cid: record.cid.clone(),
            birthday: record.birthday,
            guardian: record.guardian.clone(),
            gender: record.gender.clone(),
            doctor: record.doctor.clone(),
            doc_doctor: record.doc_doctor.clone(),
            expertise: record.expertise.clone(),
            city: record.city.clone(),
            uf: record.uf.clone(),
        })
    }

    /// Builds the full insert payload for a create.
    pub fn to_insert(&self) -> NewPatient {
        NewPatient {
            name: self.name.as_str().to_owned(),
            age: self.age,
            doc: self.doc.clone(),
            cid: self.cid.clone(),
            birthday: self.birthday,
            guardian: self.guardian.clone(),
            gender: self.gender.clone(),
            doctor: self.doctor.clone(),
            doc_doctor: self.doc_doctor.clone(),
            expertise: self.expertise.clone(),
            city: self.city.clone(),
            uf: self.uf.clone(),
        }
    }

    /// Builds the partial update payload against the currently-known row.
    ///
    /// The ten demographic fields are taken from the draft unconditionally.
    /// `doc` and `cid` are included only when they differ from `current`;
    /// with no known current row both count as changed.
    pub fn patch_against(&self, current: Option<&PatientRecord>) -> PatientPatch {
        let doc_changed = current.map_or(true, |row| row.doc != self.doc);
        let cid_changed = current.map_or(true, |row| row.cid != self.cid);

        PatientPatch {
            name: self.name.as_str().to_owned(),
            age: self.age,
            birthday: self.birthday,
            guardian: self.guardian.clone(),
            gender: self.gender.clone(),
            doctor: self.doctor.clone(),
            doc_doctor: self.doc_doctor.clone(),
            expertise: self.expertise.clone(),
            city: self.city.clone(),
            uf: self.uf.clone(),
            doc: doc_changed.then(|| self.doc.clone()),
            cid: cid_changed.then(|| self.cid.clone()),
        }
    }
}

/// Insert payload for a new patient.
///
/// Carries every field except `id` and `reports`; both are owned by the
/// store, which assigns the id and leaves the report log unset.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct NewPatient {
    pub name: String,
    pub age: u32,
    pub doc: String,
    pub cid: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub guardian: Option<String>,
    pub gender: Option<String>,
    pub doctor: Option<String>,
    pub doc_doctor: Option<String>,
    pub expertise: Option<String>,
    pub city: Option<String>,
    pub uf: Option<String>,
}

/// Partial update payload keyed by patient id.
///
/// Demographic fields are always serialized (a `None` clears the column).
/// `doc` and `cid` are absent from the JSON body entirely unless changed;
/// for `cid` the inner option distinguishes clearing from setting.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct PatientPatch {
    pub name: String,
    pub age: u32,
    pub birthday: Option<NaiveDate>,
    pub guardian: Option<String>,
    pub gender: Option<String>,
    pub doctor: Option<String>,
    pub doc_doctor: Option<String>,
    pub expertise: Option<String>,
    pub city: Option<String>,
    pub uf: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<Option<String>>,
}
