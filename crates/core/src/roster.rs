//! The patient roster and its save, search and delete flows.
//!
//! Responsibilities:
//! - Hold the in-memory roster the listing works from.
//! - Run the duplicate-document check before any insert.
//! - Build partial updates that only touch changed identifiers.
//!
//! Notes:
//! - Rows returned by the store are authoritative. A freshly created row is
//!   appended as returned, without re-sorting; name order comes back on the
//!   next activation.
//! - Store failures are logged here with their detail and surfaced to the
//!   caller as errors to be rendered generically.

use crate::error::{PatientError, PatientResult};
use prontuario_model::{PatientDraft, PatientId, PatientRecord};
use prontuario_store::RecordStore;
use std::sync::Arc;

/// What a successful save did, carrying the row as the store returned it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    Created(PatientRecord),
    Updated(PatientRecord),
}

impl SaveOutcome {
    pub fn record(&self) -> &PatientRecord {
        match self {
            Self::Created(record) | Self::Updated(record) => record,
        }
    }
}

/// The roster of patients, loaded on activation and kept in step with the
/// writes that go through it.
pub struct RosterService {
    store: Arc<dyn RecordStore>,
    patients: Vec<PatientRecord>,
}

impl RosterService {
    /// Builds the service and loads the roster.
    ///
    /// A load failure is logged and leaves the roster empty rather than
    /// failing activation; the user sees an empty list.
    pub async fn activate(store: Arc<dyn RecordStore>) -> Self {
        let mut service = Self {
            store,
            patients: Vec::new(),
        };
        service.refresh().await;
        service
    }

    /// Reloads the roster from the store, name-ordered.
    pub async fn refresh(&mut self) {
        match self.store.list_all().await {
            Ok(rows) => self.patients = rows,
            Err(e) => {
                tracing::error!("failed to load the patient roster - {e}");
                self.patients.clear();
            }
        }
    }

    pub fn patients(&self) -> &[PatientRecord] {
        &self.patients
    }

    pub fn find(&self, id: PatientId) -> Option<&PatientRecord> {
        self.patients.iter().find(|patient| patient.id == id)
    }

    /// Patients whose name contains `term`, case-insensitively.
    ///
    /// The term is taken as typed, surrounding whitespace included. Matches
    /// on the name only; an empty term matches everyone. The roster is
    /// filtered in place, the store is not consulted.
    pub fn search(&self, term: &str) -> Vec<&PatientRecord> {
        let needle = term.to_lowercase();
        self.patients
            .iter()
            .filter(|patient| patient.name.to_lowercase().contains(&needle))
            .collect()
    }

    /// Saves a draft, inserting when it has no id and updating otherwise.
    ///
    /// # Errors
    ///
    /// [`PatientError::DuplicateDocument`] when a create finds the document
    /// number already taken; store failures pass through after logging.
    pub async fn save(&mut self, draft: &PatientDraft) -> PatientResult<SaveOutcome> {
        match draft.id {
            None => self.create(draft).await,
            Some(id) => self.update(id, draft).await,
        }
    }

    async fn create(&mut self, draft: &PatientDraft) -> PatientResult<SaveOutcome> {
        let existing = match self.store.count_by_doc(&draft.doc).await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!("could not check for a duplicate document - {e}");
                return Err(e.into());
            }
        };
        if existing > 0 {
            return Err(PatientError::DuplicateDocument);
        }

        let row = match self.store.insert(&draft.to_insert()).await {
            Ok(row) => row,
            Err(e) => {
                tracing::error!("could not save the new patient - {e}");
                return Err(e.into());
            }
        };
        self.patients.push(row.clone());
        Ok(SaveOutcome::Created(row))
    }

    async fn update(&mut self, id: PatientId, draft: &PatientDraft) -> PatientResult<SaveOutcome> {
        let patch = draft.patch_against(self.find(id));

        let row = match self.store.update(id, &patch).await {
            Ok(row) => row,
            Err(e) => {
                tracing::error!("could not save changes to patient {id} - {e}");
                return Err(e.into());
            }
        };
        if let Some(slot) = self.patients.iter_mut().find(|patient| patient.id == id) {
            *slot = row.clone();
        }
        Ok(SaveOutcome::Updated(row))
    }

    /// Deletes a patient and drops it from the roster.
    ///
    /// Failures are logged and swallowed; the roster keeps the row and the
    /// caller sees no error. Asking for confirmation belongs to the caller.
    pub async fn delete(&mut self, id: PatientId) {
        if let Err(e) = self.store.delete(id).await {
            tracing::error!("could not delete patient {id} - {e}");
            return;
        }
        self.patients.retain(|patient| patient.id != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prontuario_model::NonEmptyText;
    use prontuario_store::{MemoryStore, StoreOp};

    fn record(id: i64, name: &str, doc: &str) -> PatientRecord {
        PatientRecord {
            id: PatientId::new(id),
            name: name.to_owned(),
            age: 10,
            doc: doc.to_owned(),
            cid: None,
            birthday: None,
            guardian: None,
            gender: None,
            doctor: None,
            doc_doctor: None,
            expertise: None,
            city: None,
            uf: None,
            reports: Vec::new(),
        }
    }

    fn draft(name: &str, doc: &str) -> PatientDraft {
        PatientDraft {
            id: None,
            name: NonEmptyText::new(name).expect("test name should be non-empty"),
            age: 10,
            doc: doc.to_owned(),
            cid: None,
            birthday: None,
            guardian: None,
            gender: None,
            doctor: None,
            doc_doctor: None,
            expertise: None,
            city: None,
            uf: None,
        }
    }

    async fn service_with(rows: Vec<PatientRecord>) -> (RosterService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_rows(rows));
        let service = RosterService::activate(Arc::clone(&store) as Arc<dyn RecordStore>).await;
        (service, store)
    }

    #[tokio::test]
    async fn activation_orders_the_roster_by_name() {
        let (service, _) = service_with(vec![
            record(1, "Carla", "3"),
            record(2, "Ana", "1"),
            record(3, "Bruno", "2"),
        ])
        .await;

        let names: Vec<&str> = service.patients().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Ana", "Bruno", "Carla"]);
    }

    #[tokio::test]
    async fn activation_failure_leaves_an_empty_roster() {
        let store = Arc::new(MemoryStore::with_rows(vec![record(1, "Ana", "1")]));
        store.inject_failure(StoreOp::List).await;

        let service = RosterService::activate(Arc::clone(&store) as Arc<dyn RecordStore>).await;
        assert!(service.patients().is_empty());
    }

    #[tokio::test]
    async fn search_matches_substrings_case_insensitively() {
        let (service, _) = service_with(vec![
            record(1, "Ana Silva", "1"),
            record(2, "Bruno Santos", "2"),
            record(3, "Mariana Costa", "3"),
        ])
        .await;

        let hits: Vec<&str> = service.search("ana").iter().map(|p| p.name.as_str()).collect();
        assert_eq!(hits, ["Ana Silva", "Mariana Costa"]);
    }

    #[tokio::test]
    async fn search_looks_at_names_only() {
        let (service, _) = service_with(vec![record(1, "Ana", "777")]).await;
        assert!(service.search("777").is_empty());
    }

    #[tokio::test]
    async fn empty_search_term_matches_everyone() {
        let (service, _) = service_with(vec![record(1, "Ana", "1"), record(2, "Bruno", "2")]).await;
        assert_eq!(service.search("").len(), 2);
    }

    #[tokio::test]
    async fn search_takes_the_term_as_typed() {
        let (service, _) = service_with(vec![
            record(1, "Ana Silva", "1"),
            record(2, "Mariana Costa", "2"),
        ])
        .await;

        assert!(service.search(" ana").is_empty(), "padding is part of the term");
        let hits: Vec<&str> = service.search("a c").iter().map(|p| p.name.as_str()).collect();
        assert_eq!(hits, ["Mariana Costa"]);
    }

    #[tokio::test]
    async fn create_appends_the_stored_row_without_resorting() {
        let (mut service, _) = service_with(vec![record(1, "Zuleica", "1")]).await;

        let outcome = service
            .save(&draft("Ana", "2"))
            .await
            .expect("create should succeed");

        assert!(matches!(outcome, SaveOutcome::Created(_)));
        let names: Vec<&str> = service.patients().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Zuleica", "Ana"], "new rows go to the end until the next reload");
    }

    #[tokio::test]
    async fn duplicate_document_aborts_before_the_insert() {
        let (mut service, store) = service_with(vec![record(1, "Ana", "123")]).await;

        let result = service.save(&draft("Bruno", "123")).await;

        assert!(matches!(result, Err(PatientError::DuplicateDocument)));
        assert_eq!(store.calls(StoreOp::Insert), 0, "no insert may be attempted");
        assert_eq!(service.patients().len(), 1);
    }

    #[tokio::test]
    async fn blank_documents_collide_like_any_other_value() {
        let (mut service, store) = service_with(vec![record(1, "Ana", "")]).await;

        let result = service.save(&draft("Bruno", "")).await;

        assert!(matches!(result, Err(PatientError::DuplicateDocument)));
        assert_eq!(store.calls(StoreOp::Insert), 0);
    }

    #[tokio::test]
    async fn failed_duplicate_check_surfaces_without_inserting() {
        let (mut service, store) = service_with(vec![]).await;
        store.inject_failure(StoreOp::Count).await;

        let result = service.save(&draft("Ana", "1")).await;

        assert!(matches!(result, Err(PatientError::Store(_))));
        assert_eq!(store.calls(StoreOp::Insert), 0);
    }

    #[tokio::test]
    async fn update_with_unchanged_identifiers_leaves_them_out_of_the_body() {
        let mut seeded = record(1, "Ana", "123");
        seeded.cid = Some("F84.0".to_owned());
        let (mut service, store) = service_with(vec![seeded.clone()]).await;

        let mut edit = PatientDraft::from_record(&seeded).expect("prefill should succeed");
        edit.age = 11;
        service.save(&edit).await.expect("update should succeed");

        let body = store.last_patch().await.expect("an update body was recorded");
        let body = body.as_object().expect("update body should be an object");
        assert!(!body.contains_key("doc"));
        assert!(!body.contains_key("cid"));
        assert_eq!(body["age"], 11);
    }

    #[tokio::test]
    async fn update_with_a_changed_document_sends_it() {
        let seeded = record(1, "Ana", "123");
        let (mut service, store) = service_with(vec![seeded.clone()]).await;

        let mut edit = PatientDraft::from_record(&seeded).expect("prefill should succeed");
        edit.doc = "456".to_owned();
        service.save(&edit).await.expect("update should succeed");

        let body = store.last_patch().await.expect("an update body was recorded");
        assert_eq!(body["doc"], "456");
    }

    #[tokio::test]
    async fn update_replaces_the_roster_entry_with_the_stored_row() {
        let seeded = record(1, "Ana", "123");
        let (mut service, _) = service_with(vec![seeded.clone()]).await;

        let mut edit = PatientDraft::from_record(&seeded).expect("prefill should succeed");
        edit.name = NonEmptyText::new("Ana Maria").expect("valid name");
        service.save(&edit).await.expect("update should succeed");

        let roster = service.find(PatientId::new(1)).expect("row should still be present");
        assert_eq!(roster.name, "Ana Maria");
    }

    #[tokio::test]
    async fn update_failure_leaves_the_roster_unchanged() {
        let seeded = record(1, "Ana", "123");
        let (mut service, store) = service_with(vec![seeded.clone()]).await;
        store.inject_failure(StoreOp::Update).await;

        let mut edit = PatientDraft::from_record(&seeded).expect("prefill should succeed");
        edit.name = NonEmptyText::new("Ana Maria").expect("valid name");
        let result = service.save(&edit).await;

        assert!(matches!(result, Err(PatientError::Store(_))));
        let roster = service.find(PatientId::new(1)).expect("row should still be present");
        assert_eq!(roster.name, "Ana");
    }

    #[tokio::test]
    async fn delete_drops_the_patient_from_roster_and_store() {
        let (mut service, store) = service_with(vec![record(1, "Ana", "1"), record(2, "Bruno", "2")])
            .await;

        service.delete(PatientId::new(1)).await;

        assert!(service.find(PatientId::new(1)).is_none());
        assert_eq!(store.rows().await.len(), 1);
    }

    #[tokio::test]
    async fn delete_of_a_missing_id_changes_nothing() {
        let (mut service, _) = service_with(vec![record(1, "Ana", "1")]).await;

        service.delete(PatientId::new(99)).await;

        assert_eq!(service.patients().len(), 1);
    }

    #[tokio::test]
    async fn delete_failure_keeps_the_patient_listed() {
        let (mut service, store) = service_with(vec![record(1, "Ana", "1")]).await;
        store.inject_failure(StoreOp::Delete).await;

        service.delete(PatientId::new(1)).await;

        assert!(service.find(PatientId::new(1)).is_some(), "failed deletes keep the row");
        assert_eq!(store.rows().await.len(), 1);
    }
}
