//! The per-patient report log and its append flow.
//!
//! Reports append at the end of the stored column; newest-first is purely a
//! display order computed at render time. An append sends the whole column
//! back, so the last completed save wins if two edits race.

use crate::error::{PatientError, PatientResult};
use prontuario_model::{PatientId, PatientReports, Report, ReportDraft};
use prontuario_store::{RecordStore, StoreError};
use std::sync::Arc;

/// One patient's report log, loaded for the report page.
pub struct ReportLogService {
    store: Arc<dyn RecordStore>,
    patient: PatientReports,
}

impl ReportLogService {
    /// Loads the log of one patient.
    ///
    /// # Errors
    ///
    /// [`PatientError::PatientNotFound`] when the row does not exist, and
    /// also when the load fails for any other reason; the detail goes to
    /// the log and the page renders the same not-found state.
    pub async fn load(store: Arc<dyn RecordStore>, id: PatientId) -> PatientResult<Self> {
        match store.fetch_reports(id).await {
            Ok(patient) => Ok(Self { store, patient }),
            Err(StoreError::NotFound) => Err(PatientError::PatientNotFound),
            Err(e) => {
                tracing::error!("could not load reports for patient {id} - {e}");
                Err(PatientError::PatientNotFound)
            }
        }
    }

    pub fn patient_id(&self) -> PatientId {
        self.patient.id
    }

    pub fn patient_name(&self) -> &str {
        &self.patient.name
    }

    /// The log in storage order, oldest first.
    pub fn reports(&self) -> &[Report] {
        &self.patient.reports
    }

    /// The log as displayed, newest first.
    pub fn reports_newest_first(&self) -> Vec<&Report> {
        self.patient.reports.iter().rev().collect()
    }

    /// Appends one report and writes the whole column back.
    ///
    /// The local log is only updated once the store accepts the write, so a
    /// failed append leaves both sides as they were.
    ///
    /// # Errors
    ///
    /// Store failures pass through after logging.
    pub async fn append(&mut self, draft: ReportDraft) -> PatientResult<Report> {
        let report = draft.into_report();
        let mut log = self.patient.reports.clone();
        log.push(report.clone());

        if let Err(e) = self.store.replace_reports(self.patient.id, &log).await {
            tracing::error!("could not save a report for patient {} - {e}", self.patient.id);
            return Err(e.into());
        }
        self.patient.reports = log;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use prontuario_model::{PatientRecord, TextError};
    use prontuario_store::{MemoryStore, StoreOp};

    fn record_with_reports(id: i64, name: &str) -> PatientRecord {
        PatientRecord {
            id: PatientId::new(id),
            name: name.to_owned(),
            age: 10,
            doc: "123".to_owned(),
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

    fn day(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).expect("valid date")
    }

    async fn log_for(store: &Arc<MemoryStore>, id: i64) -> ReportLogService {
        ReportLogService::load(Arc::clone(store) as Arc<dyn RecordStore>, PatientId::new(id))
            .await
            .expect("load of an existing patient should succeed")
    }

    #[tokio::test]
    async fn load_of_a_missing_patient_reports_not_found() {
        let store = Arc::new(MemoryStore::default());

        let result =
            ReportLogService::load(Arc::clone(&store) as Arc<dyn RecordStore>, PatientId::new(1))
                .await;

        assert!(matches!(result, Err(PatientError::PatientNotFound)));
    }

    #[tokio::test]
    async fn load_failure_also_reports_not_found() {
        let store = Arc::new(MemoryStore::with_rows(vec![record_with_reports(1, "Ana")]));
        store.inject_failure(StoreOp::FetchReports).await;

        let result =
            ReportLogService::load(Arc::clone(&store) as Arc<dyn RecordStore>, PatientId::new(1))
                .await;

        assert!(matches!(result, Err(PatientError::PatientNotFound)));
    }

    #[tokio::test]
    async fn appends_keep_storage_order_and_reverse_for_display() {
        let store = Arc::new(MemoryStore::with_rows(vec![record_with_reports(1, "Ana")]));
        let mut log = log_for(&store, 1).await;

        log.append(ReportDraft::new(Some(day(1)), "A").expect("valid draft"))
            .await
            .expect("first append should succeed");
        log.append(ReportDraft::new(Some(day(2)), "B").expect("valid draft"))
            .await
            .expect("second append should succeed");

        let stored: Vec<&str> = log.reports().iter().map(|r| r.content.as_str()).collect();
        assert_eq!(stored, ["A", "B"], "storage keeps append order");

        let display: Vec<&str> = log
            .reports_newest_first()
            .iter()
            .map(|r| r.content.as_str())
            .collect();
        assert_eq!(display, ["B", "A"], "display shows newest first");

        let rows = store.rows().await;
        let persisted: Vec<&str> = rows[0].reports.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(persisted, ["A", "B"]);
    }

    #[tokio::test]
    async fn failed_append_leaves_the_log_unchanged() {
        let store = Arc::new(MemoryStore::with_rows(vec![record_with_reports(1, "Ana")]));
        let mut log = log_for(&store, 1).await;
        log.append(ReportDraft::new(Some(day(1)), "A").expect("valid draft"))
            .await
            .expect("seed append should succeed");
        store.inject_failure(StoreOp::ReplaceReports).await;

        let result = log
            .append(ReportDraft::new(Some(day(2)), "B").expect("valid draft"))
            .await;

        assert!(matches!(result, Err(PatientError::Store(_))));
        assert_eq!(log.reports().len(), 1, "local log keeps only the saved report");
        assert_eq!(store.rows().await[0].reports.len(), 1);
    }

    #[tokio::test]
    async fn blank_content_never_reaches_the_store() {
        let store = Arc::new(MemoryStore::with_rows(vec![record_with_reports(1, "Ana")]));

        let draft = ReportDraft::new(Some(day(1)), "   ");

        assert!(matches!(draft, Err(TextError::Empty)));
        assert_eq!(store.calls(StoreOp::ReplaceReports), 0);
    }
}
