//! In-process record store with call instrumentation.
//!
//! Backs the service tests. Rows live in a mutex-guarded vector, every
//! operation bumps a per-operation counter, and failures can be injected per
//! operation to exercise the error paths without a network.

use crate::{RecordStore, StoreError, StoreResult};
use async_trait::async_trait;
use prontuario_model::{NewPatient, PatientId, PatientPatch, PatientRecord, PatientReports, Report};
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tokio::sync::Mutex;

/// One operation of the [`RecordStore`] contract, for counting and for
/// failure injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreOp {
    List,
    FetchReports,
    Count,
    Insert,
    Update,
    ReplaceReports,
    Delete,
}

/// [`RecordStore`] kept entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<PatientRecord>>,
    next_id: AtomicI64,
    failures: Mutex<HashSet<StoreOp>>,
    list_calls: AtomicU64,
    fetch_calls: AtomicU64,
    count_calls: AtomicU64,
    insert_calls: AtomicU64,
    update_calls: AtomicU64,
    replace_calls: AtomicU64,
    delete_calls: AtomicU64,
    last_patch: Mutex<Option<serde_json::Value>>,
}

impl MemoryStore {
    /// Store seeded with existing rows. Ids assigned by later inserts
    /// continue after the seeded maximum.
    pub fn with_rows(rows: Vec<PatientRecord>) -> Self {
        let highest = rows.iter().map(|row| row.id.value()).max().unwrap_or(0);
        Self {
            rows: Mutex::new(rows),
            next_id: AtomicI64::new(highest),
            ..Self::default()
        }
    }

    /// Makes every future call of `op` fail with a synthetic rejection.
    pub async fn inject_failure(&self, op: StoreOp) {
        self.failures.lock().await.insert(op);
    }

    /// How many times `op` has been called.
    pub fn calls(&self, op: StoreOp) -> u64 {
        self.counter(op).load(Ordering::Relaxed)
    }

    /// The body of the most recent update, as serialized for the wire.
    pub async fn last_patch(&self) -> Option<serde_json::Value> {
        self.last_patch.lock().await.clone()
    }

    /// Snapshot of the stored rows in storage order.
    pub async fn rows(&self) -> Vec<PatientRecord> {
        self.rows.lock().await.clone()
    }

    fn counter(&self, op: StoreOp) -> &AtomicU64 {
        match op {
            StoreOp::List => &self.list_calls,
            StoreOp::FetchReports => &self.fetch_calls,
            StoreOp::Count => &self.count_calls,
            StoreOp::Insert => &self.insert_calls,
            StoreOp::Update => &self.update_calls,
            StoreOp::ReplaceReports => &self.replace_calls,
            StoreOp::Delete => &self.delete_calls,
        }
    }

    async fn enter(&self, op: StoreOp) -> StoreResult<()> {
        self.counter(op).fetch_add(1, Ordering::Relaxed);
        if self.failures.lock().await.contains(&op) {
            return Err(StoreError::Rejected {
                status: 500,
                message: "injected failure".to_owned(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list_all(&self) -> StoreResult<Vec<PatientRecord>> {
        self.enter(StoreOp::List).await?;
        let mut rows = self.rows.lock().await.clone();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn fetch_reports(&self, id: PatientId) -> StoreResult<PatientReports> {
        self.enter(StoreOp::FetchReports).await?;
        let rows = self.rows.lock().await;
        rows.iter()
            .find(|row| row.id == id)
            .map(|row| PatientReports {
                id: row.id,
                name: row.name.clone(),
                reports: row.reports.clone(),
            })
            .ok_or(StoreError::NotFound)
    }

    async fn count_by_doc(&self, doc: &str) -> StoreResult<u64> {
        self.enter(StoreOp::Count).await?;
        let rows = self.rows.lock().await;
        Ok(rows.iter().filter(|row| row.doc == doc).count() as u64)
    }

    async fn insert(&self, new: &NewPatient) -> StoreResult<PatientRecord> {
        self.enter(StoreOp::Insert).await?;
        let id = PatientId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let row = PatientRecord {
            id,
            name: new.name.clone(),
            age: new.age,
            doc: new.doc.clone(),
            cid: new.cid.clone(),
            birthday: new.birthday,
            guardian: new.guardian.clone(),
            gender: new.gender.clone(),
            doctor: new.doctor.clone(),
            doc_doctor: new.doc_doctor.clone(),
            expertise: new.expertise.clone(),
            city: new.city.clone(),
            uf: new.uf.clone(),
            reports: Vec::new(),
        };
        self.rows.lock().await.push(row.clone());
        Ok(row)
    }

    async fn update(&self, id: PatientId, patch: &PatientPatch) -> StoreResult<PatientRecord> {
        self.enter(StoreOp::Update).await?;
        *self.last_patch.lock().await = Some(serde_json::to_value(patch)?);

        let mut rows = self.rows.lock().await;
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or(StoreError::NotFound)?;

        row.name = patch.name.clone();
        row.age = patch.age;
        row.birthday = patch.birthday;
        row.guardian = patch.guardian.clone();
        row.gender = patch.gender.clone();
        row.doctor = patch.doctor.clone();
        row.doc_doctor = patch.doc_doctor.clone();
        row.expertise = patch.expertise.clone();
        row.city = patch.city.clone();
        row.uf = patch.uf.clone();
        if let Some(doc) = &patch.doc {
            row.doc = doc.clone();
        }
        if let Some(cid) = &patch.cid {
            row.cid = cid.clone();
        }
        Ok(row.clone())
    }

    async fn replace_reports(&self, id: PatientId, reports: &[Report]) -> StoreResult<()> {
        self.enter(StoreOp::ReplaceReports).await?;
        let mut rows = self.rows.lock().await;
        if let Some(row) = rows.iter_mut().find(|row| row.id == id) {
            row.reports = reports.to_vec();
        }
        Ok(())
    }

    async fn delete(&self, id: PatientId) -> StoreResult<()> {
        self.enter(StoreOp::Delete).await?;
        self.rows.lock().await.retain(|row| row.id != id);
        Ok(())
    }
}
