//! Per-tenant job assignment store
//!
//! Holds job records, the per-job transition locks that serialize status
//! changes, and the overdue bookkeeping the deadline monitor works from.
//! The "at most one non-terminal job per complaint" invariant is checked
//! here so it holds regardless of which caller writes.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::log_persist_failure;
use crate::db::mongo::MongoCollection;
use crate::db::schemas::{JobDoc, JobStatus};
use crate::types::{NivaranError, Result};

/// Job store for one tenant
pub struct JobStore {
    tenant_id: Uuid,
    docs: DashMap<Uuid, JobDoc>,
    /// Per-job transition locks; a completing officer and a reassigning
    /// staff member cannot race on the same job
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    /// Per-complaint assignment locks; insertion serializes per complaint
    /// so the open-job check cannot be raced past
    assign_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    db: Option<MongoCollection<JobDoc>>,
    owner_index: Arc<DashMap<Uuid, Uuid>>,
}

impl JobStore {
    pub(crate) fn new(
        tenant_id: Uuid,
        db: Option<MongoCollection<JobDoc>>,
        owner_index: Arc<DashMap<Uuid, Uuid>>,
    ) -> Self {
        Self {
            tenant_id,
            docs: DashMap::new(),
            locks: DashMap::new(),
            assign_locks: DashMap::new(),
            db,
            owner_index,
        }
    }

    /// Transition lock for a job; hold it across read-check-write
    pub fn transition_lock(&self, job_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(job_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Insert a new assignment.
    ///
    /// Rejected with a conflict if the complaint already has a
    /// non-terminal job; reassignment must supersede through
    /// [`JobStore::save`] in the same operation first.
    pub async fn insert(&self, job: JobDoc) -> Result<JobDoc> {
        // Serialization point: the open-job check and the insert run
        // under the complaint's assignment lock
        let lock = self
            .assign_locks
            .entry(job.complaint_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(open) = self.non_terminal_for_complaint(job.complaint_id) {
            return Err(NivaranError::conflict(format!(
                "complaint {} already has open job {}",
                job.complaint_id, open.job_id
            )));
        }

        self.owner_index.insert(job.job_id, self.tenant_id);
        self.docs.insert(job.job_id, job.clone());
        self.persist(&job).await;
        Ok(job)
    }

    /// Get a job by id
    pub fn get(&self, job_id: Uuid) -> Option<JobDoc> {
        self.docs.get(&job_id).map(|d| d.clone())
    }

    /// The complaint's open job, if any
    pub fn non_terminal_for_complaint(&self, complaint_id: Uuid) -> Option<JobDoc> {
        self.docs
            .iter()
            .find(|j| j.complaint_id == complaint_id && !j.status.is_terminal())
            .map(|j| j.clone())
    }

    /// Write back a mutated job record
    pub async fn save(&self, job: JobDoc) -> Result<JobDoc> {
        if !self.docs.contains_key(&job.job_id) {
            return Err(NivaranError::not_found(format!("job {}", job.job_id)));
        }
        self.docs.insert(job.job_id, job.clone());
        self.persist(&job).await;
        Ok(job)
    }

    /// List jobs, optionally filtered by officer, status and overdue flag
    pub fn list(
        &self,
        officer_id: Option<Uuid>,
        status: Option<JobStatus>,
        overdue: Option<bool>,
    ) -> Vec<JobDoc> {
        let mut results: Vec<JobDoc> = self
            .docs
            .iter()
            .filter(|j| officer_id.map_or(true, |o| j.officer_id == o))
            .filter(|j| status.map_or(true, |s| j.status == s))
            .filter(|j| overdue.map_or(true, |flag| j.overdue == flag))
            .map(|j| j.clone())
            .collect();
        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        results
    }

    /// Non-terminal jobs past their deadline that have not yet been
    /// alerted for that deadline
    pub fn overdue_candidates(&self, now: DateTime<Utc>) -> Vec<JobDoc> {
        self.docs
            .iter()
            .filter(|j| !j.status.is_terminal())
            .filter(|j| j.deadline < now)
            .filter(|j| j.overdue_alerted_for != Some(j.deadline))
            .map(|j| j.clone())
            .collect()
    }

    /// Number of jobs held
    pub fn count(&self) -> usize {
        self.docs.len()
    }

    /// Re-insert a document loaded from MongoDB
    pub(crate) fn restore(&self, doc: JobDoc) {
        self.owner_index.insert(doc.job_id, self.tenant_id);
        self.docs.insert(doc.job_id, doc);
    }

    async fn persist(&self, doc: &JobDoc) {
        if let Some(ref collection) = self.db {
            if let Err(e) = collection
                .upsert_one(bson::doc! { "job_id": doc.job_id.to_string() }, doc.clone())
                .await
            {
                log_persist_failure("job", &e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store() -> JobStore {
        JobStore::new(Uuid::new_v4(), None, Arc::new(DashMap::new()))
    }

    fn job(store: &JobStore, complaint_id: Uuid, deadline: DateTime<Utc>) -> JobDoc {
        JobDoc::new(store.tenant_id, complaint_id, Uuid::new_v4(), deadline, None)
    }

    #[tokio::test]
    async fn test_one_open_job_per_complaint() {
        let store = store();
        let complaint = Uuid::new_v4();
        let deadline = Utc::now() + Duration::hours(48);

        store.insert(job(&store, complaint, deadline)).await.unwrap();
        let err = store
            .insert(job(&store, complaint, deadline))
            .await
            .unwrap_err();
        assert!(matches!(err, NivaranError::Conflict(_)));

        // Superseding the open job clears the way
        let mut open = store.non_terminal_for_complaint(complaint).unwrap();
        open.status = JobStatus::Superseded;
        store.save(open).await.unwrap();
        store.insert(job(&store, complaint, deadline)).await.unwrap();
        assert_eq!(store.count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_assignments_single_winner() {
        let store = Arc::new(store());
        let complaint = Uuid::new_v4();
        let deadline = Utc::now() + Duration::hours(48);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let job =
                    JobDoc::new(store.tenant_id, complaint, Uuid::new_v4(), deadline, None);
                store.insert(job).await.is_ok()
            }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }

        assert_eq!(wins, 1);
        assert_eq!(store.count(), 1);
    }

    #[tokio::test]
    async fn test_overdue_candidates_respect_alert_bookkeeping() {
        let store = store();
        let now = Utc::now();
        let past = now - Duration::hours(1);

        let inserted = store.insert(job(&store, Uuid::new_v4(), past)).await.unwrap();
        assert_eq!(store.overdue_candidates(now).len(), 1);

        // Once alerted for this deadline, re-scans skip the job
        let mut alerted = inserted.clone();
        alerted.overdue = true;
        alerted.overdue_alerted_for = Some(past);
        store.save(alerted).await.unwrap();
        assert!(store.overdue_candidates(now).is_empty());

        // A new deadline re-arms
        let mut reassigned = store.get(inserted.job_id).unwrap();
        reassigned.deadline = now - Duration::minutes(5);
        reassigned.overdue = false;
        store.save(reassigned).await.unwrap();
        assert_eq!(store.overdue_candidates(now).len(), 1);
    }

    #[tokio::test]
    async fn test_completed_jobs_are_never_candidates() {
        let store = store();
        let now = Utc::now();

        let inserted = store
            .insert(job(&store, Uuid::new_v4(), now - Duration::hours(1)))
            .await
            .unwrap();
        let mut done = inserted;
        done.status = JobStatus::Completed;
        done.completed_at = Some(now);
        store.save(done).await.unwrap();

        assert!(store.overdue_candidates(now).is_empty());
    }

    #[tokio::test]
    async fn test_list_filters() {
        let store = store();
        let officer = Uuid::new_v4();
        let deadline = Utc::now() + Duration::hours(48);

        let mut first = JobDoc::new(store.tenant_id, Uuid::new_v4(), officer, deadline, None);
        first.overdue = true;
        store.insert(first).await.unwrap();
        store.insert(job(&store, Uuid::new_v4(), deadline)).await.unwrap();

        assert_eq!(store.list(Some(officer), None, None).len(), 1);
        assert_eq!(store.list(None, Some(JobStatus::Assigned), None).len(), 2);
        assert_eq!(store.list(None, None, Some(true)).len(), 1);
    }
}
