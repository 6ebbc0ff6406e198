//! Per-tenant call log store
//!
//! Append-only. A record is created when a call starts and touched once
//! more when it ends, to attach the end timestamp, outcome and any
//! complaint created during the call.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::log_persist_failure;
use crate::db::mongo::MongoCollection;
use crate::db::schemas::{CallLogDoc, CallOutcome};
use crate::types::{NivaranError, Result};

/// Call log store for one tenant
pub struct CallStore {
    tenant_id: Uuid,
    docs: DashMap<Uuid, CallLogDoc>,
    db: Option<MongoCollection<CallLogDoc>>,
    owner_index: Arc<DashMap<Uuid, Uuid>>,
}

impl CallStore {
    pub(crate) fn new(
        tenant_id: Uuid,
        db: Option<MongoCollection<CallLogDoc>>,
        owner_index: Arc<DashMap<Uuid, Uuid>>,
    ) -> Self {
        Self {
            tenant_id,
            docs: DashMap::new(),
            db,
            owner_index,
        }
    }

    /// Append a call record at call start
    pub async fn log_call(&self, call: CallLogDoc) -> Result<CallLogDoc> {
        if call.caller_phone.trim().is_empty() {
            return Err(NivaranError::validation("caller_phone must not be empty"));
        }

        self.owner_index.insert(call.call_id, self.tenant_id);
        self.docs.insert(call.call_id, call.clone());
        self.persist(&call).await;
        Ok(call)
    }

    /// Attach the end timestamp and outcome, exactly once
    pub async fn finish(
        &self,
        call_id: Uuid,
        outcome: CallOutcome,
        complaint_id: Option<Uuid>,
    ) -> Result<CallLogDoc> {
        let mut doc = self
            .docs
            .get_mut(&call_id)
            .ok_or_else(|| NivaranError::not_found(format!("call {}", call_id)))?;

        if doc.ended_at.is_some() {
            return Err(NivaranError::conflict(format!(
                "call {} has already ended",
                call_id
            )));
        }

        doc.ended_at = Some(chrono::Utc::now());
        doc.outcome = Some(outcome);
        if complaint_id.is_some() {
            doc.complaint_id = complaint_id;
        }
        let snapshot = doc.clone();
        drop(doc);

        self.persist(&snapshot).await;
        Ok(snapshot)
    }

    /// Get a call record by id
    pub fn get(&self, call_id: Uuid) -> Option<CallLogDoc> {
        self.docs.get(&call_id).map(|d| d.clone())
    }

    /// List the tenant's calls, most recent first
    pub fn list(&self) -> Vec<CallLogDoc> {
        let mut results: Vec<CallLogDoc> = self.docs.iter().map(|d| d.clone()).collect();
        results.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        results
    }

    /// Counts per outcome classification (ended calls only)
    pub fn outcome_counts(&self) -> HashMap<String, usize> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for doc in self.docs.iter() {
            if let Some(outcome) = doc.outcome {
                *counts.entry(outcome.as_str().to_string()).or_default() += 1;
            }
        }
        counts
    }

    /// Number of calls held
    pub fn count(&self) -> usize {
        self.docs.len()
    }

    /// Re-insert a document loaded from MongoDB
    pub(crate) fn restore(&self, doc: CallLogDoc) {
        self.owner_index.insert(doc.call_id, self.tenant_id);
        self.docs.insert(doc.call_id, doc);
    }

    async fn persist(&self, doc: &CallLogDoc) {
        if let Some(ref collection) = self.db {
            if let Err(e) = collection
                .upsert_one(
                    bson::doc! { "call_id": doc.call_id.to_string() },
                    doc.clone(),
                )
                .await
            {
                log_persist_failure("call log", &e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CallStore {
        CallStore::new(Uuid::new_v4(), None, Arc::new(DashMap::new()))
    }

    fn call(store: &CallStore) -> CallLogDoc {
        CallLogDoc::new(
            Some(store.tenant_id),
            "+919876543210".to_string(),
            "+914423456789".to_string(),
            Some("room-42".to_string()),
        )
    }

    #[tokio::test]
    async fn test_finish_attaches_outcome_exactly_once() {
        let store = store();
        let logged = store.log_call(call(&store)).await.unwrap();

        let finished = store
            .finish(logged.call_id, CallOutcome::Completed, Some(Uuid::new_v4()))
            .await
            .unwrap();
        assert_eq!(finished.outcome, Some(CallOutcome::Completed));
        assert!(finished.ended_at.is_some());
        assert!(finished.duration_seconds().is_some());

        let err = store
            .finish(logged.call_id, CallOutcome::Failed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, NivaranError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_outcome_counts() {
        let store = store();
        let a = store.log_call(call(&store)).await.unwrap();
        let b = store.log_call(call(&store)).await.unwrap();
        store.log_call(call(&store)).await.unwrap();

        store
            .finish(a.call_id, CallOutcome::Completed, None)
            .await
            .unwrap();
        store
            .finish(b.call_id, CallOutcome::NoAnswer, None)
            .await
            .unwrap();

        let counts = store.outcome_counts();
        assert_eq!(counts.get("completed"), Some(&1));
        assert_eq!(counts.get("no_answer"), Some(&1));
        assert_eq!(counts.get("busy"), None);
        assert_eq!(store.count(), 3);
    }
}
