//! Per-tenant complaint store
//!
//! Owns complaint records and the sequence counters that number them.
//! Numbering serializes through a per-partition async mutex so two
//! concurrent creations in the same tenant/year can never collide or
//! skip: the counter hands out a contiguous 1..N run.

use chrono::{DateTime, Datelike, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use super::log_persist_failure;
use crate::db::mongo::MongoCollection;
use crate::db::schemas::{ComplaintDoc, ComplaintStatus, IssueType, Metadata};
use crate::types::{NivaranError, Result};

/// Sortable listing fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    CreatedAt,
    Status,
    IssueType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// Listing filters, search, sort and pagination
#[derive(Debug, Clone, Default)]
pub struct ComplaintQuery {
    pub issue_type: Option<IssueType>,
    pub status: Option<ComplaintStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Case-insensitive match over name, location, description and phone
    pub search: Option<String>,
    pub sort_by: SortField,
    pub direction: SortDirection,
    pub offset: usize,
    pub limit: Option<usize>,
}

/// Totals for the dashboard summary
#[derive(Debug, Clone, Serialize)]
pub struct ComplaintStats {
    pub total: usize,
    pub by_status: HashMap<String, usize>,
    pub by_issue_type: HashMap<String, usize>,
}

/// Fields supplied when filing a complaint
#[derive(Debug, Clone)]
pub struct NewComplaint {
    pub citizen_name: String,
    pub citizen_phone: String,
    pub issue_type: IssueType,
    pub description: String,
    pub location: Option<String>,
    pub landmark: Option<String>,
    pub audio_url: Option<String>,
    pub transcript: Option<String>,
}

/// Complaint store for one tenant
pub struct ComplaintStore {
    tenant_id: Uuid,
    docs: DashMap<Uuid, ComplaintDoc>,
    /// year → last issued sequence number; creations serialize here
    counters: Mutex<HashMap<i32, u32>>,
    db: Option<MongoCollection<ComplaintDoc>>,
    owner_index: Arc<DashMap<Uuid, Uuid>>,
}

impl ComplaintStore {
    pub(crate) fn new(
        tenant_id: Uuid,
        db: Option<MongoCollection<ComplaintDoc>>,
        owner_index: Arc<DashMap<Uuid, Uuid>>,
    ) -> Self {
        Self {
            tenant_id,
            docs: DashMap::new(),
            counters: Mutex::new(HashMap::new()),
            db,
            owner_index,
        }
    }

    /// File a new complaint, assigning the next sequence number for the
    /// tenant's current year.
    pub async fn create(&self, prefix: &str, fields: NewComplaint) -> Result<ComplaintDoc> {
        if fields.citizen_name.trim().is_empty() {
            return Err(NivaranError::validation("citizen_name must not be empty"));
        }
        if fields.citizen_phone.trim().is_empty() {
            return Err(NivaranError::validation("citizen_phone must not be empty"));
        }
        if fields.description.trim().is_empty() {
            return Err(NivaranError::validation("description must not be empty"));
        }

        let now = Utc::now();
        let year = now.year();

        // Serialization point: numbering and insertion happen under the
        // counter lock, so a concurrent create cannot observe a gap
        let mut counters = self.counters.lock().await;
        let counter = counters
            .entry(year)
            .or_insert_with(|| self.highest_issued(year));
        *counter += 1;
        let complaint_number = format!("{}-{}-{:04}", prefix, year, counter);

        let doc = ComplaintDoc {
            _id: None,
            metadata: Metadata::new(),
            complaint_id: Uuid::new_v4(),
            tenant_id: self.tenant_id,
            complaint_number: complaint_number.clone(),
            citizen_name: fields.citizen_name,
            citizen_phone: fields.citizen_phone,
            issue_type: fields.issue_type,
            description: fields.description,
            location: fields.location,
            landmark: fields.landmark,
            audio_url: fields.audio_url,
            transcript: fields.transcript,
            status: ComplaintStatus::New,
            created_at: now,
            updated_at: now,
        };

        self.owner_index.insert(doc.complaint_id, self.tenant_id);
        self.docs.insert(doc.complaint_id, doc.clone());
        drop(counters);

        self.persist(&doc).await;
        info!(
            tenant = %self.tenant_id,
            complaint = %doc.complaint_id,
            number = %complaint_number,
            "Complaint created"
        );
        Ok(doc)
    }

    /// Get a complaint by id
    pub fn get(&self, complaint_id: Uuid) -> Option<ComplaintDoc> {
        self.docs.get(&complaint_id).map(|d| d.clone())
    }

    /// Apply a status change decided by the lifecycle engine
    pub async fn set_status(
        &self,
        complaint_id: Uuid,
        status: ComplaintStatus,
    ) -> Result<ComplaintDoc> {
        let mut doc = self
            .docs
            .get_mut(&complaint_id)
            .ok_or_else(|| NivaranError::not_found(format!("complaint {}", complaint_id)))?;
        doc.status = status;
        doc.updated_at = Utc::now();
        let snapshot = doc.clone();
        drop(doc);

        self.persist(&snapshot).await;
        Ok(snapshot)
    }

    /// List complaints with filters, search, sort and pagination
    pub fn list(&self, query: &ComplaintQuery) -> Vec<ComplaintDoc> {
        let needle = query.search.as_ref().map(|s| s.to_lowercase());

        let mut results: Vec<ComplaintDoc> = self
            .docs
            .iter()
            .filter(|d| query.issue_type.map_or(true, |t| d.issue_type == t))
            .filter(|d| query.status.map_or(true, |s| d.status == s))
            .filter(|d| query.from.map_or(true, |from| d.created_at >= from))
            .filter(|d| query.to.map_or(true, |to| d.created_at <= to))
            .filter(|d| match &needle {
                Some(needle) => {
                    d.citizen_name.to_lowercase().contains(needle)
                        || d.citizen_phone.to_lowercase().contains(needle)
                        || d.description.to_lowercase().contains(needle)
                        || d.location
                            .as_ref()
                            .is_some_and(|l| l.to_lowercase().contains(needle))
                }
                None => true,
            })
            .map(|d| d.clone())
            .collect();

        results.sort_by(|a, b| {
            let ordering = match query.sort_by {
                SortField::CreatedAt => a.created_at.cmp(&b.created_at),
                SortField::Status => a.status.as_str().cmp(b.status.as_str()),
                SortField::IssueType => a.issue_type.as_str().cmp(b.issue_type.as_str()),
            };
            match query.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        let iter = results.into_iter().skip(query.offset);
        match query.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }

    /// Totals by status and issue type
    pub fn stats(&self) -> ComplaintStats {
        let mut by_status: HashMap<String, usize> = HashMap::new();
        let mut by_issue_type: HashMap<String, usize> = HashMap::new();
        let mut total = 0;

        for doc in self.docs.iter() {
            total += 1;
            *by_status.entry(doc.status.as_str().to_string()).or_default() += 1;
            *by_issue_type
                .entry(doc.issue_type.as_str().to_string())
                .or_default() += 1;
        }

        ComplaintStats {
            total,
            by_status,
            by_issue_type,
        }
    }

    /// Number of complaints held
    pub fn count(&self) -> usize {
        self.docs.len()
    }

    /// Re-insert a document loaded from MongoDB
    pub(crate) fn restore(&self, doc: ComplaintDoc) {
        self.owner_index.insert(doc.complaint_id, self.tenant_id);
        self.docs.insert(doc.complaint_id, doc);
    }

    /// Highest sequence number already issued for a year (counter seed
    /// after a restart)
    fn highest_issued(&self, year: i32) -> u32 {
        let marker = format!("-{}-", year);
        self.docs
            .iter()
            .filter(|d| d.complaint_number.contains(&marker))
            .filter_map(|d| {
                d.complaint_number
                    .rsplit('-')
                    .next()
                    .and_then(|n| n.parse::<u32>().ok())
            })
            .max()
            .unwrap_or(0)
    }

    async fn persist(&self, doc: &ComplaintDoc) {
        if let Some(ref collection) = self.db {
            if let Err(e) = collection
                .upsert_one(
                    bson::doc! { "complaint_id": doc.complaint_id.to_string() },
                    doc.clone(),
                )
                .await
            {
                log_persist_failure("complaint", &e);
            }
        }
    }
}
