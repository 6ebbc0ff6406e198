//! Job assignment document schema
//!
//! A job is the unit of work given to one officer to resolve one
//! complaint by a deadline. A complaint may accumulate several jobs over
//! its lifetime (reassignment), but at most one may be non-terminal at
//! any time. `overdue` is a derived flag, not a status: a job keeps its
//! real status while flagged.

use bson::{doc, oid::ObjectId, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for job assignments
pub const JOB_COLLECTION: &str = "job_assignments";

/// Job assignment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Assigned,
    Accepted,
    InProgress,
    Completed,
    /// Terminal: replaced by a newer assignment for the same complaint
    Superseded,
}

impl JobStatus {
    /// Whether the status is terminal (no further transitions)
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Superseded)
    }

    /// Stable string form
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Assigned => "assigned",
            JobStatus::Accepted => "accepted",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Superseded => "superseded",
        }
    }
}

/// Job assignment document
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct JobDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata
    #[serde(default)]
    pub metadata: Metadata,

    /// Stable job identifier
    pub job_id: Uuid,

    /// Owning tenant
    pub tenant_id: Uuid,

    /// The complaint this job resolves
    pub complaint_id: Uuid,

    /// The officer responsible; must belong to the same tenant
    pub officer_id: Uuid,

    /// When the work must be finished
    pub deadline: DateTime<Utc>,

    /// Instructions from the staff member who assigned the job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Lifecycle status
    pub status: JobStatus,

    /// Deadline has passed while the job was non-terminal
    #[serde(default)]
    pub overdue: bool,

    /// The deadline for which an overdue alert was already emitted.
    /// Re-scans emit nothing while this matches `deadline`; reassignment
    /// with a new deadline re-arms monitoring.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overdue_alerted_for: Option<DateTime<Utc>>,

    /// Proof media URLs uploaded by the officer (at least 1 at completion)
    #[serde(default)]
    pub proof_urls: Vec<String>,

    /// Officer's notes on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_notes: Option<String>,

    /// When the job was completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl JobDoc {
    /// Create a freshly assigned job
    pub fn new(
        tenant_id: Uuid,
        complaint_id: Uuid,
        officer_id: Uuid,
        deadline: DateTime<Utc>,
        instructions: Option<String>,
    ) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            job_id: Uuid::new_v4(),
            tenant_id,
            complaint_id,
            officer_id,
            deadline,
            instructions,
            status: JobStatus::Assigned,
            overdue: false,
            overdue_alerted_for: None,
            proof_urls: Vec::new(),
            completion_notes: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }
}

impl Default for JobDoc {
    fn default() -> Self {
        Self::new(Uuid::nil(), Uuid::nil(), Uuid::nil(), Utc::now(), None)
    }
}

impl IntoIndexes for JobDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "job_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("job_id_unique".to_string())
                        .build(),
                ),
            ),
            // Deadline monitor scans non-completed jobs ordered by deadline
            (
                doc! { "status": 1, "deadline": 1 },
                Some(
                    IndexOptions::builder()
                        .name("status_deadline".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "tenant_id": 1, "officer_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("tenant_officer".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for JobDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Superseded.is_terminal());
        assert!(!JobStatus::Assigned.is_terminal());
        assert!(!JobStatus::Accepted.is_terminal());
        assert!(!JobStatus::InProgress.is_terminal());
    }
}
