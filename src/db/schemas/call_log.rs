//! Call log document schema
//!
//! Append-only record of every inbound call, including calls that could
//! not be routed to a tenant. Never mutated after the call ends except
//! to attach the end timestamp and outcome.

use bson::{doc, oid::ObjectId, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for call logs
pub const CALL_LOG_COLLECTION: &str = "call_logs";

/// Outcome classification attached when a call ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Completed,
    NoAnswer,
    Busy,
    Failed,
    /// The dialed number resolved to no active tenant
    Unrouted,
}

impl CallOutcome {
    /// Stable string form
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Completed => "completed",
            CallOutcome::NoAnswer => "no_answer",
            CallOutcome::Busy => "busy",
            CallOutcome::Failed => "failed",
            CallOutcome::Unrouted => "unrouted",
        }
    }
}

/// Call log document
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CallLogDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata
    #[serde(default)]
    pub metadata: Metadata,

    /// Stable call identifier
    pub call_id: Uuid,

    /// Resolved tenant, absent when routing failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,

    /// Citizen's phone number
    pub caller_phone: String,

    /// The number that was dialed
    pub dialed_number: String,

    /// Outcome, attached when the call ends
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<CallOutcome>,

    /// Complaint created during the call, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complaint_id: Option<Uuid>,

    /// Media room identifier from the telephony platform
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,

    /// Call start
    pub started_at: DateTime<Utc>,

    /// Call end, attached exactly once
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl CallLogDoc {
    /// Append a new in-progress call record
    pub fn new(
        tenant_id: Option<Uuid>,
        caller_phone: String,
        dialed_number: String,
        room_id: Option<String>,
    ) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            call_id: Uuid::new_v4(),
            tenant_id,
            caller_phone,
            dialed_number,
            outcome: None,
            complaint_id: None,
            room_id,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Duration in seconds, once the call has ended
    pub fn duration_seconds(&self) -> Option<i64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_seconds())
    }
}

impl Default for CallLogDoc {
    fn default() -> Self {
        Self::new(None, String::new(), String::new(), None)
    }
}

impl IntoIndexes for CallLogDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "call_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("call_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "tenant_id": 1, "started_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("tenant_started".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for CallLogDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
