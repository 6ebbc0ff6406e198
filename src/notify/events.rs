//! Notification event types
//!
//! Discrete events handed to the external Notification Dispatcher. Each
//! carries the ids, a human-readable summary, and the contact needed to
//! compose an outbound message; delivery is the dispatcher's concern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subject prefix for notification events on NATS
pub const EVENT_SUBJECT_PREFIX: &str = "NIVARAN.EVENT";

/// Events consumed by the Notification Dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// A tenant finished provisioning (welcome message)
    TenantProvisioned {
        tenant_id: Uuid,
        routing_key: String,
        contact: String,
        summary: String,
    },
    /// A complaint was filed
    ComplaintCreated {
        tenant_id: Uuid,
        complaint_id: Uuid,
        complaint_number: String,
        contact: String,
        summary: String,
    },
    /// A job was assigned to an officer
    JobAssigned {
        tenant_id: Uuid,
        job_id: Uuid,
        complaint_id: Uuid,
        officer_id: Uuid,
        contact: String,
        deadline: DateTime<Utc>,
        summary: String,
    },
    /// A job's deadline passed without completion; emitted exactly once
    /// per (job, deadline)
    JobOverdue {
        tenant_id: Uuid,
        job_id: Uuid,
        complaint_id: Uuid,
        officer_id: Uuid,
        contact: String,
        deadline: DateTime<Utc>,
        summary: String,
    },
    /// A job was completed with proof attached
    JobCompleted {
        tenant_id: Uuid,
        job_id: Uuid,
        complaint_id: Uuid,
        officer_id: Uuid,
        contact: String,
        summary: String,
    },
}

impl NotificationEvent {
    /// Short kind name used in subjects and logs
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::TenantProvisioned { .. } => "tenant_provisioned",
            NotificationEvent::ComplaintCreated { .. } => "complaint_created",
            NotificationEvent::JobAssigned { .. } => "job_assigned",
            NotificationEvent::JobOverdue { .. } => "job_overdue",
            NotificationEvent::JobCompleted { .. } => "job_completed",
        }
    }

    /// NATS subject for this event
    pub fn subject(&self) -> String {
        format!("{}.{}", EVENT_SUBJECT_PREFIX, self.kind())
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<bytes::Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Into::into)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_and_round_trip() {
        let event = NotificationEvent::JobOverdue {
            tenant_id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            complaint_id: Uuid::new_v4(),
            officer_id: Uuid::new_v4(),
            contact: "+919876543210".to_string(),
            deadline: Utc::now(),
            summary: "Job overdue".to_string(),
        };
        assert_eq!(event.subject(), "NIVARAN.EVENT.job_overdue");

        let bytes = event.to_bytes().unwrap();
        let decoded = NotificationEvent::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.kind(), "job_overdue");
    }
}
