//! Complaint document schema
//!
//! A complaint is one tracked grievance filed by a citizen, owned by a
//! tenant and numbered `PREFIX-YYYY-NNNN` where NNNN is gapless per
//! (tenant, calendar year).

use bson::{doc, oid::ObjectId, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for complaints
pub const COMPLAINT_COLLECTION: &str = "complaints";

/// Closed set of complaint categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Water,
    Road,
    Electricity,
    Drainage,
    Garbage,
    Streetlight,
    Other,
}

impl IssueType {
    /// All recognized issue types with the descriptions the voice
    /// pipeline uses for classification
    pub const CATALOGUE: [(IssueType, &'static str); 7] = [
        (IssueType::Water, "Water supply issues, pipe leaks, no water"),
        (IssueType::Road, "Potholes, damaged roads, road repairs needed"),
        (
            IssueType::Electricity,
            "Power cuts, electrical faults, transformer issues",
        ),
        (
            IssueType::Drainage,
            "Blocked drains, sewage overflow, flooding",
        ),
        (
            IssueType::Garbage,
            "Garbage not collected, dumping issues",
        ),
        (IssueType::Streetlight, "Street lights not working"),
        (IssueType::Other, "Any other issue not listed above"),
    ];

    /// Parse a caller-supplied issue type string.
    ///
    /// Strict mode rejects unknown values; lenient mode (voice path)
    /// coerces them to `Other`.
    pub fn parse(s: &str, lenient: bool) -> Option<IssueType> {
        let parsed = match s.trim().to_lowercase().as_str() {
            "water" => Some(IssueType::Water),
            "road" => Some(IssueType::Road),
            "electricity" => Some(IssueType::Electricity),
            "drainage" => Some(IssueType::Drainage),
            "garbage" => Some(IssueType::Garbage),
            "streetlight" => Some(IssueType::Streetlight),
            "other" => Some(IssueType::Other),
            _ => None,
        };
        if parsed.is_none() && lenient {
            Some(IssueType::Other)
        } else {
            parsed
        }
    }

    /// Stable string form
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::Water => "water",
            IssueType::Road => "road",
            IssueType::Electricity => "electricity",
            IssueType::Drainage => "drainage",
            IssueType::Garbage => "garbage",
            IssueType::Streetlight => "streetlight",
            IssueType::Other => "other",
        }
    }
}

/// Complaint lifecycle status
///
/// Forward-only except the explicit reopen (verified/closed -> assigned)
/// driven by creating a new job assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintStatus {
    New,
    Assigned,
    InProgress,
    Completed,
    Verified,
    Closed,
}

impl ComplaintStatus {
    /// Stable string form
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintStatus::New => "new",
            ComplaintStatus::Assigned => "assigned",
            ComplaintStatus::InProgress => "in_progress",
            ComplaintStatus::Completed => "completed",
            ComplaintStatus::Verified => "verified",
            ComplaintStatus::Closed => "closed",
        }
    }
}

/// Complaint document
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ComplaintDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata
    #[serde(default)]
    pub metadata: Metadata,

    /// Stable complaint identifier
    pub complaint_id: Uuid,

    /// Owning tenant
    pub tenant_id: Uuid,

    /// Human-readable sequence number, e.g. "CHN-2024-0001"
    pub complaint_number: String,

    /// Citizen's name
    pub citizen_name: String,

    /// Citizen's phone number
    pub citizen_phone: String,

    /// Category of the grievance
    pub issue_type: IssueType,

    /// Free-text description
    pub description: String,

    /// Where the problem is
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Nearby landmark
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landmark: Option<String>,

    /// Call recording URL, if the complaint came from a call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,

    /// Conversation transcript
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,

    /// Lifecycle status
    pub status: ComplaintStatus,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl Default for ComplaintDoc {
    fn default() -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            complaint_id: Uuid::nil(),
            tenant_id: Uuid::nil(),
            complaint_number: String::new(),
            citizen_name: String::new(),
            citizen_phone: String::new(),
            issue_type: IssueType::Other,
            description: String::new(),
            location: None,
            landmark: None,
            audio_url: None,
            transcript: None,
            status: ComplaintStatus::New,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

impl IntoIndexes for ComplaintDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "complaint_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("complaint_id_unique".to_string())
                        .build(),
                ),
            ),
            // Sequence numbers are unique per tenant
            (
                doc! { "tenant_id": 1, "complaint_number": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("tenant_number_unique".to_string())
                        .build(),
                ),
            ),
            // Dashboard listing is always tenant-scoped and recent-first
            (
                doc! { "tenant_id": 1, "created_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("tenant_created".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ComplaintDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_type_parse_strict() {
        assert_eq!(IssueType::parse("water", false), Some(IssueType::Water));
        assert_eq!(IssueType::parse("  Road ", false), Some(IssueType::Road));
        assert_eq!(IssueType::parse("pothole", false), None);
    }

    #[test]
    fn test_issue_type_parse_lenient_coerces_to_other() {
        assert_eq!(IssueType::parse("pothole", true), Some(IssueType::Other));
        assert_eq!(IssueType::parse("water", true), Some(IssueType::Water));
    }

    #[test]
    fn test_status_round_trip() {
        let s: ComplaintStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(s, ComplaintStatus::InProgress);
        assert_eq!(s.as_str(), "in_progress");
    }
}
