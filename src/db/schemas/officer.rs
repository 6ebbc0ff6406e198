//! Officer document schema
//!
//! Officers are field staff who resolve complaints. Each officer belongs
//! to exactly one tenant; phone numbers are unique within a tenant but
//! may repeat across tenants.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for officers
pub const OFFICER_COLLECTION: &str = "officers";

/// Officer document
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct OfficerDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata
    #[serde(default)]
    pub metadata: Metadata,

    /// Stable officer identifier
    pub officer_id: Uuid,

    /// Owning tenant
    pub tenant_id: Uuid,

    /// Officer's full name
    pub name: String,

    /// Contact phone, unique within the owning tenant
    pub phone: String,

    /// Contact email
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Department, e.g. "PWD" or "Water Board"
    pub department: String,

    /// Designation, e.g. "Junior Engineer"
    pub designation: String,

    /// Whether the officer can receive new assignments
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl OfficerDoc {
    /// Create a new active officer for a tenant
    pub fn new(
        tenant_id: Uuid,
        name: String,
        phone: String,
        email: Option<String>,
        department: String,
        designation: String,
    ) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            officer_id: Uuid::new_v4(),
            tenant_id,
            name,
            phone,
            email,
            department,
            designation,
            is_active: true,
        }
    }
}

impl IntoIndexes for OfficerDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "officer_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("officer_id_unique".to_string())
                        .build(),
                ),
            ),
            // Phone unique within a tenant, never across tenants
            (
                doc! { "tenant_id": 1, "phone": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("tenant_phone_unique".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for OfficerDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
