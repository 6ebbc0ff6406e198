//! Tenant document schema
//!
//! A tenant is one elected representative's office: the unit of routing
//! and data isolation. The routing key is the phone number citizens dial;
//! at most one *active* tenant may hold a routing key at any time.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for tenants
pub const TENANT_COLLECTION: &str = "tenants";

/// Ordered provisioning steps of the tenant saga
///
/// Steps 1-5 are compensatable; `WelcomeNotification` is fire-and-forget
/// and `Activate` only runs once everything before it committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStep {
    ReserveRoutingKey,
    CreatePartition,
    RegisterTrunk,
    PublishConfig,
    IssueCredentials,
    WelcomeNotification,
    Activate,
}

impl ProvisionStep {
    /// Forward execution order
    pub const ORDER: [ProvisionStep; 7] = [
        ProvisionStep::ReserveRoutingKey,
        ProvisionStep::CreatePartition,
        ProvisionStep::RegisterTrunk,
        ProvisionStep::PublishConfig,
        ProvisionStep::IssueCredentials,
        ProvisionStep::WelcomeNotification,
        ProvisionStep::Activate,
    ];

    /// Stable name used in logs and error payloads
    pub fn name(&self) -> &'static str {
        match self {
            ProvisionStep::ReserveRoutingKey => "reserve_routing_key",
            ProvisionStep::CreatePartition => "create_partition",
            ProvisionStep::RegisterTrunk => "register_trunk",
            ProvisionStep::PublishConfig => "publish_config",
            ProvisionStep::IssueCredentials => "issue_credentials",
            ProvisionStep::WelcomeNotification => "welcome_notification",
            ProvisionStep::Activate => "activate",
        }
    }
}

impl std::fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Provisioning lifecycle of a tenant record
///
/// `Pending` and `Failed` carry the set of committed steps so a retried
/// provisioning run resumes from the first incomplete step instead of
/// duplicating side effects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProvisioningState {
    Pending { completed: Vec<ProvisionStep> },
    Active,
    Failed {
        failed_step: ProvisionStep,
        completed: Vec<ProvisionStep>,
    },
}

impl Default for ProvisioningState {
    fn default() -> Self {
        ProvisioningState::Pending { completed: Vec::new() }
    }
}

/// Per-tenant runtime configuration served to the voice pipeline
///
/// A closed record with explicit defaults; validated once at the
/// orchestrator's publish step, written to the config cache whole
/// (replace-not-patch), never patched field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Representative display name
    pub name: String,
    /// Constituency name, also the source of the complaint number prefix
    pub constituency: String,
    /// Languages the voice pipeline should speak
    pub languages: Vec<String>,
    /// Greeting played at call start
    pub greeting: String,
    /// Hours before an unassigned escalation is considered breached
    pub escalation_hours: u32,
}

impl TenantConfig {
    /// Default escalation window
    pub const DEFAULT_ESCALATION_HOURS: u32 = 48;

    /// Validate the closed configuration record.
    ///
    /// Runs at the orchestrator's publish step, not at read sites.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.constituency.trim().len() < 3 {
            return Err("constituency must be at least 3 characters".to_string());
        }
        if self.languages.is_empty() {
            return Err("at least one language is required".to_string());
        }
        if self.greeting.trim().is_empty() {
            return Err("greeting must not be empty".to_string());
        }
        if self.escalation_hours == 0 {
            return Err("escalation_hours must be greater than zero".to_string());
        }
        Ok(())
    }

    /// Prefix for complaint sequence numbers, e.g. "Chennai South" -> "CHN"
    pub fn number_prefix(&self) -> String {
        self.constituency
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .take(3)
            .collect::<String>()
            .to_uppercase()
    }
}

/// Tenant document
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TenantDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Stable tenant identifier, immutable for the record's lifetime
    pub tenant_id: Uuid,

    /// Routing key: the phone number citizens dial to reach this tenant
    pub routing_key: String,

    /// Previous routing key during a two-phase re-route (dual-route window)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retiring_routing_key: Option<String>,

    /// Representative name
    pub name: String,

    /// Constituency name
    pub constituency: String,

    /// Admin contact email, used for dashboard credential issuance
    pub admin_email: String,

    /// Languages the voice pipeline should speak
    pub languages: Vec<String>,

    /// Greeting played at call start
    pub greeting: String,

    /// Escalation window in hours
    pub escalation_hours: u32,

    /// Whether the tenant is live for call routing
    #[serde(default)]
    pub is_active: bool,

    /// Saga progress
    #[serde(default)]
    pub provisioning: ProvisioningState,
}

impl TenantDoc {
    /// Create a new pending tenant record.
    ///
    /// When no greeting is supplied, a default one is synthesized from the
    /// constituency and representative name.
    pub fn new(
        routing_key: String,
        name: String,
        constituency: String,
        admin_email: String,
        languages: Vec<String>,
        greeting: Option<String>,
    ) -> Self {
        let greeting = greeting.unwrap_or_else(|| {
            format!(
                "Vanakkam! Welcome to {} constituency office. \
                 I am an assistant helping {}. \
                 Please tell me your name and describe your complaint.",
                constituency, name
            )
        });

        Self {
            _id: None,
            metadata: Metadata::new(),
            tenant_id: Uuid::new_v4(),
            routing_key,
            retiring_routing_key: None,
            name,
            constituency,
            admin_email,
            languages,
            greeting,
            escalation_hours: TenantConfig::DEFAULT_ESCALATION_HOURS,
            is_active: false,
            provisioning: ProvisioningState::default(),
        }
    }

    /// Snapshot the runtime configuration served to the call router
    pub fn config(&self) -> TenantConfig {
        TenantConfig {
            name: self.name.clone(),
            constituency: self.constituency.clone(),
            languages: self.languages.clone(),
            greeting: self.greeting.clone(),
            escalation_hours: self.escalation_hours,
        }
    }
}

impl IntoIndexes for TenantDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "tenant_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("tenant_id_unique".to_string())
                        .build(),
                ),
            ),
            // Routing-key lookups on the inbound-call path
            (
                doc! { "routing_key": 1, "is_active": 1 },
                Some(
                    IndexOptions::builder()
                        .name("routing_key_active".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for TenantDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
