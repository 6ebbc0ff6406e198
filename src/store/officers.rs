//! Per-tenant officer store
//!
//! Officer phone numbers are unique within a tenant; the same number may
//! serve two different constituencies. Identity fields (id, tenant,
//! phone) are immutable after creation.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::log_persist_failure;
use crate::db::mongo::MongoCollection;
use crate::db::schemas::OfficerDoc;
use crate::types::{NivaranError, Result};

/// Mutable officer attributes
#[derive(Debug, Clone, Default)]
pub struct OfficerUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub department: Option<String>,
    pub designation: Option<String>,
    pub is_active: Option<bool>,
}

/// Officer store for one tenant
pub struct OfficerStore {
    tenant_id: Uuid,
    docs: DashMap<Uuid, OfficerDoc>,
    db: Option<MongoCollection<OfficerDoc>>,
    owner_index: Arc<DashMap<Uuid, Uuid>>,
}

impl OfficerStore {
    pub(crate) fn new(
        tenant_id: Uuid,
        db: Option<MongoCollection<OfficerDoc>>,
        owner_index: Arc<DashMap<Uuid, Uuid>>,
    ) -> Self {
        Self {
            tenant_id,
            docs: DashMap::new(),
            db,
            owner_index,
        }
    }

    /// Add an officer; the phone must be unused within this tenant
    pub async fn add(
        &self,
        name: String,
        phone: String,
        email: Option<String>,
        department: String,
        designation: String,
    ) -> Result<OfficerDoc> {
        if name.trim().is_empty() {
            return Err(NivaranError::validation("name must not be empty"));
        }
        if phone.trim().is_empty() {
            return Err(NivaranError::validation("phone must not be empty"));
        }
        if self.docs.iter().any(|o| o.phone == phone) {
            return Err(NivaranError::conflict(format!(
                "an officer with phone {} already exists",
                phone
            )));
        }

        let doc = OfficerDoc::new(self.tenant_id, name, phone, email, department, designation);

        self.owner_index.insert(doc.officer_id, self.tenant_id);
        self.docs.insert(doc.officer_id, doc.clone());
        self.persist(&doc).await;

        info!(
            tenant = %self.tenant_id,
            officer = %doc.officer_id,
            department = %doc.department,
            "Officer added"
        );
        Ok(doc)
    }

    /// Get an officer by id
    pub fn get(&self, officer_id: Uuid) -> Option<OfficerDoc> {
        self.docs.get(&officer_id).map(|d| d.clone())
    }

    /// List officers, optionally filtered by department and activity
    pub fn list(&self, department: Option<&str>, active_only: bool) -> Vec<OfficerDoc> {
        let mut results: Vec<OfficerDoc> = self
            .docs
            .iter()
            .filter(|o| department.map_or(true, |d| o.department.eq_ignore_ascii_case(d)))
            .filter(|o| !active_only || o.is_active)
            .map(|o| o.clone())
            .collect();
        results.sort_by(|a, b| a.name.cmp(&b.name));
        results
    }

    /// Update an officer's mutable attributes
    pub async fn update(&self, officer_id: Uuid, update: OfficerUpdate) -> Result<OfficerDoc> {
        let mut doc = self
            .docs
            .get_mut(&officer_id)
            .ok_or_else(|| NivaranError::not_found(format!("officer {}", officer_id)))?;

        if let Some(name) = update.name {
            if name.trim().is_empty() {
                return Err(NivaranError::validation("name must not be empty"));
            }
            doc.name = name;
        }
        if let Some(email) = update.email {
            doc.email = Some(email);
        }
        if let Some(department) = update.department {
            doc.department = department;
        }
        if let Some(designation) = update.designation {
            doc.designation = designation;
        }
        if let Some(is_active) = update.is_active {
            doc.is_active = is_active;
        }
        let snapshot = doc.clone();
        drop(doc);

        self.persist(&snapshot).await;
        Ok(snapshot)
    }

    /// Stop an officer from receiving new assignments
    pub async fn deactivate(&self, officer_id: Uuid) -> Result<OfficerDoc> {
        self.update(
            officer_id,
            OfficerUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
    }

    /// Number of officers held
    pub fn count(&self) -> usize {
        self.docs.len()
    }

    /// Re-insert a document loaded from MongoDB
    pub(crate) fn restore(&self, doc: OfficerDoc) {
        self.owner_index.insert(doc.officer_id, self.tenant_id);
        self.docs.insert(doc.officer_id, doc);
    }

    async fn persist(&self, doc: &OfficerDoc) {
        if let Some(ref collection) = self.db {
            if let Err(e) = collection
                .upsert_one(
                    bson::doc! { "officer_id": doc.officer_id.to_string() },
                    doc.clone(),
                )
                .await
            {
                log_persist_failure("officer", &e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> OfficerStore {
        OfficerStore::new(Uuid::new_v4(), None, Arc::new(DashMap::new()))
    }

    #[tokio::test]
    async fn test_duplicate_phone_within_tenant_conflicts() {
        let store = store();
        store
            .add(
                "Kumar".to_string(),
                "+919800000001".to_string(),
                None,
                "PWD".to_string(),
                "Junior Engineer".to_string(),
            )
            .await
            .unwrap();

        let err = store
            .add(
                "Anand".to_string(),
                "+919800000001".to_string(),
                None,
                "Water Board".to_string(),
                "Supervisor".to_string(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NivaranError::Conflict(_)));
        assert_eq!(store.count(), 1);
    }

    #[tokio::test]
    async fn test_same_phone_allowed_across_tenants() {
        let a = store();
        let b = store();

        a.add(
            "Kumar".to_string(),
            "+919800000001".to_string(),
            None,
            "PWD".to_string(),
            "Junior Engineer".to_string(),
        )
        .await
        .unwrap();
        b.add(
            "Kumar".to_string(),
            "+919800000001".to_string(),
            None,
            "PWD".to_string(),
            "Junior Engineer".to_string(),
        )
        .await
        .unwrap();

        assert_eq!(a.count(), 1);
        assert_eq!(b.count(), 1);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let store = store();
        store
            .add(
                "Kumar".to_string(),
                "+919800000001".to_string(),
                None,
                "PWD".to_string(),
                "Junior Engineer".to_string(),
            )
            .await
            .unwrap();
        let anand = store
            .add(
                "Anand".to_string(),
                "+919800000002".to_string(),
                None,
                "Water Board".to_string(),
                "Supervisor".to_string(),
            )
            .await
            .unwrap();
        store.deactivate(anand.officer_id).await.unwrap();

        assert_eq!(store.list(Some("pwd"), false).len(), 1);
        assert_eq!(store.list(None, true).len(), 1);
        assert_eq!(store.list(None, false).len(), 2);
    }

    #[tokio::test]
    async fn test_update_mutable_fields_only() {
        let store = store();
        let officer = store
            .add(
                "Kumar".to_string(),
                "+919800000001".to_string(),
                None,
                "PWD".to_string(),
                "Junior Engineer".to_string(),
            )
            .await
            .unwrap();

        let updated = store
            .update(
                officer.officer_id,
                OfficerUpdate {
                    designation: Some("Assistant Engineer".to_string()),
                    email: Some("kumar@example.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.designation, "Assistant Engineer");
        assert_eq!(updated.phone, "+919800000001");
        assert_eq!(updated.tenant_id, officer.tenant_id);
    }
}
