//! Tenant-scoped storage
//!
//! Every tenant's complaints, officers, jobs and call logs live behind a
//! `TenantPartition` handle obtained by tenant id. All reads and writes
//! go through a partition, so a query can never see another tenant's
//! rows. Dashboard endpoints that carry only an entity id reach the
//! owning partition through global id→tenant indexes; the indexes hand
//! back a partition handle, they never bypass one.

pub mod calls;
pub mod complaints;
pub mod jobs;
pub mod officers;

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::mongo::MongoCollection;
use crate::db::schemas::{CallLogDoc, ComplaintDoc, JobDoc, OfficerDoc};
use crate::types::{NivaranError, Result};

pub use calls::CallStore;
pub use complaints::{
    ComplaintQuery, ComplaintStats, ComplaintStore, NewComplaint, SortDirection, SortField,
};
pub use jobs::JobStore;
pub use officers::{OfficerStore, OfficerUpdate};

/// Shared MongoDB collections backing all partitions (None = memory-only)
#[derive(Clone)]
pub struct StoreBacking {
    pub complaints: MongoCollection<ComplaintDoc>,
    pub officers: MongoCollection<OfficerDoc>,
    pub jobs: MongoCollection<JobDoc>,
    pub calls: MongoCollection<CallLogDoc>,
}

/// Global id→owning-tenant indexes shared by all partitions
#[derive(Clone, Default)]
pub(crate) struct OwnerIndexes {
    pub complaints: Arc<DashMap<Uuid, Uuid>>,
    pub officers: Arc<DashMap<Uuid, Uuid>>,
    pub jobs: Arc<DashMap<Uuid, Uuid>>,
    pub calls: Arc<DashMap<Uuid, Uuid>>,
}

/// One tenant's isolated stores
pub struct TenantPartition {
    pub tenant_id: Uuid,
    pub complaints: ComplaintStore,
    pub officers: OfficerStore,
    pub jobs: JobStore,
    pub calls: CallStore,
}

impl TenantPartition {
    fn new(tenant_id: Uuid, backing: Option<&StoreBacking>, indexes: &OwnerIndexes) -> Self {
        Self {
            tenant_id,
            complaints: ComplaintStore::new(
                tenant_id,
                backing.map(|b| b.complaints.clone()),
                Arc::clone(&indexes.complaints),
            ),
            officers: OfficerStore::new(
                tenant_id,
                backing.map(|b| b.officers.clone()),
                Arc::clone(&indexes.officers),
            ),
            jobs: JobStore::new(
                tenant_id,
                backing.map(|b| b.jobs.clone()),
                Arc::clone(&indexes.jobs),
            ),
            calls: CallStore::new(
                tenant_id,
                backing.map(|b| b.calls.clone()),
                Arc::clone(&indexes.calls),
            ),
        }
    }
}

/// Registry of tenant partitions
pub struct PartitionMap {
    partitions: DashMap<Uuid, Arc<TenantPartition>>,
    indexes: OwnerIndexes,
    backing: Option<StoreBacking>,
}

impl PartitionMap {
    /// Memory-only partition map (dev mode, tests)
    pub fn new() -> Self {
        Self {
            partitions: DashMap::new(),
            indexes: OwnerIndexes::default(),
            backing: None,
        }
    }

    /// Partition map with shared MongoDB backing
    pub fn with_backing(backing: StoreBacking) -> Self {
        Self {
            partitions: DashMap::new(),
            indexes: OwnerIndexes::default(),
            backing: Some(backing),
        }
    }

    /// Create a tenant's partition (create-if-absent)
    pub fn create_partition(&self, tenant_id: Uuid) -> Arc<TenantPartition> {
        self.partitions
            .entry(tenant_id)
            .or_insert_with(|| {
                info!(tenant = %tenant_id, "Partition created");
                Arc::new(TenantPartition::new(
                    tenant_id,
                    self.backing.as_ref(),
                    &self.indexes,
                ))
            })
            .clone()
    }

    /// Drop a tenant's partition (provisioning compensation).
    ///
    /// Clears the tenant's entries from the global indexes so stale ids
    /// cannot resolve to a removed partition.
    pub fn remove_partition(&self, tenant_id: Uuid) {
        if self.partitions.remove(&tenant_id).is_some() {
            self.indexes.complaints.retain(|_, owner| *owner != tenant_id);
            self.indexes.officers.retain(|_, owner| *owner != tenant_id);
            self.indexes.jobs.retain(|_, owner| *owner != tenant_id);
            self.indexes.calls.retain(|_, owner| *owner != tenant_id);
            info!(tenant = %tenant_id, "Partition removed");
        }
    }

    /// Get a tenant's partition handle
    pub fn get(&self, tenant_id: Uuid) -> Option<Arc<TenantPartition>> {
        self.partitions.get(&tenant_id).map(|p| p.clone())
    }

    /// Get a tenant's partition handle, erroring on unknown tenants
    pub fn partition(&self, tenant_id: Uuid) -> Result<Arc<TenantPartition>> {
        self.get(tenant_id)
            .ok_or_else(|| NivaranError::not_found(format!("tenant {}", tenant_id)))
    }

    /// Resolve a complaint id to its owning partition
    pub fn partition_for_complaint(&self, complaint_id: Uuid) -> Result<Arc<TenantPartition>> {
        let tenant_id = self
            .indexes
            .complaints
            .get(&complaint_id)
            .map(|t| *t)
            .ok_or_else(|| NivaranError::not_found(format!("complaint {}", complaint_id)))?;
        self.partition(tenant_id)
    }

    /// Resolve a job id to its owning partition
    pub fn partition_for_job(&self, job_id: Uuid) -> Result<Arc<TenantPartition>> {
        let tenant_id = self
            .indexes
            .jobs
            .get(&job_id)
            .map(|t| *t)
            .ok_or_else(|| NivaranError::not_found(format!("job {}", job_id)))?;
        self.partition(tenant_id)
    }

    /// Resolve an officer id to its owning partition
    pub fn partition_for_officer(&self, officer_id: Uuid) -> Result<Arc<TenantPartition>> {
        let tenant_id = self
            .indexes
            .officers
            .get(&officer_id)
            .map(|t| *t)
            .ok_or_else(|| NivaranError::not_found(format!("officer {}", officer_id)))?;
        self.partition(tenant_id)
    }

    /// Resolve a call id to its owning partition
    pub fn partition_for_call(&self, call_id: Uuid) -> Result<Arc<TenantPartition>> {
        let tenant_id = self
            .indexes
            .calls
            .get(&call_id)
            .map(|t| *t)
            .ok_or_else(|| NivaranError::not_found(format!("call {}", call_id)))?;
        self.partition(tenant_id)
    }

    /// Iterate over all partitions (deadline monitor)
    pub fn partitions(&self) -> Vec<Arc<TenantPartition>> {
        self.partitions.iter().map(|p| p.value().clone()).collect()
    }

    /// Number of live partitions
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Rebuild partitions and indexes from MongoDB
    pub async fn load_from_db(&self) -> Result<()> {
        let Some(ref backing) = self.backing else {
            return Ok(());
        };

        let mut loaded = 0usize;

        for complaint in backing.complaints.find_many(bson::doc! {}).await? {
            let partition = self.create_partition(complaint.tenant_id);
            partition.complaints.restore(complaint);
            loaded += 1;
        }
        for officer in backing.officers.find_many(bson::doc! {}).await? {
            let partition = self.create_partition(officer.tenant_id);
            partition.officers.restore(officer);
            loaded += 1;
        }
        for job in backing.jobs.find_many(bson::doc! {}).await? {
            let partition = self.create_partition(job.tenant_id);
            partition.jobs.restore(job);
            loaded += 1;
        }
        for call in backing.calls.find_many(bson::doc! {}).await? {
            if let Some(tenant_id) = call.tenant_id {
                let partition = self.create_partition(tenant_id);
                partition.calls.restore(call);
                loaded += 1;
            }
        }

        if loaded > 0 {
            info!(
                "Loaded {} documents into {} partitions from MongoDB",
                loaded,
                self.partition_count()
            );
        }

        Ok(())
    }
}

impl Default for PartitionMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Log a persistence failure without failing the in-memory write.
///
/// Engines are authoritative in memory; a missed upsert is re-written on
/// the next mutation of the same document.
pub(crate) fn log_persist_failure(entity: &str, err: &NivaranError) {
    warn!("Failed to persist {}: {}", entity, err);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_partition_is_idempotent() {
        let map = PartitionMap::new();
        let tenant = Uuid::new_v4();

        let first = map.create_partition(tenant);
        let second = map.create_partition(tenant);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(map.partition_count(), 1);
    }

    #[test]
    fn test_remove_partition() {
        let map = PartitionMap::new();
        let tenant = Uuid::new_v4();

        map.create_partition(tenant);
        map.remove_partition(tenant);
        assert!(map.get(tenant).is_none());
        assert!(map.partition(tenant).is_err());
    }

    #[test]
    fn test_unknown_ids_are_not_found() {
        let map = PartitionMap::new();
        assert!(matches!(
            map.partition_for_complaint(Uuid::new_v4()),
            Err(NivaranError::NotFound(_))
        ));
        assert!(matches!(
            map.partition_for_job(Uuid::new_v4()),
            Err(NivaranError::NotFound(_))
        ));
    }
}
