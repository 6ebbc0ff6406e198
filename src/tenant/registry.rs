//! Tenant registry — authoritative record of tenants and routing bindings
//!
//! Every node holds a TenantRegistry. It owns two maps: tenant records by
//! id, and the routing-key table that decides which tenant an inbound call
//! belongs to. At most one active tenant may hold a routing key; the
//! binding table is the single place that uniqueness is enforced.
//!
//! ## Thread Safety
//!
//! DashMap for lock-free concurrent reads on the call-resolution path.
//! Routing-key reservation goes through the entry API so two concurrent
//! provisioning runs for the same number cannot both win.

use bson::doc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::ConfigCache;
use crate::db::mongo::MongoCollection;
use crate::db::schemas::{ProvisioningState, TenantConfig, TenantDoc};
use crate::types::{NivaranError, Result};

/// Registry of tenants and routing-key bindings
pub struct TenantRegistry {
    /// tenant_id → tenant record
    tenants: DashMap<Uuid, TenantDoc>,
    /// routing_key → owning tenant (includes retiring keys during a
    /// dual-route window)
    routing: DashMap<String, Uuid>,
    /// MongoDB collection for persistent backing (None = memory-only)
    db: Option<MongoCollection<TenantDoc>>,
    /// Config cache to evict on tenant mutation
    cache: Arc<ConfigCache>,
}

impl TenantRegistry {
    /// Create a new registry with optional MongoDB backing
    pub async fn new(db: Option<MongoCollection<TenantDoc>>, cache: Arc<ConfigCache>) -> Self {
        let registry = Self {
            tenants: DashMap::new(),
            routing: DashMap::new(),
            db,
            cache,
        };

        if registry.db.is_some() {
            if let Err(e) = registry.load_from_db().await {
                warn!("Failed to load tenant registry from MongoDB: {}", e);
            }
        }

        registry
    }

    /// Load tenant records and rebuild the routing table
    pub async fn load_from_db(&self) -> Result<()> {
        let Some(ref collection) = self.db else {
            return Ok(());
        };

        let docs = collection.find_many(doc! {}).await?;
        let count = docs.len();

        for tenant in docs {
            self.routing
                .insert(tenant.routing_key.clone(), tenant.tenant_id);
            if let Some(ref retiring) = tenant.retiring_routing_key {
                self.routing.insert(retiring.clone(), tenant.tenant_id);
            }
            self.tenants.insert(tenant.tenant_id, tenant);
        }

        if count > 0 {
            info!("Loaded {} tenants from MongoDB", count);
        }

        Ok(())
    }

    /// Reserve a routing key for a tenant.
    ///
    /// Idempotent for the same tenant (saga retry); a key held by any
    /// other tenant is a conflict.
    pub fn reserve_routing_key(&self, routing_key: &str, tenant_id: Uuid) -> Result<()> {
        match self.routing.entry(routing_key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(tenant_id);
                info!(routing_key = %routing_key, tenant = %tenant_id, "Routing key reserved");
                Ok(())
            }
            Entry::Occupied(existing) if *existing.get() == tenant_id => Ok(()),
            Entry::Occupied(_) => Err(NivaranError::conflict(format!(
                "routing key {} is already held by another tenant",
                routing_key
            ))),
        }
    }

    /// Release a routing key held by a tenant (compensation, deactivate,
    /// reroute retirement). Releasing a key the tenant does not hold is a
    /// no-op.
    pub fn release_routing_key(&self, routing_key: &str, tenant_id: Uuid) {
        let removed = self
            .routing
            .remove_if(routing_key, |_, owner| *owner == tenant_id);
        if removed.is_some() {
            self.cache.invalidate(routing_key);
            info!(routing_key = %routing_key, tenant = %tenant_id, "Routing key released");
        }
    }

    /// Insert or replace a tenant record and persist it
    pub async fn upsert_tenant(&self, tenant: TenantDoc) -> Result<()> {
        self.persist(&tenant).await?;
        self.tenants.insert(tenant.tenant_id, tenant);
        Ok(())
    }

    /// Get a tenant record by id
    pub fn get(&self, tenant_id: Uuid) -> Option<TenantDoc> {
        self.tenants.get(&tenant_id).map(|t| t.clone())
    }

    /// List all tenant records
    pub fn list(&self) -> Vec<TenantDoc> {
        self.tenants.iter().map(|t| t.value().clone()).collect()
    }

    /// Resolve a routing key to its active tenant and config snapshot.
    ///
    /// Inactive and unknown tenants resolve to None; a dialed number must
    /// never reach a tenant that is not live.
    pub fn resolve_active(&self, routing_key: &str) -> Option<(Uuid, TenantConfig)> {
        let tenant_id = *self.routing.get(routing_key)?;
        let tenant = self.tenants.get(&tenant_id)?;
        if !tenant.is_active {
            return None;
        }
        Some((tenant_id, tenant.config()))
    }

    /// Record saga progress for a tenant
    pub async fn set_provisioning(&self, tenant_id: Uuid, state: ProvisioningState) -> Result<()> {
        let mut tenant = self
            .tenants
            .get_mut(&tenant_id)
            .ok_or_else(|| NivaranError::not_found(format!("tenant {}", tenant_id)))?;
        tenant.provisioning = state;
        let snapshot = tenant.clone();
        drop(tenant);

        self.persist(&snapshot).await
    }

    /// Mark a tenant live for call routing
    pub async fn activate(&self, tenant_id: Uuid) -> Result<TenantDoc> {
        let mut tenant = self
            .tenants
            .get_mut(&tenant_id)
            .ok_or_else(|| NivaranError::not_found(format!("tenant {}", tenant_id)))?;
        tenant.is_active = true;
        tenant.provisioning = ProvisioningState::Active;
        let snapshot = tenant.clone();
        drop(tenant);

        self.persist(&snapshot).await?;
        info!(tenant = %tenant_id, routing_key = %snapshot.routing_key, "Tenant activated");
        Ok(snapshot)
    }

    /// Replace a tenant's runtime configuration.
    ///
    /// Write-then-invalidate: the record is updated and persisted first,
    /// then the cache entry is evicted so the next call-resolution reads
    /// the new snapshot whole.
    pub async fn update_config(&self, tenant_id: Uuid, config: TenantConfig) -> Result<TenantDoc> {
        config.validate().map_err(NivaranError::Validation)?;

        let mut tenant = self
            .tenants
            .get_mut(&tenant_id)
            .ok_or_else(|| NivaranError::not_found(format!("tenant {}", tenant_id)))?;
        tenant.name = config.name;
        tenant.constituency = config.constituency;
        tenant.languages = config.languages;
        tenant.greeting = config.greeting;
        tenant.escalation_hours = config.escalation_hours;
        let snapshot = tenant.clone();
        drop(tenant);

        self.persist(&snapshot).await?;
        self.cache.invalidate(&snapshot.routing_key);
        if let Some(ref retiring) = snapshot.retiring_routing_key {
            self.cache.invalidate(retiring);
        }

        info!(tenant = %tenant_id, "Tenant config updated");
        Ok(snapshot)
    }

    /// Take a tenant out of service: release its routing keys and evict
    /// its cache entries. The record itself is kept for audit.
    pub async fn deactivate(&self, tenant_id: Uuid) -> Result<TenantDoc> {
        let mut tenant = self
            .tenants
            .get_mut(&tenant_id)
            .ok_or_else(|| NivaranError::not_found(format!("tenant {}", tenant_id)))?;
        tenant.is_active = false;
        let snapshot = tenant.clone();
        drop(tenant);

        self.release_routing_key(&snapshot.routing_key, tenant_id);
        if let Some(ref retiring) = snapshot.retiring_routing_key {
            self.release_routing_key(retiring, tenant_id);
        }

        self.persist(&snapshot).await?;
        info!(tenant = %tenant_id, "Tenant deactivated");
        Ok(snapshot)
    }

    /// Begin a two-phase re-route: bind the new key while the old one
    /// keeps routing (dual-route window). At most one window may be open
    /// per tenant; a stacked re-route would orphan the earlier retiring
    /// key in the routing table.
    pub async fn begin_reroute(&self, tenant_id: Uuid, new_key: &str) -> Result<TenantDoc> {
        let mut tenant = self
            .tenants
            .get_mut(&tenant_id)
            .ok_or_else(|| NivaranError::not_found(format!("tenant {}", tenant_id)))?;
        if tenant.routing_key == new_key {
            return Err(NivaranError::validation(
                "new routing key matches the current one",
            ));
        }
        if tenant.retiring_routing_key.is_some() {
            return Err(NivaranError::conflict(
                "a re-route is already in progress; finish it first",
            ));
        }
        self.reserve_routing_key(new_key, tenant_id)?;
        tenant.retiring_routing_key = Some(tenant.routing_key.clone());
        tenant.routing_key = new_key.to_string();
        let snapshot = tenant.clone();
        drop(tenant);

        self.persist(&snapshot).await?;
        // Both keys route during the window; evict so lookups repopulate
        self.cache.invalidate(new_key);
        if let Some(ref retiring) = snapshot.retiring_routing_key {
            self.cache.invalidate(retiring);
        }

        info!(tenant = %tenant_id, new_key = %new_key, "Re-route started, dual-route window open");
        Ok(snapshot)
    }

    /// Roll back a just-opened re-route: the old key becomes primary
    /// again and the new one is released. Used when the trunk rejects
    /// the new binding.
    pub async fn abort_reroute(&self, tenant_id: Uuid) -> Result<TenantDoc> {
        let mut tenant = self
            .tenants
            .get_mut(&tenant_id)
            .ok_or_else(|| NivaranError::not_found(format!("tenant {}", tenant_id)))?;
        let Some(old_key) = tenant.retiring_routing_key.take() else {
            return Err(NivaranError::validation("no re-route in progress"));
        };
        let new_key = std::mem::replace(&mut tenant.routing_key, old_key);
        let snapshot = tenant.clone();
        drop(tenant);

        self.release_routing_key(&new_key, tenant_id);
        self.persist(&snapshot).await?;

        info!(tenant = %tenant_id, abandoned_key = %new_key, "Re-route aborted");
        Ok(snapshot)
    }

    /// Close the dual-route window: stop routing the retiring key
    pub async fn finish_reroute(&self, tenant_id: Uuid) -> Result<TenantDoc> {
        let mut tenant = self
            .tenants
            .get_mut(&tenant_id)
            .ok_or_else(|| NivaranError::not_found(format!("tenant {}", tenant_id)))?;
        let Some(retiring) = tenant.retiring_routing_key.take() else {
            return Err(NivaranError::validation("no re-route in progress"));
        };
        let snapshot = tenant.clone();
        drop(tenant);

        self.release_routing_key(&retiring, tenant_id);
        self.persist(&snapshot).await?;

        info!(tenant = %tenant_id, retired_key = %retiring, "Re-route finished");
        Ok(snapshot)
    }

    /// Number of registered tenants
    pub fn tenant_count(&self) -> usize {
        self.tenants.len()
    }

    /// Number of live routing bindings
    pub fn routing_count(&self) -> usize {
        self.routing.len()
    }

    /// Persist a tenant record if MongoDB is available
    async fn persist(&self, tenant: &TenantDoc) -> Result<()> {
        if let Some(ref collection) = self.db {
            collection
                .upsert_one(
                    doc! { "tenant_id": tenant.tenant_id.to_string() },
                    tenant.clone(),
                )
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn registry() -> TenantRegistry {
        TenantRegistry::new(None, Arc::new(ConfigCache::new())).await
    }

    fn tenant(routing_key: &str, constituency: &str) -> TenantDoc {
        TenantDoc::new(
            routing_key.to_string(),
            "Rajesh Kumar".to_string(),
            constituency.to_string(),
            "rajesh@example.com".to_string(),
            vec!["tamil".to_string(), "english".to_string()],
            None,
        )
    }

    #[tokio::test]
    async fn test_reserve_is_idempotent_per_tenant() {
        let registry = registry().await;
        let id = Uuid::new_v4();

        registry.reserve_routing_key("+914423456789", id).unwrap();
        registry.reserve_routing_key("+914423456789", id).unwrap();
        assert_eq!(registry.routing_count(), 1);

        let err = registry
            .reserve_routing_key("+914423456789", Uuid::new_v4())
            .unwrap_err();
        assert!(matches!(err, NivaranError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_resolve_requires_active() {
        let registry = registry().await;
        let t = tenant("+914423456789", "Chennai South");
        let id = t.tenant_id;

        registry.reserve_routing_key("+914423456789", id).unwrap();
        registry.upsert_tenant(t).await.unwrap();

        // Pending tenant does not route
        assert!(registry.resolve_active("+914423456789").is_none());

        registry.activate(id).await.unwrap();
        let (resolved, config) = registry.resolve_active("+914423456789").unwrap();
        assert_eq!(resolved, id);
        assert_eq!(config.constituency, "Chennai South");
    }

    #[tokio::test]
    async fn test_deactivate_releases_routing_key() {
        let registry = registry().await;
        let t = tenant("+914423456789", "Chennai South");
        let id = t.tenant_id;

        registry.reserve_routing_key("+914423456789", id).unwrap();
        registry.upsert_tenant(t).await.unwrap();
        registry.activate(id).await.unwrap();

        registry.deactivate(id).await.unwrap();
        assert!(registry.resolve_active("+914423456789").is_none());
        assert_eq!(registry.routing_count(), 0);

        // The released key can be claimed by a new tenant
        registry
            .reserve_routing_key("+914423456789", Uuid::new_v4())
            .unwrap();
    }

    #[tokio::test]
    async fn test_reroute_dual_window_then_retire() {
        let registry = registry().await;
        let t = tenant("+914411111111", "Chennai South");
        let id = t.tenant_id;

        registry.reserve_routing_key("+914411111111", id).unwrap();
        registry.upsert_tenant(t).await.unwrap();
        registry.activate(id).await.unwrap();

        registry.begin_reroute(id, "+914422222222").await.unwrap();

        // Both numbers reach the tenant during the window
        assert_eq!(registry.resolve_active("+914411111111").unwrap().0, id);
        assert_eq!(registry.resolve_active("+914422222222").unwrap().0, id);

        registry.finish_reroute(id).await.unwrap();
        assert!(registry.resolve_active("+914411111111").is_none());
        assert_eq!(registry.resolve_active("+914422222222").unwrap().0, id);
    }

    #[tokio::test]
    async fn test_stacked_reroute_rejected_until_finished() {
        let registry = registry().await;
        let t = tenant("+914411111111", "Chennai South");
        let id = t.tenant_id;

        registry.reserve_routing_key("+914411111111", id).unwrap();
        registry.upsert_tenant(t).await.unwrap();
        registry.activate(id).await.unwrap();

        registry.begin_reroute(id, "+914422222222").await.unwrap();
        let err = registry
            .begin_reroute(id, "+914433333333")
            .await
            .unwrap_err();
        assert!(matches!(err, NivaranError::Conflict(_)));

        // The rejected key was never reserved, and the open window is intact
        assert!(registry.resolve_active("+914433333333").is_none());
        assert_eq!(registry.resolve_active("+914411111111").unwrap().0, id);
        assert_eq!(registry.routing_count(), 2);

        // Once finished, the retiring key is released and a new window opens
        registry.finish_reroute(id).await.unwrap();
        assert!(registry.resolve_active("+914411111111").is_none());
        registry.begin_reroute(id, "+914433333333").await.unwrap();
        assert_eq!(registry.resolve_active("+914433333333").unwrap().0, id);
    }

    #[tokio::test]
    async fn test_abort_reroute_restores_old_key() {
        let registry = registry().await;
        let t = tenant("+914411111111", "Chennai South");
        let id = t.tenant_id;

        registry.reserve_routing_key("+914411111111", id).unwrap();
        registry.upsert_tenant(t).await.unwrap();
        registry.activate(id).await.unwrap();

        registry.begin_reroute(id, "+914422222222").await.unwrap();
        let restored = registry.abort_reroute(id).await.unwrap();

        assert_eq!(restored.routing_key, "+914411111111");
        assert!(restored.retiring_routing_key.is_none());
        assert_eq!(registry.resolve_active("+914411111111").unwrap().0, id);
        assert!(registry.resolve_active("+914422222222").is_none());
        assert_eq!(registry.routing_count(), 1);

        // The abandoned key is free for someone else
        registry
            .reserve_routing_key("+914422222222", Uuid::new_v4())
            .unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_reservation_single_winner() {
        let registry = Arc::new(registry().await);

        let mut handles = Vec::new();
        for _ in 0..20 {
            let reg = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                reg.reserve_routing_key("+914423456789", Uuid::new_v4())
                    .is_ok()
            }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }

        assert_eq!(wins, 1);
        assert_eq!(registry.routing_count(), 1);
    }

    #[tokio::test]
    async fn test_update_config_replaces_whole_record() {
        let registry = registry().await;
        let t = tenant("+914423456789", "Chennai South");
        let id = t.tenant_id;

        registry.reserve_routing_key("+914423456789", id).unwrap();
        registry.upsert_tenant(t).await.unwrap();
        registry.activate(id).await.unwrap();

        let mut config = registry.get(id).unwrap().config();
        config.escalation_hours = 24;
        config.greeting = "Hello".to_string();
        registry.update_config(id, config).await.unwrap();

        let (_, resolved) = registry.resolve_active("+914423456789").unwrap();
        assert_eq!(resolved.escalation_hours, 24);
        assert_eq!(resolved.greeting, "Hello");

        // Invalid replacement is rejected whole
        let mut bad = registry.get(id).unwrap().config();
        bad.languages.clear();
        assert!(matches!(
            registry.update_config(id, bad).await,
            Err(NivaranError::Validation(_))
        ));
    }
}
