//! Call Router — resolves a dialed number to its tenant
//!
//! Hot path of every inbound call. Lookups are read-through: the config
//! cache answers first, and on a miss the registry is consulted under a
//! short timeout and the cache repopulated. A number that resolves to no
//! active tenant (unknown, inactive, or fallback timeout) is a routing
//! miss; the caller hears the unavailable message and the call is still
//! logged.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::ConfigCache;
use crate::db::schemas::TenantConfig;
use crate::tenant::TenantRegistry;
use crate::types::{NivaranError, Result};

/// Default bound on the registry fallback
const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_millis(250);

/// A resolved inbound call: the owning tenant and its config snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRoute {
    pub tenant_id: Uuid,
    pub config: TenantConfig,
}

/// Routes inbound calls by dialed number
pub struct CallRouter {
    cache: Arc<ConfigCache>,
    registry: Arc<TenantRegistry>,
    resolve_timeout: Duration,
}

impl CallRouter {
    pub fn new(cache: Arc<ConfigCache>, registry: Arc<TenantRegistry>) -> Self {
        Self {
            cache,
            registry,
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
        }
    }

    /// Override the registry fallback bound
    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    /// Resolve a dialed number to its active tenant.
    ///
    /// A fallback that overruns the timeout degrades to a routing miss
    /// rather than holding the caller in silence.
    pub async fn resolve(&self, dialed: &str) -> Result<ResolvedRoute> {
        if let Some(cached) = self.cache.get(dialed) {
            debug!(dialed = %dialed, tenant = %cached.tenant_id, "Call resolved from cache");
            return Ok(ResolvedRoute {
                tenant_id: cached.tenant_id,
                config: cached.config,
            });
        }

        let registry = Arc::clone(&self.registry);
        let key = dialed.to_string();
        let fallback = timeout(self.resolve_timeout, async move {
            registry.resolve_active(&key)
        })
        .await;

        match fallback {
            Ok(Some((tenant_id, config))) => {
                self.cache.put(dialed, tenant_id, config.clone());
                debug!(dialed = %dialed, tenant = %tenant_id, "Call resolved from registry");
                Ok(ResolvedRoute { tenant_id, config })
            }
            Ok(None) => Err(NivaranError::not_found(format!(
                "no active tenant for {}",
                dialed
            ))),
            Err(_) => {
                warn!(dialed = %dialed, "Registry fallback timed out");
                Err(NivaranError::not_found(format!(
                    "no active tenant for {}",
                    dialed
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::TenantDoc;

    async fn setup() -> (Arc<ConfigCache>, Arc<TenantRegistry>, CallRouter) {
        let cache = Arc::new(ConfigCache::new());
        let registry = Arc::new(TenantRegistry::new(None, Arc::clone(&cache)).await);
        let router = CallRouter::new(Arc::clone(&cache), Arc::clone(&registry));
        (cache, registry, router)
    }

    async fn activate_tenant(registry: &TenantRegistry, routing_key: &str) -> Uuid {
        let tenant = TenantDoc::new(
            routing_key.to_string(),
            "Rajesh Kumar".to_string(),
            "Chennai South".to_string(),
            "rajesh@example.com".to_string(),
            vec!["tamil".to_string()],
            None,
        );
        let id = tenant.tenant_id;
        registry.reserve_routing_key(routing_key, id).unwrap();
        registry.upsert_tenant(tenant).await.unwrap();
        registry.activate(id).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_miss_falls_back_and_repopulates_cache() {
        let (cache, registry, router) = setup().await;
        let id = activate_tenant(&registry, "+914423456789").await;

        let route = router.resolve("+914423456789").await.unwrap();
        assert_eq!(route.tenant_id, id);
        assert_eq!(route.config.constituency, "Chennai South");

        // Second resolution is a cache hit
        router.resolve("+914423456789").await.unwrap();
        let (hits, misses) = cache.stats();
        assert_eq!(hits, 1);
        assert_eq!(misses, 1);
    }

    #[tokio::test]
    async fn test_unknown_number_is_not_found() {
        let (_, _, router) = setup().await;
        let err = router.resolve("+910000000000").await.unwrap_err();
        assert!(matches!(err, NivaranError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_inactive_tenant_does_not_route() {
        let (_, registry, router) = setup().await;
        let id = activate_tenant(&registry, "+914423456789").await;
        registry.deactivate(id).await.unwrap();

        let err = router.resolve("+914423456789").await.unwrap_err();
        assert!(matches!(err, NivaranError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stale_entry_evicted_on_config_update() {
        let (_, registry, router) = setup().await;
        let id = activate_tenant(&registry, "+914423456789").await;

        router.resolve("+914423456789").await.unwrap();

        let mut config = registry.get(id).unwrap().config();
        config.greeting = "Updated greeting".to_string();
        registry.update_config(id, config).await.unwrap();

        let route = router.resolve("+914423456789").await.unwrap();
        assert_eq!(route.config.greeting, "Updated greeting");
    }
}
