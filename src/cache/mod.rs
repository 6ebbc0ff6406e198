//! Tenant config cache
//!
//! Read-through cache on the inbound-call hot path, keyed by routing key.
//! Entries are whole `TenantConfig` snapshots: writers replace or evict an
//! entry, never patch fields, so a reader can never observe a half-updated
//! configuration.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use uuid::Uuid;

use crate::db::schemas::TenantConfig;

/// A cached routing entry: the owning tenant plus its config snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct CachedConfig {
    pub tenant_id: Uuid,
    pub config: TenantConfig,
}

/// In-memory config cache keyed by routing key
#[derive(Default)]
pub struct ConfigCache {
    entries: DashMap<String, CachedConfig>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a routing key, counting the hit or miss
    pub fn get(&self, routing_key: &str) -> Option<CachedConfig> {
        match self.entries.get(routing_key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a whole config snapshot for a routing key
    pub fn put(&self, routing_key: &str, tenant_id: Uuid, config: TenantConfig) {
        self.entries
            .insert(routing_key.to_string(), CachedConfig { tenant_id, config });
        debug!(routing_key = %routing_key, tenant = %tenant_id, "Config cached");
    }

    /// Drop the entry for a routing key; the next lookup repopulates from
    /// the registry
    pub fn invalidate(&self, routing_key: &str) {
        if self.entries.remove(routing_key).is_some() {
            debug!(routing_key = %routing_key, "Config cache entry evicted");
        }
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lifetime hit/miss counters
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}
