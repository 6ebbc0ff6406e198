//! External collaborator seams
//!
//! The telephony call-routing layer and the dashboard credential issuer
//! are independent backing systems. The provisioning saga talks to them
//! through these traits; HTTP implementations are used in production and
//! in-memory implementations in dev mode and tests (with scriptable
//! failure injection for compensation-path coverage).

use async_trait::async_trait;
use dashmap::DashMap;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::{NivaranError, Result};

/// Binds routing keys to tenants in the external call-routing layer
#[async_trait]
pub trait TrunkRegistrar: Send + Sync {
    /// Bind a number to a tenant (create-if-absent: rebinding the same
    /// number to the same tenant is a no-op)
    async fn bind(&self, number: &str, tenant_id: Uuid) -> Result<()>;

    /// Remove a number binding (absent binding is a no-op)
    async fn unbind(&self, number: &str) -> Result<()>;
}

/// Issues dashboard logins for tenant admins
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    /// Create (or confirm existing) dashboard credentials for a tenant
    /// admin; returns opaque success/failure
    async fn create_dashboard_login(&self, tenant_id: Uuid, admin_email: &str) -> Result<()>;

    /// Revoke a tenant's dashboard credentials
    async fn revoke_dashboard_login(&self, tenant_id: Uuid) -> Result<()>;
}

/// HTTP-backed trunk registrar
pub struct HttpTrunkRegistrar {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTrunkRegistrar {
    /// Create a registrar client with a bounded per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NivaranError::Config(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TrunkRegistrar for HttpTrunkRegistrar {
    async fn bind(&self, number: &str, tenant_id: Uuid) -> Result<()> {
        let url = format!("{}/bindings", self.base_url);
        let body = serde_json::json!({ "number": number, "tenant_id": tenant_id });

        let resp = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| NivaranError::dependency(format!("trunk bind failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(NivaranError::dependency(format!(
                "trunk bind returned {}",
                resp.status()
            )));
        }

        debug!(number = %number, tenant = %tenant_id, "Trunk binding registered");
        Ok(())
    }

    async fn unbind(&self, number: &str) -> Result<()> {
        let url = format!("{}/bindings/{}", self.base_url, number);

        let resp = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| NivaranError::dependency(format!("trunk unbind failed: {}", e)))?;

        // 404 means the binding is already gone; unbind is idempotent
        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(NivaranError::dependency(format!(
                "trunk unbind returned {}",
                resp.status()
            )));
        }

        Ok(())
    }
}

/// HTTP-backed credential issuer
pub struct HttpCredentialIssuer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCredentialIssuer {
    /// Create an issuer client with a bounded per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NivaranError::Config(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CredentialIssuer for HttpCredentialIssuer {
    async fn create_dashboard_login(&self, tenant_id: Uuid, admin_email: &str) -> Result<()> {
        let url = format!("{}/logins", self.base_url);
        let body = serde_json::json!({ "tenant_id": tenant_id, "email": admin_email });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| NivaranError::dependency(format!("credential issue failed: {}", e)))?;

        // 409 means the login already exists; issuance is create-if-absent
        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::CONFLICT {
            return Err(NivaranError::dependency(format!(
                "credential issuer returned {}",
                resp.status()
            )));
        }

        info!(tenant = %tenant_id, "Dashboard login issued");
        Ok(())
    }

    async fn revoke_dashboard_login(&self, tenant_id: Uuid) -> Result<()> {
        let url = format!("{}/logins/{}", self.base_url, tenant_id);

        let resp = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| NivaranError::dependency(format!("credential revoke failed: {}", e)))?;

        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(NivaranError::dependency(format!(
                "credential issuer returned {}",
                resp.status()
            )));
        }

        Ok(())
    }
}

/// In-memory trunk registrar for dev mode and tests
#[derive(Default)]
pub struct MemoryTrunkRegistrar {
    bindings: DashMap<String, Uuid>,
    fail_bind: AtomicBool,
    fail_unbind: AtomicBool,
}

impl MemoryTrunkRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next bind calls fail (compensation-path tests)
    pub fn set_fail_bind(&self, fail: bool) {
        self.fail_bind.store(fail, Ordering::SeqCst);
    }

    /// Make the next unbind calls fail
    pub fn set_fail_unbind(&self, fail: bool) {
        self.fail_unbind.store(fail, Ordering::SeqCst);
    }

    /// Current binding for a number
    pub fn binding(&self, number: &str) -> Option<Uuid> {
        self.bindings.get(number).map(|b| *b)
    }

    /// Number of live bindings
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }
}

#[async_trait]
impl TrunkRegistrar for MemoryTrunkRegistrar {
    async fn bind(&self, number: &str, tenant_id: Uuid) -> Result<()> {
        if self.fail_bind.load(Ordering::SeqCst) {
            return Err(NivaranError::dependency("trunk registrar unavailable"));
        }
        self.bindings.insert(number.to_string(), tenant_id);
        Ok(())
    }

    async fn unbind(&self, number: &str) -> Result<()> {
        if self.fail_unbind.load(Ordering::SeqCst) {
            return Err(NivaranError::dependency("trunk registrar unavailable"));
        }
        self.bindings.remove(number);
        Ok(())
    }
}

/// In-memory credential issuer for dev mode and tests
#[derive(Default)]
pub struct MemoryCredentialIssuer {
    logins: DashMap<Uuid, String>,
    fail_issue: AtomicBool,
}

impl MemoryCredentialIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next issue calls fail
    pub fn set_fail_issue(&self, fail: bool) {
        self.fail_issue.store(fail, Ordering::SeqCst);
    }

    /// Whether a login exists for a tenant
    pub fn has_login(&self, tenant_id: Uuid) -> bool {
        self.logins.contains_key(&tenant_id)
    }
}

#[async_trait]
impl CredentialIssuer for MemoryCredentialIssuer {
    async fn create_dashboard_login(&self, tenant_id: Uuid, _admin_email: &str) -> Result<()> {
        if self.fail_issue.load(Ordering::SeqCst) {
            return Err(NivaranError::dependency("credential issuer unavailable"));
        }
        // Create-if-absent: keep the existing password on retry
        self.logins
            .entry(tenant_id)
            .or_insert_with(generate_initial_password);
        Ok(())
    }

    async fn revoke_dashboard_login(&self, tenant_id: Uuid) -> Result<()> {
        self.logins.remove(&tenant_id);
        Ok(())
    }
}

/// Generate a random initial dashboard password
fn generate_initial_password() -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..16)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_registrar_bind_unbind() {
        let registrar = MemoryTrunkRegistrar::new();
        let tenant = Uuid::new_v4();

        registrar.bind("+914423456789", tenant).await.unwrap();
        assert_eq!(registrar.binding("+914423456789"), Some(tenant));

        // Rebinding the same number is idempotent
        registrar.bind("+914423456789", tenant).await.unwrap();
        assert_eq!(registrar.binding_count(), 1);

        registrar.unbind("+914423456789").await.unwrap();
        assert_eq!(registrar.binding("+914423456789"), None);

        // Unbinding an absent number is a no-op
        registrar.unbind("+914423456789").await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_registrar_failure_injection() {
        let registrar = MemoryTrunkRegistrar::new();
        registrar.set_fail_bind(true);

        let err = registrar.bind("+91", Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, NivaranError::Dependency(_)));
    }

    #[tokio::test]
    async fn test_memory_issuer_create_if_absent() {
        let issuer = MemoryCredentialIssuer::new();
        let tenant = Uuid::new_v4();

        issuer
            .create_dashboard_login(tenant, "a@example.com")
            .await
            .unwrap();
        let first = issuer.logins.get(&tenant).unwrap().clone();

        // Retry keeps the original password
        issuer
            .create_dashboard_login(tenant, "a@example.com")
            .await
            .unwrap();
        assert_eq!(*issuer.logins.get(&tenant).unwrap(), first);

        issuer.revoke_dashboard_login(tenant).await.unwrap();
        assert!(!issuer.has_login(tenant));
    }
}
