//! Tenant Provisioner — orchestrates tenant onboarding
//!
//! When an admin registers a tenant, the provisioner runs the onboarding
//! steps in a fixed order:
//! 1. Reserve the routing key
//! 2. Create the tenant's data partition
//! 3. Register the number with the telephony trunk
//! 4. Publish the config snapshot to the cache
//! 5. Issue dashboard credentials
//! 6. Send the welcome notification (best-effort)
//! 7. Activate the tenant for call routing
//!
//! Forward actions are create-if-absent, so a crashed run can be retried
//! and resumes from the first incomplete step. When a step fails, the
//! completed steps are compensated in reverse order and the tenant is
//! left in a Failed state that a later retry can start over from.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use super::registry::TenantRegistry;
use crate::cache::ConfigCache;
use crate::db::schemas::{ProvisionStep, ProvisioningState, TenantDoc};
use crate::external::{CredentialIssuer, TrunkRegistrar};
use crate::notify::{EventBus, NotificationEvent};
use crate::store::PartitionMap;
use crate::types::{NivaranError, Result};

/// Default bound on each external call inside the saga
const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Admin-supplied tenant registration
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub routing_key: String,
    pub name: String,
    pub constituency: String,
    pub admin_email: String,
    pub languages: Vec<String>,
    pub greeting: Option<String>,
}

/// Orchestrates tenant onboarding against the registry, partition map,
/// cache, and external collaborators.
pub struct TenantProvisioner {
    registry: Arc<TenantRegistry>,
    partitions: Arc<PartitionMap>,
    cache: Arc<ConfigCache>,
    trunk: Arc<dyn TrunkRegistrar>,
    credentials: Arc<dyn CredentialIssuer>,
    events: Arc<EventBus>,
    step_timeout: Duration,
}

impl TenantProvisioner {
    pub fn new(
        registry: Arc<TenantRegistry>,
        partitions: Arc<PartitionMap>,
        cache: Arc<ConfigCache>,
        trunk: Arc<dyn TrunkRegistrar>,
        credentials: Arc<dyn CredentialIssuer>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            registry,
            partitions,
            cache,
            trunk,
            credentials,
            events,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    /// Override the per-step external call bound
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Provision a new tenant from an admin registration.
    ///
    /// The record is created pending and the saga runs to completion or
    /// to a compensated Failed state.
    pub async fn provision(&self, request: ProvisionRequest) -> Result<TenantDoc> {
        let tenant = TenantDoc::new(
            request.routing_key,
            request.name,
            request.constituency,
            request.admin_email,
            request.languages,
            request.greeting,
        );
        tenant.config().validate().map_err(NivaranError::Validation)?;
        if tenant.admin_email.trim().is_empty() || !tenant.admin_email.contains('@') {
            return Err(NivaranError::validation("admin_email must be a valid email"));
        }

        let tenant_id = tenant.tenant_id;
        self.registry.upsert_tenant(tenant).await?;

        info!(tenant = %tenant_id, "Provisioning started");
        self.run(tenant_id).await
    }

    /// Retry a pending or failed tenant.
    ///
    /// A run interrupted before compensation resumes from the first
    /// incomplete step; a compensated failure starts over from the top.
    /// Active tenants are not retried.
    pub async fn retry(&self, tenant_id: Uuid) -> Result<TenantDoc> {
        let tenant = self
            .registry
            .get(tenant_id)
            .ok_or_else(|| NivaranError::not_found(format!("tenant {}", tenant_id)))?;

        if tenant.provisioning == ProvisioningState::Active {
            return Err(NivaranError::conflict("tenant is already active"));
        }

        info!(tenant = %tenant_id, "Provisioning retry started");
        self.run(tenant_id).await
    }

    /// Tear down a tenant: deactivate it and undo its provisioned
    /// resources in reverse order.
    ///
    /// The data partition is deliberately not undone: filed complaints,
    /// jobs and call logs are audit history and outlive the tenant.
    /// Removing the partition belongs to saga compensation only, where
    /// no history exists yet.
    pub async fn deprovision(&self, tenant_id: Uuid) -> Result<TenantDoc> {
        let tenant = self.registry.deactivate(tenant_id).await?;

        let steps: Vec<ProvisionStep> = ProvisionStep::ORDER
            .into_iter()
            .filter(|s| *s != ProvisionStep::CreatePartition)
            .collect();
        self.compensate(&tenant, &steps).await;

        info!(tenant = %tenant_id, "Tenant deprovisioned");
        Ok(self
            .registry
            .get(tenant_id)
            .unwrap_or(tenant))
    }

    /// Open a dual-route window onto a new number.
    ///
    /// The registry reservation runs first so a key held by another
    /// tenant is rejected before the telephony layer is touched; the
    /// trunk is bound afterwards and the reservation rolled back if the
    /// bind fails.
    pub async fn begin_reroute(&self, tenant_id: Uuid, new_key: &str) -> Result<TenantDoc> {
        let tenant = self.registry.begin_reroute(tenant_id, new_key).await?;

        if let Err(e) = self
            .bounded_reroute(self.trunk.bind(new_key, tenant_id))
            .await
        {
            warn!(
                tenant = %tenant_id,
                new_key = %new_key,
                "Trunk bind failed, rolling back re-route: {}",
                e
            );
            if let Err(undo) = self.registry.abort_reroute(tenant_id).await {
                warn!(tenant = %tenant_id, "Re-route rollback failed: {}", undo);
            }
            return Err(e);
        }

        Ok(tenant)
    }

    /// Close the dual-route window and release the retired number from
    /// the trunk (best-effort; the registry already stopped routing it).
    pub async fn finish_reroute(&self, tenant_id: Uuid) -> Result<TenantDoc> {
        let retiring = self
            .registry
            .get(tenant_id)
            .and_then(|t| t.retiring_routing_key);

        let tenant = self.registry.finish_reroute(tenant_id).await?;

        if let Some(retired) = retiring {
            if let Err(e) = self.bounded_reroute(self.trunk.unbind(&retired)).await {
                warn!(
                    tenant = %tenant_id,
                    retired_key = %retired,
                    "Failed to unbind retired number: {}",
                    e
                );
            }
        }

        Ok(tenant)
    }

    /// Run the saga from the first incomplete step
    async fn run(&self, tenant_id: Uuid) -> Result<TenantDoc> {
        let tenant = self
            .registry
            .get(tenant_id)
            .ok_or_else(|| NivaranError::not_found(format!("tenant {}", tenant_id)))?;

        let mut completed = match &tenant.provisioning {
            ProvisioningState::Pending { completed } => completed.clone(),
            // Compensation already unwound the side effects
            ProvisioningState::Failed { .. } => Vec::new(),
            ProvisioningState::Active => return Ok(tenant),
        };

        for step in ProvisionStep::ORDER {
            if completed.contains(&step) {
                continue;
            }

            if let Err(e) = self.forward(&tenant, step).await {
                warn!(
                    tenant = %tenant_id,
                    step = %step,
                    "Provisioning step failed, compensating: {}",
                    e
                );
                self.compensate(&tenant, &completed).await;
                self.registry
                    .set_provisioning(
                        tenant_id,
                        ProvisioningState::Failed {
                            failed_step: step,
                            completed: Vec::new(),
                        },
                    )
                    .await?;
                return Err(e);
            }

            completed.push(step);
            // Activate records its own state; everything else checkpoints
            // progress so a crashed run resumes instead of re-executing
            if step != ProvisionStep::Activate {
                self.registry
                    .set_provisioning(
                        tenant_id,
                        ProvisioningState::Pending {
                            completed: completed.clone(),
                        },
                    )
                    .await?;
            }
        }

        let activated = self
            .registry
            .get(tenant_id)
            .ok_or_else(|| NivaranError::not_found(format!("tenant {}", tenant_id)))?;
        info!(
            tenant = %tenant_id,
            routing_key = %activated.routing_key,
            "Provisioning completed"
        );
        Ok(activated)
    }

    /// Execute one forward step
    async fn forward(&self, tenant: &TenantDoc, step: ProvisionStep) -> Result<()> {
        match step {
            ProvisionStep::ReserveRoutingKey => self
                .registry
                .reserve_routing_key(&tenant.routing_key, tenant.tenant_id),
            ProvisionStep::CreatePartition => {
                self.partitions.create_partition(tenant.tenant_id);
                Ok(())
            }
            ProvisionStep::RegisterTrunk => {
                self.bounded(step, self.trunk.bind(&tenant.routing_key, tenant.tenant_id))
                    .await
            }
            ProvisionStep::PublishConfig => {
                let config = tenant.config();
                config.validate().map_err(NivaranError::Validation)?;
                self.cache.put(&tenant.routing_key, tenant.tenant_id, config);
                Ok(())
            }
            ProvisionStep::IssueCredentials => {
                self.bounded(
                    step,
                    self.credentials
                        .create_dashboard_login(tenant.tenant_id, &tenant.admin_email),
                )
                .await
            }
            ProvisionStep::WelcomeNotification => {
                // Best-effort; an undelivered welcome never fails the saga
                self.events
                    .emit(NotificationEvent::TenantProvisioned {
                        tenant_id: tenant.tenant_id,
                        routing_key: tenant.routing_key.clone(),
                        contact: tenant.admin_email.clone(),
                        summary: format!(
                            "{} constituency office is ready on {}",
                            tenant.constituency, tenant.routing_key
                        ),
                    })
                    .await;
                Ok(())
            }
            ProvisionStep::Activate => self.registry.activate(tenant.tenant_id).await.map(|_| ()),
        }
    }

    /// Undo completed steps in reverse order.
    ///
    /// Compensation is best-effort: a failing undo is logged and the
    /// remaining steps still run, since each undo is independent and
    /// idempotent.
    async fn compensate(&self, tenant: &TenantDoc, completed: &[ProvisionStep]) {
        for step in completed.iter().rev() {
            let result = match step {
                ProvisionStep::ReserveRoutingKey => {
                    self.registry
                        .release_routing_key(&tenant.routing_key, tenant.tenant_id);
                    Ok(())
                }
                ProvisionStep::CreatePartition => {
                    self.partitions.remove_partition(tenant.tenant_id);
                    Ok(())
                }
                ProvisionStep::RegisterTrunk => self.trunk.unbind(&tenant.routing_key).await,
                ProvisionStep::PublishConfig => {
                    self.cache.invalidate(&tenant.routing_key);
                    Ok(())
                }
                ProvisionStep::IssueCredentials => {
                    self.credentials
                        .revoke_dashboard_login(tenant.tenant_id)
                        .await
                }
                // Nothing to undo for a sent notification or activation flag
                ProvisionStep::WelcomeNotification | ProvisionStep::Activate => Ok(()),
            };

            if let Err(e) = result {
                warn!(
                    tenant = %tenant.tenant_id,
                    step = %step,
                    "Compensation step failed: {}",
                    e
                );
            }
        }
    }

    /// Bound an external call by the step timeout
    async fn bounded(
        &self,
        step: ProvisionStep,
        fut: impl std::future::Future<Output = Result<()>>,
    ) -> Result<()> {
        match timeout(self.step_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(NivaranError::dependency(format!(
                "step {} timed out after {:?}",
                step, self.step_timeout
            ))),
        }
    }

    /// Bound a trunk call outside the saga by the same timeout
    async fn bounded_reroute(
        &self,
        fut: impl std::future::Future<Output = Result<()>>,
    ) -> Result<()> {
        match timeout(self.step_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(NivaranError::dependency(format!(
                "trunk call timed out after {:?}",
                self.step_timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::IssueType;
    use crate::external::{MemoryCredentialIssuer, MemoryTrunkRegistrar};
    use crate::store::NewComplaint;

    struct Fixture {
        registry: Arc<TenantRegistry>,
        partitions: Arc<PartitionMap>,
        cache: Arc<ConfigCache>,
        trunk: Arc<MemoryTrunkRegistrar>,
        credentials: Arc<MemoryCredentialIssuer>,
        events: Arc<EventBus>,
        provisioner: TenantProvisioner,
    }

    async fn fixture() -> Fixture {
        let cache = Arc::new(ConfigCache::new());
        let registry = Arc::new(TenantRegistry::new(None, Arc::clone(&cache)).await);
        let partitions = Arc::new(PartitionMap::new());
        let trunk = Arc::new(MemoryTrunkRegistrar::new());
        let credentials = Arc::new(MemoryCredentialIssuer::new());
        let events = Arc::new(EventBus::new(None));

        let provisioner = TenantProvisioner::new(
            Arc::clone(&registry),
            Arc::clone(&partitions),
            Arc::clone(&cache),
            trunk.clone() as Arc<dyn TrunkRegistrar>,
            credentials.clone() as Arc<dyn CredentialIssuer>,
            Arc::clone(&events),
        )
        .with_step_timeout(Duration::from_millis(500));

        Fixture {
            registry,
            partitions,
            cache,
            trunk,
            credentials,
            events,
            provisioner,
        }
    }

    fn request(routing_key: &str) -> ProvisionRequest {
        ProvisionRequest {
            routing_key: routing_key.to_string(),
            name: "Rajesh Kumar".to_string(),
            constituency: "Chennai South".to_string(),
            admin_email: "rajesh@example.com".to_string(),
            languages: vec!["tamil".to_string(), "english".to_string()],
            greeting: None,
        }
    }

    #[tokio::test]
    async fn test_successful_provision_activates_tenant() {
        let f = fixture().await;
        let mut rx = f.events.subscribe();

        let tenant = f.provisioner.provision(request("+914423456789")).await.unwrap();

        assert!(tenant.is_active);
        assert_eq!(tenant.provisioning, ProvisioningState::Active);
        assert_eq!(f.trunk.binding("+914423456789"), Some(tenant.tenant_id));
        assert!(f.credentials.has_login(tenant.tenant_id));
        assert!(f.partitions.get(tenant.tenant_id).is_some());
        assert!(f.cache.get("+914423456789").is_some());
        assert_eq!(
            f.registry.resolve_active("+914423456789").unwrap().0,
            tenant.tenant_id
        );

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), "tenant_provisioned");
    }

    #[tokio::test]
    async fn test_trunk_failure_compensates_earlier_steps() {
        let f = fixture().await;
        f.trunk.set_fail_bind(true);

        let err = f
            .provisioner
            .provision(request("+914423456789"))
            .await
            .unwrap_err();
        assert!(matches!(err, NivaranError::Dependency(_)));

        // Reservation and partition from steps 1-2 are rolled back
        assert_eq!(f.registry.routing_count(), 0);
        let tenant = &f.registry.list()[0];
        assert!(f.partitions.get(tenant.tenant_id).is_none());
        assert!(f.cache.get("+914423456789").is_none());
        assert!(matches!(
            tenant.provisioning,
            ProvisioningState::Failed {
                failed_step: ProvisionStep::RegisterTrunk,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_credential_failure_unwinds_trunk_and_cache() {
        let f = fixture().await;
        f.credentials.set_fail_issue(true);

        let err = f
            .provisioner
            .provision(request("+914423456789"))
            .await
            .unwrap_err();
        assert!(matches!(err, NivaranError::Dependency(_)));

        assert_eq!(f.trunk.binding("+914423456789"), None);
        assert!(f.cache.get("+914423456789").is_none());
        assert_eq!(f.registry.routing_count(), 0);
    }

    #[tokio::test]
    async fn test_retry_after_failure_succeeds() {
        let f = fixture().await;
        f.trunk.set_fail_bind(true);
        f.provisioner
            .provision(request("+914423456789"))
            .await
            .unwrap_err();

        let tenant_id = f.registry.list()[0].tenant_id;
        f.trunk.set_fail_bind(false);

        let tenant = f.provisioner.retry(tenant_id).await.unwrap();
        assert!(tenant.is_active);
        assert_eq!(f.trunk.binding("+914423456789"), Some(tenant_id));
        assert!(f.partitions.get(tenant_id).is_some());
    }

    #[tokio::test]
    async fn test_retry_resumes_from_first_incomplete_step() {
        let f = fixture().await;

        // Simulate a run that crashed after binding the trunk
        let tenant = TenantDoc::new(
            "+914423456789".to_string(),
            "Rajesh Kumar".to_string(),
            "Chennai South".to_string(),
            "rajesh@example.com".to_string(),
            vec!["tamil".to_string()],
            None,
        );
        let tenant_id = tenant.tenant_id;
        f.registry.upsert_tenant(tenant).await.unwrap();
        f.registry
            .reserve_routing_key("+914423456789", tenant_id)
            .unwrap();
        f.partitions.create_partition(tenant_id);
        f.trunk.bind("+914423456789", tenant_id).await.unwrap();
        f.registry
            .set_provisioning(
                tenant_id,
                ProvisioningState::Pending {
                    completed: vec![
                        ProvisionStep::ReserveRoutingKey,
                        ProvisionStep::CreatePartition,
                        ProvisionStep::RegisterTrunk,
                    ],
                },
            )
            .await
            .unwrap();

        // A bind failure now would only matter if the step re-ran
        f.trunk.set_fail_bind(true);

        let resumed = f.provisioner.retry(tenant_id).await.unwrap();
        assert!(resumed.is_active);
        assert!(f.credentials.has_login(tenant_id));
    }

    #[tokio::test]
    async fn test_duplicate_routing_key_conflicts() {
        let f = fixture().await;
        f.provisioner.provision(request("+914423456789")).await.unwrap();

        let err = f
            .provisioner
            .provision(request("+914423456789"))
            .await
            .unwrap_err();
        assert!(matches!(err, NivaranError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_retry_active_tenant_conflicts() {
        let f = fixture().await;
        let tenant = f.provisioner.provision(request("+914423456789")).await.unwrap();

        let err = f.provisioner.retry(tenant.tenant_id).await.unwrap_err();
        assert!(matches!(err, NivaranError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_deprovision_releases_routing_but_keeps_partition() {
        let f = fixture().await;
        let tenant = f.provisioner.provision(request("+914423456789")).await.unwrap();

        f.provisioner.deprovision(tenant.tenant_id).await.unwrap();

        assert_eq!(f.trunk.binding("+914423456789"), None);
        assert!(!f.credentials.has_login(tenant.tenant_id));
        assert!(f.registry.resolve_active("+914423456789").is_none());
        assert!(f.cache.get("+914423456789").is_none());
        // History stays reachable after teardown
        assert!(f.partitions.get(tenant.tenant_id).is_some());
    }

    #[tokio::test]
    async fn test_deprovision_keeps_complaint_history() {
        let f = fixture().await;
        let tenant = f.provisioner.provision(request("+914423456789")).await.unwrap();

        let partition = f.partitions.partition(tenant.tenant_id).unwrap();
        let complaint = partition
            .complaints
            .create(
                "CHE",
                NewComplaint {
                    citizen_name: "Meena".to_string(),
                    citizen_phone: "+919876543210".to_string(),
                    issue_type: IssueType::Water,
                    description: "No water supply for three days".to_string(),
                    location: None,
                    landmark: None,
                    audio_url: None,
                    transcript: None,
                },
            )
            .await
            .unwrap();

        f.provisioner.deprovision(tenant.tenant_id).await.unwrap();

        let partition = f
            .partitions
            .partition_for_complaint(complaint.complaint_id)
            .unwrap();
        let kept = partition.complaints.get(complaint.complaint_id).unwrap();
        assert_eq!(kept.complaint_number, complaint.complaint_number);
    }

    #[tokio::test]
    async fn test_reroute_onto_foreign_key_leaves_trunk_intact() {
        let f = fixture().await;
        let first = f.provisioner.provision(request("+914411111111")).await.unwrap();
        let second = f.provisioner.provision(request("+914422222222")).await.unwrap();

        let err = f
            .provisioner
            .begin_reroute(first.tenant_id, "+914422222222")
            .await
            .unwrap_err();
        assert!(matches!(err, NivaranError::Conflict(_)));

        // The other tenant's number still reaches them in the telephony layer
        assert_eq!(f.trunk.binding("+914422222222"), Some(second.tenant_id));
        assert_eq!(
            f.registry.resolve_active("+914422222222").unwrap().0,
            second.tenant_id
        );
    }

    #[tokio::test]
    async fn test_reroute_trunk_failure_rolls_back_reservation() {
        let f = fixture().await;
        let tenant = f.provisioner.provision(request("+914411111111")).await.unwrap();

        f.trunk.set_fail_bind(true);
        let err = f
            .provisioner
            .begin_reroute(tenant.tenant_id, "+914422222222")
            .await
            .unwrap_err();
        assert!(matches!(err, NivaranError::Dependency(_)));

        // Old number still primary, new key released, no window left open
        let record = f.registry.get(tenant.tenant_id).unwrap();
        assert_eq!(record.routing_key, "+914411111111");
        assert!(record.retiring_routing_key.is_none());
        assert!(f.registry.resolve_active("+914422222222").is_none());
        assert_eq!(f.registry.routing_count(), 1);

        // A later attempt succeeds once the trunk recovers
        f.trunk.set_fail_bind(false);
        f.provisioner
            .begin_reroute(tenant.tenant_id, "+914422222222")
            .await
            .unwrap();
        assert_eq!(f.trunk.binding("+914422222222"), Some(tenant.tenant_id));
    }

    #[tokio::test]
    async fn test_finish_reroute_unbinds_retired_number() {
        let f = fixture().await;
        let tenant = f.provisioner.provision(request("+914411111111")).await.unwrap();

        f.provisioner
            .begin_reroute(tenant.tenant_id, "+914422222222")
            .await
            .unwrap();
        assert_eq!(f.trunk.binding("+914411111111"), Some(tenant.tenant_id));
        assert_eq!(f.trunk.binding("+914422222222"), Some(tenant.tenant_id));

        f.provisioner.finish_reroute(tenant.tenant_id).await.unwrap();
        assert_eq!(f.trunk.binding("+914411111111"), None);
        assert_eq!(f.trunk.binding("+914422222222"), Some(tenant.tenant_id));
    }

    #[tokio::test]
    async fn test_invalid_request_rejected_before_any_step() {
        let f = fixture().await;
        let mut req = request("+914423456789");
        req.languages.clear();

        let err = f.provisioner.provision(req).await.unwrap_err();
        assert!(matches!(err, NivaranError::Validation(_)));
        assert_eq!(f.registry.routing_count(), 0);
    }
}
