//! Complaint/Job Lifecycle Engine
//!
//! Enforces the complaint and job state machines over the tenant
//! partitions. Every guard is checked before any write, so a rejected
//! transition leaves nothing half-mutated. Job transitions for one job
//! serialize through the store's per-job lock, which closes the race
//! between an officer completing a job and a staff member reassigning it.
//!
//! Complaint: new → assigned → in_progress → completed → verified →
//! closed; reopen (verified/closed → assigned) happens only through a
//! new job assignment. Job: assigned → accepted → in_progress →
//! completed, with superseded as the reassignment terminal.

pub mod deadline;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::db::schemas::{ComplaintDoc, ComplaintStatus, JobDoc, JobStatus};
use crate::notify::{EventBus, NotificationEvent};
use crate::store::{NewComplaint, PartitionMap};
use crate::tenant::TenantRegistry;
use crate::types::{NivaranError, Result};

pub use deadline::DeadlineMonitor;

/// Drives complaint and job state over the partition map
pub struct LifecycleEngine {
    partitions: Arc<PartitionMap>,
    registry: Arc<TenantRegistry>,
    events: Arc<EventBus>,
}

impl LifecycleEngine {
    pub fn new(
        partitions: Arc<PartitionMap>,
        registry: Arc<TenantRegistry>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            partitions,
            registry,
            events,
        }
    }

    /// File a complaint for a tenant and emit `ComplaintCreated`
    pub async fn create_complaint(
        &self,
        tenant_id: Uuid,
        fields: NewComplaint,
    ) -> Result<ComplaintDoc> {
        let tenant = self
            .registry
            .get(tenant_id)
            .ok_or_else(|| NivaranError::not_found(format!("tenant {}", tenant_id)))?;
        let partition = self.partitions.partition(tenant_id)?;

        let prefix = tenant.config().number_prefix();
        let complaint = partition.complaints.create(&prefix, fields).await?;

        self.events
            .emit(NotificationEvent::ComplaintCreated {
                tenant_id,
                complaint_id: complaint.complaint_id,
                complaint_number: complaint.complaint_number.clone(),
                contact: complaint.citizen_phone.clone(),
                summary: format!(
                    "Complaint {} registered: {}",
                    complaint.complaint_number,
                    complaint.issue_type.as_str()
                ),
            })
            .await;

        Ok(complaint)
    }

    /// Assign a complaint to an officer.
    ///
    /// An open job on the complaint is superseded in the same operation;
    /// a verified or closed complaint is reopened. The officer must
    /// belong to the complaint's tenant.
    pub async fn assign_job(
        &self,
        complaint_id: Uuid,
        officer_id: Uuid,
        deadline: DateTime<Utc>,
        instructions: Option<String>,
    ) -> Result<JobDoc> {
        let partition = self.partitions.partition_for_complaint(complaint_id)?;
        let complaint = partition
            .complaints
            .get(complaint_id)
            .ok_or_else(|| NivaranError::not_found(format!("complaint {}", complaint_id)))?;

        let officer = match partition.officers.get(officer_id) {
            Some(officer) => officer,
            // Distinguish a cross-tenant officer from an unknown one
            None => {
                return if self.partitions.partition_for_officer(officer_id).is_ok() {
                    Err(NivaranError::conflict(
                        "officer belongs to a different tenant",
                    ))
                } else {
                    Err(NivaranError::not_found(format!("officer {}", officer_id)))
                };
            }
        };
        if !officer.is_active {
            return Err(NivaranError::validation(format!(
                "officer {} is deactivated",
                officer_id
            )));
        }
        if complaint.status == ComplaintStatus::Completed {
            return Err(NivaranError::conflict(
                "complaint is awaiting verification; verify or close before reassigning",
            ));
        }

        // Supersede the open job, if any, under its transition lock
        if let Some(open) = partition.jobs.non_terminal_for_complaint(complaint_id) {
            let lock = partition.jobs.transition_lock(open.job_id);
            let _guard = lock.lock().await;

            // Re-read: the job may have completed while we waited
            if let Some(mut current) = partition.jobs.get(open.job_id) {
                if !current.status.is_terminal() {
                    current.status = JobStatus::Superseded;
                    partition.jobs.save(current).await?;
                    info!(job = %open.job_id, complaint = %complaint_id, "Job superseded");
                }
            }
        }

        let job = JobDoc::new(
            partition.tenant_id,
            complaint_id,
            officer_id,
            deadline,
            instructions,
        );
        let job = partition.jobs.insert(job).await?;

        partition
            .complaints
            .set_status(complaint_id, ComplaintStatus::Assigned)
            .await?;

        info!(
            job = %job.job_id,
            complaint = %complaint_id,
            officer = %officer_id,
            deadline = %deadline,
            "Job assigned"
        );
        self.events
            .emit(NotificationEvent::JobAssigned {
                tenant_id: partition.tenant_id,
                job_id: job.job_id,
                complaint_id,
                officer_id,
                contact: officer.phone.clone(),
                deadline,
                summary: format!(
                    "Complaint {} assigned to {}",
                    complaint.complaint_number, officer.name
                ),
            })
            .await;

        Ok(job)
    }

    /// Officer acknowledges the assignment
    pub async fn accept_job(&self, job_id: Uuid) -> Result<JobDoc> {
        let partition = self.partitions.partition_for_job(job_id)?;
        let lock = partition.jobs.transition_lock(job_id);
        let _guard = lock.lock().await;

        let mut job = partition
            .jobs
            .get(job_id)
            .ok_or_else(|| NivaranError::not_found(format!("job {}", job_id)))?;
        if job.status != JobStatus::Assigned {
            return Err(NivaranError::conflict(format!(
                "cannot accept a job in status {}",
                job.status.as_str()
            )));
        }

        job.status = JobStatus::Accepted;
        let job = partition.jobs.save(job).await?;
        self.advance_to_in_progress(&partition, job.complaint_id).await?;
        Ok(job)
    }

    /// Officer starts the work
    pub async fn start_job(&self, job_id: Uuid) -> Result<JobDoc> {
        let partition = self.partitions.partition_for_job(job_id)?;
        let lock = partition.jobs.transition_lock(job_id);
        let _guard = lock.lock().await;

        let mut job = partition
            .jobs
            .get(job_id)
            .ok_or_else(|| NivaranError::not_found(format!("job {}", job_id)))?;
        if !matches!(job.status, JobStatus::Assigned | JobStatus::Accepted) {
            return Err(NivaranError::conflict(format!(
                "cannot start a job in status {}",
                job.status.as_str()
            )));
        }

        job.status = JobStatus::InProgress;
        let job = partition.jobs.save(job).await?;
        self.advance_to_in_progress(&partition, job.complaint_id).await?;
        Ok(job)
    }

    /// Officer completes the job with proof.
    ///
    /// At least one proof media reference is required; the linked
    /// complaint cascades to completed and `JobCompleted` is emitted.
    pub async fn complete_job(
        &self,
        job_id: Uuid,
        proof_urls: Vec<String>,
        notes: Option<String>,
    ) -> Result<JobDoc> {
        if proof_urls.iter().filter(|u| !u.trim().is_empty()).count() == 0 {
            return Err(NivaranError::validation(
                "at least one proof photo is required to complete a job",
            ));
        }

        let partition = self.partitions.partition_for_job(job_id)?;
        let lock = partition.jobs.transition_lock(job_id);
        let _guard = lock.lock().await;

        let mut job = partition
            .jobs
            .get(job_id)
            .ok_or_else(|| NivaranError::not_found(format!("job {}", job_id)))?;
        if job.status.is_terminal() {
            return Err(NivaranError::conflict(format!(
                "cannot complete a job in status {}",
                job.status.as_str()
            )));
        }

        job.status = JobStatus::Completed;
        job.proof_urls = proof_urls;
        job.completion_notes = notes;
        job.completed_at = Some(Utc::now());
        let job = partition.jobs.save(job).await?;

        let complaint = partition
            .complaints
            .set_status(job.complaint_id, ComplaintStatus::Completed)
            .await?;

        info!(job = %job_id, complaint = %job.complaint_id, "Job completed");
        self.events
            .emit(NotificationEvent::JobCompleted {
                tenant_id: partition.tenant_id,
                job_id,
                complaint_id: job.complaint_id,
                officer_id: job.officer_id,
                contact: complaint.citizen_phone.clone(),
                summary: format!("Complaint {} resolved", complaint.complaint_number),
            })
            .await;

        Ok(job)
    }

    /// Staff confirms the resolution
    pub async fn verify_complaint(&self, complaint_id: Uuid) -> Result<ComplaintDoc> {
        let partition = self.partitions.partition_for_complaint(complaint_id)?;
        let complaint = partition
            .complaints
            .get(complaint_id)
            .ok_or_else(|| NivaranError::not_found(format!("complaint {}", complaint_id)))?;

        if complaint.status != ComplaintStatus::Completed {
            return Err(NivaranError::conflict(format!(
                "cannot verify a complaint in status {}",
                complaint.status.as_str()
            )));
        }

        partition
            .complaints
            .set_status(complaint_id, ComplaintStatus::Verified)
            .await
    }

    /// Close a verified complaint (terminal)
    pub async fn close_complaint(&self, complaint_id: Uuid) -> Result<ComplaintDoc> {
        let partition = self.partitions.partition_for_complaint(complaint_id)?;
        let complaint = partition
            .complaints
            .get(complaint_id)
            .ok_or_else(|| NivaranError::not_found(format!("complaint {}", complaint_id)))?;

        if complaint.status != ComplaintStatus::Verified {
            return Err(NivaranError::conflict(format!(
                "cannot close a complaint in status {}",
                complaint.status.as_str()
            )));
        }

        partition
            .complaints
            .set_status(complaint_id, ComplaintStatus::Closed)
            .await
    }

    /// First officer action moves an assigned complaint to in_progress
    async fn advance_to_in_progress(
        &self,
        partition: &crate::store::TenantPartition,
        complaint_id: Uuid,
    ) -> Result<()> {
        if let Some(complaint) = partition.complaints.get(complaint_id) {
            if complaint.status == ComplaintStatus::Assigned {
                partition
                    .complaints
                    .set_status(complaint_id, ComplaintStatus::InProgress)
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::ConfigCache;
    use crate::db::schemas::{IssueType, TenantDoc};
    use chrono::Duration;

    pub(crate) struct Fixture {
        pub registry: Arc<TenantRegistry>,
        pub partitions: Arc<PartitionMap>,
        pub events: Arc<EventBus>,
        pub engine: LifecycleEngine,
    }

    pub(crate) async fn fixture() -> Fixture {
        let cache = Arc::new(ConfigCache::new());
        let registry = Arc::new(TenantRegistry::new(None, cache).await);
        let partitions = Arc::new(PartitionMap::new());
        let events = Arc::new(EventBus::new(None));
        let engine = LifecycleEngine::new(
            Arc::clone(&partitions),
            Arc::clone(&registry),
            Arc::clone(&events),
        );
        Fixture {
            registry,
            partitions,
            events,
            engine,
        }
    }

    pub(crate) async fn chennai_south(f: &Fixture) -> Uuid {
        let tenant = TenantDoc::new(
            "+914423456789".to_string(),
            "Rajesh Kumar".to_string(),
            "Chennai South".to_string(),
            "rajesh@example.com".to_string(),
            vec!["tamil".to_string(), "english".to_string()],
            None,
        );
        let id = tenant.tenant_id;
        f.registry.reserve_routing_key("+914423456789", id).unwrap();
        f.registry.upsert_tenant(tenant).await.unwrap();
        f.registry.activate(id).await.unwrap();
        f.partitions.create_partition(id);
        id
    }

    pub(crate) fn water_complaint() -> NewComplaint {
        NewComplaint {
            citizen_name: "Priya".to_string(),
            citizen_phone: "+919876543210".to_string(),
            issue_type: IssueType::Water,
            description: "No water supply for three days".to_string(),
            location: Some("Anna Nagar 4th street".to_string()),
            landmark: None,
            audio_url: None,
            transcript: None,
        }
    }

    pub(crate) async fn add_officer(f: &Fixture, tenant_id: Uuid) -> Uuid {
        f.partitions
            .partition(tenant_id)
            .unwrap()
            .officers
            .add(
                "Kumar".to_string(),
                "+919800000001".to_string(),
                None,
                "Water Board".to_string(),
                "Junior Engineer".to_string(),
            )
            .await
            .unwrap()
            .officer_id
    }

    #[tokio::test]
    async fn test_create_complaint_numbers_and_emits() {
        let f = fixture().await;
        let tenant_id = chennai_south(&f).await;
        let mut rx = f.events.subscribe();
        let year = Utc::now().format("%Y");

        let complaint = f
            .engine
            .create_complaint(tenant_id, water_complaint())
            .await
            .unwrap();
        assert_eq!(complaint.complaint_number, format!("CHN-{}-0001", year));
        assert_eq!(complaint.status, ComplaintStatus::New);
        assert_eq!(rx.recv().await.unwrap().kind(), "complaint_created");
    }

    #[tokio::test]
    async fn test_assignment_drives_complaint_forward() {
        let f = fixture().await;
        let tenant_id = chennai_south(&f).await;
        let officer_id = add_officer(&f, tenant_id).await;
        let complaint = f
            .engine
            .create_complaint(tenant_id, water_complaint())
            .await
            .unwrap();

        let job = f
            .engine
            .assign_job(
                complaint.complaint_id,
                officer_id,
                Utc::now() + Duration::hours(48),
                Some("Check the valve chamber".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Assigned);

        let partition = f.partitions.partition(tenant_id).unwrap();
        assert_eq!(
            partition.complaints.get(complaint.complaint_id).unwrap().status,
            ComplaintStatus::Assigned
        );

        f.engine.accept_job(job.job_id).await.unwrap();
        assert_eq!(
            partition.complaints.get(complaint.complaint_id).unwrap().status,
            ComplaintStatus::InProgress
        );
    }

    #[tokio::test]
    async fn test_completion_requires_proof() {
        let f = fixture().await;
        let tenant_id = chennai_south(&f).await;
        let officer_id = add_officer(&f, tenant_id).await;
        let complaint = f
            .engine
            .create_complaint(tenant_id, water_complaint())
            .await
            .unwrap();
        let job = f
            .engine
            .assign_job(
                complaint.complaint_id,
                officer_id,
                Utc::now() + Duration::hours(48),
                None,
            )
            .await
            .unwrap();

        let err = f
            .engine
            .complete_job(job.job_id, vec![], None)
            .await
            .unwrap_err();
        assert!(matches!(err, NivaranError::Validation(_)));

        let done = f
            .engine
            .complete_job(
                job.job_id,
                vec!["https://media.example/proof-1.jpg".to_string()],
                Some("Valve replaced".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.completed_at.is_some());

        let partition = f.partitions.partition(tenant_id).unwrap();
        assert_eq!(
            partition.complaints.get(complaint.complaint_id).unwrap().status,
            ComplaintStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_reassignment_supersedes_open_job() {
        let f = fixture().await;
        let tenant_id = chennai_south(&f).await;
        let officer_a = add_officer(&f, tenant_id).await;
        let partition = f.partitions.partition(tenant_id).unwrap();
        let officer_b = partition
            .officers
            .add(
                "Anand".to_string(),
                "+919800000002".to_string(),
                None,
                "Water Board".to_string(),
                "Supervisor".to_string(),
            )
            .await
            .unwrap()
            .officer_id;

        let complaint = f
            .engine
            .create_complaint(tenant_id, water_complaint())
            .await
            .unwrap();
        let first = f
            .engine
            .assign_job(
                complaint.complaint_id,
                officer_a,
                Utc::now() + Duration::hours(48),
                None,
            )
            .await
            .unwrap();
        let second = f
            .engine
            .assign_job(
                complaint.complaint_id,
                officer_b,
                Utc::now() + Duration::hours(24),
                None,
            )
            .await
            .unwrap();

        assert_eq!(
            partition.jobs.get(first.job_id).unwrap().status,
            JobStatus::Superseded
        );
        assert_eq!(
            partition
                .jobs
                .non_terminal_for_complaint(complaint.complaint_id)
                .unwrap()
                .job_id,
            second.job_id
        );
    }

    #[tokio::test]
    async fn test_cross_tenant_assignment_conflicts() {
        let f = fixture().await;
        let tenant_a = chennai_south(&f).await;

        let other = TenantDoc::new(
            "+914499999999".to_string(),
            "Meena".to_string(),
            "Chennai North".to_string(),
            "meena@example.com".to_string(),
            vec!["tamil".to_string()],
            None,
        );
        let tenant_b = other.tenant_id;
        f.registry.reserve_routing_key("+914499999999", tenant_b).unwrap();
        f.registry.upsert_tenant(other).await.unwrap();
        f.registry.activate(tenant_b).await.unwrap();
        f.partitions.create_partition(tenant_b);
        let foreign_officer = add_officer(&f, tenant_b).await;

        let complaint = f
            .engine
            .create_complaint(tenant_a, water_complaint())
            .await
            .unwrap();
        let err = f
            .engine
            .assign_job(
                complaint.complaint_id,
                foreign_officer,
                Utc::now() + Duration::hours(48),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NivaranError::Conflict(_)));

        // Nothing was written on either side
        assert_eq!(
            f.partitions.partition(tenant_a).unwrap().jobs.count(),
            0
        );
        assert_eq!(
            f.partitions.partition(tenant_b).unwrap().jobs.count(),
            0
        );
    }

    #[tokio::test]
    async fn test_verify_then_close_then_reopen() {
        let f = fixture().await;
        let tenant_id = chennai_south(&f).await;
        let officer_id = add_officer(&f, tenant_id).await;
        let complaint = f
            .engine
            .create_complaint(tenant_id, water_complaint())
            .await
            .unwrap();
        let job = f
            .engine
            .assign_job(
                complaint.complaint_id,
                officer_id,
                Utc::now() + Duration::hours(48),
                None,
            )
            .await
            .unwrap();
        f.engine
            .complete_job(job.job_id, vec!["https://media.example/p.jpg".to_string()], None)
            .await
            .unwrap();

        // Closing before verification is an invalid transition
        assert!(matches!(
            f.engine.close_complaint(complaint.complaint_id).await,
            Err(NivaranError::Conflict(_))
        ));

        f.engine.verify_complaint(complaint.complaint_id).await.unwrap();
        let closed = f.engine.close_complaint(complaint.complaint_id).await.unwrap();
        assert_eq!(closed.status, ComplaintStatus::Closed);

        // Reopen happens through a fresh assignment
        let reopened = f
            .engine
            .assign_job(
                complaint.complaint_id,
                officer_id,
                Utc::now() + Duration::hours(24),
                None,
            )
            .await
            .unwrap();
        assert_eq!(reopened.status, JobStatus::Assigned);
        let partition = f.partitions.partition(tenant_id).unwrap();
        assert_eq!(
            partition.complaints.get(complaint.complaint_id).unwrap().status,
            ComplaintStatus::Assigned
        );
    }

    #[tokio::test]
    async fn test_tenant_scoped_queries_never_leak() {
        let f = fixture().await;
        let tenant_a = chennai_south(&f).await;

        let other = TenantDoc::new(
            "+914499999999".to_string(),
            "Meena".to_string(),
            "Chennai North".to_string(),
            "meena@example.com".to_string(),
            vec!["tamil".to_string()],
            None,
        );
        let tenant_b = other.tenant_id;
        f.registry.reserve_routing_key("+914499999999", tenant_b).unwrap();
        f.registry.upsert_tenant(other).await.unwrap();
        f.partitions.create_partition(tenant_b);

        f.engine.create_complaint(tenant_a, water_complaint()).await.unwrap();

        let partition_b = f.partitions.partition(tenant_b).unwrap();
        assert_eq!(partition_b.complaints.count(), 0);
        assert!(partition_b
            .complaints
            .list(&Default::default())
            .is_empty());
    }
}
