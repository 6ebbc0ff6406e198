//! Deadline Monitor
//!
//! Periodic background scan over non-terminal jobs whose deadline has
//! passed. Each (job, deadline) pair is alerted exactly once: the scan
//! records the deadline it alerted for, so re-runs emit nothing until a
//! reassignment arms a fresh deadline. `scan_once` takes the clock as an
//! argument and carries all the logic, so tests drive it directly.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::notify::{EventBus, NotificationEvent};
use crate::store::PartitionMap;

/// Default scan interval
const SCAN_INTERVAL: Duration = Duration::from_secs(120);

/// Watches job deadlines and emits `JobOverdue` alerts
pub struct DeadlineMonitor {
    partitions: Arc<PartitionMap>,
    events: Arc<EventBus>,
    interval: Duration,
    running: Arc<RwLock<bool>>,
    scans: AtomicU64,
    alerts: AtomicU64,
}

impl DeadlineMonitor {
    pub fn new(partitions: Arc<PartitionMap>, events: Arc<EventBus>) -> Self {
        Self {
            partitions,
            events,
            interval: SCAN_INTERVAL,
            running: Arc::new(RwLock::new(false)),
            scans: AtomicU64::new(0),
            alerts: AtomicU64::new(0),
        }
    }

    /// Override the scan interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Scan every partition once against the given clock.
    ///
    /// Returns the number of alerts emitted. Idempotent: a job already
    /// alerted for its current deadline is skipped.
    pub async fn scan_once(&self, now: DateTime<Utc>) -> usize {
        self.scans.fetch_add(1, Ordering::Relaxed);
        let mut emitted = 0;

        for partition in self.partitions.partitions() {
            for candidate in partition.jobs.overdue_candidates(now) {
                let lock = partition.jobs.transition_lock(candidate.job_id);
                let _guard = lock.lock().await;

                // Re-read under the lock; the job may have completed or
                // been reassigned since the candidate list was built
                let Some(mut job) = partition.jobs.get(candidate.job_id) else {
                    continue;
                };
                if job.status.is_terminal()
                    || job.deadline >= now
                    || job.overdue_alerted_for == Some(job.deadline)
                {
                    continue;
                }

                job.overdue = true;
                job.overdue_alerted_for = Some(job.deadline);
                let deadline = job.deadline;
                let saved = partition.jobs.save(job).await;
                let Ok(job) = saved else {
                    warn!(job = %candidate.job_id, "Failed to record overdue flag");
                    continue;
                };

                let contact = partition
                    .officers
                    .get(job.officer_id)
                    .map(|o| o.phone)
                    .unwrap_or_default();
                let summary = match partition.complaints.get(job.complaint_id) {
                    Some(c) => format!("Complaint {} is past its deadline", c.complaint_number),
                    None => format!("Job {} is past its deadline", job.job_id),
                };

                info!(
                    job = %job.job_id,
                    complaint = %job.complaint_id,
                    deadline = %deadline,
                    "Job overdue"
                );
                self.events
                    .emit(NotificationEvent::JobOverdue {
                        tenant_id: partition.tenant_id,
                        job_id: job.job_id,
                        complaint_id: job.complaint_id,
                        officer_id: job.officer_id,
                        contact,
                        deadline,
                        summary,
                    })
                    .await;
                emitted += 1;
            }
        }

        self.alerts.fetch_add(emitted as u64, Ordering::Relaxed);
        emitted
    }

    /// Lifetime scan and alert counters for the status endpoint
    pub fn stats(&self) -> (u64, u64) {
        (
            self.scans.load(Ordering::Relaxed),
            self.alerts.load(Ordering::Relaxed),
        )
    }

    /// Start the background scan loop
    pub async fn start(self: Arc<Self>) {
        {
            let mut running = self.running.write().await;
            if *running {
                warn!("Deadline monitor already running");
                return;
            }
            *running = true;
        }

        info!("Starting deadline monitor (interval: {:?})", self.interval);

        let monitor = Arc::clone(&self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(monitor.interval);

            loop {
                interval.tick().await;

                if !*monitor.running.read().await {
                    info!("Deadline monitor stopped");
                    break;
                }

                monitor.scan_once(Utc::now()).await;
            }
        });
    }

    /// Stop the background loop
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
    }

    /// Whether the background loop is running
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}
