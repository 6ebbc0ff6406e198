//! Database schemas for Nivaran
//!
//! Defines the document structures for tenants, officers, complaints,
//! job assignments, and call logs. The same structs serve as the
//! in-memory records held by the domain stores.

mod call_log;
mod complaint;
mod job;
mod metadata;
mod officer;
mod tenant;

pub use call_log::{CallLogDoc, CallOutcome, CALL_LOG_COLLECTION};
pub use complaint::{ComplaintDoc, ComplaintStatus, IssueType, COMPLAINT_COLLECTION};
pub use job::{JobDoc, JobStatus, JOB_COLLECTION};
pub use metadata::Metadata;
pub use officer::{OfficerDoc, OFFICER_COLLECTION};
pub use tenant::{
    ProvisionStep, ProvisioningState, TenantConfig, TenantDoc, TENANT_COLLECTION,
};
