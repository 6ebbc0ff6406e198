//! Tenant registry and provisioning orchestration

pub mod provisioner;
pub mod registry;

pub use provisioner::{ProvisionRequest, TenantProvisioner};
pub use registry::TenantRegistry;
