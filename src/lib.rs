//! Nivaran - multi-tenant citizen grievance gateway
//!
//! Routes citizen calls to the right elected representative's office and
//! tracks every complaint from filing to verified resolution.
//!
//! ## Services
//!
//! - **Tenant provisioning**: saga-ordered onboarding with compensation
//! - **Call routing**: dialed number to tenant config, cache-first
//! - **Lifecycle**: complaint and job state machines with per-job locks
//! - **Deadline monitor**: background overdue scanning and escalation
//! - **Notify**: lifecycle events for the external dispatcher over NATS

pub mod cache;
pub mod config;
pub mod db;
pub mod external;
pub mod lifecycle;
pub mod notify;
pub mod router;
pub mod routes;
pub mod server;
pub mod store;
pub mod tenant;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{NivaranError, Result};
