//! Configuration for Nivaran
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use uuid::Uuid;

/// Nivaran - multi-tenant citizen grievance gateway
#[derive(Parser, Debug, Clone)]
#[command(name = "nivaran")]
#[command(about = "Routes citizen calls to tenants and tracks complaints to resolution")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (MongoDB/NATS optional, in-memory collaborators)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "nivaran")]
    pub mongodb_db: String,

    /// NATS configuration
    #[command(flatten)]
    pub nats: NatsArgs,

    /// Telephony trunk registrar base URL (external call-routing layer)
    /// When unset, an in-memory registrar is used (dev mode only)
    #[arg(long, env = "TRUNK_REGISTRAR_URL")]
    pub trunk_registrar_url: Option<String>,

    /// Credential issuer base URL (dashboard login provisioning)
    /// When unset, an in-memory issuer is used (dev mode only)
    #[arg(long, env = "CREDENTIAL_ISSUER_URL")]
    pub credential_issuer_url: Option<String>,

    /// Timeout for call resolution registry fallback, in milliseconds.
    /// Sits on the inbound-call critical path; a slow fallback degrades
    /// to NotFound rather than stalling the call.
    #[arg(long, env = "RESOLVE_TIMEOUT_MS", default_value = "250")]
    pub resolve_timeout_ms: u64,

    /// Timeout for each provisioning step's external call, in milliseconds
    #[arg(long, env = "PROVISION_STEP_TIMEOUT_MS", default_value = "5000")]
    pub provision_step_timeout_ms: u64,

    /// Deadline monitor scan interval in seconds
    #[arg(long, env = "DEADLINE_SCAN_INTERVAL_SECS", default_value = "120")]
    pub deadline_scan_interval_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// NATS connection configuration
#[derive(Parser, Debug, Clone)]
pub struct NatsArgs {
    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://127.0.0.1:4222")]
    pub nats_url: String,

    /// NATS username (optional)
    #[arg(long, env = "NATS_USER")]
    pub nats_user: Option<String>,

    /// NATS password (optional)
    #[arg(long, env = "NATS_PASSWORD")]
    pub nats_password: Option<String>,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            if self.trunk_registrar_url.is_none() {
                return Err("TRUNK_REGISTRAR_URL is required in production mode".to_string());
            }
            if self.credential_issuer_url.is_none() {
                return Err("CREDENTIAL_ISSUER_URL is required in production mode".to_string());
            }
        }

        if self.resolve_timeout_ms == 0 {
            return Err("RESOLVE_TIMEOUT_MS must be greater than zero".to_string());
        }

        if self.deadline_scan_interval_secs == 0 {
            return Err("DEADLINE_SCAN_INTERVAL_SECS must be greater than zero".to_string());
        }

        Ok(())
    }
}

/// Defaults used when building Args outside of clap (tests)
#[cfg(test)]
impl Default for Args {
    fn default() -> Self {
        Self {
            node_id: Uuid::new_v4(),
            listen: "127.0.0.1:0".parse().unwrap(),
            dev_mode: true,
            mongodb_uri: "mongodb://localhost:27017".to_string(),
            mongodb_db: "nivaran".to_string(),
            nats: NatsArgs {
                nats_url: "nats://127.0.0.1:4222".to_string(),
                nats_user: None,
                nats_password: None,
            },
            trunk_registrar_url: None,
            credential_issuer_url: None,
            resolve_timeout_ms: 250,
            provision_step_timeout_ms: 5000,
            deadline_scan_interval_secs: 120,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dev_mode_allows_missing_collaborators() {
        let args = Args::default();
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_production_requires_collaborator_urls() {
        let args = Args {
            dev_mode: false,
            ..Args::default()
        };
        let err = args.validate().unwrap_err();
        assert!(err.contains("TRUNK_REGISTRAR_URL"));
    }

    #[test]
    fn test_zero_resolve_timeout_rejected() {
        let args = Args {
            resolve_timeout_ms: 0,
            ..Args::default()
        };
        assert!(args.validate().is_err());
    }
}
