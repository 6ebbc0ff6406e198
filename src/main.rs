//! Nivaran - multi-tenant citizen grievance gateway
//!
//! Entry point: wires storage, messaging, the provisioning saga, call
//! routing, the lifecycle engine and the deadline monitor, then serves HTTP.

use clap::Parser;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nivaran::{
    cache::ConfigCache,
    config::Args,
    db::{
        schemas::{
            CallLogDoc, ComplaintDoc, JobDoc, OfficerDoc, TenantDoc, CALL_LOG_COLLECTION,
            COMPLAINT_COLLECTION, JOB_COLLECTION, OFFICER_COLLECTION, TENANT_COLLECTION,
        },
        MongoClient,
    },
    external::{
        CredentialIssuer, HttpCredentialIssuer, HttpTrunkRegistrar, MemoryCredentialIssuer,
        MemoryTrunkRegistrar, TrunkRegistrar,
    },
    lifecycle::{DeadlineMonitor, LifecycleEngine},
    notify::{EventBus, NatsClient},
    router::CallRouter,
    server::{self, AppState},
    store::{PartitionMap, StoreBacking},
    tenant::{TenantProvisioner, TenantRegistry},
};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("nivaran={},info", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    info!("Starting Nivaran");
    info!("  Node ID: {}", args.node_id);
    info!("  Listen: {}", args.listen);
    info!(
        "  Mode: {}",
        if args.dev_mode { "development" } else { "production" }
    );
    info!("  MongoDB: {}", args.mongodb_uri);
    info!("  NATS: {}", args.nats.nats_url);

    // MongoDB is optional in dev mode; without it every store is memory-only
    let mongo = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => Some(client),
        Err(e) => {
            if args.dev_mode {
                warn!("MongoDB unavailable, running memory-only: {}", e);
                None
            } else {
                error!("Failed to connect to MongoDB: {}", e);
                std::process::exit(1);
            }
        }
    };

    // Same policy for NATS; without it events stay on the local channel
    let nats = match NatsClient::new(&args.nats, "nivaran").await {
        Ok(client) => Some(client),
        Err(e) => {
            if args.dev_mode {
                warn!("NATS unavailable, events are local-only: {}", e);
                None
            } else {
                error!("Failed to connect to NATS: {}", e);
                std::process::exit(1);
            }
        }
    };

    let state = match build_state(args, mongo, nats).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize: {}", e);
            std::process::exit(1);
        }
    };

    Arc::clone(&state.monitor).start().await;

    if let Err(e) = server::run(state).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Assemble the application state from optional backends.
async fn build_state(
    args: Args,
    mongo: Option<MongoClient>,
    nats: Option<NatsClient>,
) -> Result<Arc<AppState>, nivaran::NivaranError> {
    let cache = Arc::new(ConfigCache::new());

    let tenant_collection = match mongo {
        Some(ref client) => Some(client.collection::<TenantDoc>(TENANT_COLLECTION).await?),
        None => None,
    };

    let registry = Arc::new(TenantRegistry::new(tenant_collection, Arc::clone(&cache)).await);
    registry.load_from_db().await?;

    let (partitions, unrouted_calls) = match mongo {
        Some(ref client) => {
            let calls = client.collection::<CallLogDoc>(CALL_LOG_COLLECTION).await?;
            let backing = StoreBacking {
                complaints: client
                    .collection::<ComplaintDoc>(COMPLAINT_COLLECTION)
                    .await?,
                officers: client.collection::<OfficerDoc>(OFFICER_COLLECTION).await?,
                jobs: client.collection::<JobDoc>(JOB_COLLECTION).await?,
                calls: calls.clone(),
            };
            (Arc::new(PartitionMap::with_backing(backing)), Some(calls))
        }
        None => (Arc::new(PartitionMap::new()), None),
    };
    partitions.load_from_db().await?;

    let events = Arc::new(EventBus::new(nats.clone()));

    let step_timeout = Duration::from_millis(args.provision_step_timeout_ms);
    let trunk: Arc<dyn TrunkRegistrar> = match args.trunk_registrar_url {
        Some(ref url) => Arc::new(HttpTrunkRegistrar::new(url, step_timeout)?),
        None => {
            warn!("No trunk registrar configured, using in-memory registrar");
            Arc::new(MemoryTrunkRegistrar::new())
        }
    };
    let credentials: Arc<dyn CredentialIssuer> = match args.credential_issuer_url {
        Some(ref url) => Arc::new(HttpCredentialIssuer::new(url, step_timeout)?),
        None => {
            warn!("No credential issuer configured, using in-memory issuer");
            Arc::new(MemoryCredentialIssuer::new())
        }
    };

    let call_router = Arc::new(
        CallRouter::new(Arc::clone(&cache), Arc::clone(&registry))
            .with_resolve_timeout(Duration::from_millis(args.resolve_timeout_ms)),
    );
    let lifecycle = Arc::new(LifecycleEngine::new(
        Arc::clone(&partitions),
        Arc::clone(&registry),
        Arc::clone(&events),
    ));
    let provisioner = Arc::new(
        TenantProvisioner::new(
            Arc::clone(&registry),
            Arc::clone(&partitions),
            Arc::clone(&cache),
            Arc::clone(&trunk),
            Arc::clone(&credentials),
            Arc::clone(&events),
        )
        .with_step_timeout(step_timeout),
    );
    let monitor = Arc::new(
        DeadlineMonitor::new(Arc::clone(&partitions), Arc::clone(&events))
            .with_interval(Duration::from_secs(args.deadline_scan_interval_secs)),
    );

    info!(
        tenants = registry.tenant_count(),
        partitions = partitions.partition_count(),
        "State initialized"
    );

    Ok(Arc::new(AppState {
        args,
        mongo,
        nats,
        cache,
        registry,
        partitions,
        call_router,
        lifecycle,
        provisioner,
        monitor,
        events,
        unrouted_calls,
        started_at: Instant::now(),
    }))
}
