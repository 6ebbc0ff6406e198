//! HTTP server implementation
//!
//! hyper http1 with TokioIo, one task per connection. Requests are routed
//! by (method, path) match; parametric paths dispatch through the
//! per-resource helpers below.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::cache::ConfigCache;
use crate::config::Args;
use crate::db::mongo::MongoCollection;
use crate::db::schemas::CallLogDoc;
use crate::db::MongoClient;
use crate::external::{
    CredentialIssuer, MemoryCredentialIssuer, MemoryTrunkRegistrar, TrunkRegistrar,
};
use crate::lifecycle::{DeadlineMonitor, LifecycleEngine};
use crate::notify::{EventBus, NatsClient};
use crate::router::CallRouter;
use crate::routes;
use crate::store::PartitionMap;
use crate::tenant::{TenantProvisioner, TenantRegistry};
use crate::types::NivaranError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub mongo: Option<MongoClient>,
    pub nats: Option<NatsClient>,
    /// Routing-key config cache, read on every inbound call
    pub cache: Arc<ConfigCache>,
    /// Authoritative tenant records and routing bindings
    pub registry: Arc<TenantRegistry>,
    /// Per-tenant data partitions
    pub partitions: Arc<PartitionMap>,
    /// Dialed-number resolution (cache first, registry fallback)
    pub call_router: Arc<CallRouter>,
    /// Complaint and job state machines
    pub lifecycle: Arc<LifecycleEngine>,
    /// Tenant onboarding saga
    pub provisioner: Arc<TenantProvisioner>,
    /// Background deadline scanner
    pub monitor: Arc<DeadlineMonitor>,
    /// Notification event bus
    pub events: Arc<EventBus>,
    /// Sink for call records that resolved to no tenant
    pub unrouted_calls: Option<MongoCollection<CallLogDoc>>,
    pub started_at: Instant,
}

impl AppState {
    /// Memory-only state with in-process collaborators (dev mode, tests)
    pub async fn dev(args: Args) -> Arc<Self> {
        let cache = Arc::new(ConfigCache::new());
        let registry = Arc::new(TenantRegistry::new(None, Arc::clone(&cache)).await);
        let partitions = Arc::new(PartitionMap::new());
        let events = Arc::new(EventBus::new(None));
        let trunk: Arc<dyn TrunkRegistrar> = Arc::new(MemoryTrunkRegistrar::new());
        let credentials: Arc<dyn CredentialIssuer> = Arc::new(MemoryCredentialIssuer::new());

        let call_router = Arc::new(CallRouter::new(Arc::clone(&cache), Arc::clone(&registry)));
        let lifecycle = Arc::new(LifecycleEngine::new(
            Arc::clone(&partitions),
            Arc::clone(&registry),
            Arc::clone(&events),
        ));
        let provisioner = Arc::new(TenantProvisioner::new(
            Arc::clone(&registry),
            Arc::clone(&partitions),
            Arc::clone(&cache),
            Arc::clone(&trunk),
            Arc::clone(&credentials),
            Arc::clone(&events),
        ));
        let monitor = Arc::new(DeadlineMonitor::new(
            Arc::clone(&partitions),
            Arc::clone(&events),
        ));

        Arc::new(Self {
            args,
            mongo: None,
            nats: None,
            cache,
            registry,
            partitions,
            call_router,
            lifecycle,
            provisioner,
            monitor,
            events,
            unrouted_calls: None,
            started_at: Instant::now(),
        })
    }
}

/// Run the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), NivaranError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Nivaran listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - external collaborators are in-memory");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|q| q.to_string());

    info!("[{}] {} {}", addr, method, path);

    let response = match (method.clone(), path.as_str()) {
        // Liveness probe
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            routes::health_check(Arc::clone(&state))
        }

        // Readiness probe
        (Method::GET, "/ready") | (Method::GET, "/readyz") => {
            routes::readiness_check(Arc::clone(&state))
        }

        // Build info for deployment verification
        (Method::GET, "/version") => routes::version_info(),

        // Runtime counters
        (Method::GET, "/status") => routes::status_check(Arc::clone(&state)).await,

        // Classification catalogue for the voice pipeline
        (Method::GET, "/api/issue-types") => routes::complaints::issue_types(),

        // Tenant administration
        (Method::POST, "/api/tenants") => {
            routes::tenants::provision(Arc::clone(&state), req).await
        }
        (Method::GET, "/api/tenants") => routes::tenants::list(Arc::clone(&state)),

        // Call routing for the voice pipeline
        (Method::GET, p) if p.starts_with("/api/resolve/") => {
            let number = p.strip_prefix("/api/resolve/").unwrap_or("");
            let number = urlencoding::decode(number).unwrap_or_default();
            routes::calls::resolve(Arc::clone(&state), &number).await
        }

        // Inbound call logging
        (Method::POST, "/api/calls") => routes::calls::log_call(Arc::clone(&state), req).await,
        (_, p) if p.starts_with("/api/calls/") => {
            handle_call_scoped(state, method, &path, req).await
        }

        // Job assignment and officer progress
        (Method::POST, "/api/jobs") => routes::jobs::assign(Arc::clone(&state), req).await,
        (_, p) if p.starts_with("/api/jobs/") => handle_job_scoped(state, method, &path, req).await,

        (_, p) if p.starts_with("/api/complaints/") => {
            handle_complaint_scoped(state, method, &path).await
        }
        (_, p) if p.starts_with("/api/officers/") => {
            handle_officer_scoped(state, method, &path, req).await
        }
        (_, p) if p.starts_with("/api/tenants/") => {
            handle_tenant_scoped(state, method, &path, query.as_deref(), req).await
        }

        (Method::OPTIONS, _) => preflight_response(),

        _ => not_found_response(&path),
    };

    Ok(to_boxed(response))
}

/// Routes under /api/tenants/{id}
async fn handle_tenant_scoped(
    state: Arc<AppState>,
    method: Method,
    path: &str,
    query: Option<&str>,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let rest = path.strip_prefix("/api/tenants/").unwrap_or("");
    let mut parts = rest.splitn(2, '/');
    let id_str = parts.next().unwrap_or("");
    let tail = parts.next().unwrap_or("");

    let tenant_id = match routes::parse_uuid(id_str, "tenant") {
        Ok(id) => id,
        Err(response) => return response,
    };

    match (method, tail) {
        (Method::GET, "") => routes::tenants::get(state, tenant_id),
        (Method::PUT, "") => routes::tenants::update(state, tenant_id, req).await,
        (Method::DELETE, "") => routes::tenants::deactivate(state, tenant_id).await,
        (Method::POST, "retry") => routes::tenants::retry(state, tenant_id).await,
        (Method::POST, "reroute") => routes::tenants::reroute(state, tenant_id, req).await,
        (Method::POST, "complaints") => routes::complaints::create(state, tenant_id, req).await,
        (Method::GET, "complaints") => routes::complaints::list(state, tenant_id, query),
        (Method::GET, "complaints/stats") => routes::complaints::stats(state, tenant_id),
        (Method::POST, "officers") => routes::officers::add(state, tenant_id, req).await,
        (Method::GET, "officers") => routes::officers::list(state, tenant_id, query),
        (Method::GET, "jobs") => routes::jobs::list(state, tenant_id, query),
        (Method::GET, "calls") => routes::calls::list(state, tenant_id),
        _ => not_found_response(path),
    }
}

/// Routes under /api/complaints/{id}
async fn handle_complaint_scoped(
    state: Arc<AppState>,
    method: Method,
    path: &str,
) -> Response<Full<Bytes>> {
    let rest = path.strip_prefix("/api/complaints/").unwrap_or("");
    let mut parts = rest.splitn(2, '/');
    let id_str = parts.next().unwrap_or("");
    let tail = parts.next().unwrap_or("");

    let complaint_id = match routes::parse_uuid(id_str, "complaint") {
        Ok(id) => id,
        Err(response) => return response,
    };

    match (method, tail) {
        (Method::GET, "") => routes::complaints::get(state, complaint_id),
        (Method::POST, "verify") => routes::complaints::verify(state, complaint_id).await,
        (Method::POST, "close") => routes::complaints::close(state, complaint_id).await,
        _ => not_found_response(path),
    }
}

/// Routes under /api/officers/{id}
async fn handle_officer_scoped(
    state: Arc<AppState>,
    method: Method,
    path: &str,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let id_str = path.strip_prefix("/api/officers/").unwrap_or("");

    let officer_id = match routes::parse_uuid(id_str, "officer") {
        Ok(id) => id,
        Err(response) => return response,
    };

    match method {
        Method::GET => routes::officers::get(state, officer_id),
        Method::PUT => routes::officers::update(state, officer_id, req).await,
        _ => not_found_response(path),
    }
}

/// Routes under /api/jobs/{id}
async fn handle_job_scoped(
    state: Arc<AppState>,
    method: Method,
    path: &str,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let rest = path.strip_prefix("/api/jobs/").unwrap_or("");
    let mut parts = rest.splitn(2, '/');
    let id_str = parts.next().unwrap_or("");
    let tail = parts.next().unwrap_or("");

    let job_id = match routes::parse_uuid(id_str, "job") {
        Ok(id) => id,
        Err(response) => return response,
    };

    match (method, tail) {
        (Method::GET, "") => routes::jobs::get(state, job_id),
        (Method::POST, "accept") => routes::jobs::accept(state, job_id).await,
        (Method::POST, "start") => routes::jobs::start(state, job_id).await,
        (Method::POST, "complete") => routes::jobs::complete(state, job_id, req).await,
        _ => not_found_response(path),
    }
}

/// Routes under /api/calls/{id}
async fn handle_call_scoped(
    state: Arc<AppState>,
    method: Method,
    path: &str,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let rest = path.strip_prefix("/api/calls/").unwrap_or("");
    let mut parts = rest.splitn(2, '/');
    let id_str = parts.next().unwrap_or("");
    let tail = parts.next().unwrap_or("");

    let call_id = match routes::parse_uuid(id_str, "call") {
        Ok(id) => id,
        Err(response) => return response,
    };

    match (method, tail) {
        (Method::POST, "finish") => routes::calls::finish(state, call_id, req).await,
        _ => not_found_response(path),
    }
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// Not found response
fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Not Found",
        "path": path,
    });

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}
