//! Tenant administration endpoints
//!
//! - `POST /api/tenants` - provision a new tenant (runs the full saga)
//! - `GET /api/tenants` - list tenants
//! - `GET /api/tenants/{id}` - tenant record
//! - `PUT /api/tenants/{id}` - replace display config (whole record)
//! - `DELETE /api/tenants/{id}` - deprovision
//! - `POST /api/tenants/{id}/retry` - retry a pending/failed provisioning
//! - `POST /api/tenants/{id}/reroute` - two-phase phone number change

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{bad_request, error_response, json_response, read_json};
use crate::db::schemas::{ProvisioningState, TenantConfig, TenantDoc};
use crate::server::AppState;
use crate::tenant::ProvisionRequest;

/// Tenant record as served by the API
#[derive(Serialize)]
pub struct TenantResponse {
    pub tenant_id: Uuid,
    pub routing_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retiring_routing_key: Option<String>,
    pub name: String,
    pub constituency: String,
    pub admin_email: String,
    pub languages: Vec<String>,
    pub greeting: String,
    pub escalation_hours: u32,
    pub is_active: bool,
    pub provisioning: ProvisioningState,
}

impl From<TenantDoc> for TenantResponse {
    fn from(doc: TenantDoc) -> Self {
        Self {
            tenant_id: doc.tenant_id,
            routing_key: doc.routing_key,
            retiring_routing_key: doc.retiring_routing_key,
            name: doc.name,
            constituency: doc.constituency,
            admin_email: doc.admin_email,
            languages: doc.languages,
            greeting: doc.greeting,
            escalation_hours: doc.escalation_hours,
            is_active: doc.is_active,
            provisioning: doc.provisioning,
        }
    }
}

#[derive(Deserialize)]
struct ProvisionBody {
    routing_key: String,
    name: String,
    constituency: String,
    admin_email: String,
    languages: Vec<String>,
    greeting: Option<String>,
}

/// POST /api/tenants
pub async fn provision(state: Arc<AppState>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let body: ProvisionBody = match read_json(req).await {
        Ok(b) => b,
        Err(response) => return response,
    };

    let request = ProvisionRequest {
        routing_key: body.routing_key,
        name: body.name,
        constituency: body.constituency,
        admin_email: body.admin_email,
        languages: body.languages,
        greeting: body.greeting,
    };

    match state.provisioner.provision(request).await {
        Ok(tenant) => json_response(StatusCode::CREATED, &TenantResponse::from(tenant)),
        Err(e) => error_response(&e),
    }
}

/// GET /api/tenants
pub fn list(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let tenants: Vec<TenantResponse> = state
        .registry
        .list()
        .into_iter()
        .map(TenantResponse::from)
        .collect();
    json_response(StatusCode::OK, &tenants)
}

/// GET /api/tenants/{id}
pub fn get(state: Arc<AppState>, tenant_id: Uuid) -> Response<Full<Bytes>> {
    match state.registry.get(tenant_id) {
        Some(tenant) => json_response(StatusCode::OK, &TenantResponse::from(tenant)),
        None => error_response(&crate::types::NivaranError::not_found(format!(
            "tenant {}",
            tenant_id
        ))),
    }
}

/// PUT /api/tenants/{id}
///
/// The body is the whole config record; it is validated and applied as a
/// unit, and the routing cache entry is evicted so the next call resolves
/// the fresh snapshot.
pub async fn update(
    state: Arc<AppState>,
    tenant_id: Uuid,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let config: TenantConfig = match read_json(req).await {
        Ok(b) => b,
        Err(response) => return response,
    };

    match state.registry.update_config(tenant_id, config).await {
        Ok(tenant) => json_response(StatusCode::OK, &TenantResponse::from(tenant)),
        Err(e) => error_response(&e),
    }
}

/// DELETE /api/tenants/{id}
pub async fn deactivate(state: Arc<AppState>, tenant_id: Uuid) -> Response<Full<Bytes>> {
    match state.provisioner.deprovision(tenant_id).await {
        Ok(tenant) => json_response(StatusCode::OK, &TenantResponse::from(tenant)),
        Err(e) => error_response(&e),
    }
}

/// POST /api/tenants/{id}/retry
pub async fn retry(state: Arc<AppState>, tenant_id: Uuid) -> Response<Full<Bytes>> {
    match state.provisioner.retry(tenant_id).await {
        Ok(tenant) => json_response(StatusCode::OK, &TenantResponse::from(tenant)),
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize)]
struct RerouteBody {
    /// Begin a re-route onto this number
    new_routing_key: Option<String>,
    /// Close the dual-route window
    #[serde(default)]
    finish: bool,
}

/// POST /api/tenants/{id}/reroute
///
/// Two-phase: a body with `new_routing_key` opens the dual-route window
/// (old and new numbers both reach the tenant); a body with `finish: true`
/// retires the old number.
pub async fn reroute(
    state: Arc<AppState>,
    tenant_id: Uuid,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let body: RerouteBody = match read_json(req).await {
        Ok(b) => b,
        Err(response) => return response,
    };

    match (body.new_routing_key, body.finish) {
        (Some(new_key), false) => match state.provisioner.begin_reroute(tenant_id, &new_key).await
        {
            Ok(tenant) => json_response(StatusCode::OK, &TenantResponse::from(tenant)),
            Err(e) => error_response(&e),
        },
        (None, true) => match state.provisioner.finish_reroute(tenant_id).await {
            Ok(tenant) => json_response(StatusCode::OK, &TenantResponse::from(tenant)),
            Err(e) => error_response(&e),
        },
        _ => bad_request("provide either new_routing_key (begin) or finish: true"),
    }
}
