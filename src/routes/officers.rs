//! Officer endpoints
//!
//! - `POST /api/tenants/{id}/officers` - add an officer
//! - `GET /api/tenants/{id}/officers` - list (department/active filters)
//! - `GET /api/officers/{id}` - single record
//! - `PUT /api/officers/{id}` - update mutable attributes

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{error_response, json_response, read_json};
use crate::db::schemas::OfficerDoc;
use crate::server::AppState;
use crate::store::OfficerUpdate;

/// Officer record as served by the API
#[derive(Serialize)]
pub struct OfficerResponse {
    pub officer_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub department: String,
    pub designation: String,
    pub is_active: bool,
}

impl From<OfficerDoc> for OfficerResponse {
    fn from(doc: OfficerDoc) -> Self {
        Self {
            officer_id: doc.officer_id,
            tenant_id: doc.tenant_id,
            name: doc.name,
            phone: doc.phone,
            email: doc.email,
            department: doc.department,
            designation: doc.designation,
            is_active: doc.is_active,
        }
    }
}

#[derive(Deserialize)]
struct AddOfficerBody {
    name: String,
    phone: String,
    email: Option<String>,
    department: String,
    designation: String,
}

/// POST /api/tenants/{id}/officers
pub async fn add(
    state: Arc<AppState>,
    tenant_id: Uuid,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let body: AddOfficerBody = match read_json(req).await {
        Ok(b) => b,
        Err(response) => return response,
    };

    let partition = match state.partitions.partition(tenant_id) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };

    match partition
        .officers
        .add(
            body.name,
            body.phone,
            body.email,
            body.department,
            body.designation,
        )
        .await
    {
        Ok(officer) => json_response(StatusCode::CREATED, &OfficerResponse::from(officer)),
        Err(e) => error_response(&e),
    }
}

/// GET /api/tenants/{id}/officers
pub fn list(state: Arc<AppState>, tenant_id: Uuid, query: Option<&str>) -> Response<Full<Bytes>> {
    let mut department: Option<String> = None;
    let mut active_only = false;

    if let Some(raw) = query {
        for pair in raw.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let value = urlencoding::decode(value).unwrap_or_default();
            match key {
                "department" => department = Some(value.into_owned()),
                "active" => active_only = value == "true",
                _ => {}
            }
        }
    }

    let partition = match state.partitions.partition(tenant_id) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };

    let officers: Vec<OfficerResponse> = partition
        .officers
        .list(department.as_deref(), active_only)
        .into_iter()
        .map(OfficerResponse::from)
        .collect();
    json_response(StatusCode::OK, &officers)
}

/// GET /api/officers/{id}
pub fn get(state: Arc<AppState>, officer_id: Uuid) -> Response<Full<Bytes>> {
    let partition = match state.partitions.partition_for_officer(officer_id) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };

    match partition.officers.get(officer_id) {
        Some(officer) => json_response(StatusCode::OK, &OfficerResponse::from(officer)),
        None => error_response(&crate::types::NivaranError::not_found(format!(
            "officer {}",
            officer_id
        ))),
    }
}

#[derive(Deserialize)]
struct UpdateOfficerBody {
    name: Option<String>,
    email: Option<String>,
    department: Option<String>,
    designation: Option<String>,
    is_active: Option<bool>,
}

/// PUT /api/officers/{id}
///
/// Phone and tenant are immutable; the body simply has no fields for them.
pub async fn update(
    state: Arc<AppState>,
    officer_id: Uuid,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let body: UpdateOfficerBody = match read_json(req).await {
        Ok(b) => b,
        Err(response) => return response,
    };

    let partition = match state.partitions.partition_for_officer(officer_id) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };

    let update = OfficerUpdate {
        name: body.name,
        email: body.email,
        department: body.department,
        designation: body.designation,
        is_active: body.is_active,
    };

    match partition.officers.update(officer_id, update).await {
        Ok(officer) => json_response(StatusCode::OK, &OfficerResponse::from(officer)),
        Err(e) => error_response(&e),
    }
}
