//! Call routing and call log endpoints
//!
//! - `GET /api/resolve/{number}` - resolve a dialed number (voice pipeline
//!   asks this before answering)
//! - `POST /api/calls` - log an inbound call; resolves the dialed number
//!   and returns the tenant config when routed
//! - `POST /api/calls/{id}/finish` - attach outcome and end timestamp
//! - `GET /api/tenants/{id}/calls` - list a tenant's calls

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{bad_request, error_response, json_response, read_json};
use crate::db::schemas::{CallLogDoc, CallOutcome, TenantConfig};
use crate::server::AppState;

/// Call record as served by the API
#[derive(Serialize)]
pub struct CallResponse {
    pub call_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,
    pub caller_phone: String,
    pub dialed_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<CallOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complaint_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
}

impl From<CallLogDoc> for CallResponse {
    fn from(doc: CallLogDoc) -> Self {
        let duration_seconds = doc.duration_seconds();
        Self {
            call_id: doc.call_id,
            tenant_id: doc.tenant_id,
            caller_phone: doc.caller_phone,
            dialed_number: doc.dialed_number,
            outcome: doc.outcome,
            complaint_id: doc.complaint_id,
            room_id: doc.room_id,
            started_at: doc.started_at,
            ended_at: doc.ended_at,
            duration_seconds,
        }
    }
}

/// GET /api/resolve/{number}
pub async fn resolve(state: Arc<AppState>, number: &str) -> Response<Full<Bytes>> {
    if number.trim().is_empty() {
        return bad_request("dialed number must not be empty");
    }

    match state.call_router.resolve(number).await {
        Ok(route) => json_response(
            StatusCode::OK,
            &serde_json::json!({
                "tenant_id": route.tenant_id,
                "config": route.config,
            }),
        ),
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize)]
struct LogCallBody {
    caller_phone: String,
    dialed_number: String,
    room_id: Option<String>,
}

/// Routed-or-not result of logging an inbound call
#[derive(Serialize)]
struct LogCallResponse {
    routed: bool,
    call: CallResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<TenantConfig>,
}

/// POST /api/calls
///
/// Resolves the dialed number and appends the call record to the owning
/// tenant's log. A number that resolves to no active tenant still gets a
/// record (outcome `unrouted`, already ended) so the miss is auditable;
/// the voice pipeline plays the unavailable message off `routed: false`.
pub async fn log_call(state: Arc<AppState>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let body: LogCallBody = match read_json(req).await {
        Ok(b) => b,
        Err(response) => return response,
    };

    match state.call_router.resolve(&body.dialed_number).await {
        Ok(route) => {
            let partition = match state.partitions.partition(route.tenant_id) {
                Ok(p) => p,
                Err(e) => return error_response(&e),
            };

            let doc = CallLogDoc::new(
                Some(route.tenant_id),
                body.caller_phone,
                body.dialed_number,
                body.room_id,
            );
            match partition.calls.log_call(doc).await {
                Ok(call) => json_response(
                    StatusCode::CREATED,
                    &LogCallResponse {
                        routed: true,
                        call: CallResponse::from(call),
                        config: Some(route.config),
                    },
                ),
                Err(e) => error_response(&e),
            }
        }
        Err(_) => {
            // Routing miss: record it outside any partition
            let mut doc = CallLogDoc::new(None, body.caller_phone, body.dialed_number, body.room_id);
            doc.outcome = Some(CallOutcome::Unrouted);
            doc.ended_at = Some(Utc::now());

            info!(
                dialed = %doc.dialed_number,
                caller = %doc.caller_phone,
                "Unrouted call"
            );
            if let Some(ref sink) = state.unrouted_calls {
                if let Err(e) = sink
                    .upsert_one(
                        bson::doc! { "call_id": doc.call_id.to_string() },
                        doc.clone(),
                    )
                    .await
                {
                    warn!("Failed to persist unrouted call: {}", e);
                }
            }

            json_response(
                StatusCode::CREATED,
                &LogCallResponse {
                    routed: false,
                    call: CallResponse::from(doc),
                    config: None,
                },
            )
        }
    }
}

#[derive(Deserialize)]
struct FinishCallBody {
    outcome: String,
    complaint_id: Option<Uuid>,
}

/// POST /api/calls/{id}/finish
pub async fn finish(
    state: Arc<AppState>,
    call_id: Uuid,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let body: FinishCallBody = match read_json(req).await {
        Ok(b) => b,
        Err(response) => return response,
    };

    let Some(outcome) = parse_outcome(&body.outcome) else {
        return bad_request(&format!("unknown outcome: {}", body.outcome));
    };

    let partition = match state.partitions.partition_for_call(call_id) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };

    match partition
        .calls
        .finish(call_id, outcome, body.complaint_id)
        .await
    {
        Ok(call) => json_response(StatusCode::OK, &CallResponse::from(call)),
        Err(e) => error_response(&e),
    }
}

/// GET /api/tenants/{id}/calls
pub fn list(state: Arc<AppState>, tenant_id: Uuid) -> Response<Full<Bytes>> {
    let partition = match state.partitions.partition(tenant_id) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };

    let calls: Vec<CallResponse> = partition
        .calls
        .list()
        .into_iter()
        .map(CallResponse::from)
        .collect();
    json_response(
        StatusCode::OK,
        &serde_json::json!({
            "calls": calls,
            "outcomes": partition.calls.outcome_counts(),
        }),
    )
}

pub(crate) fn parse_outcome(s: &str) -> Option<CallOutcome> {
    match s {
        "completed" => Some(CallOutcome::Completed),
        "no_answer" => Some(CallOutcome::NoAnswer),
        "busy" => Some(CallOutcome::Busy),
        "failed" => Some(CallOutcome::Failed),
        "unrouted" => Some(CallOutcome::Unrouted),
        _ => None,
    }
}
