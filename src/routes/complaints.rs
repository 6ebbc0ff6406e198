//! Complaint endpoints
//!
//! - `POST /api/tenants/{id}/complaints` - file a complaint
//! - `GET /api/tenants/{id}/complaints` - list with filters, search,
//!   sort and pagination
//! - `GET /api/tenants/{id}/complaints/stats` - totals by status/issue
//! - `GET /api/complaints/{id}` - single record
//! - `POST /api/complaints/{id}/verify` - staff confirms resolution
//! - `POST /api/complaints/{id}/close` - close a verified complaint
//! - `GET /api/issue-types` - classification catalogue for the voice
//!   pipeline

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{bad_request, error_response, json_response, read_json};
use crate::db::schemas::{ComplaintDoc, ComplaintStatus, IssueType};
use crate::server::AppState;
use crate::store::{ComplaintQuery, NewComplaint, SortDirection, SortField};

/// Complaint record as served by the API
#[derive(Serialize)]
pub struct ComplaintResponse {
    pub complaint_id: Uuid,
    pub tenant_id: Uuid,
    pub complaint_number: String,
    pub citizen_name: String,
    pub citizen_phone: String,
    pub issue_type: IssueType,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landmark: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    pub status: ComplaintStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ComplaintDoc> for ComplaintResponse {
    fn from(doc: ComplaintDoc) -> Self {
        Self {
            complaint_id: doc.complaint_id,
            tenant_id: doc.tenant_id,
            complaint_number: doc.complaint_number,
            citizen_name: doc.citizen_name,
            citizen_phone: doc.citizen_phone,
            issue_type: doc.issue_type,
            description: doc.description,
            location: doc.location,
            landmark: doc.landmark,
            audio_url: doc.audio_url,
            transcript: doc.transcript,
            status: doc.status,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }
    }
}

#[derive(Deserialize)]
struct CreateComplaintBody {
    citizen_name: String,
    citizen_phone: String,
    issue_type: String,
    description: String,
    location: Option<String>,
    landmark: Option<String>,
    audio_url: Option<String>,
    transcript: Option<String>,
    /// Voice path: coerce an unrecognized issue type to `other` instead
    /// of rejecting the complaint
    #[serde(default)]
    lenient: bool,
}

/// POST /api/tenants/{id}/complaints
pub async fn create(
    state: Arc<AppState>,
    tenant_id: Uuid,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let body: CreateComplaintBody = match read_json(req).await {
        Ok(b) => b,
        Err(response) => return response,
    };

    let Some(issue_type) = IssueType::parse(&body.issue_type, body.lenient) else {
        return bad_request(&format!("unknown issue_type: {}", body.issue_type));
    };

    let fields = NewComplaint {
        citizen_name: body.citizen_name,
        citizen_phone: body.citizen_phone,
        issue_type,
        description: body.description,
        location: body.location,
        landmark: body.landmark,
        audio_url: body.audio_url,
        transcript: body.transcript,
    };

    match state.lifecycle.create_complaint(tenant_id, fields).await {
        Ok(complaint) => json_response(StatusCode::CREATED, &ComplaintResponse::from(complaint)),
        Err(e) => error_response(&e),
    }
}

/// GET /api/tenants/{id}/complaints
pub fn list(state: Arc<AppState>, tenant_id: Uuid, query: Option<&str>) -> Response<Full<Bytes>> {
    let query = match query_from_string(query) {
        Ok(q) => q,
        Err(message) => return bad_request(&message),
    };

    let partition = match state.partitions.partition(tenant_id) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };

    let complaints: Vec<ComplaintResponse> = partition
        .complaints
        .list(&query)
        .into_iter()
        .map(ComplaintResponse::from)
        .collect();
    json_response(StatusCode::OK, &complaints)
}

/// GET /api/tenants/{id}/complaints/stats
pub fn stats(state: Arc<AppState>, tenant_id: Uuid) -> Response<Full<Bytes>> {
    match state.partitions.partition(tenant_id) {
        Ok(partition) => json_response(StatusCode::OK, &partition.complaints.stats()),
        Err(e) => error_response(&e),
    }
}

/// GET /api/complaints/{id}
pub fn get(state: Arc<AppState>, complaint_id: Uuid) -> Response<Full<Bytes>> {
    let partition = match state.partitions.partition_for_complaint(complaint_id) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };

    match partition.complaints.get(complaint_id) {
        Some(complaint) => json_response(StatusCode::OK, &ComplaintResponse::from(complaint)),
        None => error_response(&crate::types::NivaranError::not_found(format!(
            "complaint {}",
            complaint_id
        ))),
    }
}

/// POST /api/complaints/{id}/verify
pub async fn verify(state: Arc<AppState>, complaint_id: Uuid) -> Response<Full<Bytes>> {
    match state.lifecycle.verify_complaint(complaint_id).await {
        Ok(complaint) => json_response(StatusCode::OK, &ComplaintResponse::from(complaint)),
        Err(e) => error_response(&e),
    }
}

/// POST /api/complaints/{id}/close
pub async fn close(state: Arc<AppState>, complaint_id: Uuid) -> Response<Full<Bytes>> {
    match state.lifecycle.close_complaint(complaint_id).await {
        Ok(complaint) => json_response(StatusCode::OK, &ComplaintResponse::from(complaint)),
        Err(e) => error_response(&e),
    }
}

/// GET /api/issue-types
///
/// The classification catalogue the voice pipeline builds its prompt from.
pub fn issue_types() -> Response<Full<Bytes>> {
    let catalogue: Vec<serde_json::Value> = IssueType::CATALOGUE
        .iter()
        .map(|(issue_type, description)| {
            serde_json::json!({
                "issue_type": issue_type.as_str(),
                "description": description,
            })
        })
        .collect();
    json_response(StatusCode::OK, &catalogue)
}

pub(crate) fn parse_status(s: &str) -> Option<ComplaintStatus> {
    match s {
        "new" => Some(ComplaintStatus::New),
        "assigned" => Some(ComplaintStatus::Assigned),
        "in_progress" => Some(ComplaintStatus::InProgress),
        "completed" => Some(ComplaintStatus::Completed),
        "verified" => Some(ComplaintStatus::Verified),
        "closed" => Some(ComplaintStatus::Closed),
        _ => None,
    }
}

/// Build a listing query from the raw query string
fn query_from_string(query: Option<&str>) -> Result<ComplaintQuery, String> {
    let mut q = ComplaintQuery::default();

    let Some(raw) = query else {
        return Ok(q);
    };

    for pair in raw.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let value = urlencoding::decode(value).unwrap_or_default();

        match key {
            "issue_type" => {
                q.issue_type = Some(
                    IssueType::parse(&value, false)
                        .ok_or_else(|| format!("unknown issue_type: {}", value))?,
                )
            }
            "status" => {
                q.status =
                    Some(parse_status(&value).ok_or_else(|| format!("unknown status: {}", value))?)
            }
            "from" => {
                q.from = Some(
                    DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| format!("invalid from timestamp: {}", value))?
                        .with_timezone(&Utc),
                )
            }
            "to" => {
                q.to = Some(
                    DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| format!("invalid to timestamp: {}", value))?
                        .with_timezone(&Utc),
                )
            }
            "search" => q.search = Some(value.into_owned()),
            "sort_by" => {
                q.sort_by = match value.as_ref() {
                    "created_at" => SortField::CreatedAt,
                    "status" => SortField::Status,
                    "issue_type" => SortField::IssueType,
                    other => return Err(format!("unknown sort_by: {}", other)),
                }
            }
            "sort_dir" => {
                q.direction = match value.as_ref() {
                    "asc" => SortDirection::Asc,
                    "desc" => SortDirection::Desc,
                    other => return Err(format!("unknown sort_dir: {}", other)),
                }
            }
            "offset" => q.offset = value.parse().unwrap_or(0),
            "limit" => q.limit = value.parse().ok(),
            _ => {}
        }
    }

    Ok(q)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_from_string_full() {
        let q = query_from_string(Some(
            "issue_type=water&status=assigned&search=Anna%20Nagar&sort_by=status&sort_dir=asc&offset=10&limit=20",
        ))
        .unwrap();

        assert_eq!(q.issue_type, Some(IssueType::Water));
        assert_eq!(q.status, Some(ComplaintStatus::Assigned));
        assert_eq!(q.search.as_deref(), Some("Anna Nagar"));
        assert_eq!(q.sort_by, SortField::Status);
        assert_eq!(q.direction, SortDirection::Asc);
        assert_eq!(q.offset, 10);
        assert_eq!(q.limit, Some(20));
    }

    #[test]
    fn test_query_from_string_rejects_unknown_values() {
        assert!(query_from_string(Some("issue_type=pothole")).is_err());
        assert!(query_from_string(Some("status=wip")).is_err());
        assert!(query_from_string(Some("sort_by=priority")).is_err());
        assert!(query_from_string(Some("from=yesterday")).is_err());
    }

    #[test]
    fn test_query_from_string_empty_is_default() {
        let q = query_from_string(None).unwrap();
        assert!(q.issue_type.is_none());
        assert_eq!(q.offset, 0);
        assert!(q.limit.is_none());
    }

    #[test]
    fn test_date_range_parsing() {
        let q = query_from_string(Some("from=2024-01-01T00:00:00Z&to=2024-12-31T23:59:59Z"))
            .unwrap();
        assert!(q.from.unwrap() < q.to.unwrap());
    }
}
