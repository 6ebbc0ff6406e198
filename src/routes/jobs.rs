//! Job assignment endpoints
//!
//! - `POST /api/jobs` - assign a complaint to an officer
//! - `GET /api/jobs/{id}` - single record
//! - `GET /api/tenants/{id}/jobs` - list (officer/status/overdue filters)
//! - `POST /api/jobs/{id}/accept` - officer acknowledges
//! - `POST /api/jobs/{id}/start` - officer starts the work
//! - `POST /api/jobs/{id}/complete` - officer completes with proof

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{bad_request, error_response, json_response, read_json};
use crate::db::schemas::{JobDoc, JobStatus};
use crate::server::AppState;

/// Job record as served by the API
#[derive(Serialize)]
pub struct JobResponse {
    pub job_id: Uuid,
    pub tenant_id: Uuid,
    pub complaint_id: Uuid,
    pub officer_id: Uuid,
    pub deadline: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub status: JobStatus,
    pub overdue: bool,
    pub proof_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<JobDoc> for JobResponse {
    fn from(doc: JobDoc) -> Self {
        Self {
            job_id: doc.job_id,
            tenant_id: doc.tenant_id,
            complaint_id: doc.complaint_id,
            officer_id: doc.officer_id,
            deadline: doc.deadline,
            instructions: doc.instructions,
            status: doc.status,
            overdue: doc.overdue,
            proof_urls: doc.proof_urls,
            completion_notes: doc.completion_notes,
            completed_at: doc.completed_at,
            created_at: doc.created_at,
        }
    }
}

#[derive(Deserialize)]
struct AssignJobBody {
    complaint_id: Uuid,
    officer_id: Uuid,
    deadline: DateTime<Utc>,
    instructions: Option<String>,
}

/// POST /api/jobs
pub async fn assign(state: Arc<AppState>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let body: AssignJobBody = match read_json(req).await {
        Ok(b) => b,
        Err(response) => return response,
    };

    match state
        .lifecycle
        .assign_job(
            body.complaint_id,
            body.officer_id,
            body.deadline,
            body.instructions,
        )
        .await
    {
        Ok(job) => json_response(StatusCode::CREATED, &JobResponse::from(job)),
        Err(e) => error_response(&e),
    }
}

/// GET /api/jobs/{id}
pub fn get(state: Arc<AppState>, job_id: Uuid) -> Response<Full<Bytes>> {
    let partition = match state.partitions.partition_for_job(job_id) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };

    match partition.jobs.get(job_id) {
        Some(job) => json_response(StatusCode::OK, &JobResponse::from(job)),
        None => error_response(&crate::types::NivaranError::not_found(format!(
            "job {}",
            job_id
        ))),
    }
}

/// GET /api/tenants/{id}/jobs
pub fn list(state: Arc<AppState>, tenant_id: Uuid, query: Option<&str>) -> Response<Full<Bytes>> {
    let mut officer_id: Option<Uuid> = None;
    let mut status: Option<JobStatus> = None;
    let mut overdue: Option<bool> = None;

    if let Some(raw) = query {
        for pair in raw.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let value = urlencoding::decode(value).unwrap_or_default();
            match key {
                "officer_id" => match Uuid::parse_str(&value) {
                    Ok(id) => officer_id = Some(id),
                    Err(_) => return bad_request("invalid officer_id filter"),
                },
                "status" => match parse_job_status(&value) {
                    Some(s) => status = Some(s),
                    None => return bad_request(&format!("unknown job status: {}", value)),
                },
                "overdue" => overdue = value.parse().ok(),
                _ => {}
            }
        }
    }

    let partition = match state.partitions.partition(tenant_id) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };

    let jobs: Vec<JobResponse> = partition
        .jobs
        .list(officer_id, status, overdue)
        .into_iter()
        .map(JobResponse::from)
        .collect();
    json_response(StatusCode::OK, &jobs)
}

/// POST /api/jobs/{id}/accept
pub async fn accept(state: Arc<AppState>, job_id: Uuid) -> Response<Full<Bytes>> {
    match state.lifecycle.accept_job(job_id).await {
        Ok(job) => json_response(StatusCode::OK, &JobResponse::from(job)),
        Err(e) => error_response(&e),
    }
}

/// POST /api/jobs/{id}/start
pub async fn start(state: Arc<AppState>, job_id: Uuid) -> Response<Full<Bytes>> {
    match state.lifecycle.start_job(job_id).await {
        Ok(job) => json_response(StatusCode::OK, &JobResponse::from(job)),
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize)]
struct CompleteJobBody {
    proof_urls: Vec<String>,
    notes: Option<String>,
}

/// POST /api/jobs/{id}/complete
pub async fn complete(
    state: Arc<AppState>,
    job_id: Uuid,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let body: CompleteJobBody = match read_json(req).await {
        Ok(b) => b,
        Err(response) => return response,
    };

    match state
        .lifecycle
        .complete_job(job_id, body.proof_urls, body.notes)
        .await
    {
        Ok(job) => json_response(StatusCode::OK, &JobResponse::from(job)),
        Err(e) => error_response(&e),
    }
}

pub(crate) fn parse_job_status(s: &str) -> Option<JobStatus> {
    match s {
        "assigned" => Some(JobStatus::Assigned),
        "accepted" => Some(JobStatus::Accepted),
        "in_progress" => Some(JobStatus::InProgress),
        "completed" => Some(JobStatus::Completed),
        "superseded" => Some(JobStatus::Superseded),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_job_status() {
        assert_eq!(parse_job_status("in_progress"), Some(JobStatus::InProgress));
        assert_eq!(parse_job_status("superseded"), Some(JobStatus::Superseded));
        assert_eq!(parse_job_status("done"), None);
    }
}
