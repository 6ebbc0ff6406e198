//! HTTP routes for Nivaran

pub mod calls;
pub mod complaints;
pub mod health;
pub mod jobs;
pub mod officers;
pub mod tenants;

pub use health::{health_check, readiness_check, status_check, version_info};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::types::NivaranError;

/// Serialize a value as a JSON response
pub(crate) fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body)
        .unwrap_or_else(|_| r#"{"error":"serialization failed"}"#.to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(json)))
        .unwrap()
}

/// Map a domain error onto its HTTP status and JSON body
pub(crate) fn error_response(err: &NivaranError) -> Response<Full<Bytes>> {
    let status = match err {
        NivaranError::Validation(_) => StatusCode::BAD_REQUEST,
        NivaranError::Conflict(_) => StatusCode::CONFLICT,
        NivaranError::NotFound(_) => StatusCode::NOT_FOUND,
        NivaranError::Dependency(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    json_response(status, &serde_json::json!({ "error": err.to_string() }))
}

/// 400 with a JSON error body
pub(crate) fn bad_request(message: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::BAD_REQUEST,
        &serde_json::json!({ "error": message }),
    )
}

/// Collect and deserialize a JSON request body.
///
/// Returns the ready-made 400 response on failure so handlers can
/// early-return it.
pub(crate) async fn read_json<T: DeserializeOwned>(
    req: Request<Incoming>,
) -> std::result::Result<T, Response<Full<Bytes>>> {
    let bytes = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => return Err(bad_request("failed to read request body")),
    };

    serde_json::from_slice(&bytes).map_err(|e| bad_request(&format!("invalid JSON body: {}", e)))
}

/// Parse a path segment as a UUID
pub(crate) fn parse_uuid(s: &str, what: &str) -> std::result::Result<Uuid, Response<Full<Bytes>>> {
    Uuid::parse_str(s).map_err(|_| bad_request(&format!("invalid {} id", what)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (NivaranError::validation("x"), StatusCode::BAD_REQUEST),
            (NivaranError::conflict("x"), StatusCode::CONFLICT),
            (NivaranError::not_found("x"), StatusCode::NOT_FOUND),
            (NivaranError::dependency("x"), StatusCode::BAD_GATEWAY),
            (
                NivaranError::Database("x".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(error_response(&err).status(), expected);
        }
    }

    #[test]
    fn test_parse_uuid_rejects_garbage() {
        assert!(parse_uuid("not-a-uuid", "tenant").is_err());
        assert!(parse_uuid(&Uuid::new_v4().to_string(), "tenant").is_ok());
    }
}
