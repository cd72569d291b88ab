//! Request/response types and response helpers for the Admin API.

use crate::model::{Exchange, ExecutionRecord, HandlerDefinition, JwksConfig};
use crate::store::StoreError;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorDetail>,
}

/// Individual error detail
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// Body for creating or replacing an HTTP handler definition.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerRequest {
    pub name: String,
    pub code: String,
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub jwks: Option<JwksConfig>,
}

impl HandlerRequest {
    pub fn into_definition(self, id: Uuid, version: i64) -> HandlerDefinition {
        HandlerDefinition {
            id,
            version,
            name: self.name,
            code: self.code,
            method: self.method,
            path: self.path,
            order: self.order,
            jwks: self.jwks,
        }
    }
}

/// Body for replacing the TCP handler definition.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TcpHandlerRequest {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub enabled: bool,
}

/// Body for the bulk exchange operations.
#[derive(Debug, Deserialize)]
pub struct BulkIdsRequest {
    pub ids: Vec<Uuid>,
}

/// One exchange together with its execution records.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeDetail {
    #[serde(flatten)]
    pub exchange: Exchange,
    pub executions: Vec<ExecutionRecord>,
}

/// Response for a successful share request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareResponse {
    pub shared_id: String,
}

/// Query parameters accepted by `GET /exchanges`.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExchangeQueryParams {
    pub direction: Option<String>,
    pub archived: Option<bool>,
}

impl ExchangeQueryParams {
    /// Parse query parameters from query string
    pub fn parse(query: Option<&str>) -> Self {
        let mut params = Self::default();
        for pair in query.unwrap_or("").split('&') {
            match pair.split_once('=') {
                Some(("direction", value)) => params.direction = Some(value.to_string()),
                Some(("archived", value)) => params.archived = value.parse().ok(),
                _ => {}
            }
        }
        params
    }
}

/// Create a JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string_pretty(body).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap_or_else(|_| {
            // Should never happen with a valid StatusCode
            Response::new(Full::new(Bytes::from("Internal Server Error")))
        })
}

/// Create an empty response with just a status code
pub fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from("Internal Server Error"))))
}

/// Create an error response
pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let error = ErrorResponse {
        errors: vec![ErrorDetail {
            code: status.as_str().to_string(),
            message: message.to_string(),
        }],
    };
    json_response(status, &error)
}

/// Create a not found response
pub fn not_found() -> Response<Full<Bytes>> {
    error_response(StatusCode::NOT_FOUND, "Not Found")
}

/// Map a storage error onto an API response.
pub fn store_error_response(err: StoreError) -> Response<Full<Bytes>> {
    match &err {
        StoreError::NotFound { .. } => error_response(StatusCode::NOT_FOUND, &err.to_string()),
        StoreError::InvalidTransition(_) => {
            error_response(StatusCode::CONFLICT, &err.to_string())
        }
        StoreError::Backend(_) => {
            tracing::error!(error = %err, "storage backend failure in admin api");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage backend failure")
        }
    }
}

/// Collect request body into bytes
pub async fn collect_body(req: Request<Incoming>) -> Result<Bytes, String> {
    use http_body_util::BodyExt;
    req.collect()
        .await
        .map(|c| c.to_bytes())
        .map_err(|e| format!("Failed to read request body: {e}"))
}

/// Collect and deserialize a JSON request body, mapping failures onto a 400.
pub async fn parse_json_body<T: serde::de::DeserializeOwned>(
    req: Request<Incoming>,
) -> Result<T, Response<Full<Bytes>>> {
    let bytes = collect_body(req)
        .await
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &e))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &format!("Invalid JSON body: {e}")))
}
