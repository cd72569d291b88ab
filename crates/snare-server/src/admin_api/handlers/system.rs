//! System endpoints.

use crate::admin_api::types::json_response;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde_json::json;

/// GET /
pub fn handle_root() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &json!({
            "name": "snare",
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": [
                "/health",
                "/handlers",
                "/tcp-handler",
                "/exchanges",
                "/shared/:sharedId",
            ],
        }),
    )
}

/// GET /health
pub fn handle_health() -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &json!({ "status": "ok" }))
}
