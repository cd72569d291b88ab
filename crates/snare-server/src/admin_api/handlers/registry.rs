//! Handler definition endpoints: the HTTP handler registry and the single
//! TCP handler slot.

use crate::admin_api::types::{
    empty_response, error_response, json_response, parse_json_body, store_error_response,
    HandlerRequest, TcpHandlerRequest,
};
use crate::admin_api::AdminState;
use crate::model::TcpHandlerDefinition;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde_json::json;
use uuid::Uuid;

/// GET /handlers
pub fn handle_list(state: &AdminState) -> Response<Full<Bytes>> {
    match state.store.list_handlers() {
        Ok(handlers) => json_response(StatusCode::OK, &json!({ "handlers": handlers })),
        Err(e) => store_error_response(e),
    }
}

/// POST /handlers
pub async fn handle_create(
    req: Request<Incoming>,
    state: &AdminState,
) -> Response<Full<Bytes>> {
    let body: HandlerRequest = match parse_json_body(req).await {
        Ok(body) => body,
        Err(resp) => return resp,
    };
    if let Err(message) = validate_handler_request(&body) {
        return error_response(StatusCode::BAD_REQUEST, &message);
    }

    let definition = body.into_definition(Uuid::new_v4(), 0);
    if let Err(e) = state.store.create_handler(definition.clone()) {
        return store_error_response(e);
    }
    tracing::info!(handler = %definition.id, name = %definition.name, "handler created");
    json_response(StatusCode::CREATED, &definition)
}

/// GET /handlers/:id
pub fn handle_get(id: Uuid, state: &AdminState) -> Response<Full<Bytes>> {
    match state.store.get_handler(id) {
        Ok(definition) => json_response(StatusCode::OK, &definition),
        Err(e) => store_error_response(e),
    }
}

/// PUT /handlers/:id
pub async fn handle_update(
    id: Uuid,
    req: Request<Incoming>,
    state: &AdminState,
) -> Response<Full<Bytes>> {
    let body: HandlerRequest = match parse_json_body(req).await {
        Ok(body) => body,
        Err(resp) => return resp,
    };
    if let Err(message) = validate_handler_request(&body) {
        return error_response(StatusCode::BAD_REQUEST, &message);
    }

    // The store bumps the version; the one sent here is discarded.
    if let Err(e) = state.store.update_handler(body.into_definition(id, 0)) {
        return store_error_response(e);
    }
    match state.store.get_handler(id) {
        Ok(definition) => {
            tracing::info!(handler = %id, version = definition.version, "handler updated");
            json_response(StatusCode::OK, &definition)
        }
        Err(e) => store_error_response(e),
    }
}

/// DELETE /handlers/:id
pub fn handle_delete(id: Uuid, state: &AdminState) -> Response<Full<Bytes>> {
    match state.store.delete_handler(id) {
        Ok(()) => {
            tracing::info!(handler = %id, "handler deleted");
            empty_response(StatusCode::NO_CONTENT)
        }
        Err(e) => store_error_response(e),
    }
}

/// GET /tcp-handler
pub fn handle_get_tcp(state: &AdminState) -> Response<Full<Bytes>> {
    match state.store.get_tcp_handler() {
        Ok(definition) => json_response(StatusCode::OK, &json!({ "tcpHandler": definition })),
        Err(e) => store_error_response(e),
    }
}

/// PUT /tcp-handler
pub async fn handle_put_tcp(
    req: Request<Incoming>,
    state: &AdminState,
) -> Response<Full<Bytes>> {
    let body: TcpHandlerRequest = match parse_json_body(req).await {
        Ok(body) => body,
        Err(resp) => return resp,
    };
    if body.code.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "'code' must not be empty");
    }

    // Replacing keeps the existing id so execution records stay linked.
    let id = match state.store.get_tcp_handler() {
        Ok(existing) => existing.map(|h| h.id).unwrap_or_else(Uuid::new_v4),
        Err(e) => return store_error_response(e),
    };
    let definition = TcpHandlerDefinition {
        id,
        version: 0,
        name: body.name,
        code: body.code,
        enabled: body.enabled,
    };
    if let Err(e) = state.store.set_tcp_handler(definition) {
        return store_error_response(e);
    }
    match state.store.get_tcp_handler() {
        Ok(definition) => json_response(StatusCode::OK, &json!({ "tcpHandler": definition })),
        Err(e) => store_error_response(e),
    }
}

fn validate_handler_request(body: &HandlerRequest) -> Result<(), String> {
    if body.code.trim().is_empty() {
        return Err("'code' must not be empty".to_string());
    }
    if body.path.is_empty() || !body.path.starts_with('/') {
        return Err("'path' must start with '/'".to_string());
    }
    let method_ok = body.method == "*"
        || matches!(
            body.method.to_ascii_uppercase().as_str(),
            "GET" | "HEAD" | "POST" | "PUT" | "DELETE" | "OPTIONS" | "PATCH"
        );
    if !method_ok {
        return Err(format!(
            "'method' must be '*' or an HTTP verb, got '{}'",
            body.method
        ));
    }
    Ok(())
}
