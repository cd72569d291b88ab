//! Route dispatch for the Admin API.

use crate::admin_api::handlers::{exchanges, registry, system};
use crate::admin_api::types::{error_response, not_found};
use crate::admin_api::AdminState;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use tracing::debug;
use uuid::Uuid;

/// Main request router
pub async fn route_request(
    req: Request<Incoming>,
    state: AdminState,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|s| s.to_string());

    debug!("Admin API: {} {}", method, path);

    Ok(route_by_path(&method, &path, query.as_deref(), req, &state).await)
}

async fn route_by_path(
    method: &Method,
    path: &str,
    query: Option<&str>,
    req: Request<Incoming>,
    state: &AdminState,
) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/") => return system::handle_root(),
        (&Method::GET, "/health") => return system::handle_health(),
        _ => {}
    }

    if path == "/handlers" {
        return match *method {
            Method::GET => registry::handle_list(state),
            Method::POST => registry::handle_create(req, state).await,
            _ => not_found(),
        };
    }

    if let Some(rest) = path.strip_prefix("/handlers/") {
        let id = match parse_uuid(rest) {
            Ok(id) => id,
            Err(resp) => return resp,
        };
        return match *method {
            Method::GET => registry::handle_get(id, state),
            Method::PUT => registry::handle_update(id, req, state).await,
            Method::DELETE => registry::handle_delete(id, state),
            _ => not_found(),
        };
    }

    if path == "/tcp-handler" {
        return match *method {
            Method::GET => registry::handle_get_tcp(state),
            Method::PUT => registry::handle_put_tcp(req, state).await,
            _ => not_found(),
        };
    }

    if path == "/exchanges" {
        return match *method {
            Method::GET => exchanges::handle_list(query, state),
            _ => not_found(),
        };
    }

    if let Some(rest) = path.strip_prefix("/exchanges/") {
        return route_exchange(method, rest, req, state).await;
    }

    if let Some(shared_id) = path.strip_prefix("/shared/") {
        return match *method {
            Method::GET => exchanges::handle_get_shared(shared_id, state),
            _ => not_found(),
        };
    }

    not_found()
}

async fn route_exchange(
    method: &Method,
    rest: &str,
    req: Request<Incoming>,
    state: &AdminState,
) -> Response<Full<Bytes>> {
    // Bulk operations share the /exchanges/ prefix with the id routes.
    match (method, rest) {
        (&Method::POST, "archive") => return exchanges::handle_bulk_archive(req, state).await,
        (&Method::POST, "unarchive") => {
            return exchanges::handle_bulk_unarchive(req, state).await
        }
        (&Method::POST, "delete") => return exchanges::handle_bulk_delete(req, state).await,
        _ => {}
    }

    let segments: Vec<&str> = rest.split('/').collect();
    let id = match parse_uuid(segments[0]) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match (method, &segments[1..]) {
        (&Method::GET, []) => exchanges::handle_get(id, state),
        (&Method::DELETE, []) => exchanges::handle_delete(id, state),
        (&Method::POST, ["share"]) => exchanges::handle_share(id, state),
        _ => not_found(),
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, Response<Full<Bytes>>> {
    raw.parse().map_err(|_| {
        error_response(
            StatusCode::BAD_REQUEST,
            &format!("Invalid id '{raw}', expected a UUID"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uuid() {
        assert!(parse_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
        let err = parse_uuid("not-a-uuid").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
