//! Captured traffic endpoints: listing, inspection, archival, and sharing.

use crate::admin_api::types::{
    empty_response, error_response, json_response, parse_json_body, store_error_response,
    BulkIdsRequest, ExchangeDetail, ExchangeQueryParams, ShareResponse,
};
use crate::admin_api::AdminState;
use crate::events::DomainEvent;
use crate::model::Direction;
use crate::store::ExchangeFilter;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde_json::json;
use uuid::Uuid;

/// GET /exchanges
pub fn handle_list(query: Option<&str>, state: &AdminState) -> Response<Full<Bytes>> {
    let params = ExchangeQueryParams::parse(query);
    let direction = match params.direction.as_deref() {
        None => None,
        Some("http") => Some(Direction::Http),
        Some("tcp") => Some(Direction::Tcp),
        Some(other) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("'direction' must be 'http' or 'tcp', got '{other}'"),
            )
        }
    };
    let filter = ExchangeFilter {
        direction,
        archived: params.archived,
    };
    match state.store.list_exchanges(filter) {
        Ok(exchanges) => json_response(StatusCode::OK, &json!({ "exchanges": exchanges })),
        Err(e) => store_error_response(e),
    }
}

/// GET /exchanges/:id
pub fn handle_get(id: Uuid, state: &AdminState) -> Response<Full<Bytes>> {
    let exchange = match state.store.get_exchange(id) {
        Ok(exchange) => exchange,
        Err(e) => return store_error_response(e),
    };
    let executions = match state.store.list_executions(id) {
        Ok(executions) => executions,
        Err(e) => return store_error_response(e),
    };
    json_response(
        StatusCode::OK,
        &ExchangeDetail {
            exchange,
            executions,
        },
    )
}

/// DELETE /exchanges/:id
pub fn handle_delete(id: Uuid, state: &AdminState) -> Response<Full<Bytes>> {
    let direction = match state.store.get_exchange(id) {
        Ok(exchange) => exchange.direction,
        Err(e) => return store_error_response(e),
    };
    match state.store.delete_exchange(id) {
        Ok(()) => {
            state.events.publish(DomainEvent::deleted(direction, id));
            empty_response(StatusCode::NO_CONTENT)
        }
        Err(e) => store_error_response(e),
    }
}

/// POST /exchanges/archive
pub async fn handle_bulk_archive(
    req: Request<Incoming>,
    state: &AdminState,
) -> Response<Full<Bytes>> {
    bulk_operation(req, state, BulkOp::Archive).await
}

/// POST /exchanges/unarchive
pub async fn handle_bulk_unarchive(
    req: Request<Incoming>,
    state: &AdminState,
) -> Response<Full<Bytes>> {
    bulk_operation(req, state, BulkOp::Unarchive).await
}

/// POST /exchanges/delete
pub async fn handle_bulk_delete(
    req: Request<Incoming>,
    state: &AdminState,
) -> Response<Full<Bytes>> {
    bulk_operation(req, state, BulkOp::Delete).await
}

/// POST /exchanges/:id/share
pub fn handle_share(id: Uuid, state: &AdminState) -> Response<Full<Bytes>> {
    match state.store.share_exchange(id) {
        Ok(shared_id) => json_response(StatusCode::OK, &ShareResponse { shared_id }),
        Err(e) => store_error_response(e),
    }
}

/// GET /shared/:sharedId
pub fn handle_get_shared(shared_id: &str, state: &AdminState) -> Response<Full<Bytes>> {
    let exchange = match state.store.get_shared_exchange(shared_id) {
        Ok(exchange) => exchange,
        Err(e) => return store_error_response(e),
    };
    let executions = match state.store.list_executions(exchange.id) {
        Ok(executions) => executions,
        Err(e) => return store_error_response(e),
    };
    json_response(
        StatusCode::OK,
        &ExchangeDetail {
            exchange,
            executions,
        },
    )
}

#[derive(Clone, Copy)]
enum BulkOp {
    Archive,
    Unarchive,
    Delete,
}

async fn bulk_operation(
    req: Request<Incoming>,
    state: &AdminState,
    op: BulkOp,
) -> Response<Full<Bytes>> {
    let body: BulkIdsRequest = match parse_json_body(req).await {
        Ok(body) => body,
        Err(resp) => return resp,
    };
    if body.ids.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "'ids' must not be empty");
    }

    // Directions are needed for the events; read them before mutating.
    let mut directions = Vec::with_capacity(body.ids.len());
    for id in &body.ids {
        match state.store.get_exchange(*id) {
            Ok(exchange) => directions.push((*id, exchange.direction)),
            Err(e) => return store_error_response(e),
        }
    }

    let result = match op {
        BulkOp::Archive => state.store.archive_exchanges(&body.ids),
        BulkOp::Unarchive => state.store.unarchive_exchanges(&body.ids),
        BulkOp::Delete => state.store.delete_exchanges(&body.ids),
    };
    if let Err(e) = result {
        return store_error_response(e);
    }

    for (id, direction) in directions {
        let event = match op {
            BulkOp::Archive => DomainEvent::archived(direction, id),
            BulkOp::Unarchive => DomainEvent::unarchived(direction, id),
            BulkOp::Delete => DomainEvent::deleted(direction, id),
        };
        state.events.publish(event);
    }
    json_response(StatusCode::OK, &json!({ "affected": body.ids.len() }))
}
