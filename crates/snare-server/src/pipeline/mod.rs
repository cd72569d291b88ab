//! Exchange processing pipeline.
//!
//! Ties capture, matching, script execution, and execution tracking
//! together. One call processes one HTTP exchange (or one TCP chunk) start
//! to finish, synchronously; the listener layer moves these calls off the
//! async runtime with `spawn_blocking`.

use crate::model::{
    Exchange, ExchangeStatus, ExecutionRecord, ExecutionStatus, ResponseSnapshot,
};
use crate::routing::match_handlers;
use crate::scripting::{
    dynamic_to_json, execute_handler_script, JwtEnv, ResponseState, ScriptRequest,
};
use crate::store::{CaptureStore, StoreError};
use chrono::Utc;
use rhai::{Dynamic, Map};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

/// Result of running one TCP chunk through the handler.
pub struct TcpChunkOutcome {
    /// Bytes to write back to the socket, in queue order.
    pub writes: Vec<Vec<u8>>,
    /// The `locals` map to carry into the next chunk of this connection.
    pub locals: Map,
    /// Formatted script error, if the handler threw.
    pub error: Option<String>,
}

pub struct Pipeline {
    store: Arc<dyn CaptureStore>,
    /// Set on shutdown; in-flight scripts observe it via the engine
    /// progress hook and terminate.
    shutdown: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(store: Arc<dyn CaptureStore>) -> Self {
        Self {
            store,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn store(&self) -> &Arc<dyn CaptureStore> {
        &self.store
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Process one captured HTTP request end to end.
    ///
    /// The exchange is persisted `Running` before any handler runs, every
    /// matched handler gets an execution record, and the exchange is
    /// finalized exactly once. Returns the response to write to the client.
    pub fn run_http_exchange(&self, exchange: Exchange) -> Result<ResponseSnapshot, StoreError> {
        self.store.create_exchange(exchange.clone())?;

        // Fresh registry snapshot per exchange, so definition changes
        // apply to the next request without a restart.
        let registry = self.store.list_handlers()?;
        let method = exchange.method.as_deref().unwrap_or("");
        let path = exchange.path.as_deref().unwrap_or("/");
        let matched = match_handlers(&registry, method, path);

        tracing::debug!(
            exchange = %exchange.id,
            method,
            path,
            matched = matched.len(),
            "dispatching exchange"
        );

        let response = Arc::new(Mutex::new(ResponseState::default_response()));
        let mut locals = Map::new();
        let mut failure: Option<String> = None;

        for (position, (handler, params)) in matched.into_iter().enumerate() {
            let mut record = ExecutionRecord::running(handler.id, exchange.id, position as i64);
            self.store.create_execution(record.clone())?;

            let request = ScriptRequest::from_exchange(&exchange, params);
            let jwt_env = JwtEnv {
                auth_header: exchange.header("authorization").map(String::from),
                jwks: handler.jwks.clone(),
            };
            let outcome = execute_handler_script(
                &handler.code,
                &request,
                Arc::clone(&response),
                locals,
                jwt_env,
                Some(Arc::clone(&self.shutdown)),
            );
            locals = outcome.locals;

            record.console_output = outcome.console_output;
            record.locals_snapshot = locals_snapshot(&locals);
            match outcome.result {
                Ok(()) => record.status = ExecutionStatus::Success,
                Err(message) => {
                    tracing::warn!(
                        exchange = %exchange.id,
                        handler = %handler.id,
                        error = %message,
                        "handler script failed"
                    );
                    record.status = ExecutionStatus::Error;
                    record.error_message = Some(message.clone());
                    failure = Some(message);
                }
            }
            self.store.update_execution(record)?;

            // First failure short-circuits the chain.
            if failure.is_some() {
                break;
            }
        }

        let mut state = {
            let guard = response.lock().unwrap_or_else(|e| e.into_inner());
            guard.clone()
        };

        let status = if let Some(message) = &failure {
            state.status = 500;
            state.set_header("Content-Type", "application/json");
            state.body = Some(
                serde_json::to_vec(&serde_json::json!({ "error": message }))
                    .unwrap_or_else(|_| b"{\"error\":\"handler failed\"}".to_vec()),
            );
            ExchangeStatus::Error
        } else {
            ExchangeStatus::Complete
        };

        let snapshot = ResponseSnapshot {
            status: state.status,
            headers: state.headers,
            body: state.body,
            responded_at: Utc::now(),
        };
        self.store
            .finalize_exchange(exchange.id, status, snapshot.clone())?;
        Ok(snapshot)
    }

    /// Run one inbound TCP chunk through the active handler.
    ///
    /// With no enabled handler the chunk passes through silently: no
    /// execution record, no writes. A script error is recorded but does not
    /// tear down the connection; the caller decides what to do with it.
    pub fn run_tcp_chunk(
        &self,
        exchange: &Exchange,
        chunk: Vec<u8>,
        locals: Map,
        sequence: i64,
    ) -> Result<TcpChunkOutcome, StoreError> {
        let handler = match self.store.active_tcp_handler()? {
            Some(handler) => handler,
            None => {
                return Ok(TcpChunkOutcome {
                    writes: Vec::new(),
                    locals,
                    error: None,
                })
            }
        };

        let mut record = ExecutionRecord::running(handler.id, exchange.id, sequence);
        self.store.create_execution(record.clone())?;

        let mut request = ScriptRequest::from_exchange(exchange, Default::default());
        request.tcp_bytes = Some(chunk);
        let response = Arc::new(Mutex::new(ResponseState::default_response()));

        let outcome = execute_handler_script(
            &handler.code,
            &request,
            Arc::clone(&response),
            locals,
            JwtEnv::default(),
            Some(Arc::clone(&self.shutdown)),
        );

        record.console_output = outcome.console_output;
        record.locals_snapshot = locals_snapshot(&outcome.locals);
        let error = match outcome.result {
            Ok(()) => {
                record.status = ExecutionStatus::Success;
                None
            }
            Err(message) => {
                tracing::warn!(
                    exchange = %exchange.id,
                    handler = %handler.id,
                    error = %message,
                    "tcp handler script failed"
                );
                record.status = ExecutionStatus::Error;
                record.error_message = Some(message.clone());
                Some(message)
            }
        };
        self.store.update_execution(record)?;

        let writes = {
            let guard = response.lock().unwrap_or_else(|e| e.into_inner());
            guard.tcp_writes.clone()
        };
        Ok(TcpChunkOutcome {
            writes,
            locals: outcome.locals,
            error,
        })
    }

    /// Close out a TCP exchange when the peer disconnects.
    pub fn finalize_tcp_exchange(&self, exchange_id: uuid::Uuid) -> Result<(), StoreError> {
        self.store.finalize_exchange(
            exchange_id,
            ExchangeStatus::Complete,
            ResponseSnapshot {
                status: 200,
                headers: Vec::new(),
                body: None,
                responded_at: Utc::now(),
            },
        )
    }
}

fn locals_snapshot(locals: &Map) -> Option<serde_json::Value> {
    if locals.is_empty() {
        return None;
    }
    Some(dynamic_to_json(Dynamic::from(locals.clone())))
}
