//! In-memory implementation of the persistence port.
//!
//! All state lives behind a single mutex, which makes the bulk operations
//! trivially atomic. Useful for testing, development, and single-instance
//! deployments.

use super::{CaptureStore, ExchangeFilter, StoreError};
use crate::model::{
    Exchange, ExchangeStatus, ExecutionRecord, ExecutionStatus, HandlerDefinition,
    ResponseSnapshot, TcpHandlerDefinition,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct State {
    exchanges: HashMap<Uuid, Exchange>,
    /// Registry order is insertion order; ties in `order` resolve by it.
    handlers: Vec<HandlerDefinition>,
    tcp_handler: Option<TcpHandlerDefinition>,
    executions: HashMap<Uuid, ExecutionRecord>,
}

pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // Lock poisoning only happens if another thread panicked while
        // holding the guard; recover the data rather than cascading.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureStore for MemoryStore {
    fn create_exchange(&self, exchange: Exchange) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.exchanges.insert(exchange.id, exchange);
        Ok(())
    }

    fn get_exchange(&self, id: Uuid) -> Result<Exchange, StoreError> {
        let state = self.lock();
        state
            .exchanges
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("exchange", id))
    }

    fn get_shared_exchange(&self, shared_id: &str) -> Result<Exchange, StoreError> {
        let state = self.lock();
        state
            .exchanges
            .values()
            .find(|e| e.shared_id.as_deref() == Some(shared_id))
            .cloned()
            .ok_or_else(|| StoreError::not_found("shared exchange", shared_id))
    }

    fn list_exchanges(&self, filter: ExchangeFilter) -> Result<Vec<Exchange>, StoreError> {
        let state = self.lock();
        let mut exchanges: Vec<Exchange> = state
            .exchanges
            .values()
            .filter(|e| filter.direction.map_or(true, |d| e.direction == d))
            .filter(|e| {
                filter
                    .archived
                    .map_or(true, |want| e.archived_at.is_some() == want)
            })
            .cloned()
            .collect();
        // Newest first
        exchanges.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        Ok(exchanges)
    }

    fn finalize_exchange(
        &self,
        id: Uuid,
        status: ExchangeStatus,
        response: ResponseSnapshot,
    ) -> Result<(), StoreError> {
        if status == ExchangeStatus::Running {
            return Err(StoreError::InvalidTransition(
                "cannot finalize an exchange back to running".to_string(),
            ));
        }
        let mut state = self.lock();
        let exchange = state
            .exchanges
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("exchange", id))?;
        if exchange.status != ExchangeStatus::Running {
            return Err(StoreError::InvalidTransition(format!(
                "exchange {id} already finalized"
            )));
        }
        exchange.status = status;
        exchange.response = Some(response);
        Ok(())
    }

    fn delete_exchange(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.lock();
        state
            .exchanges
            .remove(&id)
            .ok_or_else(|| StoreError::not_found("exchange", id))?;
        state.executions.retain(|_, r| r.exchange_id != id);
        Ok(())
    }

    fn append_exchange_data(&self, id: Uuid, chunk: &[u8]) -> Result<(), StoreError> {
        let mut state = self.lock();
        let exchange = state
            .exchanges
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("exchange", id))?;
        if exchange.status != ExchangeStatus::Running {
            return Err(StoreError::InvalidTransition(format!(
                "exchange {id} already finalized"
            )));
        }
        exchange
            .body
            .get_or_insert_with(Vec::new)
            .extend_from_slice(chunk);
        Ok(())
    }

    fn archive_exchanges(&self, ids: &[Uuid]) -> Result<(), StoreError> {
        let mut state = self.lock();
        // Validate first so the operation is all-or-nothing.
        for id in ids {
            if !state.exchanges.contains_key(id) {
                return Err(StoreError::not_found("exchange", *id));
            }
        }
        let now = Utc::now();
        for id in ids {
            if let Some(exchange) = state.exchanges.get_mut(id) {
                exchange.archived_at.get_or_insert(now);
            }
        }
        Ok(())
    }

    fn unarchive_exchanges(&self, ids: &[Uuid]) -> Result<(), StoreError> {
        let mut state = self.lock();
        for id in ids {
            if !state.exchanges.contains_key(id) {
                return Err(StoreError::not_found("exchange", *id));
            }
        }
        for id in ids {
            if let Some(exchange) = state.exchanges.get_mut(id) {
                exchange.archived_at = None;
            }
        }
        Ok(())
    }

    fn delete_exchanges(&self, ids: &[Uuid]) -> Result<(), StoreError> {
        let mut state = self.lock();
        for id in ids {
            if !state.exchanges.contains_key(id) {
                return Err(StoreError::not_found("exchange", *id));
            }
        }
        for id in ids {
            state.exchanges.remove(id);
        }
        state
            .executions
            .retain(|_, r| !ids.contains(&r.exchange_id));
        Ok(())
    }

    fn share_exchange(&self, id: Uuid) -> Result<String, StoreError> {
        let mut state = self.lock();
        let exchange = state
            .exchanges
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("exchange", id))?;
        if let Some(existing) = &exchange.shared_id {
            return Ok(existing.clone());
        }
        let shared_id = Uuid::new_v4().simple().to_string();
        exchange.shared_id = Some(shared_id.clone());
        Ok(shared_id)
    }

    fn list_handlers(&self) -> Result<Vec<HandlerDefinition>, StoreError> {
        Ok(self.lock().handlers.clone())
    }

    fn get_handler(&self, id: Uuid) -> Result<HandlerDefinition, StoreError> {
        self.lock()
            .handlers
            .iter()
            .find(|h| h.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("handler", id))
    }

    fn create_handler(&self, definition: HandlerDefinition) -> Result<(), StoreError> {
        self.lock().handlers.push(definition);
        Ok(())
    }

    fn update_handler(&self, mut definition: HandlerDefinition) -> Result<(), StoreError> {
        let mut state = self.lock();
        let slot = state
            .handlers
            .iter_mut()
            .find(|h| h.id == definition.id)
            .ok_or_else(|| StoreError::not_found("handler", definition.id))?;
        definition.version = slot.version + 1;
        *slot = definition;
        Ok(())
    }

    fn delete_handler(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.lock();
        let before = state.handlers.len();
        state.handlers.retain(|h| h.id != id);
        if state.handlers.len() == before {
            return Err(StoreError::not_found("handler", id));
        }
        Ok(())
    }

    fn get_tcp_handler(&self) -> Result<Option<TcpHandlerDefinition>, StoreError> {
        Ok(self.lock().tcp_handler.clone())
    }

    fn set_tcp_handler(&self, mut definition: TcpHandlerDefinition) -> Result<(), StoreError> {
        let mut state = self.lock();
        if let Some(existing) = &state.tcp_handler {
            definition.version = existing.version + 1;
        }
        state.tcp_handler = Some(definition);
        Ok(())
    }

    fn create_execution(&self, record: ExecutionRecord) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.executions.insert(record.id, record);
        Ok(())
    }

    fn update_execution(&self, record: ExecutionRecord) -> Result<(), StoreError> {
        let mut state = self.lock();
        let existing = state
            .executions
            .get_mut(&record.id)
            .ok_or_else(|| StoreError::not_found("execution record", record.id))?;
        if existing.status != ExecutionStatus::Running {
            return Err(StoreError::InvalidTransition(format!(
                "execution record {} already finalized",
                record.id
            )));
        }
        *existing = record;
        Ok(())
    }

    fn list_executions(&self, exchange_id: Uuid) -> Result<Vec<ExecutionRecord>, StoreError> {
        let state = self.lock();
        let mut records: Vec<ExecutionRecord> = state
            .executions
            .values()
            .filter(|r| r.exchange_id == exchange_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.order);
        Ok(records)
    }
}
