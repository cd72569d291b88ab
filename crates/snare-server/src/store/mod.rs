//! Persistence port for captured traffic.
//!
//! The pipeline, admin API, and registry all depend on the [`CaptureStore`]
//! trait rather than a storage technology. The in-memory backend is the
//! default; other backends only need to honor the same contract.

mod memory;
pub use memory::MemoryStore;

use crate::model::{
    Direction, Exchange, ExchangeStatus, ExecutionRecord, HandlerDefinition, ResponseSnapshot,
    TcpHandlerDefinition,
};
use uuid::Uuid;

/// Persistence errors surfaced to the calling layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Listing filter for exchanges.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExchangeFilter {
    pub direction: Option<Direction>,
    /// `Some(true)` = archived only, `Some(false)` = active only.
    pub archived: Option<bool>,
}

/// Storage contract for exchanges, handler definitions, and execution
/// records. Bulk operations are atomic: all rows affected or none.
pub trait CaptureStore: Send + Sync {
    // ----- Exchanges -----

    fn create_exchange(&self, exchange: Exchange) -> Result<(), StoreError>;

    fn get_exchange(&self, id: Uuid) -> Result<Exchange, StoreError>;

    fn get_shared_exchange(&self, shared_id: &str) -> Result<Exchange, StoreError>;

    fn list_exchanges(&self, filter: ExchangeFilter) -> Result<Vec<Exchange>, StoreError>;

    /// Record the final response and move the exchange out of `Running`.
    /// Allowed exactly once per exchange.
    fn finalize_exchange(
        &self,
        id: Uuid,
        status: ExchangeStatus,
        response: ResponseSnapshot,
    ) -> Result<(), StoreError>;

    fn delete_exchange(&self, id: Uuid) -> Result<(), StoreError>;

    /// Append captured bytes to a running exchange's body. Used by the TCP
    /// listener as chunks arrive.
    fn append_exchange_data(&self, id: Uuid, chunk: &[u8]) -> Result<(), StoreError>;

    /// Atomic bulk archive: fails without side effects if any id is unknown.
    fn archive_exchanges(&self, ids: &[Uuid]) -> Result<(), StoreError>;

    /// Atomic bulk unarchive.
    fn unarchive_exchanges(&self, ids: &[Uuid]) -> Result<(), StoreError>;

    /// Atomic bulk delete.
    fn delete_exchanges(&self, ids: &[Uuid]) -> Result<(), StoreError>;

    /// Assign (or return the existing) public share id for an exchange.
    fn share_exchange(&self, id: Uuid) -> Result<String, StoreError>;

    // ----- Handler registry -----

    /// All HTTP handler definitions in registry (insertion) order.
    fn list_handlers(&self) -> Result<Vec<HandlerDefinition>, StoreError>;

    fn get_handler(&self, id: Uuid) -> Result<HandlerDefinition, StoreError>;

    fn create_handler(&self, definition: HandlerDefinition) -> Result<(), StoreError>;

    /// Replace an existing definition, bumping its version.
    fn update_handler(&self, definition: HandlerDefinition) -> Result<(), StoreError>;

    fn delete_handler(&self, id: Uuid) -> Result<(), StoreError>;

    /// The TCP handler definition, if one has been configured.
    fn get_tcp_handler(&self) -> Result<Option<TcpHandlerDefinition>, StoreError>;

    /// The enabled TCP handler, single-or-none.
    fn active_tcp_handler(&self) -> Result<Option<TcpHandlerDefinition>, StoreError> {
        Ok(self.get_tcp_handler()?.filter(|h| h.enabled))
    }

    fn set_tcp_handler(&self, definition: TcpHandlerDefinition) -> Result<(), StoreError>;

    // ----- Execution records -----

    fn create_execution(&self, record: ExecutionRecord) -> Result<(), StoreError>;

    /// Replace a record that is still `Running` with its final state.
    fn update_execution(&self, record: ExecutionRecord) -> Result<(), StoreError>;

    /// Records for one exchange, ascending by sequence position.
    fn list_executions(&self, exchange_id: Uuid) -> Result<Vec<ExecutionRecord>, StoreError>;
}
