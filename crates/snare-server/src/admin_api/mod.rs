//! Admin API: handler definition management, captured traffic inspection,
//! archival, and sharing. Runs on its own listener, separate from capture.

pub mod handlers;
pub mod router;
pub mod server;
pub mod types;

pub use server::AdminApiServer;

use crate::events::EventBus;
use crate::store::CaptureStore;
use std::sync::Arc;

/// Shared state handed to every admin route.
#[derive(Clone)]
pub struct AdminState {
    pub store: Arc<dyn CaptureStore>,
    pub events: EventBus,
}

impl AdminState {
    pub fn new(store: Arc<dyn CaptureStore>, events: EventBus) -> Self {
        Self { store, events }
    }
}
