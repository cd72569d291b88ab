//! Admin API request handlers.

pub mod exchanges;
pub mod registry;
pub mod system;
