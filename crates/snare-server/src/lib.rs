//! Programmable traffic interception server.
//!
//! Captures HTTP requests and raw TCP traffic, runs operator-authored
//! scripts against each exchange, tracks every handler invocation, and
//! serves an admin API for managing handlers and inspecting captures.

pub mod admin_api;
pub mod auth;
pub mod config;
pub mod events;
pub mod model;
pub mod pipeline;
pub mod routing;
pub mod scripting;
pub mod server;
pub mod store;
