//! Capture listeners: the HTTP surface handlers program against and the
//! raw TCP listener.

pub mod http;
pub mod tcp;

pub use http::CaptureServer;
pub use tcp::TcpCaptureServer;
