//! Persisted entity types: captured exchanges, handler definitions, and
//! per-handler execution records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Direction of a captured exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Http,
    Tcp,
}

/// Lifecycle state of a captured exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeStatus {
    Running,
    Complete,
    Error,
}

/// Final response snapshot recorded when an exchange completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSnapshot {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    #[serde(default, with = "opt_base64", skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<u8>>,
    pub responded_at: DateTime<Utc>,
}

/// One captured HTTP request/response pair or TCP session.
///
/// Once `status` is `Complete`, request fields never change; only archive
/// state, sharing, and the response snapshot move through controlled store
/// operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exchange {
    pub id: Uuid,
    pub direction: Direction,
    pub status: ExchangeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub query: HashMap<String, String>,
    #[serde(default, with = "opt_base64", skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<u8>>,
    pub received_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_id: Option<String>,
}

impl Exchange {
    /// Create a running HTTP exchange from inbound request data.
    #[allow(clippy::too_many_arguments)]
    pub fn new_http(
        method: String,
        url: String,
        path: String,
        remote_addr: Option<String>,
        headers: Vec<(String, String)>,
        query: HashMap<String, String>,
        body: Option<Vec<u8>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            direction: Direction::Http,
            status: ExchangeStatus::Running,
            method: Some(method),
            url: Some(url),
            path: Some(path),
            remote_addr,
            headers,
            query,
            body,
            received_at: Utc::now(),
            response: None,
            archived_at: None,
            shared_id: None,
        }
    }

    /// Create a running TCP connection exchange.
    pub fn new_tcp(remote_addr: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            direction: Direction::Tcp,
            status: ExchangeStatus::Running,
            method: None,
            url: None,
            path: None,
            remote_addr: Some(remote_addr),
            headers: Vec::new(),
            query: HashMap::new(),
            body: None,
            received_at: Utc::now(),
            response: None,
            archived_at: None,
            shared_id: None,
        }
    }

    /// Value of a request header, case-insensitive lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// JWKS configuration attached to a handler definition for `jwt.*` calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "source")]
pub enum JwksConfig {
    /// Inline JWKS document (JSON text).
    Inline { json: String },
    /// URL to fetch the JWKS from.
    Jku { url: String },
}

/// An operator-authored HTTP handler: match criteria plus script source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerDefinition {
    pub id: Uuid,
    #[serde(default)]
    pub version: i64,
    pub name: String,
    /// Top-level Rhai statements; the stored wire format.
    pub code: String,
    /// `*` or an exact verb.
    pub method: String,
    /// Literal segments, `:name` params, optional trailing `*`.
    pub path: String,
    /// Ascending execution priority; ties keep registry order.
    #[serde(default)]
    pub order: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks: Option<JwksConfig>,
}

/// The single script run against raw TCP traffic when enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TcpHandlerDefinition {
    pub id: Uuid,
    #[serde(default)]
    pub version: i64,
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub enabled: bool,
}

/// Outcome state of one handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Success,
    Error,
}

/// Record of one handler invocation within one exchange.
///
/// Created in `Running` immediately before invocation, updated exactly once
/// immediately after, never mutated later.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub handler_id: Uuid,
    pub exchange_id: Uuid,
    /// Zero-based position in this exchange's execution sequence.
    pub order: i64,
    pub started_at: DateTime<Utc>,
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locals_snapshot: Option<serde_json::Value>,
}

impl ExecutionRecord {
    pub fn running(handler_id: Uuid, exchange_id: Uuid, order: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            handler_id,
            exchange_id,
            order,
            started_at: Utc::now(),
            status: ExecutionStatus::Running,
            error_message: None,
            console_output: None,
            locals_snapshot: None,
        }
    }
}

/// Base64 (de)serialization for optional raw bodies so captured bytes stay
/// compact in JSON instead of rendering as integer arrays.
mod opt_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => s.serialize_some(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(d)?;
        match encoded {
            Some(text) => STANDARD
                .decode(text.as_bytes())
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_header_lookup_case_insensitive() {
        let exchange = Exchange::new_http(
            "GET".to_string(),
            "http://localhost/x".to_string(),
            "/x".to_string(),
            None,
            vec![("Authorization".to_string(), "Bearer abc".to_string())],
            HashMap::new(),
            None,
        );

        assert_eq!(exchange.header("authorization"), Some("Bearer abc"));
        assert_eq!(exchange.header("AUTHORIZATION"), Some("Bearer abc"));
        assert_eq!(exchange.header("x-missing"), None);
    }

    #[test]
    fn test_exchange_body_roundtrips_as_base64() {
        let mut exchange = Exchange::new_tcp("127.0.0.1:5000".to_string());
        exchange.body = Some(vec![0, 159, 146, 150]);

        let json = serde_json::to_string(&exchange).unwrap();
        assert!(json.contains("\"body\":\"AJ+Slg==\""));

        let back: Exchange = serde_json::from_str(&json).unwrap();
        assert_eq!(back.body, Some(vec![0, 159, 146, 150]));
    }

    #[test]
    fn test_execution_record_starts_running() {
        let record = ExecutionRecord::running(Uuid::new_v4(), Uuid::new_v4(), 0);
        assert_eq!(record.status, ExecutionStatus::Running);
        assert!(record.error_message.is_none());
        assert!(record.console_output.is_none());
    }
}
