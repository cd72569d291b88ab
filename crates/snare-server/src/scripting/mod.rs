//! Sandboxed execution of handler scripts.
//!
//! Handler source is plain top-level Rhai statements executed with exactly
//! these bindings in scope: `req`, `resp`, `console`, `locals`, `jwt`, and
//! `hmac`. Nothing else of the host is reachable; Rhai itself has no
//! filesystem, network, or process access.

mod console;
mod context;

pub use console::ScriptConsole;
pub use context::{execute_handler_script, JwtEnv};

use crate::model::Exchange;
use rhai::{Dynamic, EvalAltResult, Map};
use serde_json::Value;
use std::collections::HashMap;

/// Shared mutable response state for one exchange.
///
/// Handlers mutate this sequentially through the `resp` binding; mutations
/// already applied survive a later script error.
#[derive(Debug, Clone)]
pub struct ResponseState {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    /// Raw socket writes queued by TCP handlers.
    pub tcp_writes: Vec<Vec<u8>>,
}

impl ResponseState {
    /// The default response when no handler mutates anything: 200, empty
    /// header set, empty body.
    pub fn default_response() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: None,
            tcp_writes: Vec::new(),
        }
    }

    /// Set a header, replacing an existing one case-insensitively.
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let Some(slot) = self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            slot.1 = value.to_string();
        } else {
            self.headers.push((name.to_string(), value.to_string()));
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Read-only view of an exchange's inbound data for the `req` binding.
#[derive(Debug, Clone, Default)]
pub struct ScriptRequest {
    pub method: Option<String>,
    pub url: Option<String>,
    pub path: Option<String>,
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub remote_addr: Option<String>,
    /// Raw chunk bytes for TCP handlers.
    pub tcp_bytes: Option<Vec<u8>>,
}

impl ScriptRequest {
    pub fn from_exchange(exchange: &Exchange, params: HashMap<String, String>) -> Self {
        Self {
            method: exchange.method.clone(),
            url: exchange.url.clone(),
            path: exchange.path.clone(),
            params,
            query: exchange.query.clone(),
            headers: exchange.headers.clone(),
            body: exchange.body.clone(),
            remote_addr: exchange.remote_addr.clone(),
            tcp_bytes: None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Outcome of one handler invocation.
pub struct ScriptOutcome {
    /// `Ok` for normal completion; `Err` carries the formatted
    /// `"<ErrorType>: <message>"` string.
    pub result: Result<(), String>,
    /// Console buffer accumulated up to completion or the throw.
    pub console_output: Option<String>,
    /// The `locals` map after execution, mutations retained even on error.
    pub locals: Map,
}

/// Format a script failure as `"<ErrorType>: <message>"`.
///
/// A `throw "boom"` comes out as `"Error: boom"`; a thrown map with `name`
/// and `message` fields keeps its own type name.
pub fn format_script_error(err: &EvalAltResult) -> String {
    match err {
        EvalAltResult::ErrorRuntime(value, _) => {
            if let Some(map) = value.read_lock::<Map>() {
                let name = map.get("name").and_then(|v| v.clone().try_cast::<String>());
                let message = map
                    .get("message")
                    .and_then(|v| v.clone().try_cast::<String>());
                if let (Some(name), Some(message)) = (name, message) {
                    return format!("{name}: {message}");
                }
            }
            format!("Error: {value}")
        }
        EvalAltResult::ErrorVariableNotFound(name, _) => {
            format!("ReferenceError: {name} is not defined")
        }
        EvalAltResult::ErrorFunctionNotFound(signature, _) => {
            format!("TypeError: {signature} is not a function")
        }
        EvalAltResult::ErrorMismatchDataType(expected, actual, _) => {
            format!("TypeError: expected {expected}, got {actual}")
        }
        EvalAltResult::ErrorTerminated(_, _) => "Error: script execution cancelled".to_string(),
        other => format!("Error: {other}"),
    }
}

/// Convert a JSON value into a Rhai `Dynamic`.
pub fn json_to_dynamic(value: Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Dynamic::from(i)
            } else if let Some(f) = n.as_f64() {
                Dynamic::from(f)
            } else {
                Dynamic::UNIT
            }
        }
        Value::String(s) => Dynamic::from(s),
        Value::Array(arr) => {
            let vec: Vec<Dynamic> = arr.into_iter().map(json_to_dynamic).collect();
            Dynamic::from(vec)
        }
        Value::Object(obj) => {
            let mut map = Map::new();
            for (k, v) in obj {
                map.insert(k.into(), json_to_dynamic(v));
            }
            Dynamic::from(map)
        }
    }
}

/// Convert a Rhai `Dynamic` into a JSON value.
pub fn dynamic_to_json(value: Dynamic) -> Value {
    if value.is_unit() {
        Value::Null
    } else if let Ok(b) = value.as_bool() {
        Value::Bool(b)
    } else if let Ok(i) = value.as_int() {
        Value::Number(i.into())
    } else if let Ok(f) = value.as_float() {
        Value::Number(serde_json::Number::from_f64(f).unwrap_or_else(|| 0.into()))
    } else if let Some(s) = value.clone().try_cast::<String>() {
        Value::String(s)
    } else if let Some(arr) = value.clone().try_cast::<Vec<Dynamic>>() {
        Value::Array(arr.into_iter().map(dynamic_to_json).collect())
    } else if let Some(map) = value.clone().try_cast::<Map>() {
        let mut obj = serde_json::Map::new();
        for (k, v) in map {
            obj.insert(k.to_string(), dynamic_to_json(v));
        }
        Value::Object(obj)
    } else {
        Value::String(value.to_string())
    }
}
