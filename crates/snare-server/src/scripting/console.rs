//! `console` binding for handler scripts.
//!
//! Each call appends one `[LEVEL] ...` line to a shared buffer that the
//! pipeline stores on the execution record, whether or not the script
//! completes. Primitives render as-is; maps and arrays render as compact
//! JSON.

use rhai::Dynamic;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct ScriptConsole {
    buffer: Arc<Mutex<Vec<String>>>,
}

impl ScriptConsole {
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The accumulated output, or `None` if the script never logged.
    pub fn output(&self) -> Option<String> {
        let lines = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }

    pub fn append(&self, level: &str, args: &[Dynamic]) {
        let rendered: Vec<String> = args.iter().map(format_value).collect();
        let line = format!("[{level}] {}", rendered.join(" "));
        self.buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line);
    }
}

impl Default for ScriptConsole {
    fn default() -> Self {
        Self::new()
    }
}

fn format_value(value: &Dynamic) -> String {
    if value.is_unit() {
        return "null".to_string();
    }
    if let Some(s) = value.clone().try_cast::<String>() {
        return s;
    }
    if value.is_map() || value.is_array() {
        let json = super::dynamic_to_json(value.clone());
        return serde_json::to_string(&json).unwrap_or_else(|_| value.to_string());
    }
    value.to_string()
}
