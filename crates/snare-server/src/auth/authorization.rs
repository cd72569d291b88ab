//! `Authorization` header classification.
//!
//! Candidate parsers run in a fixed priority order: Basic, Digest, JWT,
//! HMAC, then generic Bearer, with `Unknown` as the catch-all. Structural
//! problems never surface as `Err`; a recognized scheme with a malformed
//! value comes back as that scheme's variant with `is_valid = false` and
//! an error description.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Classified `Authorization` header value.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "scheme")]
pub enum ParsedAuth {
    Basic {
        username: String,
        password: String,
        raw_header: String,
        is_valid: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Digest {
        params: HashMap<String, String>,
        raw_header: String,
        is_valid: bool,
    },
    Jwt {
        /// The compact token, kept for later verification.
        token: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        header: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
        raw_header: String,
        is_valid: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Hmac {
        /// Algorithm as written in the header, if any. The parser records
        /// what was present; defaulting happens at verification time.
        #[serde(skip_serializing_if = "Option::is_none")]
        algorithm: Option<String>,
        signature: String,
        raw_header: String,
        is_valid: bool,
    },
    Bearer {
        token: String,
        raw_header: String,
        /// Always false at parse time, pending external verification.
        is_valid: bool,
    },
    Unknown {
        raw_header: String,
        is_valid: bool,
    },
}

impl ParsedAuth {
    pub fn scheme(&self) -> &'static str {
        match self {
            ParsedAuth::Basic { .. } => "basic",
            ParsedAuth::Digest { .. } => "digest",
            ParsedAuth::Jwt { .. } => "jwt",
            ParsedAuth::Hmac { .. } => "hmac",
            ParsedAuth::Bearer { .. } => "bearer",
            ParsedAuth::Unknown { .. } => "unknown",
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            ParsedAuth::Basic { is_valid, .. }
            | ParsedAuth::Digest { is_valid, .. }
            | ParsedAuth::Jwt { is_valid, .. }
            | ParsedAuth::Hmac { is_valid, .. }
            | ParsedAuth::Bearer { is_valid, .. }
            | ParsedAuth::Unknown { is_valid, .. } => *is_valid,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ParsedAuth::Basic { error, .. } | ParsedAuth::Jwt { error, .. } => error.as_deref(),
            _ => None,
        }
    }

    pub fn raw_header(&self) -> &str {
        match self {
            ParsedAuth::Basic { raw_header, .. }
            | ParsedAuth::Digest { raw_header, .. }
            | ParsedAuth::Jwt { raw_header, .. }
            | ParsedAuth::Hmac { raw_header, .. }
            | ParsedAuth::Bearer { raw_header, .. }
            | ParsedAuth::Unknown { raw_header, .. } => raw_header,
        }
    }
}

/// Classify a raw `Authorization` header value.
pub fn parse_authorization_header(raw: &str) -> ParsedAuth {
    parse_basic(raw)
        .or_else(|| parse_digest(raw))
        .or_else(|| parse_jwt(raw))
        .or_else(|| parse_hmac(raw))
        .or_else(|| parse_bearer(raw))
        .unwrap_or(ParsedAuth::Unknown {
            raw_header: raw.to_string(),
            is_valid: true,
        })
}

fn parse_basic(raw: &str) -> Option<ParsedAuth> {
    let token = raw.strip_prefix("Basic ")?;

    let invalid = |error: &str| ParsedAuth::Basic {
        username: String::new(),
        password: String::new(),
        raw_header: raw.to_string(),
        is_valid: false,
        error: Some(error.to_string()),
    };

    let decoded = match STANDARD.decode(token.trim()) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(_) => return Some(invalid("Credentials are not valid UTF-8")),
        },
        Err(_) => return Some(invalid("Invalid base64 encoding")),
    };

    match decoded.split_once(':') {
        Some((username, password)) => Some(ParsedAuth::Basic {
            username: username.to_string(),
            password: password.to_string(),
            raw_header: raw.to_string(),
            is_valid: true,
            error: None,
        }),
        None => Some(invalid("Missing colon separator in credentials")),
    }
}

fn parse_digest(raw: &str) -> Option<ParsedAuth> {
    let rest = raw.strip_prefix("Digest ")?;

    let mut params = HashMap::new();
    for pair in rest.split(',') {
        if let Some((key, value)) = pair.split_once('=') {
            let value = value.trim().trim_matches('"');
            params.insert(key.trim().to_string(), value.to_string());
        }
    }

    Some(ParsedAuth::Digest {
        params,
        raw_header: raw.to_string(),
        is_valid: true,
    })
}

fn parse_jwt(raw: &str) -> Option<ParsedAuth> {
    let token = raw.strip_prefix("Bearer ")?;
    if token.chars().any(char::is_whitespace) {
        return None;
    }
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
        return None;
    }

    // Three dot-separated segments is JWT territory: decoding failures stay
    // classified as `jwt`, never demoted to a generic Bearer.
    let mut error = None;
    let header = decode_jwt_segment(segments[0])
        .map_err(|e| error.get_or_insert(format!("Invalid JWT header: {e}")))
        .ok();
    let payload = decode_jwt_segment(segments[1])
        .map_err(|e| error.get_or_insert(format!("Invalid JWT payload: {e}")))
        .ok();

    Some(ParsedAuth::Jwt {
        token: token.to_string(),
        is_valid: error.is_none() && header.is_some() && payload.is_some(),
        header,
        payload,
        raw_header: raw.to_string(),
        error,
    })
}

fn decode_jwt_segment(segment: &str) -> Result<Value, String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| "malformed base64url".to_string())?;
    serde_json::from_slice(&bytes).map_err(|_| "malformed JSON".to_string())
}

fn parse_hmac(raw: &str) -> Option<ParsedAuth> {
    let rest = raw.strip_prefix("HMAC")?;

    let (algorithm, rest) = match rest.strip_prefix('-') {
        Some(tail) => {
            let (algo, tail) = tail.split_once(' ')?;
            if algo.is_empty() {
                return None;
            }
            (Some(algo.to_string()), tail)
        }
        None => (None, rest.strip_prefix(' ')?),
    };

    let signature = rest.trim();
    if signature.is_empty() || !signature.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    Some(ParsedAuth::Hmac {
        algorithm,
        signature: signature.to_string(),
        raw_header: raw.to_string(),
        is_valid: true,
    })
}

fn parse_bearer(raw: &str) -> Option<ParsedAuth> {
    let token = raw
        .strip_prefix("Bearer ")
        .or_else(|| (raw == "Bearer").then_some(""))?;
    Some(ParsedAuth::Bearer {
        token: token.to_string(),
        raw_header: raw.to_string(),
        is_valid: false,
    })
}
