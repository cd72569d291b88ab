//! JWT verification against a JWKS document or a JKU URL.
//!
//! Error strings are part of the contract: handler scripts and tests match
//! on the literal wording, so changes here are breaking.

use crate::auth::authorization::ParsedAuth;
use crate::model::JwksConfig;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

/// JKU fetches are the only network I/O in the core and must be bounded.
const JKU_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Structured verification outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JwtVerification {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JwtVerification {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            algorithm: None,
            key_id: None,
            error: Some(error.into()),
        }
    }
}

/// Pick the verification key from a set: exact `kid` match first, then the
/// first key advertising the token's algorithm, then the first key at all.
pub fn select_key<'a>(keys: &'a [Jwk], kid: Option<&str>, alg: &str) -> Option<&'a Jwk> {
    if let Some(kid) = kid {
        if let Some(jwk) = keys
            .iter()
            .find(|k| k.common.key_id.as_deref() == Some(kid))
        {
            return Some(jwk);
        }
    }
    if let Some(jwk) = keys
        .iter()
        .find(|k| k.common.key_algorithm.map(|a| a.to_string()).as_deref() == Some(alg))
    {
        return Some(jwk);
    }
    keys.first()
}

/// Resolve the key set from the handler's configuration.
fn resolve_jwks(config: &JwksConfig) -> Result<JwkSet, String> {
    match config {
        JwksConfig::Inline { json } => {
            parse_jwks(json).map_err(|e| format!("Failed to parse JWKS: {e}"))
        }
        JwksConfig::Jku { url } => {
            fetch_jwks(url).map_err(|e| format!("Failed to fetch JWKS from JKU: {e}"))
        }
    }
}

fn parse_jwks(json: &str) -> Result<JwkSet, String> {
    let value: Value = serde_json::from_str(json).map_err(|e| e.to_string())?;
    jwks_from_value(value)
}

fn jwks_from_value(value: Value) -> Result<JwkSet, String> {
    if !value.get("keys").map_or(false, Value::is_array) {
        return Err("missing 'keys' array".to_string());
    }
    serde_json::from_value(value).map_err(|e| e.to_string())
}

fn fetch_jwks(url: &str) -> Result<JwkSet, String> {
    let client = reqwest::blocking::Client::builder()
        .timeout(JKU_FETCH_TIMEOUT)
        .build()
        .map_err(|e| e.to_string())?;

    let response = client.get(url).send().map_err(|e| e.to_string())?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("HTTP status {status}"));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    if !content_type.contains("json") {
        return Err(format!("unexpected content type '{content_type}'"));
    }

    let value: Value = response.json().map_err(|e| e.to_string())?;
    jwks_from_value(value)
}

/// Verify a parsed JWT against the configured key set.
///
/// Validates the signature and the standard time claims (`exp`, `nbf`)
/// with zero clock-skew tolerance.
pub fn verify_jwt(parsed: &ParsedAuth, config: &JwksConfig) -> JwtVerification {
    let (token, header) = match parsed {
        ParsedAuth::Jwt {
            token,
            header: Some(header),
            payload: Some(_),
            is_valid: true,
            ..
        } => (token, header),
        _ => return JwtVerification::failure("Invalid JWT structure"),
    };

    let alg = match header.get("alg").and_then(Value::as_str) {
        Some(alg) => alg,
        None => return JwtVerification::failure("Missing algorithm in JWT header"),
    };
    let kid = header.get("kid").and_then(Value::as_str);

    let jwks = match resolve_jwks(config) {
        Ok(jwks) => jwks,
        Err(error) => return JwtVerification::failure(error),
    };

    let jwk = match select_key(&jwks.keys, kid, alg) {
        Some(jwk) => jwk,
        None => {
            return JwtVerification::failure(format!(
                "No matching key found in JWKS for kid: {}, alg: {alg}",
                kid.unwrap_or("none")
            ))
        }
    };

    let decoding_key = match DecodingKey::from_jwk(jwk) {
        Ok(key) => key,
        Err(_) => return JwtVerification::failure("Failed to create public key from JWK"),
    };

    let algorithm = match Algorithm::from_str(alg) {
        Ok(algorithm) => algorithm,
        Err(_) => return JwtVerification::failure("JWT signature verification failed"),
    };

    let mut validation = Validation::new(algorithm);
    validation.leeway = 0;
    validation.validate_nbf = true;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    match decode::<Value>(token, &decoding_key, &validation) {
        Ok(_) => JwtVerification {
            is_valid: true,
            algorithm: Some(alg.to_string()),
            key_id: jwk.common.key_id.clone().or_else(|| kid.map(String::from)),
            error: None,
        },
        Err(err) => {
            use jsonwebtoken::errors::ErrorKind;
            let message = match err.kind() {
                ErrorKind::ExpiredSignature => "JWT has expired",
                ErrorKind::ImmatureSignature => "JWT is not yet valid",
                _ => "JWT signature verification failed",
            };
            JwtVerification::failure(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::authorization::parse_authorization_header;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &[u8] = b"test-secret-with-enough-entropy";

    fn inline_jwks(kid: &str) -> JwksConfig {
        let jwks = json!({
            "keys": [{
                "kty": "oct",
                "kid": kid,
                "alg": "HS256",
                "k": URL_SAFE_NO_PAD.encode(SECRET),
            }]
        });
        JwksConfig::Inline {
            json: jwks.to_string(),
        }
    }

    fn signed_token(kid: Option<&str>, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = kid.map(String::from);
        encode(&header, claims, &EncodingKey::from_secret(SECRET)).unwrap()
    }

    fn parsed(token: &str) -> ParsedAuth {
        parse_authorization_header(&format!("Bearer {token}"))
    }

    #[test]
    fn test_valid_token_verifies_against_inline_jwks() {
        let exp = Utc::now().timestamp() + 3600;
        let token = signed_token(Some("k1"), &json!({"sub": "42", "exp": exp}));

        let result = verify_jwt(&parsed(&token), &inline_jwks("k1"));
        assert!(result.is_valid, "error: {:?}", result.error);
        assert_eq!(result.algorithm.as_deref(), Some("HS256"));
        assert_eq!(result.key_id.as_deref(), Some("k1"));
    }

    #[test]
    fn test_expired_token() {
        let exp = Utc::now().timestamp() - 60;
        let token = signed_token(Some("k1"), &json!({"sub": "42", "exp": exp}));

        let result = verify_jwt(&parsed(&token), &inline_jwks("k1"));
        assert!(!result.is_valid);
        assert_eq!(result.error.as_deref(), Some("JWT has expired"));
    }

    #[test]
    fn test_not_yet_valid_token() {
        let nbf = Utc::now().timestamp() + 3600;
        let token = signed_token(Some("k1"), &json!({"sub": "42", "nbf": nbf}));

        let result = verify_jwt(&parsed(&token), &inline_jwks("k1"));
        assert!(!result.is_valid);
        assert_eq!(result.error.as_deref(), Some("JWT is not yet valid"));
    }

    #[test]
    fn test_token_without_exp_is_accepted() {
        let token = signed_token(Some("k1"), &json!({"sub": "42"}));
        let result = verify_jwt(&parsed(&token), &inline_jwks("k1"));
        assert!(result.is_valid, "error: {:?}", result.error);
    }

    #[test]
    fn test_wrong_key_fails_signature_check() {
        let token = signed_token(Some("k1"), &json!({"sub": "42"}));
        let other = json!({
            "keys": [{
                "kty": "oct",
                "kid": "k1",
                "alg": "HS256",
                "k": URL_SAFE_NO_PAD.encode(b"a-completely-different-secret"),
            }]
        });
        let config = JwksConfig::Inline {
            json: other.to_string(),
        };

        let result = verify_jwt(&parsed(&token), &config);
        assert!(!result.is_valid);
        assert_eq!(
            result.error.as_deref(),
            Some("JWT signature verification failed")
        );
    }

    #[test]
    fn test_invalid_structure() {
        let parsed = parse_authorization_header("Bearer not-b64!.junk!.sig");
        let result = verify_jwt(&parsed, &inline_jwks("k1"));
        assert_eq!(result.error.as_deref(), Some("Invalid JWT structure"));

        let bearer = parse_authorization_header("Bearer plain-token");
        let result = verify_jwt(&bearer, &inline_jwks("k1"));
        assert_eq!(result.error.as_deref(), Some("Invalid JWT structure"));
    }

    #[test]
    fn test_missing_algorithm_in_header() {
        // Hand-roll a token whose header has no alg field
        let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&json!({"typ": "JWT"})).unwrap());
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&json!({"sub": "1"})).unwrap());
        let token = format!("{header}.{payload}.c2ln");

        let result = verify_jwt(&parsed(&token), &inline_jwks("k1"));
        assert_eq!(
            result.error.as_deref(),
            Some("Missing algorithm in JWT header")
        );
    }

    #[test]
    fn test_empty_jwks_reports_no_matching_key() {
        let token = signed_token(Some("k9"), &json!({"sub": "1"}));
        let config = JwksConfig::Inline {
            json: json!({"keys": []}).to_string(),
        };

        let result = verify_jwt(&parsed(&token), &config);
        assert_eq!(
            result.error.as_deref(),
            Some("No matching key found in JWKS for kid: k9, alg: HS256")
        );
    }

    #[test]
    fn test_jwks_without_keys_array_is_parse_failure() {
        let token = signed_token(Some("k1"), &json!({"sub": "1"}));
        let config = JwksConfig::Inline {
            json: json!({"nope": true}).to_string(),
        };

        let result = verify_jwt(&parsed(&token), &config);
        let error = result.error.unwrap();
        assert!(error.starts_with("Failed to parse JWKS:"), "{error}");
    }

    #[test]
    fn test_unreachable_jku_is_fetch_failure() {
        let token = signed_token(Some("k1"), &json!({"sub": "1"}));
        let config = JwksConfig::Jku {
            url: "not a url at all".to_string(),
        };

        let result = verify_jwt(&parsed(&token), &config);
        let error = result.error.unwrap();
        assert!(
            error.starts_with("Failed to fetch JWKS from JKU:"),
            "{error}"
        );
    }

    #[test]
    fn test_select_key_prefers_kid_then_alg_then_first() {
        let jwks: JwkSet = serde_json::from_value(json!({
            "keys": [
                {"kty": "oct", "kid": "first", "k": URL_SAFE_NO_PAD.encode(b"a")},
                {"kty": "oct", "kid": "by-alg", "alg": "HS256", "k": URL_SAFE_NO_PAD.encode(b"b")},
                {"kty": "oct", "kid": "target", "k": URL_SAFE_NO_PAD.encode(b"c")},
            ]
        }))
        .unwrap();

        let by_kid = select_key(&jwks.keys, Some("target"), "HS256").unwrap();
        assert_eq!(by_kid.common.key_id.as_deref(), Some("target"));

        let by_alg = select_key(&jwks.keys, Some("missing"), "HS256").unwrap();
        assert_eq!(by_alg.common.key_id.as_deref(), Some("by-alg"));

        let fallback = select_key(&jwks.keys, None, "RS256").unwrap();
        assert_eq!(fallback.common.key_id.as_deref(), Some("first"));

        assert!(select_key(&[], Some("x"), "HS256").is_none());
    }
}
