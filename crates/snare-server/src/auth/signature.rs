//! Vendor webhook signature header classification.
//!
//! Covers the GitHub/Gitea `shaN=<hex>` shape, the generic
//! `HMAC-<ALGO> <hex>` shape, and a bare-hex fallback, plus a lookup table
//! of known signature header names for display purposes.

use serde::Serialize;

/// Classified webhook signature header value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "signatureType")]
pub enum ParsedSignature {
    #[serde(rename = "hmac-sha1")]
    HmacSha1 { algorithm: String, signature: String },
    #[serde(rename = "hmac-sha256")]
    HmacSha256 { algorithm: String, signature: String },
    #[serde(rename = "hmac-sha512")]
    HmacSha512 { algorithm: String, signature: String },
    #[serde(rename = "hmac")]
    Hmac { algorithm: String, signature: String },
    #[serde(rename = "unknown")]
    Unknown { raw: String, is_valid: bool },
}

impl ParsedSignature {
    pub fn signature_type(&self) -> &'static str {
        match self {
            ParsedSignature::HmacSha1 { .. } => "hmac-sha1",
            ParsedSignature::HmacSha256 { .. } => "hmac-sha256",
            ParsedSignature::HmacSha512 { .. } => "hmac-sha512",
            ParsedSignature::Hmac { .. } => "hmac",
            ParsedSignature::Unknown { .. } => "unknown",
        }
    }

    pub fn algorithm(&self) -> Option<&str> {
        match self {
            ParsedSignature::HmacSha1 { algorithm, .. }
            | ParsedSignature::HmacSha256 { algorithm, .. }
            | ParsedSignature::HmacSha512 { algorithm, .. }
            | ParsedSignature::Hmac { algorithm, .. } => Some(algorithm),
            ParsedSignature::Unknown { .. } => None,
        }
    }

    pub fn signature(&self) -> Option<&str> {
        match self {
            ParsedSignature::HmacSha1 { signature, .. }
            | ParsedSignature::HmacSha256 { signature, .. }
            | ParsedSignature::HmacSha512 { signature, .. }
            | ParsedSignature::Hmac { signature, .. } => Some(signature),
            ParsedSignature::Unknown { .. } => None,
        }
    }
}

fn is_hex(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Parse the GitHub/Gitea `sha(1|256|512)=<hex>` shape. Returns `None` for
/// anything else.
pub fn parse_github_signature(value: &str) -> Option<ParsedSignature> {
    let (prefix, hex) = value.split_once('=')?;
    if !is_hex(hex) {
        return None;
    }
    let signature = hex.to_string();
    match prefix {
        "sha1" => Some(ParsedSignature::HmacSha1 {
            algorithm: "SHA1".to_string(),
            signature,
        }),
        "sha256" => Some(ParsedSignature::HmacSha256 {
            algorithm: "SHA256".to_string(),
            signature,
        }),
        "sha512" => Some(ParsedSignature::HmacSha512 {
            algorithm: "SHA512".to_string(),
            signature,
        }),
        _ => None,
    }
}

/// Parse the generic `HMAC-<ALGO> <hex>` shape, case-insensitive.
fn parse_generic_hmac(value: &str) -> Option<ParsedSignature> {
    let (scheme, hex) = value.split_once(' ')?;
    let algorithm = match scheme.get(..5) {
        Some(prefix) if prefix.eq_ignore_ascii_case("HMAC-") => &scheme[5..],
        _ => return None,
    };
    if algorithm.is_empty() || !is_hex(hex.trim()) {
        return None;
    }
    Some(ParsedSignature::Hmac {
        algorithm: algorithm.to_ascii_uppercase(),
        signature: hex.trim().to_string(),
    })
}

/// Classify a signature header value.
pub fn parse_signature_header(value: &str) -> ParsedSignature {
    if let Some(parsed) = parse_github_signature(value) {
        return parsed;
    }
    if let Some(parsed) = parse_generic_hmac(value) {
        return parsed;
    }
    // A bare hex digest of plausible length: algorithm unknown until
    // verification time.
    if value.len() >= 32 && is_hex(value) {
        return ParsedSignature::Hmac {
            algorithm: "UNKNOWN".to_string(),
            signature: value.to_string(),
        };
    }
    ParsedSignature::Unknown {
        raw: value.to_string(),
        is_valid: false,
    }
}

/// Display metadata for a known signature header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SignatureHeaderInfo {
    pub service: &'static str,
    pub description: &'static str,
}

const KNOWN_SIGNATURE_HEADERS: &[(&str, SignatureHeaderInfo)] = &[
    (
        "x-hub-signature",
        SignatureHeaderInfo {
            service: "GitHub",
            description: "HMAC-SHA1 signature of the request body",
        },
    ),
    (
        "x-hub-signature-256",
        SignatureHeaderInfo {
            service: "GitHub",
            description: "HMAC-SHA256 signature of the request body",
        },
    ),
    (
        "x-gitea-signature",
        SignatureHeaderInfo {
            service: "Gitea",
            description: "HMAC-SHA256 signature of the request body",
        },
    ),
    (
        "x-gitlab-signature",
        SignatureHeaderInfo {
            service: "GitLab",
            description: "HMAC signature of the request body",
        },
    ),
    (
        "x-signature",
        SignatureHeaderInfo {
            service: "Generic",
            description: "Webhook payload signature",
        },
    ),
];

/// Look up display metadata for a known signature header name,
/// case-insensitive.
pub fn signature_header_info(name: &str) -> Option<SignatureHeaderInfo> {
    let lower = name.to_ascii_lowercase();
    KNOWN_SIGNATURE_HEADERS
        .iter()
        .find(|(known, _)| *known == lower)
        .map(|(_, info)| *info)
}

/// Heuristic: does this header name carry a payload signature?
pub fn is_signature_header(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.contains("-signature") || signature_header_info(name).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX64: &str = "a3f1c2d4e5b6978812345678deadbeefcafebabe0123456789abcdef01234567";

    #[test]
    fn test_github_sha256_shape() {
        let parsed = parse_github_signature(&format!("sha256={HEX64}")).unwrap();
        assert_eq!(parsed.signature_type(), "hmac-sha256");
        assert_eq!(parsed.algorithm(), Some("SHA256"));
        assert_eq!(parsed.signature(), Some(HEX64));
    }

    #[test]
    fn test_github_sha1_and_sha512_shapes() {
        let sha1 = parse_github_signature("sha1=deadbeefcafe").unwrap();
        assert_eq!(sha1.signature_type(), "hmac-sha1");

        let sha512 = parse_github_signature(&format!("sha512={HEX64}")).unwrap();
        assert_eq!(sha512.signature_type(), "hmac-sha512");
    }

    #[test]
    fn test_github_rejects_non_matching_shapes() {
        assert!(parse_github_signature("md5=deadbeef").is_none());
        assert!(parse_github_signature("sha256=not-hex").is_none());
        assert!(parse_github_signature("sha256=").is_none());
        assert!(parse_github_signature("deadbeef").is_none());
    }

    #[test]
    fn test_generic_hmac_case_insensitive() {
        let upper = parse_signature_header("HMAC-SHA256 deadbeef");
        assert_eq!(upper.signature_type(), "hmac");
        assert_eq!(upper.algorithm(), Some("SHA256"));

        let lower = parse_signature_header("hmac-sha512 deadbeef");
        assert_eq!(lower.signature_type(), "hmac");
        assert_eq!(lower.algorithm(), Some("SHA512"));
    }

    #[test]
    fn test_bare_hex_maps_to_unknown_algorithm() {
        let parsed = parse_signature_header(HEX64);
        assert_eq!(parsed.signature_type(), "hmac");
        assert_eq!(parsed.algorithm(), Some("UNKNOWN"));
    }

    #[test]
    fn test_short_hex_is_unknown() {
        let parsed = parse_signature_header("deadbeef");
        assert_eq!(parsed.signature_type(), "unknown");
        assert!(matches!(
            parsed,
            ParsedSignature::Unknown {
                is_valid: false,
                ..
            }
        ));
    }

    #[test]
    fn test_garbage_is_unknown() {
        let parsed = parse_signature_header("hello world");
        assert_eq!(parsed.signature_type(), "unknown");
    }

    #[test]
    fn test_known_header_lookup_is_case_insensitive() {
        let info = signature_header_info("X-Hub-Signature-256").unwrap();
        assert_eq!(info.service, "GitHub");

        assert!(signature_header_info("x-gitea-signature").is_some());
        assert!(signature_header_info("x-unrelated").is_none());
    }

    #[test]
    fn test_is_signature_header_heuristic() {
        assert!(is_signature_header("X-Hub-Signature"));
        assert!(is_signature_header("x-custom-signature"));
        assert!(is_signature_header("X-Signature"));
        assert!(!is_signature_header("Content-Type"));
        assert!(!is_signature_header("X-Signed-Thing"));
    }
}
