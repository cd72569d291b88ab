//! Keyed-hash signature generation and verification.
//!
//! Digests are lowercase hex. Verification compares recomputed and
//! presented digests case-insensitively and in constant time; unsupported
//! algorithm names come back as a failed result, never a panic or `Err`.

use super::signature::ParsedSignature;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;

/// Hash algorithms supported for keyed signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HmacAlgorithm {
    Sha1,
    Sha256,
    Sha512,
}

impl HmacAlgorithm {
    /// Accepts `sha256`, `SHA-256`, `hmac-sha256` and friends.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name
            .to_ascii_lowercase()
            .replace("hmac-", "")
            .replace('-', "");
        match normalized.as_str() {
            "sha1" => Some(HmacAlgorithm::Sha1),
            "sha256" => Some(HmacAlgorithm::Sha256),
            "sha512" => Some(HmacAlgorithm::Sha512),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HmacAlgorithm::Sha1 => "SHA1",
            HmacAlgorithm::Sha256 => "SHA256",
            HmacAlgorithm::Sha512 => "SHA512",
        }
    }
}

/// Structured verification outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HmacVerification {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_signature: Option<String>,
    pub algorithm: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HmacVerification {
    fn failure(algorithm: &str, error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            expected_signature: None,
            actual_signature: None,
            algorithm: algorithm.to_string(),
            error: Some(error.into()),
        }
    }
}

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Compute the keyed hash of `payload` with `secret`, hex-encoded lowercase.
pub fn generate_signature(payload: &[u8], secret: &str, algorithm: HmacAlgorithm) -> String {
    // HMAC accepts keys of any length, so new_from_slice cannot fail here.
    match algorithm {
        HmacAlgorithm::Sha1 => {
            let mut mac =
                HmacSha1::new_from_slice(secret.as_bytes()).expect("any key length is valid");
            mac.update(payload);
            hex::encode(mac.finalize().into_bytes())
        }
        HmacAlgorithm::Sha256 => {
            let mut mac =
                HmacSha256::new_from_slice(secret.as_bytes()).expect("any key length is valid");
            mac.update(payload);
            hex::encode(mac.finalize().into_bytes())
        }
        HmacAlgorithm::Sha512 => {
            let mut mac =
                HmacSha512::new_from_slice(secret.as_bytes()).expect("any key length is valid");
            mac.update(payload);
            hex::encode(mac.finalize().into_bytes())
        }
    }
}

/// Verify a parsed signature against the payload.
pub fn verify(parsed: &ParsedSignature, payload: &[u8], secret: &str) -> HmacVerification {
    let (algorithm_name, actual) = match (parsed.algorithm(), parsed.signature()) {
        (Some(algorithm), Some(signature)) => (algorithm, signature),
        _ => return HmacVerification::failure("UNKNOWN", "Unparseable signature header"),
    };

    // A bare hex header carries no algorithm name; it verifies as SHA-256.
    let algorithm = if algorithm_name == "UNKNOWN" {
        HmacAlgorithm::Sha256
    } else {
        match HmacAlgorithm::from_name(algorithm_name) {
            Some(algorithm) => algorithm,
            None => {
                return HmacVerification::failure(
                    algorithm_name,
                    format!("Unsupported HMAC algorithm: {algorithm_name}"),
                )
            }
        }
    };

    let expected = generate_signature(payload, secret, algorithm);
    let actual_lower = actual.to_ascii_lowercase();
    let is_valid = expected
        .as_bytes()
        .ct_eq(actual_lower.as_bytes())
        .unwrap_u8()
        == 1;

    HmacVerification {
        is_valid,
        expected_signature: Some(expected),
        actual_signature: Some(actual.to_string()),
        algorithm: algorithm.name().to_string(),
        error: (!is_valid).then(|| "Signature mismatch".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::signature::parse_signature_header;

    #[test]
    fn test_generate_is_lowercase_hex() {
        let sig = generate_signature(b"payload", "secret", HmacAlgorithm::Sha256);
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(sig, sig.to_ascii_lowercase());
    }

    #[test]
    fn test_roundtrip_verifies() {
        let payload = b"{\"action\":\"push\"}";
        let sig = generate_signature(payload, "s3cret", HmacAlgorithm::Sha256);
        let parsed = parse_signature_header(&format!("sha256={sig}"));

        let result = verify(&parsed, payload, "s3cret");
        assert!(result.is_valid, "error: {:?}", result.error);
        assert_eq!(result.algorithm, "SHA256");
        assert_eq!(result.expected_signature, result.actual_signature);
    }

    #[test]
    fn test_wrong_secret_fails() {
        let payload = b"data";
        let sig = generate_signature(payload, "right", HmacAlgorithm::Sha256);
        let parsed = parse_signature_header(&format!("sha256={sig}"));

        let result = verify(&parsed, payload, "wrong");
        assert!(!result.is_valid);
        assert!(result.error.is_some());
        assert_ne!(result.expected_signature, result.actual_signature);
    }

    #[test]
    fn test_comparison_is_case_insensitive() {
        let payload = b"data";
        let sig = generate_signature(payload, "k", HmacAlgorithm::Sha1).to_ascii_uppercase();
        let parsed = parse_signature_header(&format!("sha1={sig}"));

        let result = verify(&parsed, payload, "k");
        assert!(result.is_valid);
    }

    #[test]
    fn test_unknown_algorithm_defaults_to_sha256() {
        let payload = b"data";
        let sig = generate_signature(payload, "k", HmacAlgorithm::Sha256);
        // Bare hex header parses with algorithm UNKNOWN
        let parsed = parse_signature_header(&sig);
        assert_eq!(parsed.algorithm(), Some("UNKNOWN"));

        let result = verify(&parsed, payload, "k");
        assert!(result.is_valid);
        assert_eq!(result.algorithm, "SHA256");
    }

    #[test]
    fn test_unsupported_algorithm_is_failure_not_panic() {
        let parsed = ParsedSignature::Hmac {
            algorithm: "MD5".to_string(),
            signature: "deadbeef".to_string(),
        };
        let result = verify(&parsed, b"data", "k");
        assert!(!result.is_valid);
        assert_eq!(
            result.error.as_deref(),
            Some("Unsupported HMAC algorithm: MD5")
        );
    }

    #[test]
    fn test_unknown_variant_is_failure() {
        let parsed = parse_signature_header("definitely not a signature");
        let result = verify(&parsed, b"data", "k");
        assert!(!result.is_valid);
        assert_eq!(
            result.error.as_deref(),
            Some("Unparseable signature header")
        );
    }

    #[test]
    fn test_sha512_roundtrip() {
        let payload = b"big payload";
        let sig = generate_signature(payload, "k", HmacAlgorithm::Sha512);
        assert_eq!(sig.len(), 128);
        let parsed = parse_signature_header(&format!("sha512={sig}"));
        assert!(verify(&parsed, payload, "k").is_valid);
    }

    #[test]
    fn test_algorithm_name_normalization() {
        assert_eq!(HmacAlgorithm::from_name("sha256"), Some(HmacAlgorithm::Sha256));
        assert_eq!(HmacAlgorithm::from_name("SHA-256"), Some(HmacAlgorithm::Sha256));
        assert_eq!(
            HmacAlgorithm::from_name("HMAC-SHA1"),
            Some(HmacAlgorithm::Sha1)
        );
        assert_eq!(HmacAlgorithm::from_name("md5"), None);
    }
}
