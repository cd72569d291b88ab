//! Credential analysis and verification toolkit.
//!
//! Classifies `Authorization` and vendor webhook signature headers, and
//! verifies HMAC signatures and JWTs. Parsers never fail: malformed input
//! comes back as a variant with `is_valid = false` and an error, so callers
//! (and handler scripts) can degrade gracefully.

mod authorization;
pub mod hmac;
mod jwt;
pub mod signature;

pub use authorization::{parse_authorization_header, ParsedAuth};
pub use hmac::{generate_signature, verify as verify_hmac, HmacAlgorithm, HmacVerification};
pub use jwt::{select_key, verify_jwt, JwtVerification};
pub use signature::{
    is_signature_header, parse_github_signature, parse_signature_header, signature_header_info,
    ParsedSignature, SignatureHeaderInfo,
};
