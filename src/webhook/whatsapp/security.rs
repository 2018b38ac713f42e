//! Security utilities for WhatsApp webhook verification
//!
//! This module provides signature verification for incoming WhatsApp webhook requests
//! using the X-Hub-Signature-256 header. This ensures that requests actually originate
//! from Meta/Facebook and haven't been tampered with.
//!
//! # Security Background
//!
//! Meta signs all webhook payloads with HMAC-SHA256 using your app's secret key.
//! The signature is included in the `X-Hub-Signature-256` header with the format:
//! `sha256=<hex_signature>`
//!
//! # Important Notes
//!
//! - The signature MUST be computed on the raw request body bytes, not parsed JSON
//! - The comparison must be constant-time to prevent timing attacks
//! - The header format is `sha256=<signature>` (lowercase)

use crate::consts;
use derive_more::{Display, Error};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::str::FromStr;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Signature enforcement posture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureMode {
    /// Unverified deliveries are dropped
    Strict,
    /// Unverified deliveries are logged and processed anyway, local development only
    Relaxed,
}

#[derive(Debug, Display, Error)]
#[display("unknown signature mode `{_0}`, expected `strict` or `relaxed`")]
pub struct InvalidSignatureMode(#[error(not(source))] String);

impl FromStr for SignatureMode {
    type Err = InvalidSignatureMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "relaxed" => Ok(Self::Relaxed),
            other => Err(InvalidSignatureMode(other.to_string())),
        }
    }
}

/// Outcome of checking a delivery's signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResult {
    Verified,
    Unverified(UnverifiedReason),
    /// Only produced in relaxed mode when there is nothing to verify against
    Skipped(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum UnverifiedReason {
    #[display("missing signature header")]
    MissingHeader,
    #[display("malformed signature header")]
    MalformedHeader,
    #[display("signature mismatch")]
    Mismatch,
}

impl VerificationResult {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::Unverified(_) => "unverified",
            Self::Skipped(_) => "skipped",
        }
    }
}

/// Verifies a delivery against the X-Hub-Signature-256 header.
///
/// # Arguments
///
/// * `raw_body` - The request body exactly as received
/// * `signature_header` - The value of the X-Hub-Signature-256 header, if any
/// * `app_secret` - Your WhatsApp/Facebook app secret
/// * `mode` - Enforcement posture
///
/// # Security
///
/// The computed and received digests are compared in constant time. An empty
/// secret never verifies anything: in strict mode it yields `Unverified`, in
/// relaxed mode `Skipped`.
pub fn verify(
    raw_body: &[u8],
    signature_header: Option<&str>,
    app_secret: &str,
    mode: SignatureMode,
) -> VerificationResult {
    if app_secret.is_empty() {
        return match mode {
            SignatureMode::Strict => VerificationResult::Unverified(UnverifiedReason::Mismatch),
            SignatureMode::Relaxed => VerificationResult::Skipped("no app secret configured"),
        };
    }

    let Some(signature_header) = signature_header else {
        return VerificationResult::Unverified(UnverifiedReason::MissingHeader);
    };

    // Extract the signature from the header (format: "sha256=<signature>")
    let signature_header = signature_header.trim();
    let Some(signature_hex) = signature_header.strip_prefix(consts::SIGNATURE_PREFIX) else {
        return VerificationResult::Unverified(UnverifiedReason::MalformedHeader);
    };

    let expected_signature = match hex::decode(signature_hex) {
        Ok(sig) => sig,
        Err(e) => {
            logfire::debug!(
                "Failed to decode signature hex: {error}",
                error = e.to_string()
            );
            return VerificationResult::Unverified(UnverifiedReason::MalformedHeader);
        }
    };

    // Compute HMAC-SHA256 of the raw body
    let mut mac = match HmacSha256::new_from_slice(app_secret.as_bytes()) {
        Ok(m) => m,
        Err(e) => {
            logfire::error!(
                "Failed to create HMAC instance: {error}",
                error = e.to_string()
            );
            return VerificationResult::Unverified(UnverifiedReason::Mismatch);
        }
    };
    mac.update(raw_body);
    let computed_signature = mac.finalize().into_bytes();

    // Constant-time comparison to prevent timing attacks
    let is_valid: bool = computed_signature.ct_eq(&expected_signature[..]).into();
    if is_valid {
        VerificationResult::Verified
    } else {
        VerificationResult::Unverified(UnverifiedReason::Mismatch)
    }
}

/// Formats the header value Meta would send for `raw_body`.
#[cfg(test)]
pub fn signature_header_value(raw_body: &[u8], app_secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(app_secret.as_bytes()).unwrap();
    mac.update(raw_body);
    format!(
        "{}{}",
        consts::SIGNATURE_PREFIX,
        hex::encode(mac.finalize().into_bytes())
    )
}
