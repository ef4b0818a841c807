//! Stripe webhook signature verification
//!
//! Stripe signs each delivery with a header of the form
//! `t=<unix-seconds>,v1=<hex-hmac-sha256>[,v1=...][,v0=...]`. The signed
//! message is `"<t>.<raw-body>"` keyed with the endpoint's signing secret.
//! Verification fails closed: anything unparseable is a rejection.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{BillingError, BillingResult};

type HmacSha256 = Hmac<Sha256>;

/// Replay window in seconds (inclusive)
pub const DEFAULT_TOLERANCE_SECS: u64 = 300;

/// Parsed `stripe-signature` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader<'a> {
    /// Timestamp exactly as sent; the signed message uses this text
    pub timestamp_raw: &'a str,
    pub timestamp: i64,
    /// Every `v1=` entry, in header order (more than one during secret rotation)
    pub signatures: Vec<&'a str>,
}

/// Parse the signature header into its timestamp and `v1` signatures
pub fn parse_signature_header(header: &str) -> BillingResult<SignatureHeader<'_>> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = Some(value),
            "v1" => signatures.push(value),
            _ => {}
        }
    }

    let timestamp_raw =
        timestamp.ok_or(BillingError::WebhookSignatureInvalid("missing timestamp"))?;
    let timestamp = timestamp_raw
        .parse::<i64>()
        .map_err(|_| BillingError::WebhookSignatureInvalid("malformed timestamp"))?;

    if signatures.is_empty() {
        return Err(BillingError::WebhookSignatureInvalid("missing v1 signature"));
    }

    Ok(SignatureHeader {
        timestamp_raw,
        timestamp,
        signatures,
    })
}

fn hmac_hex(secret: &str, timestamp: &str, payload: &[u8]) -> BillingResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| BillingError::WebhookSignatureInvalid("unusable signing secret"))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Lowercase hex HMAC-SHA256 of `"<timestamp>.<payload>"`
pub fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> BillingResult<String> {
    hmac_hex(secret, &timestamp.to_string(), payload)
}

/// Build a complete `stripe-signature` header value for a payload
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> BillingResult<String> {
    let signature = compute_signature(secret, timestamp, payload)?;
    Ok(format!("t={},v1={}", timestamp, signature))
}

/// Constant-time string equality.
///
/// Lengths are compared first; equal-length inputs are XOR-accumulated over
/// every byte so the running time does not depend on where they differ.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Verify a delivery against the signing secret at time `now` (unix seconds)
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: u64,
    now: i64,
) -> BillingResult<()> {
    let parsed = parse_signature_header(header)?;

    let age = now.abs_diff(parsed.timestamp);
    if age > tolerance_secs {
        tracing::warn!(
            timestamp = parsed.timestamp,
            now = now,
            age_secs = age,
            "Webhook timestamp outside tolerance"
        );
        return Err(BillingError::WebhookSignatureInvalid(
            "timestamp outside tolerance",
        ));
    }

    let expected = hmac_hex(secret, parsed.timestamp_raw, payload)?;

    // Check every candidate so the loop length is independent of which one matches
    let matched = parsed
        .signatures
        .iter()
        .fold(false, |found, candidate| {
            constant_time_eq(&expected, candidate) | found
        });

    if !matched {
        return Err(BillingError::WebhookSignatureInvalid("signature mismatch"));
    }

    Ok(())
}
