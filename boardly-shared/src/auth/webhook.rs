/// Billing webhook signature verification
///
/// The billing provider signs each delivery with a header of the form
/// `ts=<unix seconds>;h1=<hex hmac>`, where the MAC is HMAC-SHA256 over
/// `"<ts>:<raw body>"` keyed with the endpoint secret. Deliveries older than
/// the tolerance are rejected to limit replay.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use super::token::constant_time_compare;

pub const SIGNATURE_HEADER: &str = "paddle-signature";

/// Maximum accepted age of a signed delivery
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookError {
    #[error("malformed signature header")]
    Malformed,

    #[error("signature timestamp outside tolerance")]
    Stale,

    #[error("signature mismatch")]
    Mismatch,
}

/// Hex HMAC over `"<ts>:<body>"`
pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b":");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Parses `ts=..;h1=..` into `(timestamp, signatures)`
fn parse_header(header: &str) -> Result<(i64, Vec<&str>), WebhookError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(';') {
        match part.trim().split_once('=') {
            Some(("ts", value)) => {
                timestamp = Some(value.parse::<i64>().map_err(|_| WebhookError::Malformed)?)
            }
            Some(("h1", value)) => signatures.push(value),
            _ => {}
        }
    }
    match timestamp {
        Some(ts) if !signatures.is_empty() => Ok((ts, signatures)),
        _ => Err(WebhookError::Malformed),
    }
}

pub fn verify_signature(
    header: &str,
    body: &[u8],
    secret: &str,
    now: DateTime<Utc>,
    tolerance_secs: i64,
) -> Result<(), WebhookError> {
    let (timestamp, signatures) = parse_header(header)?;
    if now.timestamp().abs_diff(timestamp) > tolerance_secs.unsigned_abs() {
        return Err(WebhookError::Stale);
    }

    let expected = sign(secret, timestamp, body);
    if signatures.iter().any(|sig| constant_time_compare(sig, &expected)) {
        Ok(())
    } else {
        Err(WebhookError::Mismatch)
    }
}
