//! MercadoPago webhook signatures.
//!
//! `x-signature` looks like `ts=1704908010,v1=618c85...`. `v1` is the hex
//! HMAC-SHA256, keyed with the webhook secret, of the manifest
//! `id:<data.id>;request-id:<x-request-id>;ts:<ts>;`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("missing {0}")]
    Missing(&'static str),

    #[error("malformed x-signature header")]
    MalformedSignature,

    #[error("signature mismatch")]
    Mismatch,

    #[error("signature timestamp outside the accepted window")]
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub ts: String,
    pub v1: String,
}

impl SignatureHeader {
    pub fn parse(raw: &str) -> Result<Self, WebhookError> {
        let mut ts = None;
        let mut v1 = None;
        for part in raw.split(',') {
            let Some((k, v)) = part.split_once('=') else {
                continue;
            };
            match k.trim() {
                "ts" => ts = Some(v.trim().to_string()),
                "v1" => v1 = Some(v.trim().to_string()),
                _ => {}
            }
        }
        match (ts, v1) {
            (Some(ts), Some(v1)) if !ts.is_empty() && !v1.is_empty() => Ok(Self { ts, v1 }),
            _ => Err(WebhookError::MalformedSignature),
        }
    }
}

/// Alphanumeric ids are signed lower-cased.
pub fn manifest(data_id: &str, request_id: &str, ts: &str) -> String {
    format!(
        "id:{};request-id:{};ts:{};",
        data_id.to_lowercase(),
        request_id,
        ts
    )
}

pub fn verify(
    secret: &str,
    header: &SignatureHeader,
    data_id: &str,
    request_id: &str,
) -> Result<(), WebhookError> {
    let expected = hex::decode(&header.v1).map_err(|_| WebhookError::MalformedSignature)?;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| WebhookError::Mismatch)?;
    mac.update(manifest(data_id, request_id, &header.ts).as_bytes());
    mac.verify_slice(&expected).map_err(|_| WebhookError::Mismatch)
}

/// Rejects a `ts` further than `max_skew_secs` from `now`. MercadoPago sends
/// seconds; millisecond timestamps are accepted too. A zero window disables
/// the check.
pub fn check_fresh(ts: &str, now: i64, max_skew_secs: u64) -> Result<(), WebhookError> {
    if max_skew_secs == 0 {
        return Ok(());
    }
    let mut ts: i64 = ts.parse().map_err(|_| WebhookError::MalformedSignature)?;
    if ts > 100_000_000_000 {
        ts /= 1000;
    }
    if ts.abs_diff(now) > max_skew_secs {
        return Err(WebhookError::Stale);
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn sign(secret: &str, data_id: &str, request_id: &str, ts: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(manifest(data_id, request_id, ts).as_bytes());
    format!("ts={ts},v1={}", hex::encode(mac.finalize().into_bytes()))
}
