use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::PaymentError;

type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// Webhook Signature Verification
// ============================================================================
//
// Header format: `t=<unix seconds>,v1=<hex hmac-sha256>` where the MAC covers
// `"{t}.{raw body}"` under the shared signing secret. Several `v1` entries
// may be present while secrets rotate; any match is accepted.
//
// ============================================================================

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    /// Hex MAC over `"{timestamp}.{body}"`
    pub fn compute(&self, timestamp: i64, body: &[u8]) -> Result<String, PaymentError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| PaymentError::MalformedSignature)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);

        let digest = mac.finalize().into_bytes();
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            let _ = write!(hex, "{byte:02x}");
        }
        Ok(hex)
    }

    /// Full header value for `body` signed at `timestamp`
    pub fn header_for(&self, timestamp: i64, body: &[u8]) -> Result<String, PaymentError> {
        Ok(format!("t={timestamp},v1={}", self.compute(timestamp, body)?))
    }

    pub fn verify(
        &self,
        header: Option<&str>,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(), PaymentError> {
        let header = header.ok_or(PaymentError::MissingSignature)?;

        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => {
                    timestamp = Some(value.parse::<i64>().map_err(|_| PaymentError::MalformedSignature)?);
                }
                Some(("v1", value)) => signatures.push(value),
                Some(_) => {}
                None => return Err(PaymentError::MalformedSignature),
            }
        }

        let timestamp = timestamp.ok_or(PaymentError::MalformedSignature)?;
        if signatures.is_empty() {
            return Err(PaymentError::MalformedSignature);
        }

        let age_secs = now.timestamp() - timestamp;
        if age_secs.abs() > self.tolerance_secs {
            return Err(PaymentError::StaleSignature { age_secs });
        }

        let expected = self.compute(timestamp, body)?;
        let matched = signatures
            .iter()
            .any(|candidate| constant_time_eq(candidate.as_bytes(), expected.as_bytes()));

        if matched {
            Ok(())
        } else {
            Err(PaymentError::SignatureMismatch)
        }
    }
}
