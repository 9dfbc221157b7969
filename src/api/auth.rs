// =============================================================================
// Webhook Authentication — shared secret + optional HMAC signature
// =============================================================================
//
// The webhook URL carries a path secret compared in constant time against
// `MERIDIAN_WEBHOOK_SECRET`. When the caller also sends an
// `X-Webhook-Signature` header it must be the hex HMAC-SHA256 of the raw
// body under the same secret; a present-but-wrong signature is rejected.
// =============================================================================

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compare two byte slices in constant time. Every byte of both slices is
/// examined even after a mismatch so timing does not reveal the position of
/// the first difference.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Validate the path secret against the configured one.
pub fn secret_matches(presented: &str, expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    constant_time_eq(presented.as_bytes(), expected.as_bytes())
}

/// Verify a hex HMAC-SHA256 signature of `body` under `secret`.
pub fn signature_matches(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(expected.as_bytes(), signature_hex.to_lowercase().as_bytes())
}
