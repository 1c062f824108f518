//! Webhook signature verification
//!
//! Senders sign the raw request body with HMAC-SHA-256 keyed by the shared
//! secret and present it as `X-Hub-Signature-256: sha256=<hex>`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Compute the header value for `body` signed with `secret`.
///
/// Returns `None` for an empty secret, which can never verify.
pub fn sign(secret: &[u8], body: &[u8]) -> Option<String> {
    if secret.is_empty() {
        return None;
    }
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(body);
    Some(format!(
        "{}{}",
        SIGNATURE_PREFIX,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Check that `presented` is the signature of `raw_body` under `secret`.
///
/// Never fails: an empty secret, an empty or malformed signature, and a
/// mismatch all yield `false`. The digest comparison is constant-time.
pub fn verify(secret: &[u8], raw_body: &[u8], presented: &str) -> bool {
    if secret.is_empty() || presented.is_empty() {
        return false;
    }

    let Some(hex_digest) = presented.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };

    // Only the canonical lowercase rendering is accepted
    if hex_digest.bytes().any(|b| b.is_ascii_uppercase()) {
        return false;
    }

    let Ok(digest) = hex::decode(hex_digest) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(raw_body);
    mac.verify_slice(&digest).is_ok()
}
