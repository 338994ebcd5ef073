use crate::types::Payload;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Serialize a payload the way it is signed: compact JSON with sorted keys.
pub fn canonical_json(payload: &Payload) -> String {
    serde_json::to_string(payload).unwrap_or_default()
}

/// Hex-encoded HMAC-SHA256 of `message` keyed by `secret`.
pub fn hmac_hex(secret: &str, message: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Signature sent in `X-Webhook-Signature` for this payload.
pub fn sign_payload(secret: &str, payload: &Payload) -> String {
    hmac_hex(secret, canonical_json(payload).as_bytes())
}

/// Check a signature the way a receiving workflow would.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(body);
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    mac.verify_slice(&expected).is_ok()
}
