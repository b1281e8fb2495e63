//! Gateway signatures: lower-case hex HMAC-SHA256.
//!
//! Payment callbacks sign `order_id|payment_id` with the API key secret,
//! webhooks sign the raw request body with the webhook secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEX_LEN: usize = 64;

fn keyed(secret: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size")
}

pub fn sign(secret: &[u8], message: &[u8]) -> String {
    let mut mac = keyed(secret);
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

fn payment_message(order_id: &str, payment_id: &str) -> String {
    format!("{}|{}", order_id, payment_id)
}

pub fn payment_signature(secret: &[u8], order_id: &str, payment_id: &str) -> String {
    sign(secret, payment_message(order_id, payment_id).as_bytes())
}

/// Constant-time check. Upper-case hex is rejected so that the accepted
/// string is exactly the one the gateway produced.
pub fn verify(secret: &[u8], message: &[u8], signature: &str) -> bool {
    let well_formed = signature.len() == SIGNATURE_HEX_LEN
        && signature
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if !well_formed {
        return false;
    }
    let Ok(provided) = hex::decode(signature) else {
        return false;
    };
    let mut mac = keyed(secret);
    mac.update(message);
    mac.verify_slice(&provided).is_ok()
}

pub fn verify_payment_signature(
    secret: &[u8],
    order_id: &str,
    payment_id: &str,
    signature: &str,
) -> bool {
    verify(secret, payment_message(order_id, payment_id).as_bytes(), signature)
}

pub fn verify_webhook_signature(secret: &[u8], body: &[u8], signature: &str) -> bool {
    verify(secret, body, signature)
}
