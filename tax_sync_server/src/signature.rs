//! Webhook signature verification.
//!
//! The platform signs every webhook delivery with HMAC-SHA256 over the exact, unparsed request body, base64-encoded
//! into the signature header. Verification compares in constant time, and a configured fallback secret is tried
//! after the primary so that deliveries keep flowing while the signing key is being rotated.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use stt_common::Secret;

type HmacSha256 = Hmac<Sha256>;

pub fn calculate_hmac(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(body);
    base64::encode(mac.finalize().into_bytes())
}

/// Constant-time check of one secret against the base64 signature header.
pub fn verify_signature(secret: &str, body: &[u8], signature_b64: &str) -> bool {
    let expected = match base64::decode(signature_b64) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Try the primary secret, then the fallback, before rejecting.
pub fn verify_with_rotation(
    primary: &Secret<String>,
    fallback: Option<&Secret<String>>,
    body: &[u8],
    signature_b64: &str,
) -> bool {
    if verify_signature(primary.reveal(), body, signature_b64) {
        return true;
    }
    fallback.map(|secret| verify_signature(secret.reveal(), body, signature_b64)).unwrap_or(false)
}

#[cfg(test)]
mod test {
    use super::*;

    const BODY: &[u8] = br#"{"id": 820982911946154500, "total_price": "100.44"}"#;

    #[test]
    fn accepts_a_valid_signature() {
        let signature = calculate_hmac("hush", BODY);
        assert!(verify_signature("hush", BODY, &signature));
    }

    #[test]
    fn rejects_wrong_secret_or_tampered_body() {
        let signature = calculate_hmac("hush", BODY);
        assert!(!verify_signature("not-hush", BODY, &signature));
        assert!(!verify_signature("hush", b"tampered", &signature));
        assert!(!verify_signature("hush", BODY, "not base64!!"));
    }

    #[test]
    fn fallback_secret_is_accepted_during_rotation() {
        let old_secret = Secret::new("old".to_string());
        let new_secret = Secret::new("new".to_string());
        let signed_with_old = calculate_hmac("old", BODY);
        // Before rotation completes, deliveries signed with the old key must still verify
        assert!(verify_with_rotation(&new_secret, Some(&old_secret), BODY, &signed_with_old));
        // But only if the fallback is actually configured
        assert!(!verify_with_rotation(&new_secret, None, BODY, &signed_with_old));
    }
}
