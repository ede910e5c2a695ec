//! HMAC-SHA256 request signing, shared shape with this system's webhook
//! signature verification (§4.7): `timestamp + body`, hex-encoded digest.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-SMS-ENGINE-SIGNATURE";
pub const TIMESTAMP_HEADER: &str = "X-SMS-ENGINE-TIMESTAMP";

/// Sign `body` for an outbound request, returning `(signature_hex, timestamp)`.
pub fn sign(body: &str, signing_secret: &str) -> (String, String) {
    let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
    let signature_payload = format!("{timestamp}{body}");

    let mut mac =
        HmacSha256::new_from_slice(signing_secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(signature_payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    (signature, timestamp)
}

/// Verify a `(timestamp, body)` pair against a hex-encoded signature,
/// constant-time to avoid leaking the secret through a timing side channel.
/// Used by the webhook ingestor (§4.7) when `require_signature` is set.
pub fn verify(body: &str, timestamp: &str, signature_hex: &str, signing_secret: &str) -> bool {
    let signature_payload = format!("{timestamp}{body}");
    let mut mac =
        HmacSha256::new_from_slice(signing_secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(signature_payload.as_bytes());

    match hex::decode(signature_hex) {
        Ok(bytes) => mac.verify_slice(&bytes).is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_is_deterministic_for_a_fixed_timestamp_payload() {
        let (sig_a, ts_a) = sign("body", "secret");
        let mut mac = HmacSha256::new_from_slice(b"secret").unwrap();
        mac.update(format!("{ts_a}body").as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());
        assert_eq!(sig_a, expected);
    }

    #[test]
    fn verify_accepts_a_matching_signature() {
        let (sig, ts) = sign("payload", "secret");
        assert!(verify("payload", &ts, &sig, "secret"));
    }

    #[test]
    fn verify_rejects_a_tampered_body() {
        let (sig, ts) = sign("payload", "secret");
        assert!(!verify("tampered", &ts, &sig, "secret"));
    }

    #[test]
    fn verify_rejects_malformed_hex() {
        assert!(!verify("payload", "2026-01-01T00:00:00.000Z", "not-hex", "secret"));
    }
}
