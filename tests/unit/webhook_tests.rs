//! Unit tests for webhook signature verification.

use agent_switchboard::gateway::http::signature_valid;
use hmac::{Hmac, Mac};
use sha2::Sha256;

fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac key");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[test]
fn valid_signature_is_accepted() {
    let body = br#"{"entry":[]}"#;
    let header = sign("top-secret", body);
    assert!(signature_valid("top-secret", &header, body));
}

#[test]
fn wrong_secret_is_rejected() {
    let body = br#"{"entry":[]}"#;
    let header = sign("other-secret", body);
    assert!(!signature_valid("top-secret", &header, body));
}

#[test]
fn tampered_body_is_rejected() {
    let body = br#"{"entry":[]}"#;
    let header = sign("top-secret", body);
    assert!(!signature_valid("top-secret", &header, br#"{"entry":[{}]}"#));
}

#[test]
fn missing_prefix_is_rejected() {
    let body = b"x";
    let mut mac = Hmac::<Sha256>::new_from_slice(b"top-secret").expect("hmac key");
    mac.update(body);
    let bare_hex = hex::encode(mac.finalize().into_bytes());
    assert!(!signature_valid("top-secret", &bare_hex, body));
}

#[test]
fn malformed_hex_is_rejected() {
    assert!(!signature_valid("top-secret", "sha256=zz-not-hex", b"x"));
    assert!(!signature_valid("top-secret", "", b"x"));
}
