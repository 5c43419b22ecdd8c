//! HMAC-SHA256 signing of outbound webhook payloads.

// crates.io
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the hex-encoded, lower-case HMAC-SHA256 of `payload` keyed by `secret`.
///
/// The result carries no `sha256=` prefix; callers format the wire header themselves.
pub fn sign(payload: &[u8], secret: &[u8]) -> String {
	let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");

	mac.update(payload);

	let bytes = mac.finalize().into_bytes();

	hex_lower(&bytes)
}

fn hex_lower(bytes: &[u8]) -> String {
	use std::fmt::Write;

	let mut out = String::with_capacity(bytes.len() * 2);

	for byte in bytes {
		write!(out, "{byte:02x}").expect("writing to a String never fails");
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn signing_is_deterministic() {
		let payload = br#"{"event_type":"MODEL_VERSION_CREATED"}"#;

		assert_eq!(sign(payload, b"s"), sign(payload, b"s"));
	}

	#[test]
	fn signature_changes_with_secret_or_payload() {
		let payload = br#"{"event_type":"MODEL_VERSION_CREATED"}"#;
		let other_payload = br#"{"event_type":"MODEL_ALIAS_SET"}"#;

		assert_ne!(sign(payload, b"s"), sign(payload, b"other"));
		assert_ne!(sign(payload, b"s"), sign(other_payload, b"s"));
	}

	#[test]
	fn known_vector_matches_hex_sha256_hmac() {
		// HMAC-SHA256("key", "The quick brown fox jumps over the lazy dog")
		let expected = "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8";

		assert_eq!(sign(b"The quick brown fox jumps over the lazy dog", b"key"), expected);
	}
}
