// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! RSA key handling for user keypairs.
//!
//! The server stores public keys only. Private keys exist in this process for
//! the duration of a `generate` call and are handed back to the caller as a
//! PKCS#8 PEM wrapped in [`SecretString`].

use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use shebang_common_secret::SecretString;
use tracing::instrument;

use crate::error::{CryptoError, CryptoResult};

/// Modulus size used for newly generated keypairs.
pub const GENERATED_KEY_BITS: usize = 4096;

/// Smallest modulus accepted on import.
pub const MIN_KEY_BITS: usize = 2048;

/// A freshly generated keypair. `private_pem` must be returned to the user and
/// then dropped; it is never persisted.
#[derive(Debug)]
pub struct GeneratedKeyPair {
	pub public_pem: String,
	pub private_pem: SecretString,
}

/// Generate an RSA keypair. CPU-bound; async callers should run this on a
/// blocking thread.
#[instrument]
pub fn generate_keypair(bits: usize) -> CryptoResult<GeneratedKeyPair> {
	let private = RsaPrivateKey::new(&mut OsRng, bits)
		.map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
	let public = RsaPublicKey::from(&private);

	let private_pem = private
		.to_pkcs8_pem(LineEnding::LF)
		.map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;

	Ok(GeneratedKeyPair {
		public_pem: encode_public_key_pem(&public)?,
		private_pem: SecretString::new(private_pem.to_string()),
	})
}

/// Parse a PEM public key. Accepts SPKI (`PUBLIC KEY`) and PKCS#1
/// (`RSA PUBLIC KEY`) encodings; rejects moduli below [`MIN_KEY_BITS`].
pub fn parse_public_key_pem(pem: &str) -> CryptoResult<RsaPublicKey> {
	let pem = pem.trim();
	let key = if pem.starts_with("-----BEGIN RSA PUBLIC KEY-----") {
		RsaPublicKey::from_pkcs1_pem(pem).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?
	} else if pem.starts_with("-----BEGIN PUBLIC KEY-----") {
		RsaPublicKey::from_public_key_pem(pem)
			.map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?
	} else {
		return Err(CryptoError::InvalidPublicKey(
			"expected a PEM encoded RSA public key".to_string(),
		));
	};

	let bits = key.size() * 8;
	if bits < MIN_KEY_BITS {
		return Err(CryptoError::InvalidPublicKey(format!(
			"key is {bits} bits, minimum is {MIN_KEY_BITS}"
		)));
	}

	Ok(key)
}

/// Canonical SPKI PEM for storage.
pub fn encode_public_key_pem(key: &RsaPublicKey) -> CryptoResult<String> {
	key.to_public_key_pem(LineEnding::LF)
		.map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

/// Parse a PKCS#8 private key PEM. Used by key holders and tests; the server
/// never parses private keys.
pub fn parse_private_key_pem(pem: &SecretString) -> CryptoResult<RsaPrivateKey> {
	RsaPrivateKey::from_pkcs8_pem(pem.expose().trim())
		.map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))
}

/// Hex sha256 of the SPKI DER encoding.
pub fn public_key_fingerprint(key: &RsaPublicKey) -> CryptoResult<String> {
	let der = key
		.to_public_key_der()
		.map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
	Ok(hex::encode(Sha256::digest(der.as_bytes())))
}

#[cfg(test)]
pub(crate) mod test_keys {
	use super::*;
	use std::sync::OnceLock;

	/// One 2048-bit key shared by the crate's tests; 4096-bit generation is
	/// exercised once in its own test.
	pub fn private_key() -> &'static RsaPrivateKey {
		static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
		KEY.get_or_init(|| RsaPrivateKey::new(&mut OsRng, 2048).unwrap())
	}

	pub fn public_key() -> RsaPublicKey {
		RsaPublicKey::from(private_key())
	}
}
