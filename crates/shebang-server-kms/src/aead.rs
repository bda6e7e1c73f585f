// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! AES-256-GCM sealing with the nonce carried in front of the ciphertext.
//!
//! Wire layout: `nonce (12) || ciphertext || tag (16)`.

use aes_gcm::{
	aead::{Aead, KeyInit, OsRng},
	Aes256Gcm, Key, Nonce,
};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{KmsError, KmsResult};

/// Master key size in bytes (AES-256).
pub const KEY_SIZE: usize = 32;

/// AES-GCM nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// AES-GCM tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// Generate a random 256-bit key.
pub fn generate_key() -> Zeroizing<[u8; KEY_SIZE]> {
	let mut key = Zeroizing::new([0u8; KEY_SIZE]);
	OsRng.fill_bytes(key.as_mut());
	key
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
pub fn seal(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> KmsResult<Vec<u8>> {
	let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

	let mut nonce_bytes = [0u8; NONCE_SIZE];
	OsRng.fill_bytes(&mut nonce_bytes);

	let ciphertext = cipher
		.encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
		.map_err(|e| KmsError::Encryption(format!("master key seal failed: {e}")))?;

	let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
	sealed.extend_from_slice(&nonce_bytes);
	sealed.extend_from_slice(&ciphertext);
	Ok(sealed)
}

/// Decrypt a value produced by [`seal`].
pub fn open(key: &[u8; KEY_SIZE], sealed: &[u8]) -> KmsResult<Zeroizing<Vec<u8>>> {
	if sealed.len() < NONCE_SIZE + TAG_SIZE {
		return Err(KmsError::InvalidCiphertext(format!(
			"expected at least {} bytes, got {}",
			NONCE_SIZE + TAG_SIZE,
			sealed.len()
		)));
	}

	let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
	let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

	cipher
		.decrypt(Nonce::from_slice(nonce), ciphertext)
		.map(Zeroizing::new)
		.map_err(|_| KmsError::IntegrityError)
}
