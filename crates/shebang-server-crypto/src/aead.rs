// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! XChaCha20-Poly1305 for script content and vault values.
//!
//! Layout: `nonce (24) || ciphertext || tag (16)`. The 192-bit nonce is drawn
//! at random per call, so no counter has to be tracked across versions.
//! Encryption writes into a single output buffer sized up front; the
//! plaintext is copied once and transformed in place. [`seal_owned`] skips
//! the copy and seals a buffer the caller gives up.

use chacha20poly1305::{
	aead::{AeadInPlace, KeyInit},
	Key, Tag, XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 24;
pub const TAG_SIZE: usize = 16;

/// Fresh random 256-bit symmetric key.
pub fn generate_key() -> Zeroizing<[u8; KEY_SIZE]> {
	let mut key = Zeroizing::new([0u8; KEY_SIZE]);
	OsRng.fill_bytes(key.as_mut());
	key
}

/// Size of the sealed output for a plaintext of `len` bytes.
pub fn sealed_len(len: usize) -> usize {
	NONCE_SIZE + len + TAG_SIZE
}

pub fn encrypt(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
	encrypt_with_aad(key, plaintext, b"")
}

/// Seal an owned plaintext buffer in place. The buffer grows by the nonce
/// and tag; no second copy of the content is made.
pub fn seal_owned(key: &[u8; KEY_SIZE], mut buffer: Vec<u8>) -> CryptoResult<Vec<u8>> {
	let cipher = XChaCha20Poly1305::new(Key::from_slice(key));

	let mut nonce = [0u8; NONCE_SIZE];
	OsRng.fill_bytes(&mut nonce);

	let len = buffer.len();
	buffer.reserve_exact(NONCE_SIZE + TAG_SIZE);
	buffer.resize(NONCE_SIZE + len, 0);
	buffer.copy_within(..len, NONCE_SIZE);
	buffer[..NONCE_SIZE].copy_from_slice(&nonce);

	let tag = cipher
		.encrypt_in_place_detached(XNonce::from_slice(&nonce), b"", &mut buffer[NONCE_SIZE..])
		.map_err(|e| CryptoError::Encryption(e.to_string()))?;
	buffer.extend_from_slice(&tag);

	Ok(buffer)
}

pub fn decrypt(key: &[u8; KEY_SIZE], sealed: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>> {
	decrypt_with_aad(key, sealed, b"")
}

/// Encrypt binding `aad` into the tag. The same `aad` must be supplied to
/// decrypt.
pub fn encrypt_with_aad(
	key: &[u8; KEY_SIZE],
	plaintext: &[u8],
	aad: &[u8],
) -> CryptoResult<Vec<u8>> {
	let cipher = XChaCha20Poly1305::new(Key::from_slice(key));

	let mut nonce = [0u8; NONCE_SIZE];
	OsRng.fill_bytes(&mut nonce);

	let mut out = Vec::with_capacity(sealed_len(plaintext.len()));
	out.extend_from_slice(&nonce);
	out.extend_from_slice(plaintext);

	let tag = cipher
		.encrypt_in_place_detached(XNonce::from_slice(&nonce), aad, &mut out[NONCE_SIZE..])
		.map_err(|e| CryptoError::Encryption(e.to_string()))?;
	out.extend_from_slice(&tag);

	Ok(out)
}

pub fn decrypt_with_aad(
	key: &[u8; KEY_SIZE],
	sealed: &[u8],
	aad: &[u8],
) -> CryptoResult<Zeroizing<Vec<u8>>> {
	if sealed.len() < NONCE_SIZE + TAG_SIZE {
		return Err(CryptoError::InvalidCiphertext(format!(
			"expected at least {} bytes, got {}",
			NONCE_SIZE + TAG_SIZE,
			sealed.len()
		)));
	}

	let (nonce, rest) = sealed.split_at(NONCE_SIZE);
	let (ciphertext, tag) = rest.split_at(rest.len() - TAG_SIZE);

	let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
	let mut buffer = Zeroizing::new(ciphertext.to_vec());
	cipher
		.decrypt_in_place_detached(
			XNonce::from_slice(nonce),
			aad,
			buffer.as_mut_slice(),
			Tag::from_slice(tag),
		)
		.map_err(|_| CryptoError::IntegrityError)?;

	Ok(buffer)
}
