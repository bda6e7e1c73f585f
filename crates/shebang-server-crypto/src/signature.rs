// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! RSA-PSS(SHA-256) signatures over script content hashes.
//!
//! Signing needs the private key, so signatures are produced by clients and
//! submitted with a version. The server only verifies.

use rand::rngs::OsRng;
use rsa::pss::{BlindedSigningKey, Signature, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::{CryptoError, CryptoResult};

/// Verify `signature` over `data` with `public`.
pub fn verify_signature(public: &RsaPublicKey, data: &[u8], signature: &[u8]) -> CryptoResult<()> {
	let signature = Signature::try_from(signature).map_err(|_| CryptoError::InvalidSignature)?;
	VerifyingKey::<Sha256>::new(public.clone())
		.verify(data, &signature)
		.map_err(|_| CryptoError::InvalidSignature)
}

/// Client-side signing helper.
pub fn sign(private: &RsaPrivateKey, data: &[u8]) -> Vec<u8> {
	BlindedSigningKey::<Sha256>::new(private.clone())
		.sign_with_rng(&mut OsRng, data)
		.to_vec()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::keys::test_keys;

	#[test]
	fn signature_verifies_over_same_bytes() {
		let signature = sign(test_keys::private_key(), b"ciphertext bytes");
		verify_signature(&test_keys::public_key(), b"ciphertext bytes", &signature).unwrap();
	}

	#[test]
	fn modified_data_fails() {
		let signature = sign(test_keys::private_key(), b"original");
		assert!(matches!(
			verify_signature(&test_keys::public_key(), b"modified", &signature),
			Err(CryptoError::InvalidSignature)
		));
	}

	#[test]
	fn garbage_signature_fails() {
		assert!(verify_signature(&test_keys::public_key(), b"data", &[0u8; 7]).is_err());
	}
}
