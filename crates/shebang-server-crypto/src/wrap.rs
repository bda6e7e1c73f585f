// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! RSA-OAEP(SHA-256) key wrapping.

use rand::rngs::OsRng;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};

/// Wrap a symmetric key for the holder of `public`'s private key.
pub fn wrap_key(public: &RsaPublicKey, key: &[u8]) -> CryptoResult<Vec<u8>> {
	public
		.encrypt(&mut OsRng, Oaep::new::<Sha256>(), key)
		.map_err(|e| CryptoError::KeyWrap(e.to_string()))
}

/// Unwrap with the private key. Only key holders can call this; the server
/// has no private keys.
pub fn unwrap_key(private: &RsaPrivateKey, wrapped: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>> {
	private
		.decrypt(Oaep::new::<Sha256>(), wrapped)
		.map(Zeroizing::new)
		.map_err(|_| CryptoError::IntegrityError)
}
