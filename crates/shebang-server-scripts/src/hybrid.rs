// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Hybrid encryption of script content.
//!
//! A fresh 256-bit content key seals the bytes with XChaCha20-Poly1305 (the
//! 24-byte nonce is prepended), and the key is wrapped with RSA-OAEP(SHA-256)
//! for the owner's keypair. The server keeps only ciphertext and the wrapped
//! key; [`HybridScriptEncryptor::open`] exists for key holders.

use shebang_scripts_core::{ContentEncoding, KeyPair, Script, WrappedKey};
use shebang_server_crypto::aead::{self, KEY_SIZE};
use shebang_server_crypto::keys::parse_public_key_pem;
use shebang_server_crypto::wrap::{unwrap_key, wrap_key};
use shebang_server_crypto::{RsaPrivateKey, RsaPublicKey};
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use crate::error::{ScriptsError, ScriptsResult};

/// Bytes to persist for a version and how they are protected.
#[derive(Debug)]
pub struct ProtectedContent {
	pub bytes: Vec<u8>,
	pub encoding: ContentEncoding,
}

impl ProtectedContent {
	fn plain(bytes: Vec<u8>) -> Self {
		Self {
			bytes,
			encoding: ContentEncoding::Plain,
		}
	}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HybridScriptEncryptor;

impl HybridScriptEncryptor {
	/// Encrypt `plaintext` for `keypair` when the script is private.
	///
	/// Without a keypair, or for public and unlisted scripts, the buffer is
	/// returned unchanged with [`ContentEncoding::Plain`]; otherwise it is
	/// sealed in place. Failures never fall back to plaintext.
	///
	/// # Errors
	/// - [`ScriptsError::KeyOwnershipMismatch`] if the keypair belongs to
	///   someone other than the script owner
	/// - [`ScriptsError::InvalidPublicKey`] if the stored PEM does not parse
	/// - [`ScriptsError::Encryption`] if sealing or wrapping fails
	#[instrument(skip_all, fields(script_id = %script.id, visibility = script.visibility.as_str()))]
	pub fn protect(
		script: &Script,
		plaintext: Vec<u8>,
		keypair: Option<&KeyPair>,
	) -> ScriptsResult<ProtectedContent> {
		let Some(keypair) = keypair else {
			return Ok(ProtectedContent::plain(plaintext));
		};
		if !script.visibility.requires_confidentiality() {
			debug!(keypair_id = %keypair.id, "Keypair ignored for non-private script");
			return Ok(ProtectedContent::plain(plaintext));
		}
		if keypair.user_id != script.owner_id {
			return Err(ScriptsError::KeyOwnershipMismatch);
		}

		let public = parse_public_key_pem(&keypair.public_key_pem)?;
		let (bytes, wrapped_key) = Self::seal(&public, plaintext)?;
		debug!(keypair_id = %keypair.id, size = bytes.len(), "Encrypted script content");

		Ok(ProtectedContent {
			bytes,
			encoding: ContentEncoding::Encrypted {
				keypair_id: keypair.id,
				wrapped_key,
			},
		})
	}

	/// Seal `plaintext` in place under a fresh content key wrapped for
	/// `public`.
	pub fn seal(public: &RsaPublicKey, plaintext: Vec<u8>) -> ScriptsResult<(Vec<u8>, WrappedKey)> {
		let key = aead::generate_key();
		let ciphertext = aead::seal_owned(&key, plaintext)?;
		let wrapped = wrap_key(public, key.as_slice())?;
		Ok((ciphertext, WrappedKey::new(wrapped)))
	}

	/// Recover plaintext with the private key.
	///
	/// # Errors
	/// [`ScriptsError::IntegrityError`] if the wrapped key or ciphertext was
	/// altered, or the private key does not match.
	pub fn open(
		private: &RsaPrivateKey,
		ciphertext: &[u8],
		wrapped_key: &WrappedKey,
	) -> ScriptsResult<Zeroizing<Vec<u8>>> {
		let unwrapped = unwrap_key(private, wrapped_key.as_bytes())?;
		let key: &[u8; KEY_SIZE] = unwrapped
			.as_slice()
			.try_into()
			.map_err(|_| ScriptsError::IntegrityError)?;
		Ok(aead::decrypt(key, ciphertext)?)
	}
}
