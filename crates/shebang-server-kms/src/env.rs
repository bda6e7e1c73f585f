// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Master key held in process memory, provisioned through the environment.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha2::{Digest, Sha256};
use shebang_common_secret::SecretString;
use shebang_server_config::load_secret_env;
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use crate::aead::{self, KEY_SIZE};
use crate::error::{KmsError, KmsResult};
use crate::KeyManager;

/// Local/dev backend: a 32-byte AES key decoded from a base64 env var
/// (or the file named by `{VAR}_FILE`).
pub struct EnvKeyManager {
	key: Zeroizing<[u8; KEY_SIZE]>,
	backend_id: String,
}

impl EnvKeyManager {
	pub fn new(key: Zeroizing<[u8; KEY_SIZE]>) -> Self {
		let backend_id = format!("env:{}", fingerprint(&key));
		Self { key, backend_id }
	}

	/// Read the master key from `var`. A missing variable is
	/// [`KmsError::KeyUnavailable`]; a malformed one is a configuration error.
	#[instrument]
	pub fn from_env(var: &str) -> KmsResult<Self> {
		let encoded = load_secret_env(var)
			.map_err(|e| KmsError::KeyUnavailable(e.to_string()))?
			.ok_or_else(|| KmsError::KeyUnavailable(format!("{var} is not set")))?;

		let manager = Self::from_base64(&encoded)?;
		debug!(backend_id = %manager.backend_id, "loaded master key from environment");
		Ok(manager)
	}

	pub fn from_base64(encoded: &SecretString) -> KmsResult<Self> {
		let bytes: Zeroizing<Vec<u8>> = Zeroizing::new(
			BASE64
				.decode(encoded.expose().trim())
				.map_err(|_| KmsError::Configuration("master key is not valid base64".to_string()))?,
		);

		if bytes.len() != KEY_SIZE {
			return Err(KmsError::Configuration(format!(
				"master key must be {KEY_SIZE} bytes, got {}",
				bytes.len()
			)));
		}

		let mut key = Zeroizing::new([0u8; KEY_SIZE]);
		key.copy_from_slice(&bytes);
		Ok(Self::new(key))
	}
}

impl std::fmt::Debug for EnvKeyManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EnvKeyManager")
			.field("key", &"[REDACTED]")
			.field("backend_id", &self.backend_id)
			.finish()
	}
}

#[async_trait]
impl KeyManager for EnvKeyManager {
	async fn encrypt(&self, plaintext: &[u8]) -> KmsResult<Vec<u8>> {
		aead::seal(&self.key, plaintext)
	}

	async fn decrypt(&self, ciphertext: &[u8]) -> KmsResult<Zeroizing<Vec<u8>>> {
		aead::open(&self.key, ciphertext)
	}

	async fn master_key(&self) -> KmsResult<Zeroizing<[u8; KEY_SIZE]>> {
		Ok(self.key.clone())
	}

	fn backend_id(&self) -> &str {
		&self.backend_id
	}
}

/// Short non-reversible identifier so logs can tell two master keys apart.
fn fingerprint(key: &[u8; KEY_SIZE]) -> String {
	let digest = Sha256::digest(key);
	hex::encode(&digest[..6])
}
