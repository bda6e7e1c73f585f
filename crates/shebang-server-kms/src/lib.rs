// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Master-key management for the shebang server.
//!
//! Every key the server persists (user data keys, in particular) is stored
//! only after being wrapped by a [`KeyManager`]. Two backends are provided:
//!
//! - [`EnvKeyManager`]: AES-256-GCM with a key decoded from the environment
//! - [`TransitKeyManager`]: a remote transit service that never releases the key
//!
//! Both produce opaque ciphertext; callers must not assume a layout.

pub mod aead;
pub mod env;
pub mod error;
pub mod transit;

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use shebang_common_secret::SecretString;
use shebang_server_config::{KmsBackend, KmsConfig};
use zeroize::Zeroizing;

pub use aead::KEY_SIZE;
pub use env::EnvKeyManager;
pub use error::{KmsError, KmsResult};
pub use transit::TransitKeyManager;

/// Wraps and unwraps byte blobs under a master key.
#[async_trait]
pub trait KeyManager: Send + Sync {
	/// Wrap `plaintext` under the master key.
	async fn encrypt(&self, plaintext: &[u8]) -> KmsResult<Vec<u8>>;

	/// Unwrap a value produced by [`KeyManager::encrypt`] on the same backend.
	///
	/// # Errors
	/// - [`KmsError::IntegrityError`] if the ciphertext was tampered with or
	///   wrapped under a different key
	/// - [`KmsError::InvalidCiphertext`] if the input is malformed
	/// - [`KmsError::KeyUnavailable`] if the backend cannot be reached
	async fn decrypt(&self, ciphertext: &[u8]) -> KmsResult<Zeroizing<Vec<u8>>>;

	/// Raw master key, for backend bootstrapping only. Application code must
	/// go through `encrypt`/`decrypt`.
	async fn master_key(&self) -> KmsResult<Zeroizing<[u8; KEY_SIZE]>>;

	/// Stable identifier of the backend and key, safe to log.
	fn backend_id(&self) -> &str;
}

/// Generate a new base64-encoded 256-bit master key for operators.
pub fn generate_master_key() -> SecretString {
	let key = aead::generate_key();
	SecretString::new(BASE64.encode(key.as_slice()))
}

/// Build the configured key manager.
pub fn key_manager_from_config(config: &KmsConfig) -> KmsResult<Arc<dyn KeyManager>> {
	match config.backend {
		KmsBackend::Env => Ok(Arc::new(EnvKeyManager::from_env(&config.master_key_env)?)),
		KmsBackend::Transit => {
			let transit = config.transit.as_ref().ok_or_else(|| {
				KmsError::Configuration("transit backend selected without transit settings".into())
			})?;
			Ok(Arc::new(TransitKeyManager::new(transit)?))
		}
	}
}
