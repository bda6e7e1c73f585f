// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! User keypairs for script encryption.
//!
//! Only public keys are stored. A generated private key is returned exactly
//! once and then dropped.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use shebang_common_secret::SecretString;
use shebang_scripts_core::{validate_keypair_name, KeyPair, KeyPairId, UserId};
use shebang_server_crypto::keys::{
	encode_public_key_pem, generate_keypair, parse_public_key_pem, public_key_fingerprint,
	GENERATED_KEY_BITS,
};
use shebang_server_db::KeyPairStore;
use tracing::{info, instrument};

use crate::error::{ScriptsError, ScriptsResult};

/// A stored keypair plus the private key the caller must keep.
pub struct GeneratedKey {
	pub keypair: KeyPair,
	pub private_key_pem: SecretString,
}

impl fmt::Debug for GeneratedKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("GeneratedKey")
			.field("keypair", &self.keypair)
			.field("private_key_pem", &self.private_key_pem)
			.finish()
	}
}

pub struct KeyPairService<K: KeyPairStore> {
	store: Arc<K>,
	key_bits: usize,
}

impl<K: KeyPairStore> KeyPairService<K> {
	pub fn new(store: Arc<K>) -> Self {
		Self::with_key_bits(store, GENERATED_KEY_BITS)
	}

	pub fn with_key_bits(store: Arc<K>, key_bits: usize) -> Self {
		Self { store, key_bits }
	}

	/// Generate a keypair server-side. Key generation runs on the blocking
	/// pool.
	#[instrument(skip(self), fields(user_id = %user_id, bits = self.key_bits))]
	pub async fn generate(&self, user_id: UserId, name: &str) -> ScriptsResult<GeneratedKey> {
		validate_keypair_name(name)?;

		let bits = self.key_bits;
		let generated = tokio::task::spawn_blocking(move || generate_keypair(bits))
			.await
			.map_err(|e| ScriptsError::Internal(format!("key generation task failed: {e}")))??;

		let public = parse_public_key_pem(&generated.public_pem)?;
		let keypair = KeyPair {
			id: KeyPairId::generate(),
			user_id,
			name: name.trim().to_string(),
			fingerprint: public_key_fingerprint(&public)?,
			public_key_pem: generated.public_pem,
			created_at: Utc::now(),
		};
		self.store.create_keypair(&keypair).await?;

		info!(keypair_id = %keypair.id, fingerprint = %keypair.fingerprint, "Generated keypair");
		Ok(GeneratedKey {
			keypair,
			private_key_pem: generated.private_pem,
		})
	}

	/// Register a public key generated elsewhere. PKCS#1 input is stored in
	/// its SPKI form.
	#[instrument(skip(self, public_key_pem), fields(user_id = %user_id))]
	pub async fn import(&self, user_id: UserId, name: &str, public_key_pem: &str) -> ScriptsResult<KeyPair> {
		validate_keypair_name(name)?;
		let public = parse_public_key_pem(public_key_pem)?;

		let keypair = KeyPair {
			id: KeyPairId::generate(),
			user_id,
			name: name.trim().to_string(),
			public_key_pem: encode_public_key_pem(&public)?,
			fingerprint: public_key_fingerprint(&public)?,
			created_at: Utc::now(),
		};
		self.store.create_keypair(&keypair).await?;

		info!(keypair_id = %keypair.id, fingerprint = %keypair.fingerprint, "Imported keypair");
		Ok(keypair)
	}

	pub async fn list(&self, user_id: UserId) -> ScriptsResult<Vec<KeyPair>> {
		Ok(self.store.list_keypairs(user_id).await?)
	}

	/// A keypair owned by `user_id`. Other users' keypairs read as missing.
	pub async fn get(&self, user_id: UserId, id: &KeyPairId) -> ScriptsResult<KeyPair> {
		match self.store.get_keypair(id).await? {
			Some(keypair) if keypair.user_id == user_id => Ok(keypair),
			_ => Err(ScriptsError::NotFound(format!("keypair {id}"))),
		}
	}

	/// Delete a keypair. Versions encrypted to it stay stored but can only be
	/// opened by whoever still holds the private key.
	#[instrument(skip(self), fields(user_id = %user_id, keypair_id = %id))]
	pub async fn delete(&self, user_id: UserId, id: &KeyPairId) -> ScriptsResult<()> {
		if !self.store.delete_keypair(user_id, id).await? {
			return Err(ScriptsError::NotFound(format!("keypair {id}")));
		}
		info!("Deleted keypair");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::test_key;
	use shebang_server_crypto::keys::parse_private_key_pem;
	use shebang_server_crypto::RsaPublicKey;
	use shebang_server_db::testing::create_migrated_test_pool;
	use shebang_server_db::KeyPairRepository;

	const ALICE: UserId = UserId::new(1);
	const BOB: UserId = UserId::new(2);

	async fn service() -> KeyPairService<KeyPairRepository> {
		let pool = create_migrated_test_pool().await;
		KeyPairService::with_key_bits(Arc::new(KeyPairRepository::new(pool)), 2048)
	}

	#[tokio::test]
	async fn generated_private_key_matches_stored_public_key() {
		let service = service().await;
		let generated = service.generate(ALICE, "  laptop ").await.unwrap();
		assert_eq!(generated.keypair.name, "laptop");

		let private = parse_private_key_pem(&generated.private_key_pem).unwrap();
		let stored = parse_public_key_pem(&generated.keypair.public_key_pem).unwrap();
		assert_eq!(RsaPublicKey::from(&private), stored);
		assert_eq!(
			generated.keypair.fingerprint,
			public_key_fingerprint(&stored).unwrap()
		);

		let debug = format!("{generated:?}");
		assert!(!debug.contains("PRIVATE KEY"));
	}

	#[tokio::test]
	async fn import_stores_canonical_pem() {
		let service = service().await;
		let key = test_key();
		let keypair = service.import(ALICE, "ci", &key.public_pem).await.unwrap();
		assert!(keypair.public_key_pem.starts_with("-----BEGIN PUBLIC KEY-----"));
		assert_eq!(service.get(ALICE, &keypair.id).await.unwrap(), keypair);
	}

	#[tokio::test]
	async fn import_rejects_garbage_and_duplicates() {
		let service = service().await;
		let err = service.import(ALICE, "ci", "not a key").await.unwrap_err();
		assert!(matches!(err, ScriptsError::InvalidPublicKey(_)));

		service.import(ALICE, "ci", &test_key().public_pem).await.unwrap();
		let err = service
			.import(ALICE, "ci", &test_key().public_pem)
			.await
			.unwrap_err();
		assert!(matches!(err, ScriptsError::Conflict(_)));

		let err = service.import(ALICE, "  ", &test_key().public_pem).await.unwrap_err();
		assert!(matches!(err, ScriptsError::InvalidInput(_)));
	}

	#[tokio::test]
	async fn keypairs_are_scoped_to_their_owner() {
		let service = service().await;
		let keypair = service.import(ALICE, "ci", &test_key().public_pem).await.unwrap();

		assert!(service.list(BOB).await.unwrap().is_empty());
		let err = service.get(BOB, &keypair.id).await.unwrap_err();
		assert!(matches!(err, ScriptsError::NotFound(_)));
		let err = service.delete(BOB, &keypair.id).await.unwrap_err();
		assert!(matches!(err, ScriptsError::NotFound(_)));

		service.delete(ALICE, &keypair.id).await.unwrap();
		assert!(service.list(ALICE).await.unwrap().is_empty());
	}
}
