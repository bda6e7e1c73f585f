// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The secret vault: small named values sealed under the owner's data key.
//!
//! Values are encrypted with XChaCha20-Poly1305 under the user's current
//! UDEK with `"{user_id}:{key_name}"` as associated data, so a ciphertext
//! copied to another row does not open.
//!
//! Every put, get and delete appends an audit entry. Audit writes are
//! best-effort: a failure is logged at error level and the primary operation
//! still succeeds.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use shebang_common_secret::SecretString;
use shebang_scripts_core::{
	validate_secret_name, AuditAction, AuditContext, SecretAuditEntry, SecretId, SecretMetadata,
	UserId,
};
use shebang_server_crypto::aead;
use shebang_server_db::{
	NewAuditEntry, ReencryptedSecret, SecretAuditStore, SecretStore, UdekStore,
};
use tracing::{error, info, instrument, warn};

use crate::error::{SecretsError, SecretsResult};
use crate::udek::UdekManager;

/// Hard cap on rows returned by one audit query.
pub const MAX_AUDIT_LIMIT: u32 = 1000;

/// Decrypted secret value with metadata.
#[derive(Debug)]
pub struct SecretValue {
	pub metadata: SecretMetadata,
	pub value: SecretString,
}

pub struct SecretVault<U: UdekStore, S: SecretStore, A: SecretAuditStore> {
	udeks: Arc<UdekManager<U>>,
	secrets: Arc<S>,
	audit: Arc<A>,
	audit_limit: u32,
}

impl<U: UdekStore, S: SecretStore, A: SecretAuditStore> SecretVault<U, S, A> {
	pub fn new(udeks: Arc<UdekManager<U>>, secrets: Arc<S>, audit: Arc<A>, audit_limit: u32) -> Self {
		Self {
			udeks,
			secrets,
			audit,
			audit_limit: audit_limit.clamp(1, MAX_AUDIT_LIMIT),
		}
	}

	pub fn udeks(&self) -> &UdekManager<U> {
		&self.udeks
	}

	/// Store `value` under `key_name`, bumping the version if it exists.
	#[instrument(skip(self, value, context), fields(user_id = %user_id, key_name = %key_name))]
	pub async fn put(
		&self,
		user_id: UserId,
		key_name: &str,
		value: &SecretString,
		expires_at: Option<DateTime<Utc>>,
		context: &AuditContext,
	) -> SecretsResult<SecretMetadata> {
		validate_secret_name(key_name)?;
		if let Some(at) = expires_at {
			if at <= Utc::now() {
				return Err(SecretsError::InvalidInput(
					"expiry must be in the future".to_string(),
				));
			}
		}

		let udek = self.udeks.get_or_create_udek(user_id).await?;
		let ciphertext =
			aead::encrypt_with_aad(udek.key(), value.as_bytes(), &secret_aad(user_id, key_name))?;

		let metadata = self
			.secrets
			.upsert_secret(user_id, key_name, &udek.id, &ciphertext, expires_at)
			.await?;

		self
			.record_audit(&metadata.id, user_id, key_name, AuditAction::Write, context)
			.await;

		info!(secret_id = %metadata.id, version = metadata.version, "Stored secret");
		Ok(metadata)
	}

	/// Decrypt the value stored under `key_name`.
	///
	/// # Errors
	/// [`SecretsError::SecretNotFound`] if the secret is absent or expired;
	/// the two cases are not distinguished.
	#[instrument(skip(self, context), fields(user_id = %user_id, key_name = %key_name))]
	pub async fn get(
		&self,
		user_id: UserId,
		key_name: &str,
		context: &AuditContext,
	) -> SecretsResult<SecretValue> {
		validate_secret_name(key_name)?;
		let now = Utc::now();

		let stored = match self.secrets.get_secret(user_id, key_name).await? {
			Some(stored) if !stored.metadata.is_expired(now) => stored,
			_ => return Err(SecretsError::SecretNotFound(key_name.to_string())),
		};

		let udek = self.udeks.get_udek(user_id, &stored.udek_id).await?;
		let plaintext = aead::decrypt_with_aad(
			udek.key(),
			&stored.ciphertext,
			&secret_aad(user_id, key_name),
		)?;
		let value = std::str::from_utf8(&plaintext)
			.map_err(|_| SecretsError::IntegrityError)?
			.to_string();

		if let Err(e) = self.secrets.touch_secret(&stored.metadata.id, now).await {
			warn!(error = %e, secret_id = %stored.metadata.id, "Failed to update secret last access time");
		}

		self
			.record_audit(&stored.metadata.id, user_id, key_name, AuditAction::Read, context)
			.await;

		let mut metadata = stored.metadata;
		metadata.last_accessed_at = Some(now);
		Ok(SecretValue {
			metadata,
			value: SecretString::new(value),
		})
	}

	/// Hard-delete the secret. The audit entry is written first.
	#[instrument(skip(self, context), fields(user_id = %user_id, key_name = %key_name))]
	pub async fn delete(
		&self,
		user_id: UserId,
		key_name: &str,
		context: &AuditContext,
	) -> SecretsResult<()> {
		validate_secret_name(key_name)?;

		let stored = match self.secrets.get_secret(user_id, key_name).await? {
			Some(stored) if !stored.metadata.is_expired(Utc::now()) => stored,
			_ => return Err(SecretsError::SecretNotFound(key_name.to_string())),
		};

		self
			.record_audit(&stored.metadata.id, user_id, key_name, AuditAction::Delete, context)
			.await;

		if !self.secrets.delete_secret(&stored.metadata.id).await? {
			return Err(SecretsError::SecretNotFound(key_name.to_string()));
		}

		info!(secret_id = %stored.metadata.id, "Deleted secret");
		Ok(())
	}

	/// Metadata of the user's live secrets. Never returns values.
	pub async fn list(&self, user_id: UserId) -> SecretsResult<Vec<SecretMetadata>> {
		let now = Utc::now();
		let secrets = self.secrets.list_secrets(user_id).await?;
		Ok(secrets.into_iter().filter(|s| !s.is_expired(now)).collect())
	}

	/// Audit entries for the user, newest first, optionally for one name.
	pub async fn audit_log(
		&self,
		user_id: UserId,
		key_name: Option<&str>,
		limit: Option<u32>,
	) -> SecretsResult<Vec<SecretAuditEntry>> {
		if let Some(name) = key_name {
			validate_secret_name(name)?;
		}
		let limit = limit.unwrap_or(self.audit_limit).clamp(1, MAX_AUDIT_LIMIT);
		Ok(self
			.audit
			.list_audit_entries(user_id, key_name, limit)
			.await?)
	}

	/// Delete every secret that expired at or before `now`. Audit rows stay.
	#[instrument(skip(self))]
	pub async fn purge_expired(&self, now: DateTime<Utc>) -> SecretsResult<u64> {
		let purged = self.secrets.delete_expired_secrets(now).await?;
		info!(purged, "Purged expired secrets");
		Ok(purged)
	}

	/// Rotate the user's data key and re-seal their secrets under it.
	///
	/// Secrets written concurrently keep the key they were written with and
	/// are picked up by the next rotation.
	#[instrument(skip(self), fields(user_id = %user_id))]
	pub async fn rotate_key(&self, user_id: UserId) -> SecretsResult<u64> {
		let Some(rotation) = self.udeks.begin_rotation(user_id).await? else {
			return Ok(0);
		};

		let stored = self.secrets.list_secrets_with_values(user_id).await?;
		let mut reencrypted = Vec::with_capacity(stored.len());
		for secret in stored {
			let previous = if secret.udek_id == rotation.current.id {
				rotation.current.clone()
			} else {
				self.udeks.get_udek(user_id, &secret.udek_id).await?
			};

			let aad = secret_aad(user_id, &secret.metadata.key_name);
			let plaintext = aead::decrypt_with_aad(previous.key(), &secret.ciphertext, &aad)?;
			let ciphertext = aead::encrypt_with_aad(rotation.replacement.key(), &plaintext, &aad)?;

			reencrypted.push(ReencryptedSecret {
				id: secret.metadata.id,
				previous_udek_id: secret.udek_id,
				version: secret.metadata.version,
				ciphertext,
			});
		}

		self.udeks.commit_rotation(rotation, &reencrypted).await
	}

	async fn record_audit(
		&self,
		secret_id: &SecretId,
		user_id: UserId,
		key_name: &str,
		action: AuditAction,
		context: &AuditContext,
	) {
		let entry = NewAuditEntry {
			secret_id,
			user_id,
			key_name,
			action,
			context,
		};
		if let Err(e) = self.audit.append_audit_entry(&entry).await {
			error!(
				error = %e,
				user_id = %user_id,
				key_name = %key_name,
				action = action.as_str(),
				"Failed to record secret audit entry"
			);
		}
	}
}

fn secret_aad(user_id: UserId, key_name: &str) -> Vec<u8> {
	format!("{user_id}:{key_name}").into_bytes()
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use chrono::Duration as ChronoDuration;
	use proptest::prelude::*;
	use shebang_server_db::testing::create_migrated_test_pool;
	use shebang_server_db::{DbError, SecretAuditRepository, SecretRepository, UdekRepository};
	use shebang_server_kms::{EnvKeyManager, KeyManager};
	use std::time::Duration;

	type TestVault = SecretVault<UdekRepository, SecretRepository, SecretAuditRepository>;

	async fn vault() -> (TestVault, Arc<SecretRepository>) {
		let pool = create_migrated_test_pool().await;
		let kms: Arc<dyn KeyManager> =
			Arc::new(EnvKeyManager::new(shebang_server_kms::aead::generate_key()));
		let udeks = Arc::new(UdekManager::new(
			kms,
			Arc::new(UdekRepository::new(pool.clone())),
			Duration::from_secs(300),
		));
		let secrets = Arc::new(SecretRepository::new(pool.clone()));
		let audit = Arc::new(SecretAuditRepository::new(pool));
		(
			SecretVault::new(udeks, Arc::clone(&secrets), audit, 100),
			secrets,
		)
	}

	fn ctx() -> AuditContext {
		AuditContext::new("203.0.113.7", "curl/8.5")
	}

	#[tokio::test]
	async fn secret_lifecycle_is_audited() {
		let (vault, _) = vault().await;
		let user = UserId::new(1);

		vault.put(user, "k", &"v1".into(), None, &ctx()).await.unwrap();
		vault.put(user, "k", &"v2".into(), None, &ctx()).await.unwrap();

		let got = vault.get(user, "k", &ctx()).await.unwrap();
		assert_eq!(got.value.expose(), "v2");
		assert_eq!(got.metadata.version, 2);
		assert!(got.metadata.last_accessed_at.is_some());

		vault.delete(user, "k", &ctx()).await.unwrap();
		let err = vault.get(user, "k", &ctx()).await.unwrap_err();
		assert!(matches!(err, SecretsError::SecretNotFound(_)));

		let log = vault.audit_log(user, Some("k"), None).await.unwrap();
		let actions: Vec<AuditAction> = log.iter().map(|e| e.action).collect();
		assert_eq!(
			actions,
			vec![
				AuditAction::Delete,
				AuditAction::Read,
				AuditAction::Write,
				AuditAction::Write
			]
		);
		let mutations = actions.iter().filter(|a| **a != AuditAction::Read).count();
		assert_eq!(mutations, 3);
		assert_eq!(log[0].ip.as_deref(), Some("203.0.113.7"));
		assert_eq!(log[0].user_agent.as_deref(), Some("curl/8.5"));
	}

	#[tokio::test]
	async fn secrets_are_scoped_to_their_owner() {
		let (vault, _) = vault().await;
		vault
			.put(UserId::new(1), "API_KEY", &"alice".into(), None, &ctx())
			.await
			.unwrap();

		let err = vault.get(UserId::new(2), "API_KEY", &ctx()).await.unwrap_err();
		assert!(matches!(err, SecretsError::SecretNotFound(_)));
	}

	#[tokio::test]
	async fn expired_secret_reads_as_missing_and_is_purged() {
		let (vault, secrets) = vault().await;
		let user = UserId::new(1);
		let expires = Utc::now() + ChronoDuration::milliseconds(50);
		vault
			.put(user, "TEMP", &"short-lived".into(), Some(expires), &ctx())
			.await
			.unwrap();
		vault
			.put(user, "KEEP", &"forever".into(), None, &ctx())
			.await
			.unwrap();

		tokio::time::sleep(Duration::from_millis(100)).await;

		let err = vault.get(user, "TEMP", &ctx()).await.unwrap_err();
		assert!(matches!(err, SecretsError::SecretNotFound(_)));
		let listed: Vec<String> = vault
			.list(user)
			.await
			.unwrap()
			.into_iter()
			.map(|m| m.key_name)
			.collect();
		assert_eq!(listed, vec!["KEEP".to_string()]);

		assert_eq!(vault.purge_expired(Utc::now()).await.unwrap(), 1);
		assert!(secrets.get_secret(user, "TEMP").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn past_expiry_is_rejected() {
		let (vault, _) = vault().await;
		let err = vault
			.put(
				UserId::new(1),
				"OLD",
				&"x".into(),
				Some(Utc::now() - ChronoDuration::seconds(1)),
				&ctx(),
			)
			.await
			.unwrap_err();
		assert!(matches!(err, SecretsError::InvalidInput(_)));
	}

	#[tokio::test]
	async fn invalid_names_are_rejected() {
		let (vault, _) = vault().await;
		for name in ["", "has space", "slash/name"] {
			let err = vault
				.put(UserId::new(1), name, &"x".into(), None, &ctx())
				.await
				.unwrap_err();
			assert!(matches!(err, SecretsError::InvalidInput(_)), "{name}");
		}
	}

	#[tokio::test]
	async fn ciphertext_moved_between_rows_fails_integrity() {
		let (vault, secrets) = vault().await;
		let user = UserId::new(1);
		let udek = vault.udeks().get_or_create_udek(user).await.unwrap();
		vault.put(user, "A", &"alpha".into(), None, &ctx()).await.unwrap();
		vault.put(user, "B", &"bravo".into(), None, &ctx()).await.unwrap();

		let a = secrets.get_secret(user, "A").await.unwrap().unwrap();
		secrets
			.upsert_secret(user, "B", &udek.id, &a.ciphertext, None)
			.await
			.unwrap();

		let err = vault.get(user, "B", &ctx()).await.unwrap_err();
		assert!(matches!(err, SecretsError::IntegrityError));
	}

	#[tokio::test]
	async fn tampered_ciphertext_fails_integrity() {
		let (vault, secrets) = vault().await;
		let user = UserId::new(1);
		vault.put(user, "T", &"tamper-me".into(), None, &ctx()).await.unwrap();

		let stored = secrets.get_secret(user, "T").await.unwrap().unwrap();
		let mut flipped = stored.ciphertext.clone();
		flipped[30] ^= 0x80;
		secrets
			.upsert_secret(user, "T", &stored.udek_id, &flipped, None)
			.await
			.unwrap();

		let err = vault.get(user, "T", &ctx()).await.unwrap_err();
		assert!(matches!(err, SecretsError::IntegrityError));
	}

	#[tokio::test]
	async fn rotation_reseals_existing_secrets() {
		let (vault, secrets) = vault().await;
		let user = UserId::new(1);
		vault.put(user, "ONE", &"1".into(), None, &ctx()).await.unwrap();
		vault.put(user, "TWO", &"2".into(), None, &ctx()).await.unwrap();
		let before = secrets.get_secret(user, "ONE").await.unwrap().unwrap();

		assert_eq!(vault.rotate_key(user).await.unwrap(), 2);

		let after = secrets.get_secret(user, "ONE").await.unwrap().unwrap();
		assert_ne!(after.udek_id, before.udek_id);
		assert_ne!(after.ciphertext, before.ciphertext);
		assert_eq!(after.metadata.version, before.metadata.version);
		assert_eq!(vault.get(user, "ONE", &ctx()).await.unwrap().value.expose(), "1");
		assert_eq!(vault.get(user, "TWO", &ctx()).await.unwrap().value.expose(), "2");

		let current = vault.udeks().get_or_create_udek(user).await.unwrap();
		assert_eq!(current.id, after.udek_id);
		assert_eq!(current.key_version, 2);
	}

	#[tokio::test]
	async fn rotating_user_without_key_moves_nothing() {
		let (vault, _) = vault().await;
		assert_eq!(vault.rotate_key(UserId::new(77)).await.unwrap(), 0);
	}

	#[tokio::test]
	async fn audit_limit_is_applied() {
		let (vault, _) = vault().await;
		let user = UserId::new(1);
		for i in 0..5 {
			vault
				.put(user, "COUNTER", &i.to_string().into(), None, &ctx())
				.await
				.unwrap();
		}
		assert_eq!(vault.audit_log(user, None, Some(3)).await.unwrap().len(), 3);
		assert_eq!(vault.audit_log(user, None, None).await.unwrap().len(), 5);
	}

	struct FailingAudit;

	#[async_trait]
	impl SecretAuditStore for FailingAudit {
		async fn append_audit_entry(&self, _entry: &NewAuditEntry<'_>) -> shebang_server_db::Result<i64> {
			Err(DbError::Internal("audit table offline".to_string()))
		}

		async fn list_audit_entries(
			&self,
			_user_id: UserId,
			_key_name: Option<&str>,
			_limit: u32,
		) -> shebang_server_db::Result<Vec<SecretAuditEntry>> {
			Ok(Vec::new())
		}
	}

	#[tokio::test]
	async fn audit_failure_does_not_fail_the_operation() {
		let pool = create_migrated_test_pool().await;
		let kms: Arc<dyn KeyManager> =
			Arc::new(EnvKeyManager::new(shebang_server_kms::aead::generate_key()));
		let udeks = Arc::new(UdekManager::new(
			kms,
			Arc::new(UdekRepository::new(pool.clone())),
			Duration::ZERO,
		));
		let vault = SecretVault::new(
			udeks,
			Arc::new(SecretRepository::new(pool)),
			Arc::new(FailingAudit),
			100,
		);
		let user = UserId::new(1);

		vault.put(user, "K", &"v".into(), None, &ctx()).await.unwrap();
		assert_eq!(vault.get(user, "K", &ctx()).await.unwrap().value.expose(), "v");
		vault.delete(user, "K", &ctx()).await.unwrap();
	}

	proptest! {
		#[test]
		fn secret_aad_is_unique_per_user_and_name(
			a in (0i64..1000, "[A-Za-z0-9_.-]{1,16}"),
			b in (0i64..1000, "[A-Za-z0-9_.-]{1,16}"),
		) {
			prop_assume!(a != b);
			prop_assert_ne!(
				secret_aad(UserId::new(a.0), &a.1),
				secret_aad(UserId::new(b.0), &b.1)
			);
		}
	}
}
