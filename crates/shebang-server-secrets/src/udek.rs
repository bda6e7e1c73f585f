// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-user data keys (UDEKs).
//!
//! Each user has exactly one current 256-bit data key, persisted only in
//! wrapped form under the master key. Demoted keys stay in the table so that
//! secrets sealed before a rotation remain readable until they are moved.
//!
//! # Creation
//!
//! First use inserts with `ON CONFLICT DO NOTHING` against the per-user
//! unique index and then re-reads the winning row. Any number of concurrent
//! first calls therefore agree on a single key.
//!
//! # Caching
//!
//! Unwrapped keys are cached per user for a configurable TTL in `Zeroizing`
//! buffers. A TTL of zero disables the cache. The cache lock is never held
//! across a KMS or database call.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use shebang_scripts_core::{UdekId, UdekRecord, UserId};
use shebang_server_config::VaultConfig;
use shebang_server_crypto::aead::{self, KEY_SIZE};
use shebang_server_db::{DbError, ReencryptedSecret, UdekStore};
use shebang_server_kms::{KeyManager, KmsError};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

use crate::error::{SecretsError, SecretsResult};

/// An unwrapped user data key.
#[derive(Clone)]
pub struct UserDataKey {
	pub id: UdekId,
	pub key_version: u32,
	key: Zeroizing<[u8; KEY_SIZE]>,
}

impl UserDataKey {
	pub fn key(&self) -> &[u8; KEY_SIZE] {
		&self.key
	}
}

impl fmt::Debug for UserDataKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("UserDataKey")
			.field("id", &self.id)
			.field("key_version", &self.key_version)
			.finish_non_exhaustive()
	}
}

struct CachedKey {
	key: UserDataKey,
	loaded_at: Instant,
}

/// A rotation that has a fresh key but has not been committed yet.
#[derive(Debug)]
pub struct PendingRotation {
	pub user_id: UserId,
	pub current: UserDataKey,
	pub replacement: UserDataKey,
	record: UdekRecord,
}

/// Outcome of re-wrapping every stored key under a new master key.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RewrapReport {
	pub rewrapped: u64,
	/// Records that already opened under the new master key.
	pub already_current: u64,
	/// Records changed by someone else while the rewrap ran.
	pub skipped: u64,
}

pub struct UdekManager<U: UdekStore> {
	kms: Arc<dyn KeyManager>,
	store: Arc<U>,
	cache_ttl: Duration,
	cache: RwLock<HashMap<UserId, CachedKey>>,
}

impl<U: UdekStore> UdekManager<U> {
	pub fn new(kms: Arc<dyn KeyManager>, store: Arc<U>, cache_ttl: Duration) -> Self {
		Self {
			kms,
			store,
			cache_ttl,
			cache: RwLock::new(HashMap::new()),
		}
	}

	pub fn from_config(kms: Arc<dyn KeyManager>, store: Arc<U>, config: &VaultConfig) -> Self {
		Self::new(kms, store, Duration::from_secs(config.udek_cache_ttl_secs))
	}

	pub fn backend_id(&self) -> &str {
		self.kms.backend_id()
	}

	/// Return the user's current key, creating it on first use.
	///
	/// # Errors
	/// - [`SecretsError::KeyUnavailable`] if the KMS cannot be reached
	/// - [`SecretsError::IntegrityError`] if the stored wrapped key does not
	///   open under the master key
	/// - [`SecretsError::Persistence`] on database failure
	#[instrument(skip(self), fields(user_id = %user_id))]
	pub async fn get_or_create_udek(&self, user_id: UserId) -> SecretsResult<UserDataKey> {
		if let Some(key) = self.cached(user_id).await {
			return Ok(key);
		}

		if let Some(record) = self.store.get_current_udek(user_id).await? {
			let key = self.unwrap_record(&record).await?;
			self.remember(user_id, &key).await;
			return Ok(key);
		}

		let fresh = aead::generate_key();
		let record = UdekRecord {
			id: UdekId::generate(),
			user_id,
			encrypted_udek: self.kms.encrypt(fresh.as_slice()).await?,
			key_version: 1,
			created_at: Utc::now(),
			rotated_at: None,
		};

		let key = if self.store.create_udek_if_absent(&record).await? {
			info!(user_id = %user_id, udek_id = %record.id, "Created user data key");
			UserDataKey {
				id: record.id,
				key_version: record.key_version,
				key: fresh,
			}
		} else {
			debug!(user_id = %user_id, "Lost user data key creation race, loading winner");
			let winner = self.store.get_current_udek(user_id).await?.ok_or_else(|| {
				SecretsError::Internal(format!(
					"no current user data key for user {user_id} after conflicting insert"
				))
			})?;
			self.unwrap_record(&winner).await?
		};

		self.remember(user_id, &key).await;
		Ok(key)
	}

	/// Unwrap a specific key of `user_id`, current or demoted.
	#[instrument(skip(self), fields(user_id = %user_id, udek_id = %id))]
	pub async fn get_udek(&self, user_id: UserId, id: &UdekId) -> SecretsResult<UserDataKey> {
		if let Some(key) = self.cached(user_id).await {
			if key.id == *id {
				return Ok(key);
			}
		}

		let record = self
			.store
			.get_udek(id)
			.await?
			.ok_or_else(|| SecretsError::Internal(format!("user data key {id} is missing")))?;

		if record.user_id != user_id {
			warn!(
				user_id = %user_id,
				owner = %record.user_id,
				udek_id = %id,
				"User data key belongs to another user"
			);
			return Err(SecretsError::IntegrityError);
		}

		self.unwrap_record(&record).await
	}

	/// Drop any cached key for `user_id`.
	pub async fn invalidate(&self, user_id: UserId) {
		self.cache.write().await.remove(&user_id);
	}

	/// Generate the successor of the user's current key.
	///
	/// Returns `None` if the user has no key yet.
	#[instrument(skip(self), fields(user_id = %user_id))]
	pub async fn begin_rotation(&self, user_id: UserId) -> SecretsResult<Option<PendingRotation>> {
		let Some(current_record) = self.store.get_current_udek(user_id).await? else {
			return Ok(None);
		};
		let current = self.unwrap_record(&current_record).await?;

		let fresh = aead::generate_key();
		let record = UdekRecord {
			id: UdekId::generate(),
			user_id,
			encrypted_udek: self.kms.encrypt(fresh.as_slice()).await?,
			key_version: current.key_version + 1,
			created_at: Utc::now(),
			rotated_at: None,
		};
		let replacement = UserDataKey {
			id: record.id,
			key_version: record.key_version,
			key: fresh,
		};

		Ok(Some(PendingRotation {
			user_id,
			current,
			replacement,
			record,
		}))
	}

	/// Demote the current key, install the replacement and move `secrets`
	/// to it, all in one transaction.
	///
	/// # Errors
	/// [`SecretsError::Conflict`] if another rotation committed first.
	#[instrument(
		skip(self, rotation, secrets),
		fields(user_id = %rotation.user_id, to = %rotation.replacement.id)
	)]
	pub async fn commit_rotation(
		&self,
		rotation: PendingRotation,
		secrets: &[ReencryptedSecret],
	) -> SecretsResult<u64> {
		let result = self
			.store
			.rotate_udek(
				rotation.user_id,
				&rotation.current.id,
				&rotation.record,
				secrets,
			)
			.await;
		self.invalidate(rotation.user_id).await;

		match result {
			Ok(moved) => {
				info!(
					user_id = %rotation.user_id,
					from = %rotation.current.id,
					to = %rotation.replacement.id,
					moved,
					"Rotated user data key"
				);
				Ok(moved)
			}
			Err(DbError::Conflict(msg)) => Err(SecretsError::Conflict(msg)),
			Err(e) => Err(e.into()),
		}
	}

	async fn unwrap_record(&self, record: &UdekRecord) -> SecretsResult<UserDataKey> {
		let plaintext = self.kms.decrypt(&record.encrypted_udek).await?;
		if plaintext.len() != KEY_SIZE {
			warn!(udek_id = %record.id, "Unwrapped user data key has the wrong length");
			return Err(SecretsError::IntegrityError);
		}

		let mut key = Zeroizing::new([0u8; KEY_SIZE]);
		key.copy_from_slice(&plaintext);
		Ok(UserDataKey {
			id: record.id,
			key_version: record.key_version,
			key,
		})
	}

	async fn cached(&self, user_id: UserId) -> Option<UserDataKey> {
		if self.cache_ttl.is_zero() {
			return None;
		}
		let cache = self.cache.read().await;
		cache
			.get(&user_id)
			.filter(|entry| entry.loaded_at.elapsed() < self.cache_ttl)
			.map(|entry| entry.key.clone())
	}

	async fn remember(&self, user_id: UserId, key: &UserDataKey) {
		if self.cache_ttl.is_zero() {
			return;
		}
		self.cache.write().await.insert(
			user_id,
			CachedKey {
				key: key.clone(),
				loaded_at: Instant::now(),
			},
		);
	}
}

/// Re-wrap every stored user data key from `old` to `new`.
///
/// Resumable: records that already open under `new` are counted and left
/// alone. Each update is a compare-and-swap on the old wrapped bytes.
#[instrument(skip_all, fields(from = old.backend_id(), to = new.backend_id()))]
pub async fn rewrap_all<U: UdekStore + ?Sized>(
	store: &U,
	old: &dyn KeyManager,
	new: &dyn KeyManager,
) -> SecretsResult<RewrapReport> {
	let mut report = RewrapReport::default();

	for record in store.list_udeks().await? {
		let key = match old.decrypt(&record.encrypted_udek).await {
			Ok(key) => key,
			Err(KmsError::IntegrityError) => {
				if new.decrypt(&record.encrypted_udek).await.is_err() {
					return Err(SecretsError::IntegrityError);
				}
				report.already_current += 1;
				continue;
			}
			Err(e) => return Err(e.into()),
		};

		let rewrapped = new.encrypt(&key).await?;
		if store
			.update_encrypted_udek(&record.id, &record.encrypted_udek, &rewrapped)
			.await?
		{
			report.rewrapped += 1;
		} else {
			warn!(udek_id = %record.id, "User data key changed during rewrap, skipped");
			report.skipped += 1;
		}
	}

	info!(
		rewrapped = report.rewrapped,
		already_current = report.already_current,
		skipped = report.skipped,
		"Rewrapped user data keys"
	);
	Ok(report)
}
