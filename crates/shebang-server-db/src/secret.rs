// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Vault secret repository.
//!
//! Values arrive already encrypted under a user data key; this layer only
//! sees ciphertext and the id of the key it was sealed with.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shebang_scripts_core::{SecretId, SecretMetadata, UdekId, UserId};
use sqlx::{sqlite::SqlitePool, Row};

use crate::codec::{format_timestamp, parse_id, parse_opt_timestamp, parse_timestamp, to_u32};
use crate::error::Result;

/// A secret row including its ciphertext.
#[derive(Clone)]
pub struct StoredSecret {
	pub metadata: SecretMetadata,
	pub udek_id: UdekId,
	pub ciphertext: Vec<u8>,
}

impl std::fmt::Debug for StoredSecret {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("StoredSecret")
			.field("metadata", &self.metadata)
			.field("udek_id", &self.udek_id)
			.field("ciphertext_len", &self.ciphertext.len())
			.finish()
	}
}

#[async_trait]
pub trait SecretStore: Send + Sync {
	async fn upsert_secret(
		&self,
		user_id: UserId,
		key_name: &str,
		udek_id: &UdekId,
		ciphertext: &[u8],
		expires_at: Option<DateTime<Utc>>,
	) -> Result<SecretMetadata>;
	async fn get_secret(&self, user_id: UserId, key_name: &str) -> Result<Option<StoredSecret>>;
	async fn touch_secret(&self, id: &SecretId, at: DateTime<Utc>) -> Result<()>;
	async fn delete_secret(&self, id: &SecretId) -> Result<bool>;
	async fn list_secrets(&self, user_id: UserId) -> Result<Vec<SecretMetadata>>;
	async fn list_secrets_with_values(&self, user_id: UserId) -> Result<Vec<StoredSecret>>;
	async fn delete_expired_secrets(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
impl SecretStore for SecretRepository {
	async fn upsert_secret(
		&self,
		user_id: UserId,
		key_name: &str,
		udek_id: &UdekId,
		ciphertext: &[u8],
		expires_at: Option<DateTime<Utc>>,
	) -> Result<SecretMetadata> {
		self.upsert_secret(user_id, key_name, udek_id, ciphertext, expires_at)
			.await
	}

	async fn get_secret(&self, user_id: UserId, key_name: &str) -> Result<Option<StoredSecret>> {
		self.get_secret(user_id, key_name).await
	}

	async fn touch_secret(&self, id: &SecretId, at: DateTime<Utc>) -> Result<()> {
		self.touch_secret(id, at).await
	}

	async fn delete_secret(&self, id: &SecretId) -> Result<bool> {
		self.delete_secret(id).await
	}

	async fn list_secrets(&self, user_id: UserId) -> Result<Vec<SecretMetadata>> {
		self.list_secrets(user_id).await
	}

	async fn list_secrets_with_values(&self, user_id: UserId) -> Result<Vec<StoredSecret>> {
		self.list_secrets_with_values(user_id).await
	}

	async fn delete_expired_secrets(&self, now: DateTime<Utc>) -> Result<u64> {
		self.delete_expired_secrets(now).await
	}
}

#[derive(Clone)]
pub struct SecretRepository {
	pool: SqlitePool,
}

const METADATA_COLUMNS: &str =
	"id, user_id, key_name, version, created_at, updated_at, last_accessed_at, expires_at";

impl SecretRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Insert or replace the value for `(user_id, key_name)`. Replacing bumps
	/// the version and resets the expiry to `expires_at`.
	#[tracing::instrument(skip(self, ciphertext), fields(user_id = %user_id, key_name, udek_id = %udek_id))]
	pub async fn upsert_secret(
		&self,
		user_id: UserId,
		key_name: &str,
		udek_id: &UdekId,
		ciphertext: &[u8],
		expires_at: Option<DateTime<Utc>>,
	) -> Result<SecretMetadata> {
		let now = format_timestamp(Utc::now());

		let row = sqlx::query(&format!(
			r#"
			INSERT INTO secrets (id, user_id, key_name, ciphertext, udek_id, version, created_at, updated_at, expires_at)
			VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?)
			ON CONFLICT (user_id, key_name) DO UPDATE SET
				ciphertext = excluded.ciphertext,
				udek_id = excluded.udek_id,
				version = secrets.version + 1,
				updated_at = excluded.updated_at,
				expires_at = excluded.expires_at
			RETURNING {METADATA_COLUMNS}
			"#
		))
		.bind(SecretId::generate().to_string())
		.bind(user_id.get())
		.bind(key_name)
		.bind(ciphertext)
		.bind(udek_id.to_string())
		.bind(&now)
		.bind(&now)
		.bind(expires_at.map(format_timestamp))
		.fetch_one(&self.pool)
		.await?;

		let metadata = parse_metadata_row(&row)?;
		tracing::debug!(secret_id = %metadata.id, version = metadata.version, "secret stored");
		Ok(metadata)
	}

	/// Fetch a secret row, expired or not. Expiry is the caller's decision.
	#[tracing::instrument(skip(self), fields(user_id = %user_id, key_name))]
	pub async fn get_secret(&self, user_id: UserId, key_name: &str) -> Result<Option<StoredSecret>> {
		let row = sqlx::query(&format!(
			"SELECT {METADATA_COLUMNS}, udek_id, ciphertext FROM secrets WHERE user_id = ? AND key_name = ?"
		))
		.bind(user_id.get())
		.bind(key_name)
		.fetch_optional(&self.pool)
		.await?;

		row.as_ref().map(parse_stored_row).transpose()
	}

	#[tracing::instrument(skip(self), fields(secret_id = %id))]
	pub async fn touch_secret(&self, id: &SecretId, at: DateTime<Utc>) -> Result<()> {
		sqlx::query("UPDATE secrets SET last_accessed_at = ? WHERE id = ?")
			.bind(format_timestamp(at))
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self), fields(secret_id = %id))]
	pub async fn delete_secret(&self, id: &SecretId) -> Result<bool> {
		let result = sqlx::query("DELETE FROM secrets WHERE id = ?")
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected() > 0)
	}

	/// Metadata for every secret the user holds, expired ones included.
	#[tracing::instrument(skip(self), fields(user_id = %user_id))]
	pub async fn list_secrets(&self, user_id: UserId) -> Result<Vec<SecretMetadata>> {
		let rows = sqlx::query(&format!(
			"SELECT {METADATA_COLUMNS} FROM secrets WHERE user_id = ? ORDER BY key_name"
		))
		.bind(user_id.get())
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(parse_metadata_row).collect()
	}

	/// Every secret the user holds with its ciphertext, for re-encryption.
	#[tracing::instrument(skip(self), fields(user_id = %user_id))]
	pub async fn list_secrets_with_values(&self, user_id: UserId) -> Result<Vec<StoredSecret>> {
		let rows = sqlx::query(&format!(
			"SELECT {METADATA_COLUMNS}, udek_id, ciphertext FROM secrets WHERE user_id = ? ORDER BY key_name"
		))
		.bind(user_id.get())
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(parse_stored_row).collect()
	}

	/// Delete every secret whose expiry is at or before `now`.
	#[tracing::instrument(skip(self))]
	pub async fn delete_expired_secrets(&self, now: DateTime<Utc>) -> Result<u64> {
		let result =
			sqlx::query("DELETE FROM secrets WHERE expires_at IS NOT NULL AND expires_at <= ?")
				.bind(format_timestamp(now))
				.execute(&self.pool)
				.await?;

		Ok(result.rows_affected())
	}
}

fn parse_metadata_row(row: &sqlx::sqlite::SqliteRow) -> Result<SecretMetadata> {
	let id: String = row.get("id");
	let created_at: String = row.get("created_at");
	let updated_at: String = row.get("updated_at");

	Ok(SecretMetadata {
		id: parse_id("secret id", &id)?,
		user_id: UserId::new(row.get("user_id")),
		key_name: row.get("key_name"),
		version: to_u32("version", row.get("version"))?,
		created_at: parse_timestamp("created_at", &created_at)?,
		updated_at: parse_timestamp("updated_at", &updated_at)?,
		last_accessed_at: parse_opt_timestamp("last_accessed_at", row.get("last_accessed_at"))?,
		expires_at: parse_opt_timestamp("expires_at", row.get("expires_at"))?,
	})
}

fn parse_stored_row(row: &sqlx::sqlite::SqliteRow) -> Result<StoredSecret> {
	let udek_id: String = row.get("udek_id");
	Ok(StoredSecret {
		metadata: parse_metadata_row(row)?,
		udek_id: parse_id("udek id", &udek_id)?,
		ciphertext: row.get("ciphertext"),
	})
}
