// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! User data key repository.
//!
//! Each user has at most one current record, enforced by a partial unique
//! index. Demoted records are kept so that secrets written under them stay
//! readable until they are re-encrypted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shebang_scripts_core::{SecretId, UdekId, UdekRecord, UserId};
use sqlx::{sqlite::SqlitePool, Row};

use crate::codec::{format_timestamp, parse_id, parse_opt_timestamp, parse_timestamp, to_u32};
use crate::error::{DbError, Result};

/// A secret ciphertext re-encrypted under a new user data key.
#[derive(Debug, Clone)]
pub struct ReencryptedSecret {
	pub id: SecretId,
	/// Key the secret was sealed with when it was read.
	pub previous_udek_id: UdekId,
	/// Version the ciphertext was read at; rows changed since are left alone.
	pub version: u32,
	pub ciphertext: Vec<u8>,
}

#[async_trait]
pub trait UdekStore: Send + Sync {
	async fn get_current_udek(&self, user_id: UserId) -> Result<Option<UdekRecord>>;
	async fn get_udek(&self, id: &UdekId) -> Result<Option<UdekRecord>>;
	async fn create_udek_if_absent(&self, record: &UdekRecord) -> Result<bool>;
	async fn list_udeks(&self) -> Result<Vec<UdekRecord>>;
	async fn update_encrypted_udek(&self, id: &UdekId, expected: &[u8], replacement: &[u8]) -> Result<bool>;
	async fn rotate_udek(
		&self,
		user_id: UserId,
		current: &UdekId,
		replacement: &UdekRecord,
		secrets: &[ReencryptedSecret],
	) -> Result<u64>;
}

#[async_trait]
impl UdekStore for UdekRepository {
	async fn get_current_udek(&self, user_id: UserId) -> Result<Option<UdekRecord>> {
		self.get_current_udek(user_id).await
	}

	async fn get_udek(&self, id: &UdekId) -> Result<Option<UdekRecord>> {
		self.get_udek(id).await
	}

	async fn create_udek_if_absent(&self, record: &UdekRecord) -> Result<bool> {
		self.create_udek_if_absent(record).await
	}

	async fn list_udeks(&self) -> Result<Vec<UdekRecord>> {
		self.list_udeks().await
	}

	async fn update_encrypted_udek(&self, id: &UdekId, expected: &[u8], replacement: &[u8]) -> Result<bool> {
		self.update_encrypted_udek(id, expected, replacement).await
	}

	async fn rotate_udek(
		&self,
		user_id: UserId,
		current: &UdekId,
		replacement: &UdekRecord,
		secrets: &[ReencryptedSecret],
	) -> Result<u64> {
		self.rotate_udek(user_id, current, replacement, secrets).await
	}
}

#[derive(Clone)]
pub struct UdekRepository {
	pool: SqlitePool,
}

const SELECT_COLUMNS: &str =
	"SELECT id, user_id, encrypted_udek, key_version, created_at, rotated_at FROM user_data_keys";

impl UdekRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self), fields(user_id = %user_id))]
	pub async fn get_current_udek(&self, user_id: UserId) -> Result<Option<UdekRecord>> {
		let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE user_id = ? AND is_current = 1"))
			.bind(user_id.get())
			.fetch_optional(&self.pool)
			.await?;

		row.as_ref().map(parse_udek_row).transpose()
	}

	#[tracing::instrument(skip(self), fields(udek_id = %id))]
	pub async fn get_udek(&self, id: &UdekId) -> Result<Option<UdekRecord>> {
		let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
			.bind(id.to_string())
			.fetch_optional(&self.pool)
			.await?;

		row.as_ref().map(parse_udek_row).transpose()
	}

	/// Insert `record` as the user's current key unless one already exists.
	///
	/// # Returns
	/// `true` if this call inserted the row. Callers that get `false` must
	/// re-read the current record; the winner of the race is authoritative.
	#[tracing::instrument(skip(self, record), fields(user_id = %record.user_id, udek_id = %record.id))]
	pub async fn create_udek_if_absent(&self, record: &UdekRecord) -> Result<bool> {
		let result = sqlx::query(
			r#"
			INSERT INTO user_data_keys (id, user_id, encrypted_udek, key_version, is_current, created_at)
			VALUES (?, ?, ?, ?, 1, ?)
			ON CONFLICT DO NOTHING
			"#,
		)
		.bind(record.id.to_string())
		.bind(record.user_id.get())
		.bind(&record.encrypted_udek)
		.bind(i64::from(record.key_version))
		.bind(format_timestamp(record.created_at))
		.execute(&self.pool)
		.await?;

		let inserted = result.rows_affected() > 0;
		tracing::debug!(inserted, "udek insert-if-absent");
		Ok(inserted)
	}

	/// Every record, current or demoted, for master-key rewrapping.
	#[tracing::instrument(skip(self))]
	pub async fn list_udeks(&self) -> Result<Vec<UdekRecord>> {
		let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY user_id, key_version"))
			.fetch_all(&self.pool)
			.await?;

		rows.iter().map(parse_udek_row).collect()
	}

	/// Replace the wrapped key if it still equals `expected`.
	#[tracing::instrument(skip(self, expected, replacement), fields(udek_id = %id))]
	pub async fn update_encrypted_udek(
		&self,
		id: &UdekId,
		expected: &[u8],
		replacement: &[u8],
	) -> Result<bool> {
		let result = sqlx::query(
			"UPDATE user_data_keys SET encrypted_udek = ? WHERE id = ? AND encrypted_udek = ?",
		)
		.bind(replacement)
		.bind(id.to_string())
		.bind(expected)
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() > 0)
	}

	/// Demote `current`, install `replacement` and store re-encrypted secret
	/// ciphertexts in one transaction.
	///
	/// Secrets whose version or key moved since they were read keep their
	/// newer ciphertext and the key it references.
	///
	/// # Returns
	/// Number of secrets moved to the new key.
	///
	/// # Errors
	/// `DbError::Conflict` if `current` is no longer the user's current key.
	#[tracing::instrument(
		skip(self, replacement, secrets),
		fields(user_id = %user_id, from = %current, to = %replacement.id, secrets = secrets.len())
	)]
	pub async fn rotate_udek(
		&self,
		user_id: UserId,
		current: &UdekId,
		replacement: &UdekRecord,
		secrets: &[ReencryptedSecret],
	) -> Result<u64> {
		let now = format_timestamp(Utc::now());
		let mut tx = self.pool.begin().await?;

		let demoted = sqlx::query(
			r#"
			UPDATE user_data_keys SET is_current = 0, rotated_at = ?
			WHERE id = ? AND user_id = ? AND is_current = 1
			"#,
		)
		.bind(&now)
		.bind(current.to_string())
		.bind(user_id.get())
		.execute(&mut *tx)
		.await?;

		if demoted.rows_affected() == 0 {
			return Err(DbError::Conflict(format!(
				"user data key {current} is no longer current"
			)));
		}

		sqlx::query(
			r#"
			INSERT INTO user_data_keys (id, user_id, encrypted_udek, key_version, is_current, created_at)
			VALUES (?, ?, ?, ?, 1, ?)
			"#,
		)
		.bind(replacement.id.to_string())
		.bind(user_id.get())
		.bind(&replacement.encrypted_udek)
		.bind(i64::from(replacement.key_version))
		.bind(format_timestamp(replacement.created_at))
		.execute(&mut *tx)
		.await?;

		let mut moved = 0;
		for secret in secrets {
			let result = sqlx::query(
				r#"
				UPDATE secrets SET ciphertext = ?, udek_id = ?
				WHERE id = ? AND user_id = ? AND udek_id = ? AND version = ?
				"#,
			)
			.bind(&secret.ciphertext)
			.bind(replacement.id.to_string())
			.bind(secret.id.to_string())
			.bind(user_id.get())
			.bind(secret.previous_udek_id.to_string())
			.bind(i64::from(secret.version))
			.execute(&mut *tx)
			.await?;
			moved += result.rows_affected();
		}

		tx.commit().await?;
		tracing::info!(user_id = %user_id, moved, "user data key rotated");
		Ok(moved)
	}
}

fn parse_udek_row(row: &sqlx::sqlite::SqliteRow) -> Result<UdekRecord> {
	let id: String = row.get("id");
	let created_at: String = row.get("created_at");
	let rotated_at: Option<String> = row.get("rotated_at");
	let created_at: DateTime<Utc> = parse_timestamp("created_at", &created_at)?;

	Ok(UdekRecord {
		id: parse_id("udek id", &id)?,
		user_id: UserId::new(row.get("user_id")),
		encrypted_udek: row.get("encrypted_udek"),
		key_version: to_u32("key_version", row.get("key_version"))?,
		created_at,
		rotated_at: parse_opt_timestamp("rotated_at", rotated_at)?,
	})
}
