// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Keypair repository.
//!
//! Only public keys are stored. Deleting a keypair does not touch content
//! wrapped for it; that content simply becomes unrecoverable.

use async_trait::async_trait;
use shebang_scripts_core::{KeyPair, KeyPairId, UserId};
use sqlx::{sqlite::SqlitePool, Row};

use crate::codec::{format_timestamp, parse_id, parse_timestamp};
use crate::error::{conflict_on_unique, Result};

#[async_trait]
pub trait KeyPairStore: Send + Sync {
	async fn create_keypair(&self, keypair: &KeyPair) -> Result<()>;
	async fn get_keypair(&self, id: &KeyPairId) -> Result<Option<KeyPair>>;
	async fn list_keypairs(&self, user_id: UserId) -> Result<Vec<KeyPair>>;
	async fn delete_keypair(&self, user_id: UserId, id: &KeyPairId) -> Result<bool>;
}

#[async_trait]
impl KeyPairStore for KeyPairRepository {
	async fn create_keypair(&self, keypair: &KeyPair) -> Result<()> {
		self.create_keypair(keypair).await
	}

	async fn get_keypair(&self, id: &KeyPairId) -> Result<Option<KeyPair>> {
		self.get_keypair(id).await
	}

	async fn list_keypairs(&self, user_id: UserId) -> Result<Vec<KeyPair>> {
		self.list_keypairs(user_id).await
	}

	async fn delete_keypair(&self, user_id: UserId, id: &KeyPairId) -> Result<bool> {
		self.delete_keypair(user_id, id).await
	}
}

#[derive(Clone)]
pub struct KeyPairRepository {
	pool: SqlitePool,
}

impl KeyPairRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Insert a keypair.
	///
	/// # Errors
	/// `DbError::Conflict` if the user already has a keypair with this name.
	#[tracing::instrument(skip(self, keypair), fields(keypair_id = %keypair.id, user_id = %keypair.user_id))]
	pub async fn create_keypair(&self, keypair: &KeyPair) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO keypairs (id, user_id, name, public_key_pem, fingerprint, created_at)
			VALUES (?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(keypair.id.to_string())
		.bind(keypair.user_id.get())
		.bind(&keypair.name)
		.bind(&keypair.public_key_pem)
		.bind(&keypair.fingerprint)
		.bind(format_timestamp(keypair.created_at))
		.execute(&self.pool)
		.await
		.map_err(|e| conflict_on_unique(e, || format!("keypair name '{}' already in use", keypair.name)))?;

		tracing::debug!(keypair_id = %keypair.id, "keypair created");
		Ok(())
	}

	/// Look up a keypair regardless of owner. Callers check ownership.
	#[tracing::instrument(skip(self), fields(keypair_id = %id))]
	pub async fn get_keypair(&self, id: &KeyPairId) -> Result<Option<KeyPair>> {
		let row = sqlx::query(
			r#"
			SELECT id, user_id, name, public_key_pem, fingerprint, created_at
			FROM keypairs
			WHERE id = ?
			"#,
		)
		.bind(id.to_string())
		.fetch_optional(&self.pool)
		.await?;

		row.as_ref().map(parse_keypair_row).transpose()
	}

	#[tracing::instrument(skip(self), fields(user_id = %user_id))]
	pub async fn list_keypairs(&self, user_id: UserId) -> Result<Vec<KeyPair>> {
		let rows = sqlx::query(
			r#"
			SELECT id, user_id, name, public_key_pem, fingerprint, created_at
			FROM keypairs
			WHERE user_id = ?
			ORDER BY created_at ASC, name ASC
			"#,
		)
		.bind(user_id.get())
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(parse_keypair_row).collect()
	}

	/// Delete a keypair owned by `user_id`. Returns false if no such keypair.
	#[tracing::instrument(skip(self), fields(user_id = %user_id, keypair_id = %id))]
	pub async fn delete_keypair(&self, user_id: UserId, id: &KeyPairId) -> Result<bool> {
		let result = sqlx::query("DELETE FROM keypairs WHERE id = ? AND user_id = ?")
			.bind(id.to_string())
			.bind(user_id.get())
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected() > 0)
	}
}

fn parse_keypair_row(row: &sqlx::sqlite::SqliteRow) -> Result<KeyPair> {
	let id: String = row.get("id");
	let created_at: String = row.get("created_at");

	Ok(KeyPair {
		id: parse_id("keypair id", &id)?,
		user_id: UserId::new(row.get("user_id")),
		name: row.get("name"),
		public_key_pem: row.get("public_key_pem"),
		fingerprint: row.get("fingerprint"),
		created_at: parse_timestamp("created_at", &created_at)?,
	})
}
