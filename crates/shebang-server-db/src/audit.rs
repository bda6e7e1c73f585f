// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Secret access audit log.
//!
//! The log is append-only: this repository exposes inserts and queries and
//! nothing else. Rows are keyed by `(user_id, key_name)` so history survives
//! deletion of the secret.

use async_trait::async_trait;
use chrono::Utc;
use shebang_scripts_core::{AuditAction, AuditContext, SecretAuditEntry, SecretId, UserId};
use sqlx::{sqlite::SqlitePool, Row};

use crate::codec::{format_timestamp, parse_id, parse_timestamp};
use crate::error::Result;

/// Values for one audit row.
#[derive(Debug, Clone)]
pub struct NewAuditEntry<'a> {
	pub secret_id: &'a SecretId,
	pub user_id: UserId,
	pub key_name: &'a str,
	pub action: AuditAction,
	pub context: &'a AuditContext,
}

#[async_trait]
pub trait SecretAuditStore: Send + Sync {
	async fn append_audit_entry(&self, entry: &NewAuditEntry<'_>) -> Result<i64>;
	async fn list_audit_entries(
		&self,
		user_id: UserId,
		key_name: Option<&str>,
		limit: u32,
	) -> Result<Vec<SecretAuditEntry>>;
}

#[async_trait]
impl SecretAuditStore for SecretAuditRepository {
	async fn append_audit_entry(&self, entry: &NewAuditEntry<'_>) -> Result<i64> {
		self.append_audit_entry(entry).await
	}

	async fn list_audit_entries(
		&self,
		user_id: UserId,
		key_name: Option<&str>,
		limit: u32,
	) -> Result<Vec<SecretAuditEntry>> {
		self.list_audit_entries(user_id, key_name, limit).await
	}
}

#[derive(Clone)]
pub struct SecretAuditRepository {
	pool: SqlitePool,
}

impl SecretAuditRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(
		skip(self, entry),
		fields(secret_id = %entry.secret_id, user_id = %entry.user_id, action = %entry.action)
	)]
	pub async fn append_audit_entry(&self, entry: &NewAuditEntry<'_>) -> Result<i64> {
		let result = sqlx::query(
			r#"
			INSERT INTO secret_audit_log (secret_id, user_id, key_name, action, ip_address, user_agent, accessed_at)
			VALUES (?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(entry.secret_id.to_string())
		.bind(entry.user_id.get())
		.bind(entry.key_name)
		.bind(entry.action.as_str())
		.bind(entry.context.ip.as_deref())
		.bind(entry.context.user_agent.as_deref())
		.bind(format_timestamp(Utc::now()))
		.execute(&self.pool)
		.await?;

		Ok(result.last_insert_rowid())
	}

	/// Newest entries first, optionally for one secret name.
	#[tracing::instrument(skip(self), fields(user_id = %user_id, key_name = ?key_name, limit))]
	pub async fn list_audit_entries(
		&self,
		user_id: UserId,
		key_name: Option<&str>,
		limit: u32,
	) -> Result<Vec<SecretAuditEntry>> {
		let rows = sqlx::query(
			r#"
			SELECT id, secret_id, user_id, key_name, action, ip_address, user_agent, accessed_at
			FROM secret_audit_log
			WHERE user_id = ? AND (? IS NULL OR key_name = ?)
			ORDER BY id DESC
			LIMIT ?
			"#,
		)
		.bind(user_id.get())
		.bind(key_name)
		.bind(key_name)
		.bind(i64::from(limit))
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(parse_audit_row).collect()
	}
}

fn parse_audit_row(row: &sqlx::sqlite::SqliteRow) -> Result<SecretAuditEntry> {
	let secret_id: String = row.get("secret_id");
	let action: String = row.get("action");
	let accessed_at: String = row.get("accessed_at");

	Ok(SecretAuditEntry {
		id: row.get("id"),
		secret_id: parse_id("secret id", &secret_id)?,
		user_id: UserId::new(row.get("user_id")),
		key_name: row.get("key_name"),
		action: action.parse()?,
		ip: row.get("ip_address"),
		user_agent: row.get("user_agent"),
		accessed_at: parse_timestamp("accessed_at", &accessed_at)?,
	})
}
