// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Access grant and share token repository.
//!
//! A script has at most one link grant and at most one grant per user;
//! re-granting replaces the expiry. Expired grants are left in place and
//! ignored by the evaluator. Share tokens are revoked by flag, never deleted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shebang_scripts_core::{
	AccessGrant, GrantId, GrantSubject, ScriptId, ShareToken, ShareTokenId, UserId,
};
use sqlx::{sqlite::SqlitePool, Row};

use crate::codec::{format_timestamp, parse_id, parse_opt_timestamp, parse_timestamp};
use crate::error::{conflict_on_unique, DbError, Result};

#[async_trait]
pub trait AccessStore: Send + Sync {
	async fn upsert_grant(
		&self,
		script_id: &ScriptId,
		subject: GrantSubject,
		granted_by: UserId,
		expires_at: Option<DateTime<Utc>>,
	) -> Result<AccessGrant>;
	async fn list_grants(&self, script_id: &ScriptId) -> Result<Vec<AccessGrant>>;
	async fn delete_grant(&self, script_id: &ScriptId, grant_id: &GrantId) -> Result<bool>;
	async fn create_share_token(&self, token: &ShareToken) -> Result<()>;
	async fn get_share_token_by_value(&self, token: &str) -> Result<Option<ShareToken>>;
	async fn list_share_tokens(&self, script_id: &ScriptId) -> Result<Vec<ShareToken>>;
	async fn revoke_share_token(&self, script_id: &ScriptId, id: &ShareTokenId) -> Result<bool>;
}

#[async_trait]
impl AccessStore for AccessRepository {
	async fn upsert_grant(
		&self,
		script_id: &ScriptId,
		subject: GrantSubject,
		granted_by: UserId,
		expires_at: Option<DateTime<Utc>>,
	) -> Result<AccessGrant> {
		self.upsert_grant(script_id, subject, granted_by, expires_at).await
	}

	async fn list_grants(&self, script_id: &ScriptId) -> Result<Vec<AccessGrant>> {
		self.list_grants(script_id).await
	}

	async fn delete_grant(&self, script_id: &ScriptId, grant_id: &GrantId) -> Result<bool> {
		self.delete_grant(script_id, grant_id).await
	}

	async fn create_share_token(&self, token: &ShareToken) -> Result<()> {
		self.create_share_token(token).await
	}

	async fn get_share_token_by_value(&self, token: &str) -> Result<Option<ShareToken>> {
		self.get_share_token_by_value(token).await
	}

	async fn list_share_tokens(&self, script_id: &ScriptId) -> Result<Vec<ShareToken>> {
		self.list_share_tokens(script_id).await
	}

	async fn revoke_share_token(&self, script_id: &ScriptId, id: &ShareTokenId) -> Result<bool> {
		self.revoke_share_token(script_id, id).await
	}
}

#[derive(Clone)]
pub struct AccessRepository {
	pool: SqlitePool,
}

const GRANT_COLUMNS: &str =
	"SELECT id, script_id, grant_type, grantee_id, granted_by, granted_at, expires_at FROM access_grants";

const TOKEN_COLUMNS: &str = "SELECT id, script_id, token, revoked, created_at FROM share_tokens";

impl AccessRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Create or refresh a grant. Re-granting keeps the grant id and replaces
	/// granter, grant time and expiry.
	#[tracing::instrument(skip(self), fields(script_id = %script_id, subject = ?subject))]
	pub async fn upsert_grant(
		&self,
		script_id: &ScriptId,
		subject: GrantSubject,
		granted_by: UserId,
		expires_at: Option<DateTime<Utc>>,
	) -> Result<AccessGrant> {
		let (grant_type, grantee, conflict_target) = match subject {
			GrantSubject::Link => ("link", None, "(script_id) WHERE grant_type = 'link'"),
			GrantSubject::User(user) => (
				"user",
				Some(user.get()),
				"(script_id, grantee_id) WHERE grant_type = 'user'",
			),
		};

		let row = sqlx::query(&format!(
			r#"
			INSERT INTO access_grants (id, script_id, grant_type, grantee_id, granted_by, granted_at, expires_at)
			VALUES (?, ?, ?, ?, ?, ?, ?)
			ON CONFLICT {conflict_target} DO UPDATE SET
				granted_by = excluded.granted_by,
				granted_at = excluded.granted_at,
				expires_at = excluded.expires_at
			RETURNING id, script_id, grant_type, grantee_id, granted_by, granted_at, expires_at
			"#
		))
		.bind(GrantId::generate().to_string())
		.bind(script_id.to_string())
		.bind(grant_type)
		.bind(grantee)
		.bind(granted_by.get())
		.bind(format_timestamp(Utc::now()))
		.bind(expires_at.map(format_timestamp))
		.fetch_one(&self.pool)
		.await?;

		let grant = parse_grant_row(&row)?;
		tracing::debug!(grant_id = %grant.id, "access grant stored");
		Ok(grant)
	}

	/// All grants for a script, including expired ones.
	#[tracing::instrument(skip(self), fields(script_id = %script_id))]
	pub async fn list_grants(&self, script_id: &ScriptId) -> Result<Vec<AccessGrant>> {
		let rows = sqlx::query(&format!("{GRANT_COLUMNS} WHERE script_id = ? ORDER BY granted_at"))
			.bind(script_id.to_string())
			.fetch_all(&self.pool)
			.await?;

		rows.iter().map(parse_grant_row).collect()
	}

	#[tracing::instrument(skip(self), fields(script_id = %script_id, grant_id = %grant_id))]
	pub async fn delete_grant(&self, script_id: &ScriptId, grant_id: &GrantId) -> Result<bool> {
		let result = sqlx::query("DELETE FROM access_grants WHERE id = ? AND script_id = ?")
			.bind(grant_id.to_string())
			.bind(script_id.to_string())
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(self, token), fields(script_id = %token.script_id, token_id = %token.id))]
	pub async fn create_share_token(&self, token: &ShareToken) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO share_tokens (id, script_id, token, revoked, created_at)
			VALUES (?, ?, ?, ?, ?)
			"#,
		)
		.bind(token.id.to_string())
		.bind(token.script_id.to_string())
		.bind(&token.token)
		.bind(token.revoked)
		.bind(format_timestamp(token.created_at))
		.execute(&self.pool)
		.await
		.map_err(|e| conflict_on_unique(e, || "share token collision".to_string()))?;

		Ok(())
	}

	/// Look up a presented token, revoked or not.
	#[tracing::instrument(skip(self, token))]
	pub async fn get_share_token_by_value(&self, token: &str) -> Result<Option<ShareToken>> {
		let row = sqlx::query(&format!("{TOKEN_COLUMNS} WHERE token = ?"))
			.bind(token)
			.fetch_optional(&self.pool)
			.await?;

		row.as_ref().map(parse_token_row).transpose()
	}

	#[tracing::instrument(skip(self), fields(script_id = %script_id))]
	pub async fn list_share_tokens(&self, script_id: &ScriptId) -> Result<Vec<ShareToken>> {
		let rows = sqlx::query(&format!("{TOKEN_COLUMNS} WHERE script_id = ? ORDER BY created_at"))
			.bind(script_id.to_string())
			.fetch_all(&self.pool)
			.await?;

		rows.iter().map(parse_token_row).collect()
	}

	/// Flip the revoked flag. Returns false if the token does not belong to
	/// the script.
	#[tracing::instrument(skip(self), fields(script_id = %script_id, token_id = %id))]
	pub async fn revoke_share_token(&self, script_id: &ScriptId, id: &ShareTokenId) -> Result<bool> {
		let result = sqlx::query("UPDATE share_tokens SET revoked = 1 WHERE id = ? AND script_id = ?")
			.bind(id.to_string())
			.bind(script_id.to_string())
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected() > 0)
	}
}

fn parse_grant_row(row: &sqlx::sqlite::SqliteRow) -> Result<AccessGrant> {
	let id: String = row.get("id");
	let script_id: String = row.get("script_id");
	let grant_type: String = row.get("grant_type");
	let grantee: Option<i64> = row.get("grantee_id");
	let granted_at: String = row.get("granted_at");
	let expires_at: Option<String> = row.get("expires_at");

	let subject = match (grant_type.as_str(), grantee) {
		("link", None) => GrantSubject::Link,
		("user", Some(user)) => GrantSubject::User(UserId::new(user)),
		(other, _) => {
			return Err(DbError::Internal(format!(
				"Invalid grant row {id}: type '{other}' with grantee {grantee:?}"
			)))
		}
	};

	Ok(AccessGrant {
		id: parse_id("grant id", &id)?,
		script_id: parse_id("script id", &script_id)?,
		subject,
		granted_by: UserId::new(row.get("granted_by")),
		granted_at: parse_timestamp("granted_at", &granted_at)?,
		expires_at: parse_opt_timestamp("expires_at", expires_at)?,
	})
}

fn parse_token_row(row: &sqlx::sqlite::SqliteRow) -> Result<ShareToken> {
	let id: String = row.get("id");
	let script_id: String = row.get("script_id");
	let created_at: String = row.get("created_at");

	Ok(ShareToken {
		id: parse_id("share token id", &id)?,
		script_id: parse_id("script id", &script_id)?,
		token: row.get("token"),
		revoked: row.get("revoked"),
		created_at: parse_timestamp("created_at", &created_at)?,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::script::ScriptRepository;
	use crate::testing::create_migrated_test_pool;
	use chrono::Duration;
	use shebang_scripts_core::{Script, Visibility};

	async fn setup() -> (AccessRepository, ScriptId) {
		let pool = create_migrated_test_pool().await;
		let now = Utc::now();
		let script = Script {
			id: ScriptId::generate(),
			owner_id: UserId::new(1),
			name: "shared.sh".to_string(),
			description: None,
			visibility: Visibility::Unlisted,
			created_at: now,
			updated_at: now,
		};
		ScriptRepository::new(pool.clone()).create_script(&script).await.unwrap();
		(AccessRepository::new(pool), script.id)
	}

	#[tokio::test]
	async fn one_link_grant_per_script() {
		let (repo, script_id) = setup().await;
		let first = repo
			.upsert_grant(&script_id, GrantSubject::Link, UserId::new(1), None)
			.await
			.unwrap();
		let expiry = Utc::now() + Duration::days(1);
		let second = repo
			.upsert_grant(&script_id, GrantSubject::Link, UserId::new(1), Some(expiry))
			.await
			.unwrap();

		assert_eq!(first.id, second.id);
		let grants = repo.list_grants(&script_id).await.unwrap();
		assert_eq!(grants.len(), 1);
		assert_eq!(
			grants[0].expires_at.map(|t| t.timestamp_micros()),
			Some(expiry.timestamp_micros())
		);
	}

	#[tokio::test]
	async fn user_grants_are_per_grantee() {
		let (repo, script_id) = setup().await;
		repo.upsert_grant(&script_id, GrantSubject::User(UserId::new(2)), UserId::new(1), None)
			.await
			.unwrap();
		repo.upsert_grant(&script_id, GrantSubject::User(UserId::new(3)), UserId::new(1), None)
			.await
			.unwrap();
		repo.upsert_grant(&script_id, GrantSubject::User(UserId::new(2)), UserId::new(1), None)
			.await
			.unwrap();
		repo.upsert_grant(&script_id, GrantSubject::Link, UserId::new(1), None)
			.await
			.unwrap();

		let grants = repo.list_grants(&script_id).await.unwrap();
		assert_eq!(grants.len(), 3);

		assert!(repo.delete_grant(&script_id, &grants[0].id).await.unwrap());
		assert!(!repo.delete_grant(&script_id, &grants[0].id).await.unwrap());
	}

	#[tokio::test]
	async fn share_tokens_revoke_by_flag() {
		let (repo, script_id) = setup().await;
		let token = ShareToken {
			id: ShareTokenId::generate(),
			script_id,
			token: "ab".repeat(32),
			revoked: false,
			created_at: Utc::now(),
		};
		repo.create_share_token(&token).await.unwrap();

		let found = repo.get_share_token_by_value(&token.token).await.unwrap().unwrap();
		assert!(!found.revoked);

		assert!(!repo.revoke_share_token(&ScriptId::generate(), &token.id).await.unwrap());
		assert!(repo.revoke_share_token(&script_id, &token.id).await.unwrap());

		let found = repo.get_share_token_by_value(&token.token).await.unwrap().unwrap();
		assert!(found.revoked);
		assert_eq!(repo.list_share_tokens(&script_id).await.unwrap().len(), 1);
		assert!(repo.get_share_token_by_value("missing").await.unwrap().is_none());
	}
}
