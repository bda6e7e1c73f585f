// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::SqlitePool;

use crate::error::DbError;

const MIGRATIONS: &[(&str, &str)] = &[
	("001_keypairs", include_str!("../migrations/001_keypairs.sql")),
	("002_user_data_keys", include_str!("../migrations/002_user_data_keys.sql")),
	("003_scripts", include_str!("../migrations/003_scripts.sql")),
	("004_access", include_str!("../migrations/004_access.sql")),
	("005_secrets", include_str!("../migrations/005_secrets.sql")),
];

/// Run all database migrations (001-005).
///
/// # Note
/// Migrations are idempotent - safe to run multiple times.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
	for (name, sql) in MIGRATIONS {
		for stmt in statements(sql) {
			if let Err(e) = sqlx::query(stmt).execute(pool).await {
				let msg = e.to_string();
				if !msg.contains("already exists") && !msg.contains("duplicate column") {
					tracing::error!(migration = %name, error = %e, "migration failed");
					return Err(e.into());
				}
			}
		}
		tracing::debug!(migration = %name, "migration applied");
	}

	Ok(())
}

/// Split a migration file on `;`, dropping comment-only fragments.
fn statements(sql: &str) -> impl Iterator<Item = &str> {
	sql.split(';').filter(|stmt| {
		stmt.lines()
			.map(str::trim)
			.any(|line| !line.is_empty() && !line.starts_with("--"))
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;

	#[tokio::test]
	async fn migrations_are_idempotent() {
		let pool = create_test_pool().await;
		run_migrations(&pool).await.unwrap();
		run_migrations(&pool).await.unwrap();

		let tables: Vec<(String,)> =
			sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
				.fetch_all(&pool)
				.await
				.unwrap();
		let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
		for expected in [
			"access_grants",
			"keypairs",
			"script_contents",
			"script_tags",
			"script_versions",
			"scripts",
			"secret_audit_log",
			"secrets",
			"share_tokens",
			"user_data_keys",
		] {
			assert!(names.contains(&expected), "missing table {expected}");
		}
	}

	#[test]
	fn comment_only_fragments_are_skipped() {
		let sql = "-- header\nCREATE TABLE a (x INTEGER);\n-- trailing comment\n";
		assert_eq!(statements(sql).count(), 1);
	}

	#[tokio::test]
	async fn encoding_columns_must_pair() {
		let pool = create_test_pool().await;
		run_migrations(&pool).await.unwrap();

		sqlx::query(
			"INSERT INTO scripts (id, owner_id, name, visibility, created_at, updated_at) \
			 VALUES ('s1', 1, 'a', 'private', 't', 't')",
		)
		.execute(&pool)
		.await
		.unwrap();
		sqlx::query(
			"INSERT INTO script_versions (id, script_id, version, content_hash, checksum, size_bytes, created_at) \
			 VALUES ('v1', 's1', 1, 'h', 'c', 1, 't')",
		)
		.execute(&pool)
		.await
		.unwrap();

		let result = sqlx::query(
			"INSERT INTO script_contents (version_id, inline_content, encryption_key_id) \
			 VALUES ('v1', x'00', 'kp')",
		)
		.execute(&pool)
		.await;
		assert!(result.is_err());
	}
}
