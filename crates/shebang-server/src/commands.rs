// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Operator commands. Each returns its result instead of printing so the
//! binary decides what reaches stdout.

use anyhow::Context;
use chrono::{DateTime, Utc};
use shebang_server_config::DatabaseConfig;
use shebang_server_crypto::keys::{generate_keypair as generate_rsa_keypair, GeneratedKeyPair};
use shebang_server_db::{SecretRepository, SqlitePool, UdekRepository};
use shebang_server_kms::KeyManager;
use shebang_server_secrets::{rewrap_all, RewrapReport};
use tracing::{info, instrument};

/// Open the database and bring the schema up to date.
#[instrument(skip(config))]
pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<SqlitePool> {
	let pool = shebang_server_db::create_pool(&config.url, config.max_connections)
		.await
		.context("failed to open database")?;
	migrate(&pool).await?;
	Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
	shebang_server_db::run_migrations(pool)
		.await
		.context("failed to run migrations")?;
	info!("Database migrations complete");
	Ok(())
}

/// RSA keypair for operators and test fixtures. The private PEM is never
/// persisted.
pub async fn generate_keypair(bits: usize) -> anyhow::Result<GeneratedKeyPair> {
	let generated = tokio::task::spawn_blocking(move || generate_rsa_keypair(bits))
		.await
		.context("key generation task failed")??;
	Ok(generated)
}

#[instrument(skip(pool))]
pub async fn purge_expired_secrets(pool: &SqlitePool, now: DateTime<Utc>) -> anyhow::Result<u64> {
	let purged = SecretRepository::new(pool.clone())
		.delete_expired_secrets(now)
		.await
		.context("failed to purge expired secrets")?;
	info!(purged, "Purged expired secrets");
	Ok(purged)
}

/// Move every user data key from the `old` master key to `new`. Safe to
/// re-run after an interruption.
#[instrument(skip_all, fields(from = old.backend_id(), to = new.backend_id()))]
pub async fn rewrap_udeks(
	pool: &SqlitePool,
	old: &dyn KeyManager,
	new: &dyn KeyManager,
) -> anyhow::Result<RewrapReport> {
	let store = UdekRepository::new(pool.clone());
	let report = rewrap_all(&store, old, new)
		.await
		.context("failed to re-wrap user data keys")?;
	info!(
		rewrapped = report.rewrapped,
		already_current = report.already_current,
		skipped = report.skipped,
		"Re-wrapped user data keys"
	);
	Ok(report)
}
