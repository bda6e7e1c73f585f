// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pool helpers for tests in this crate and its dependents.

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::migrations::run_migrations;
use crate::pool::create_pool;

/// Single-connection in-memory pool. Every connection to `:memory:` is a
/// separate database, so the pool must not grow.
pub async fn create_test_pool() -> SqlitePool {
	let options = SqliteConnectOptions::from_str(":memory:")
		.unwrap()
		.foreign_keys(true);

	SqlitePoolOptions::new()
		.max_connections(1)
		.connect_with(options)
		.await
		.expect("Failed to create test pool")
}

/// In-memory pool with the full schema applied.
pub async fn create_migrated_test_pool() -> SqlitePool {
	let pool = create_test_pool().await;
	run_migrations(&pool).await.unwrap();
	pool
}

/// File-backed WAL pool with several connections, for tests that exercise
/// concurrent writers.
pub async fn create_file_test_pool(dir: &Path, max_connections: u32) -> SqlitePool {
	let url = format!("sqlite://{}", dir.join("test.db").display());
	let pool = create_pool(&url, max_connections).await.unwrap();
	run_migrations(&pool).await.unwrap();
	pool
}
