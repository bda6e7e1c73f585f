// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! # shebang-server-db
//!
//! SQLite persistence via sqlx for keypairs, user data keys, scripts and
//! their versions, access grants, share tokens and the secret vault.
//!
//! Each domain has a `*Store` trait describing the interface and a
//! `*Repository` struct holding a `SqlitePool` that implements it by
//! delegating to inherent methods.
//!
//! | Variant | When it is returned |
//! |---------|---------------------|
//! | `NotFound` | A referenced row that must exist does not |
//! | `Conflict` | Unique constraint violation or lost optimistic update |
//! | `Sqlx` | Unexpected database error |
//! | `Internal` | Stored data that cannot be parsed |
//!
//! Lookups return `Result<Option<T>>`; absence is not an error.

pub mod acl;
pub mod audit;
mod codec;
mod error;
pub mod keypair;
pub mod migrations;
pub mod pool;
pub mod script;
pub mod secret;
pub mod udek;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use acl::{AccessRepository, AccessStore};
pub use audit::{NewAuditEntry, SecretAuditRepository, SecretAuditStore};
pub use error::{DbError, Result};
pub use keypair::{KeyPairRepository, KeyPairStore};
pub use migrations::run_migrations;
pub use pool::create_pool;
pub use script::{NewVersion, ScriptRepository, ScriptStore};
pub use secret::{SecretRepository, SecretStore, StoredSecret};
pub use udek::{ReencryptedSecret, UdekRepository, UdekStore};
pub use sqlx::sqlite::SqlitePool;
