// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use shebang_scripts_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
	#[error("Database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Conflict: {0}")]
	Conflict(String),

	#[error("Internal: {0}")]
	Internal(String),

	#[error("Invalid stored value: {0}")]
	Core(#[from] CoreError),
}

impl DbError {
	/// Whether the error is a UNIQUE or PRIMARY KEY violation.
	pub fn is_unique_violation(&self) -> bool {
		match self {
			DbError::Sqlx(sqlx::Error::Database(e)) => e.is_unique_violation(),
			DbError::Conflict(_) => true,
			_ => false,
		}
	}
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Map a unique violation to [`DbError::Conflict`], passing other errors through.
pub(crate) fn conflict_on_unique(err: sqlx::Error, what: impl FnOnce() -> String) -> DbError {
	match &err {
		sqlx::Error::Database(e) if e.is_unique_violation() => DbError::Conflict(what()),
		_ => DbError::Sqlx(err),
	}
}
