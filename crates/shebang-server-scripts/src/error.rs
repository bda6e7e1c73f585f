// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for script, sharing and keypair operations.

use shebang_scripts_core::CoreError;
use shebang_server_crypto::CryptoError;
use shebang_server_db::DbError;
use shebang_server_storage::StorageError;
use thiserror::Error;

pub type ScriptsResult<T> = Result<T, ScriptsError>;

#[derive(Debug, Error)]
pub enum ScriptsError {
	// =========================================================================
	// Policy Errors
	// =========================================================================
	#[error("unauthorized: {0}")]
	Unauthorized(String),

	#[error("keypair does not belong to the script owner")]
	KeyOwnershipMismatch,

	// =========================================================================
	// Input Errors
	// =========================================================================
	#[error("not found: {0}")]
	NotFound(String),

	#[error("invalid input: {0}")]
	InvalidInput(String),

	#[error("invalid public key: {0}")]
	InvalidPublicKey(String),

	#[error("content is {size} bytes, limit is {max}")]
	ContentTooLarge { size: u64, max: u64 },

	#[error("conflict: {0}")]
	Conflict(String),

	// =========================================================================
	// Content Errors
	// =========================================================================
	#[error("encryption failed: {0}")]
	Encryption(String),

	#[error("integrity check failed")]
	IntegrityError,

	#[error("stored content of version {version} does not match its checksum")]
	ChecksumMismatch { version: u32 },

	// =========================================================================
	// Infrastructure Errors
	// =========================================================================
	#[error("persistence error: {0}")]
	Persistence(DbError),

	#[error("storage error: {0}")]
	Storage(#[from] StorageError),

	#[error("internal error: {0}")]
	Internal(String),
}

impl ScriptsError {
	/// Returns true if this error should be logged at error level.
	pub fn is_internal(&self) -> bool {
		matches!(
			self,
			ScriptsError::Persistence(_)
				| ScriptsError::Storage(_)
				| ScriptsError::Internal(_)
				| ScriptsError::ChecksumMismatch { .. }
		)
	}
}

impl From<DbError> for ScriptsError {
	fn from(err: DbError) -> Self {
		match err {
			DbError::NotFound(msg) => ScriptsError::NotFound(msg),
			DbError::Conflict(msg) => ScriptsError::Conflict(msg),
			other => ScriptsError::Persistence(other),
		}
	}
}

impl From<CryptoError> for ScriptsError {
	fn from(err: CryptoError) -> Self {
		match err {
			CryptoError::InvalidPublicKey(msg) => ScriptsError::InvalidPublicKey(msg),
			CryptoError::Encryption(msg) | CryptoError::KeyWrap(msg) => ScriptsError::Encryption(msg),
			CryptoError::IntegrityError | CryptoError::InvalidCiphertext(_) => {
				ScriptsError::IntegrityError
			}
			other => ScriptsError::Internal(other.to_string()),
		}
	}
}

impl From<CoreError> for ScriptsError {
	fn from(err: CoreError) -> Self {
		ScriptsError::InvalidInput(err.to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn db_errors_keep_their_meaning() {
		assert!(matches!(
			ScriptsError::from(DbError::NotFound("script".into())),
			ScriptsError::NotFound(_)
		));
		assert!(matches!(
			ScriptsError::from(DbError::Conflict("name".into())),
			ScriptsError::Conflict(_)
		));
		assert!(ScriptsError::from(DbError::Internal("x".into())).is_internal());
	}

	#[test]
	fn wrap_failures_are_encryption_errors() {
		assert!(matches!(
			ScriptsError::from(CryptoError::KeyWrap("too long".into())),
			ScriptsError::Encryption(_)
		));
		assert!(!ScriptsError::KeyOwnershipMismatch.is_internal());
	}
}
