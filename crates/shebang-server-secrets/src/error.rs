// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the user data key manager and secret vault.

use shebang_scripts_core::CoreError;
use shebang_server_crypto::CryptoError;
use shebang_server_db::DbError;
use shebang_server_kms::KmsError;
use thiserror::Error;

/// Result type alias for vault operations.
pub type SecretsResult<T> = Result<T, SecretsError>;

#[derive(Debug, Error)]
pub enum SecretsError {
	// =========================================================================
	// Key Errors
	// =========================================================================
	#[error("key unavailable: {0}")]
	KeyUnavailable(String),

	#[error("integrity check failed")]
	IntegrityError,

	#[error("encryption failed: {0}")]
	Encryption(String),

	// =========================================================================
	// Secret Access Errors
	// =========================================================================
	#[error("secret not found: {0}")]
	SecretNotFound(String),

	#[error("invalid input: {0}")]
	InvalidInput(String),

	#[error("conflict: {0}")]
	Conflict(String),

	// =========================================================================
	// Infrastructure Errors
	// =========================================================================
	#[error("persistence error: {0}")]
	Persistence(#[from] DbError),

	#[error("internal error: {0}")]
	Internal(String),
}

impl SecretsError {
	/// Returns true if this error should be logged at error level.
	pub fn is_internal(&self) -> bool {
		matches!(
			self,
			SecretsError::Persistence(_)
				| SecretsError::Internal(_)
				| SecretsError::KeyUnavailable(_)
				| SecretsError::IntegrityError
		)
	}
}

impl From<KmsError> for SecretsError {
	fn from(err: KmsError) -> Self {
		match err {
			KmsError::KeyUnavailable(msg) | KmsError::Configuration(msg) => {
				SecretsError::KeyUnavailable(msg)
			}
			// A wrapped key that fails to parse has been altered at rest.
			KmsError::IntegrityError | KmsError::InvalidCiphertext(_) => SecretsError::IntegrityError,
			KmsError::Encryption(msg) => SecretsError::Encryption(msg),
		}
	}
}

impl From<CryptoError> for SecretsError {
	fn from(err: CryptoError) -> Self {
		match err {
			CryptoError::IntegrityError | CryptoError::InvalidCiphertext(_) => {
				SecretsError::IntegrityError
			}
			CryptoError::Encryption(msg) => SecretsError::Encryption(msg),
			other => SecretsError::Internal(other.to_string()),
		}
	}
}

impl From<CoreError> for SecretsError {
	fn from(err: CoreError) -> Self {
		SecretsError::InvalidInput(err.to_string())
	}
}
