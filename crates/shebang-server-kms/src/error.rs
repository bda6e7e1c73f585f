// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for master-key operations.

use thiserror::Error;

pub type KmsResult<T> = Result<T, KmsError>;

/// Errors raised by a [`crate::KeyManager`].
///
/// None of the variants carry key or plaintext bytes.
#[derive(Debug, Error)]
pub enum KmsError {
	/// The backend cannot supply the master key right now (missing env
	/// secret, transit service unreachable). Callers may retry with backoff.
	#[error("master key unavailable: {0}")]
	KeyUnavailable(String),

	/// AEAD tag verification failed: tampered ciphertext or wrong key.
	#[error("integrity check failed")]
	IntegrityError,

	/// Input is structurally not a ciphertext produced by this backend.
	#[error("invalid ciphertext: {0}")]
	InvalidCiphertext(String),

	#[error("configuration error: {0}")]
	Configuration(String),

	#[error("encryption failed: {0}")]
	Encryption(String),
}

impl KmsError {
	/// Whether a caller may reasonably retry the operation later.
	pub fn is_retryable(&self) -> bool {
		matches!(self, KmsError::KeyUnavailable(_))
	}
}
