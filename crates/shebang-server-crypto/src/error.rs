// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
	#[error("invalid public key: {0}")]
	InvalidPublicKey(String),

	#[error("invalid private key: {0}")]
	InvalidPrivateKey(String),

	#[error("encryption failed: {0}")]
	Encryption(String),

	#[error("integrity check failed")]
	IntegrityError,

	#[error("invalid ciphertext: {0}")]
	InvalidCiphertext(String),

	#[error("key wrap failed: {0}")]
	KeyWrap(String),

	#[error("signature does not verify")]
	InvalidSignature,

	#[error("key generation failed: {0}")]
	KeyGeneration(String),
}
