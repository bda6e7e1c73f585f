// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
	#[error("object not found: {0}")]
	NotFound(String),

	#[error("invalid object key '{key}': {reason}")]
	InvalidKey { key: String, reason: &'static str },

	#[error("object size mismatch: expected {expected} bytes, read {actual}")]
	SizeMismatch { expected: u64, actual: u64 },

	#[error("storage I/O error: {0}")]
	Io(#[from] std::io::Error),
}
