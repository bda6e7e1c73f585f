// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::error::{StorageError, StorageResult};

/// Object keys are relative `/`-separated paths of plain segments.
pub fn validate_key(key: &str) -> StorageResult<()> {
	let invalid = |reason| {
		Err(StorageError::InvalidKey {
			key: key.to_string(),
			reason,
		})
	};

	if key.is_empty() {
		return invalid("empty");
	}
	if key.starts_with('/') {
		return invalid("absolute path");
	}
	if key.contains('\\') || key.contains('\0') {
		return invalid("forbidden character");
	}
	for segment in key.split('/') {
		match segment {
			"" => return invalid("empty segment"),
			"." | ".." => return invalid("relative segment"),
			_ => {}
		}
	}
	Ok(())
}
