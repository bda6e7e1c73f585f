// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
	#[error("invalid {field}: {reason}")]
	InvalidInput { field: &'static str, reason: String },

	#[error("unknown visibility '{0}'")]
	UnknownVisibility(String),

	#[error("unknown audit action '{0}'")]
	UnknownAuditAction(String),

	#[error("content encoding is inconsistent: {0}")]
	InconsistentEncoding(&'static str),
}

impl CoreError {
	pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
		Self::InvalidInput {
			field,
			reason: reason.into(),
		}
	}
}
