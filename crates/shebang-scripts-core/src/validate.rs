// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Name validation shared by scripts, tags, keypairs and vault secrets.

use crate::error::{CoreError, Result};
use crate::types::LATEST_TAG;

pub const MAX_SCRIPT_NAME_LEN: usize = 128;
pub const MAX_TAG_NAME_LEN: usize = 64;
pub const MAX_SECRET_NAME_LEN: usize = 128;
pub const MAX_KEYPAIR_NAME_LEN: usize = 128;

fn check_charset(
	field: &'static str,
	value: &str,
	max_len: usize,
	allowed: impl Fn(char) -> bool,
) -> Result<()> {
	if value.is_empty() {
		return Err(CoreError::invalid(field, "must not be empty"));
	}
	if value.len() > max_len {
		return Err(CoreError::invalid(
			field,
			format!("must be at most {max_len} characters"),
		));
	}
	if let Some(c) = value.chars().find(|c| !allowed(*c)) {
		return Err(CoreError::invalid(field, format!("contains invalid character '{c}'")));
	}
	Ok(())
}

/// Script names become part of URLs: `[A-Za-z0-9._-]`, not starting with a dot.
pub fn validate_script_name(name: &str) -> Result<()> {
	check_charset("script name", name, MAX_SCRIPT_NAME_LEN, |c| {
		c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
	})?;
	if name.starts_with('.') {
		return Err(CoreError::invalid("script name", "must not start with '.'"));
	}
	Ok(())
}

/// Tag names set by users. `latest` is maintained by the server and cannot be
/// assigned directly. Names of the form `v<digits>` are rejected because they
/// would shadow version selectors.
pub fn validate_tag_name(name: &str) -> Result<()> {
	check_charset("tag name", name, MAX_TAG_NAME_LEN, |c| {
		c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-')
	})?;
	if name == LATEST_TAG {
		return Err(CoreError::invalid("tag name", "'latest' is reserved"));
	}
	if is_version_selector(name) {
		return Err(CoreError::invalid("tag name", "must not look like a version number"));
	}
	Ok(())
}

pub fn validate_secret_name(name: &str) -> Result<()> {
	check_charset("secret name", name, MAX_SECRET_NAME_LEN, |c| {
		c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
	})
}

pub fn validate_keypair_name(name: &str) -> Result<()> {
	let trimmed = name.trim();
	if trimmed.is_empty() {
		return Err(CoreError::invalid("keypair name", "must not be empty"));
	}
	if trimmed.chars().count() > MAX_KEYPAIR_NAME_LEN {
		return Err(CoreError::invalid(
			"keypair name",
			format!("must be at most {MAX_KEYPAIR_NAME_LEN} characters"),
		));
	}
	if trimmed.chars().any(char::is_control) {
		return Err(CoreError::invalid("keypair name", "contains control characters"));
	}
	Ok(())
}

pub(crate) fn is_version_selector(s: &str) -> bool {
	s.strip_prefix('v')
		.is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}
