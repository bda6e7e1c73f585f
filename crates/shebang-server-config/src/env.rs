// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Environment helpers shared by config sources and the KMS backends.
//!
//! Secrets follow the `VAR` / `VAR_FILE` convention: when `VAR_FILE` is set the
//! value is read from that path (one trailing newline stripped), otherwise `VAR`
//! is used directly. This lets the master key be mounted as a Docker or
//! Kubernetes secret instead of living in the process environment.

use std::path::PathBuf;
use std::{env, fs};

use shebang_common_secret::SecretString;

use crate::error::ConfigError;

/// Load a secret from `var` or the file named by `{var}_FILE`.
///
/// Returns `Ok(None)` when neither is set or the value is empty.
pub fn load_secret_env(var: &str) -> Result<Option<SecretString>, ConfigError> {
	let file_var = format!("{var}_FILE");

	if let Ok(path_str) = env::var(&file_var) {
		if path_str.is_empty() {
			return Err(ConfigError::Secret(format!("{file_var} is set but empty")));
		}

		let path = PathBuf::from(&path_str);
		let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead {
			path: path.clone(),
			source: e,
		})?;
		let value = content.strip_suffix('\n').unwrap_or(&content);
		let value = value.strip_suffix('\r').unwrap_or(value);
		if value.is_empty() {
			return Ok(None);
		}
		return Ok(Some(SecretString::new(value.to_string())));
	}

	Ok(env_var(var).map(SecretString::new))
}

/// Load a secret that must be present.
pub fn require_secret_env(var: &str) -> Result<SecretString, ConfigError> {
	load_secret_env(var)?.ok_or_else(|| {
		ConfigError::Secret(format!("required secret not found: set either {var} or {var}_FILE"))
	})
}

pub(crate) fn env_var(name: &str) -> Option<String> {
	env::var(name).ok().filter(|s| !s.is_empty())
}

pub(crate) fn env_bool(name: &str) -> Option<bool> {
	env_var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

pub(crate) fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid {} value '{v}'", std::any::type_name::<T>()),
		}),
		None => Ok(None),
	}
}
