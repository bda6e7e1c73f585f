// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Key management backend configuration.
//!
//! The master key itself is never part of the config struct. For the `env`
//! backend the config only names the environment variable that holds it; the
//! KMS crate reads that variable (or its `_FILE` twin) when the key manager is
//! constructed.

use serde::Deserialize;
use shebang_common_secret::SecretString;

use crate::error::ConfigError;

const DEFAULT_MASTER_KEY_ENV: &str = "MASTER_ENCRYPTION_KEY";
const DEFAULT_TRANSIT_KEY_NAME: &str = "shebang-master";
const DEFAULT_TRANSIT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KmsBackend {
	#[default]
	Env,
	Transit,
}

impl std::str::FromStr for KmsBackend {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"env" => Ok(Self::Env),
			"transit" => Ok(Self::Transit),
			other => Err(format!("unknown kms backend '{other}'")),
		}
	}
}

/// Managed transit service settings.
#[derive(Debug, Clone)]
pub struct TransitConfig {
	pub url: String,
	pub key_name: String,
	pub token: Option<SecretString>,
	pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct KmsConfig {
	pub backend: KmsBackend,
	pub master_key_env: String,
	pub transit: Option<TransitConfig>,
}

impl Default for KmsConfig {
	fn default() -> Self {
		Self {
			backend: KmsBackend::Env,
			master_key_env: DEFAULT_MASTER_KEY_ENV.to_string(),
			transit: None,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransitConfigLayer {
	#[serde(default)]
	pub url: Option<String>,
	#[serde(default)]
	pub key_name: Option<String>,
	#[serde(default)]
	pub token: Option<SecretString>,
	#[serde(default)]
	pub timeout_secs: Option<u64>,
}

impl TransitConfigLayer {
	pub fn merge(&mut self, other: TransitConfigLayer) {
		if other.url.is_some() {
			self.url = other.url;
		}
		if other.key_name.is_some() {
			self.key_name = other.key_name;
		}
		if other.token.is_some() {
			self.token = other.token;
		}
		if other.timeout_secs.is_some() {
			self.timeout_secs = other.timeout_secs;
		}
	}

	/// Returns `None` when no URL was configured.
	pub fn finalize(self) -> Option<TransitConfig> {
		let url = self.url?;
		Some(TransitConfig {
			url: url.trim_end_matches('/').to_string(),
			key_name: self
				.key_name
				.unwrap_or_else(|| DEFAULT_TRANSIT_KEY_NAME.to_string()),
			token: self.token,
			timeout_secs: self.timeout_secs.unwrap_or(DEFAULT_TRANSIT_TIMEOUT_SECS),
		})
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KmsConfigLayer {
	#[serde(default)]
	pub backend: Option<KmsBackend>,
	#[serde(default)]
	pub master_key_env: Option<String>,
	#[serde(default)]
	pub transit: Option<TransitConfigLayer>,
}

impl KmsConfigLayer {
	pub fn merge(&mut self, other: KmsConfigLayer) {
		if other.backend.is_some() {
			self.backend = other.backend;
		}
		if other.master_key_env.is_some() {
			self.master_key_env = other.master_key_env;
		}
		match (self.transit.as_mut(), other.transit) {
			(Some(t), Some(o)) => t.merge(o),
			(None, Some(o)) => self.transit = Some(o),
			_ => {}
		}
	}

	pub fn finalize(self) -> Result<KmsConfig, ConfigError> {
		let backend = self.backend.unwrap_or_default();
		let transit = self.transit.and_then(TransitConfigLayer::finalize);

		if backend == KmsBackend::Transit && transit.is_none() {
			return Err(ConfigError::Validation(
				"kms backend 'transit' requires SHEBANG_SERVER_KMS_TRANSIT_URL".to_string(),
			));
		}

		Ok(KmsConfig {
			backend,
			master_key_env: self
				.master_key_env
				.unwrap_or_else(|| DEFAULT_MASTER_KEY_ENV.to_string()),
			transit,
		})
	}
}
