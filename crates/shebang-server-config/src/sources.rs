// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: built-in defaults, TOML file, environment variables.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::env::{env_bool, env_parse, env_var, load_secret_env};
use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	DatabaseConfigLayer, KmsBackend, KmsConfigLayer, LogFormat, LoggingConfigLayer,
	RateLimitConfigLayer, ScriptsConfigLayer, StorageBackend, StorageConfigLayer,
	TransitConfigLayer, VaultConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		Ok(ServerConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/shebang/server.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: SHEBANG_SERVER_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(ServerConfigLayer {
			database: Some(load_database_from_env()?),
			storage: Some(load_storage_from_env()?),
			kms: Some(load_kms_from_env()?),
			vault: Some(load_vault_from_env()?),
			scripts: Some(load_scripts_from_env()?),
			ratelimit: Some(load_ratelimit_from_env()?),
			logging: Some(load_logging_from_env()?),
		})
	}
}

fn parse_enum<T>(name: &str) -> Result<Option<T>, ConfigError>
where
	T: std::str::FromStr<Err = String>,
{
	env_var(name)
		.map(|v| {
			v.parse().map_err(|message| ConfigError::InvalidValue {
				key: name.to_string(),
				message,
			})
		})
		.transpose()
}

fn load_database_from_env() -> Result<DatabaseConfigLayer, ConfigError> {
	Ok(DatabaseConfigLayer {
		url: env_var("SHEBANG_SERVER_DATABASE_URL"),
		max_connections: env_parse("SHEBANG_SERVER_DATABASE_MAX_CONNECTIONS")?,
	})
}

fn load_storage_from_env() -> Result<StorageConfigLayer, ConfigError> {
	Ok(StorageConfigLayer {
		backend: parse_enum::<StorageBackend>("SHEBANG_SERVER_STORAGE_BACKEND")?,
		path: env_var("SHEBANG_SERVER_STORAGE_PATH").map(PathBuf::from),
		inline_threshold_bytes: env_parse("SHEBANG_SERVER_STORAGE_INLINE_THRESHOLD")?,
	})
}

fn load_kms_from_env() -> Result<KmsConfigLayer, ConfigError> {
	let transit = if env_var("SHEBANG_SERVER_KMS_TRANSIT_URL").is_some() {
		Some(TransitConfigLayer {
			url: env_var("SHEBANG_SERVER_KMS_TRANSIT_URL"),
			key_name: env_var("SHEBANG_SERVER_KMS_TRANSIT_KEY_NAME"),
			token: load_secret_env("SHEBANG_SERVER_KMS_TRANSIT_TOKEN")?,
			timeout_secs: env_parse("SHEBANG_SERVER_KMS_TRANSIT_TIMEOUT_SECS")?,
		})
	} else {
		None
	};

	Ok(KmsConfigLayer {
		backend: parse_enum::<KmsBackend>("SHEBANG_SERVER_KMS_BACKEND")?,
		master_key_env: env_var("SHEBANG_SERVER_KMS_MASTER_KEY_ENV"),
		transit,
	})
}

fn load_vault_from_env() -> Result<VaultConfigLayer, ConfigError> {
	let cache_disabled = env_bool("SHEBANG_SERVER_VAULT_UDEK_CACHE_DISABLED").unwrap_or(false);
	let udek_cache_ttl_secs = if cache_disabled {
		Some(0)
	} else {
		env_parse("SHEBANG_SERVER_VAULT_UDEK_CACHE_TTL_SECS")?
	};

	Ok(VaultConfigLayer {
		udek_cache_ttl_secs,
		audit_query_limit: env_parse("SHEBANG_SERVER_VAULT_AUDIT_LIMIT")?,
	})
}

fn load_scripts_from_env() -> Result<ScriptsConfigLayer, ConfigError> {
	Ok(ScriptsConfigLayer {
		max_script_size: env_parse("SHEBANG_SERVER_SCRIPTS_MAX_SIZE")?,
	})
}

fn load_ratelimit_from_env() -> Result<RateLimitConfigLayer, ConfigError> {
	Ok(RateLimitConfigLayer {
		requests_per_window: env_parse("SHEBANG_SERVER_RATE_LIMIT_REQUESTS")?,
		window_secs: env_parse("SHEBANG_SERVER_RATE_LIMIT_WINDOW_SECS")?,
	})
}

fn load_logging_from_env() -> Result<LoggingConfigLayer, ConfigError> {
	Ok(LoggingConfigLayer {
		level: env_var("SHEBANG_SERVER_LOG_LEVEL"),
		format: parse_enum::<LogFormat>("SHEBANG_SERVER_LOG_FORMAT")?,
	})
}
