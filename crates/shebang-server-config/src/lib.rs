// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Centralized configuration for the shebang server.
//!
//! Configuration is merged from built-in defaults, an optional TOML file and
//! `SHEBANG_SERVER_*` environment variables, in that order of precedence.
//! Secrets (transit token, master key) use the `VAR` / `VAR_FILE` convention
//! from [`env::load_secret_env`].

pub mod env;
pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use env::{load_secret_env, require_secret_env};
pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub database: DatabaseConfig,
	pub storage: StorageConfig,
	pub kms: KmsConfig,
	pub vault: VaultConfig,
	pub scripts: ScriptsConfig,
	pub ratelimit: RateLimitConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`SHEBANG_SERVER_*`)
/// 2. Config file (`/etc/shebang/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
pub fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let database = layer.database.unwrap_or_default().finalize();
	let storage = layer.storage.unwrap_or_default().finalize();
	let kms = layer.kms.unwrap_or_default().finalize()?;
	let vault = layer.vault.unwrap_or_default().finalize();
	let scripts = layer.scripts.unwrap_or_default().finalize();
	let ratelimit = layer.ratelimit.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize();

	validate_config(&storage, &scripts, &ratelimit)?;

	info!(
		database = %database.url,
		storage_backend = ?storage.backend,
		kms_backend = ?kms.backend,
		udek_cache_ttl_secs = vault.udek_cache_ttl_secs,
		max_script_size = scripts.max_script_size,
		"Server configuration loaded"
	);

	Ok(ServerConfig {
		database,
		storage,
		kms,
		vault,
		scripts,
		ratelimit,
		logging,
	})
}

/// Validate cross-field configuration rules.
fn validate_config(
	storage: &StorageConfig,
	scripts: &ScriptsConfig,
	ratelimit: &RateLimitConfig,
) -> Result<(), ConfigError> {
	if storage.inline_threshold_bytes as u64 > scripts.max_script_size {
		return Err(ConfigError::Validation(format!(
			"inline threshold ({}) exceeds max script size ({})",
			storage.inline_threshold_bytes, scripts.max_script_size
		)));
	}

	if ratelimit.window_secs == 0 {
		return Err(ConfigError::Validation(
			"rate limit window must be at least one second".to_string(),
		));
	}

	Ok(())
}
