// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wiring for the shebang server: builds the shared services from
//! configuration and implements the operator commands.

pub mod commands;
pub mod logging;
pub mod version;

use std::sync::Arc;

use shebang_server_config::ServerConfig;
use shebang_server_db::{
	AccessRepository, KeyPairRepository, ScriptRepository, SecretAuditRepository, SecretRepository,
	SqlitePool, UdekRepository,
};
use shebang_server_kms::KeyManager;
use shebang_server_ratelimit::RateLimiter;
use shebang_server_scripts::{KeyPairService, ScriptLimits, ScriptService};
use shebang_server_secrets::{SecretVault, UdekManager};
use shebang_server_storage::ObjectStore;

pub type Vault = SecretVault<UdekRepository, SecretRepository, SecretAuditRepository>;
pub type Scripts = ScriptService<ScriptRepository, AccessRepository, KeyPairRepository>;

/// Services shared by every request.
#[derive(Clone)]
pub struct AppState {
	pub pool: SqlitePool,
	pub kms: Arc<dyn KeyManager>,
	pub udeks: Arc<UdekManager<UdekRepository>>,
	pub vault: Arc<Vault>,
	pub scripts: Arc<Scripts>,
	pub keypairs: Arc<KeyPairService<KeyPairRepository>>,
	pub objects: Arc<dyn ObjectStore>,
	pub rate_limiter: Arc<RateLimiter>,
}

pub fn create_app_state(
	pool: SqlitePool,
	kms: Arc<dyn KeyManager>,
	objects: Arc<dyn ObjectStore>,
	config: &ServerConfig,
) -> AppState {
	let udek_repo = Arc::new(UdekRepository::new(pool.clone()));
	let udeks = Arc::new(UdekManager::from_config(Arc::clone(&kms), udek_repo, &config.vault));

	let vault = Arc::new(SecretVault::new(
		Arc::clone(&udeks),
		Arc::new(SecretRepository::new(pool.clone())),
		Arc::new(SecretAuditRepository::new(pool.clone())),
		config.vault.audit_query_limit,
	));

	let keypair_repo = Arc::new(KeyPairRepository::new(pool.clone()));
	let scripts = Arc::new(ScriptService::new(
		Arc::new(ScriptRepository::new(pool.clone())),
		Arc::new(AccessRepository::new(pool.clone())),
		Arc::clone(&keypair_repo),
		Arc::clone(&objects),
		ScriptLimits::from_config(&config.scripts, &config.storage),
	));

	tracing::info!(
		kms = kms.backend_id(),
		storage = objects.name(),
		"Created application state"
	);

	AppState {
		pool,
		kms,
		udeks,
		vault,
		scripts,
		keypairs: Arc::new(KeyPairService::new(keypair_repo)),
		objects,
		rate_limiter: Arc::new(RateLimiter::from_config(&config.ratelimit)),
	}
}
