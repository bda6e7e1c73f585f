// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! shebang server operator binary.

use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use shebang_server::{commands, logging, version};
use shebang_server_crypto::keys::GENERATED_KEY_BITS;
use shebang_server_kms::{key_manager_from_config, EnvKeyManager, KeyManager};

#[derive(Parser, Debug)]
#[command(name = "shebang-server", about = "shebang script and secret vault server", version)]
struct Args {
	/// Config file to use instead of /etc/shebang/server.toml
	#[arg(long, env = "SHEBANG_SERVER_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show version and build information
	Version,
	/// Create or upgrade the database schema
	Migrate,
	/// Print a new base64 master key
	GenerateMasterKey,
	/// Print a new RSA keypair as PEM
	GenerateKeypair {
		#[arg(long, default_value_t = GENERATED_KEY_BITS)]
		bits: usize,
	},
	/// Delete vault secrets whose expiry has passed
	PurgeExpiredSecrets,
	/// Re-wrap every user data key under a new master key
	RewrapUdeks {
		/// Variable (or `<VAR>_FILE`) holding the new base64 master key
		#[arg(long, default_value = "NEW_MASTER_ENCRYPTION_KEY")]
		new_master_key_env: String,
	},
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	match args.command {
		Command::Version => {
			println!("{}", version::format_version_info());
			return Ok(());
		}
		Command::GenerateMasterKey => {
			println!("{}", shebang_server_kms::generate_master_key().expose());
			return Ok(());
		}
		Command::GenerateKeypair { bits } => {
			let generated = commands::generate_keypair(bits).await?;
			println!("{}", generated.public_pem.trim_end());
			println!("{}", generated.private_pem.expose().trim_end());
			return Ok(());
		}
		_ => {}
	}

	dotenvy::dotenv().ok();

	let config = match &args.config {
		Some(path) => shebang_server_config::load_config_with_file(path)?,
		None => shebang_server_config::load_config()?,
	};
	logging::init_tracing(&config.logging);

	tracing::info!(database = %config.database.url, "starting shebang-server");
	let pool = commands::connect(&config.database).await?;

	match args.command {
		Command::Migrate => {}
		Command::PurgeExpiredSecrets => {
			let purged = commands::purge_expired_secrets(&pool, Utc::now()).await?;
			println!("purged {purged} expired secrets");
		}
		Command::RewrapUdeks { new_master_key_env } => {
			let old = key_manager_from_config(&config.kms).context("current master key")?;
			let new = EnvKeyManager::from_env(&new_master_key_env).context("new master key")?;
			let report = commands::rewrap_udeks(&pool, old.as_ref(), &new as &dyn KeyManager).await?;
			println!(
				"rewrapped {} keys ({} already current, {} skipped)",
				report.rewrapped, report.already_current, report.skipped
			);
		}
		Command::Version | Command::GenerateMasterKey | Command::GenerateKeypair { .. } => {}
	}

	pool.close().await;
	Ok(())
}
