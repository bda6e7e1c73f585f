// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! End-to-end tests over the assembled application state.
//!
//! This suite covers:
//! - Hybrid encryption through the script service
//! - Concurrent first use of a user data key
//! - Concurrent version writes
//! - Grant expiry for unlisted scripts
//! - The secret vault lifecycle and its audit trail
//! - Tamper detection

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use shebang_common_secret::SecretString;
use shebang_scripts_core::{AuditAction, AuditContext, ContentEncoding, UserId, VersionSelector, Visibility};
use shebang_server::{create_app_state, AppState};
use shebang_server_config::ServerConfig;
use shebang_server_crypto::keys::parse_private_key_pem;
use shebang_server_db::testing::{create_file_test_pool, create_migrated_test_pool};
use shebang_server_db::{SqlitePool, UdekRepository};
use shebang_server_kms::{aead::generate_key, EnvKeyManager, KeyManager};
use shebang_server_scripts::{HybridScriptEncryptor, ScriptsError, VersionUpload};
use shebang_server_secrets::SecretsError;
use shebang_server_storage::MemoryObjectStore;

const OWNER: UserId = UserId::new(1);
const BOB: UserId = UserId::new(2);
const CAROL: UserId = UserId::new(3);

fn kms() -> Arc<dyn KeyManager> {
	Arc::new(EnvKeyManager::new(generate_key()))
}

fn state(pool: SqlitePool) -> AppState {
	create_app_state(pool, kms(), Arc::new(MemoryObjectStore::new()), &ServerConfig::default())
}

fn ctx() -> AuditContext {
	AuditContext::new("198.51.100.4", "curl/8.5.0")
}

/// Tests the hybrid round trip for a private script.
///
/// Purpose: Verify that content written with a keypair is stored and served
/// as ciphertext, and that the matching private key recovers the plaintext.
#[tokio::test]
async fn test_hybrid_roundtrip_with_matching_private_key() {
	let state = state(create_migrated_test_pool().await);
	let generated = shebang_server::commands::generate_keypair(2048).await.unwrap();
	let keypair = state
		.keypairs
		.import(OWNER, "laptop", &generated.public_pem)
		.await
		.unwrap();

	let script = state
		.scripts
		.create_script(OWNER, "bootstrap.sh", None, Visibility::Private)
		.await
		.unwrap();
	state
		.scripts
		.write_version(
			OWNER,
			&script.id,
			VersionUpload::new("#!/bin/sh\necho bootstrapped\n").with_keypair(keypair.id),
		)
		.await
		.unwrap();

	let payload = state
		.scripts
		.read_version(None, &script.id, &VersionSelector::Latest, None)
		.await
		.unwrap();
	let ContentEncoding::Encrypted { wrapped_key, .. } = &payload.encoding else {
		panic!("private content written with a keypair must be encrypted");
	};

	let private = parse_private_key_pem(&generated.private_pem).unwrap();
	let plaintext = HybridScriptEncryptor::open(&private, &payload.content, wrapped_key).unwrap();
	assert_eq!(plaintext.as_slice(), b"#!/bin/sh\necho bootstrapped\n");
}

/// Tests concurrent first use of a user data key.
///
/// Purpose: Verify that parallel first-time callers all receive the same
/// key and exactly one record is stored.
#[tokio::test]
async fn test_parallel_first_udek_calls_create_one_record() {
	let dir = tempfile::tempdir().unwrap();
	let pool = create_file_test_pool(dir.path(), 8).await;
	let state = state(pool.clone());

	let calls = (0..16).map(|_| {
		let udeks = Arc::clone(&state.udeks);
		tokio::spawn(async move { udeks.get_or_create_udek(OWNER).await })
	});
	let keys: Vec<_> = futures::future::join_all(calls)
		.await
		.into_iter()
		.map(|joined| joined.unwrap().unwrap())
		.collect();

	assert!(keys.iter().all(|k| k.id == keys[0].id && k.key() == keys[0].key()));
	let records = UdekRepository::new(pool).list_udeks().await.unwrap();
	assert_eq!(records.len(), 1);
}

/// Tests concurrent version writes.
///
/// Purpose: Verify that parallel writers receive contiguous version numbers
/// and that `latest` points at the highest one.
#[tokio::test]
async fn test_parallel_writes_get_contiguous_versions() {
	let dir = tempfile::tempdir().unwrap();
	let state = state(create_file_test_pool(dir.path(), 8).await);
	let script = state
		.scripts
		.create_script(OWNER, "ci.sh", None, Visibility::Public)
		.await
		.unwrap();

	let writes = (0..12).map(|i| {
		let scripts = Arc::clone(&state.scripts);
		let script_id = script.id;
		tokio::spawn(async move {
			scripts
				.write_version(OWNER, &script_id, VersionUpload::new(format!("echo {i}")))
				.await
		})
	});
	let mut numbers: Vec<u32> = futures::future::join_all(writes)
		.await
		.into_iter()
		.map(|joined| joined.unwrap().unwrap().version)
		.collect();
	numbers.sort_unstable();
	assert_eq!(numbers, (1..=12).collect::<Vec<_>>());

	let latest = state
		.scripts
		.read_version(None, &script.id, &VersionSelector::Latest, None)
		.await
		.unwrap();
	assert_eq!(latest.version.version, 12);
}

/// Tests grant expiry for unlisted scripts.
///
/// Purpose: Verify that a user grant admits only its grantee, and that
/// nobody but the owner is admitted once it expires.
#[tokio::test]
async fn test_unlisted_grant_expires() {
	let state = state(create_migrated_test_pool().await);
	let script = state
		.scripts
		.create_script(OWNER, "team.sh", None, Visibility::Unlisted)
		.await
		.unwrap();
	state
		.scripts
		.write_version(OWNER, &script.id, VersionUpload::new("echo team"))
		.await
		.unwrap();
	state
		.scripts
		.grant_user(OWNER, &script.id, BOB, Some(Utc::now() + chrono::Duration::milliseconds(200)))
		.await
		.unwrap();

	let read = |user| {
		let scripts = Arc::clone(&state.scripts);
		let script_id = script.id;
		async move {
			scripts
				.read_version(Some(user), &script_id, &VersionSelector::Latest, None)
				.await
		}
	};

	assert!(read(BOB).await.is_ok());
	assert!(matches!(read(CAROL).await, Err(ScriptsError::Unauthorized(_))));

	tokio::time::sleep(Duration::from_millis(300)).await;
	assert!(matches!(read(BOB).await, Err(ScriptsError::Unauthorized(_))));
	assert!(matches!(read(CAROL).await, Err(ScriptsError::Unauthorized(_))));
	assert!(read(OWNER).await.is_ok());
}

/// Tests the secret lifecycle.
///
/// Purpose: Verify put/put/get/delete semantics and that the audit trail
/// holds exactly the three mutations plus the read.
#[tokio::test]
async fn test_secret_lifecycle_and_audit_trail() {
	let state = state(create_migrated_test_pool().await);
	let vault = &state.vault;

	vault.put(OWNER, "k", &SecretString::from("v1"), None, &ctx()).await.unwrap();
	vault.put(OWNER, "k", &SecretString::from("v2"), None, &ctx()).await.unwrap();

	let value = vault.get(OWNER, "k", &ctx()).await.unwrap();
	assert_eq!(value.value.expose(), "v2");
	assert_eq!(value.metadata.version, 2);

	vault.delete(OWNER, "k", &ctx()).await.unwrap();
	assert!(matches!(
		vault.get(OWNER, "k", &ctx()).await,
		Err(SecretsError::SecretNotFound(_))
	));

	let log = vault.audit_log(OWNER, Some("k"), None).await.unwrap();
	let mutations: Vec<AuditAction> = log
		.iter()
		.map(|entry| entry.action)
		.filter(|action| *action != AuditAction::Read)
		.collect();
	assert_eq!(
		mutations,
		vec![AuditAction::Delete, AuditAction::Write, AuditAction::Write]
	);
	assert_eq!(log.len(), 4);
	assert!(log.iter().all(|e| e.ip.as_deref() == Some("198.51.100.4")));
}

/// Tests tamper detection on encrypted script content.
///
/// Purpose: Verify that flipping any single bit of stored ciphertext is
/// detected when the holder opens it.
#[tokio::test]
async fn test_ciphertext_bit_flip_is_detected() {
	let state = state(create_migrated_test_pool().await);
	let generated = shebang_server::commands::generate_keypair(2048).await.unwrap();
	let keypair = state
		.keypairs
		.import(OWNER, "laptop", &generated.public_pem)
		.await
		.unwrap();
	let script = state
		.scripts
		.create_script(OWNER, "secret.sh", None, Visibility::Private)
		.await
		.unwrap();
	state
		.scripts
		.write_version(OWNER, &script.id, VersionUpload::new("echo hidden").with_keypair(keypair.id))
		.await
		.unwrap();

	let payload = state
		.scripts
		.read_version(Some(OWNER), &script.id, &VersionSelector::Latest, None)
		.await
		.unwrap();
	let ContentEncoding::Encrypted { wrapped_key, .. } = &payload.encoding else {
		panic!("expected encrypted content");
	};
	let private = parse_private_key_pem(&generated.private_pem).unwrap();

	for byte in 0..payload.content.len() {
		let mut tampered = payload.content.clone();
		tampered[byte] ^= 1 << (byte % 8);
		let err = HybridScriptEncryptor::open(&private, &tampered, wrapped_key).unwrap_err();
		assert!(matches!(err, ScriptsError::IntegrityError), "byte {byte}");
	}
}

/// Tests master key rotation.
///
/// Purpose: Verify that secrets stay readable after every user data key is
/// re-wrapped under a new master key, and that a second run is a no-op.
#[tokio::test]
async fn test_rewrap_keeps_secrets_readable() {
	let pool = create_migrated_test_pool().await;
	let old_kms = kms();
	let new_kms = kms();

	let before = create_app_state(
		pool.clone(),
		Arc::clone(&old_kms),
		Arc::new(MemoryObjectStore::new()),
		&ServerConfig::default(),
	);
	for user in [OWNER, BOB] {
		before
			.vault
			.put(user, "token", &SecretString::from("s3cr3t"), None, &ctx())
			.await
			.unwrap();
	}

	let report = shebang_server::commands::rewrap_udeks(&pool, old_kms.as_ref(), new_kms.as_ref())
		.await
		.unwrap();
	assert_eq!(report.rewrapped, 2);

	let again = shebang_server::commands::rewrap_udeks(&pool, old_kms.as_ref(), new_kms.as_ref())
		.await
		.unwrap();
	assert_eq!((again.rewrapped, again.already_current), (0, 2));

	let after = create_app_state(
		pool,
		new_kms,
		Arc::new(MemoryObjectStore::new()),
		&ServerConfig::default(),
	);
	let value = after.vault.get(BOB, "token", &ctx()).await.unwrap();
	assert_eq!(value.value.expose(), "s3cr3t");
}

/// Tests the purge command.
///
/// Purpose: Verify that only secrets past their expiry are removed.
#[tokio::test]
async fn test_purge_expired_secrets_command() {
	let pool = create_migrated_test_pool().await;
	let state = state(pool.clone());
	state
		.vault
		.put(
			OWNER,
			"short",
			&SecretString::from("x"),
			Some(Utc::now() + chrono::Duration::milliseconds(50)),
			&ctx(),
		)
		.await
		.unwrap();
	state
		.vault
		.put(OWNER, "long", &SecretString::from("y"), None, &ctx())
		.await
		.unwrap();

	tokio::time::sleep(Duration::from_millis(100)).await;
	let purged = shebang_server::commands::purge_expired_secrets(&pool, Utc::now())
		.await
		.unwrap();
	assert_eq!(purged, 1);

	let remaining = state.vault.list(OWNER).await.unwrap();
	assert_eq!(remaining.len(), 1);
	assert_eq!(remaining[0].key_name, "long");
}
