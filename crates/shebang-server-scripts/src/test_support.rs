// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use shebang_scripts_core::{KeyPair, KeyPairId, Script, ScriptId, UserId, Visibility};
use shebang_server_crypto::keys::{generate_keypair, parse_private_key_pem, public_key_fingerprint};
use shebang_server_crypto::{RsaPrivateKey, RsaPublicKey};
use shebang_server_db::testing::create_migrated_test_pool;
use shebang_server_db::{AccessRepository, KeyPairRepository, ScriptRepository};
use shebang_server_storage::MemoryObjectStore;

use crate::service::{ScriptLimits, ScriptService};

pub struct TestKey {
	pub public_pem: String,
	pub private: RsaPrivateKey,
}

impl TestKey {
	fn generate() -> Self {
		let generated = generate_keypair(2048).unwrap();
		Self {
			private: parse_private_key_pem(&generated.private_pem).unwrap(),
			public_pem: generated.public_pem,
		}
	}

	pub fn public(&self) -> RsaPublicKey {
		RsaPublicKey::from(&self.private)
	}
}

pub fn test_key() -> &'static TestKey {
	static KEY: OnceLock<TestKey> = OnceLock::new();
	KEY.get_or_init(TestKey::generate)
}

pub fn other_test_key() -> &'static TestKey {
	static KEY: OnceLock<TestKey> = OnceLock::new();
	KEY.get_or_init(TestKey::generate)
}

pub fn script(owner: UserId, visibility: Visibility) -> Script {
	let now = Utc::now();
	Script {
		id: ScriptId::generate(),
		owner_id: owner,
		name: "deploy.sh".to_string(),
		description: None,
		visibility,
		created_at: now,
		updated_at: now,
	}
}

pub fn test_keypair(owner: UserId, key: &TestKey) -> KeyPair {
	KeyPair {
		id: KeyPairId::generate(),
		user_id: owner,
		name: "laptop".to_string(),
		public_key_pem: key.public_pem.clone(),
		fingerprint: public_key_fingerprint(&key.public()).unwrap(),
		created_at: Utc::now(),
	}
}

pub type TestService = ScriptService<ScriptRepository, AccessRepository, KeyPairRepository>;

pub struct Harness {
	pub service: TestService,
	pub keypairs: Arc<KeyPairRepository>,
	pub objects: Arc<MemoryObjectStore>,
}

pub async fn harness(limits: ScriptLimits) -> Harness {
	let pool = create_migrated_test_pool().await;
	let keypairs = Arc::new(KeyPairRepository::new(pool.clone()));
	let objects = Arc::new(MemoryObjectStore::new());
	let service = ScriptService::new(
		Arc::new(ScriptRepository::new(pool.clone())),
		Arc::new(AccessRepository::new(pool)),
		Arc::clone(&keypairs),
		objects.clone(),
		limits,
	);
	Harness {
		service,
		keypairs,
		objects,
	}
}
