// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Managed backend: the master key lives in a remote transit service and never
//! enters this process. Wrap and unwrap are HTTP calls.
//!
//! Protocol (JSON, base64 payloads):
//! - `POST {url}/v1/transit/encrypt/{key}` `{"plaintext": ..}` -> `{"ciphertext": ..}`
//! - `POST {url}/v1/transit/decrypt/{key}` `{"ciphertext": ..}` -> `{"plaintext": ..}`

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use shebang_common_secret::SecretString;
use shebang_server_config::TransitConfig;
use tracing::{instrument, warn};
use zeroize::Zeroizing;

use crate::aead::KEY_SIZE;
use crate::error::{KmsError, KmsResult};
use crate::KeyManager;

const USER_AGENT: &str = concat!("shebang-server/", env!("CARGO_PKG_VERSION"));

#[derive(Serialize)]
struct EncryptRequest<'a> {
	plaintext: &'a str,
}

#[derive(Deserialize)]
struct EncryptResponse {
	ciphertext: String,
}

#[derive(Serialize)]
struct DecryptRequest<'a> {
	ciphertext: &'a str,
}

#[derive(Deserialize)]
struct DecryptResponse {
	plaintext: SecretString,
}

pub struct TransitKeyManager {
	client: reqwest::Client,
	base_url: String,
	key_name: String,
	token: Option<SecretString>,
	backend_id: String,
}

impl TransitKeyManager {
	pub fn new(config: &TransitConfig) -> KmsResult<Self> {
		let client = reqwest::Client::builder()
			.timeout(Duration::from_secs(config.timeout_secs))
			.user_agent(USER_AGENT)
			.build()
			.map_err(|e| KmsError::Configuration(format!("transit client: {e}")))?;

		Ok(Self {
			client,
			base_url: config.url.trim_end_matches('/').to_string(),
			key_name: config.key_name.clone(),
			token: config.token.clone(),
			backend_id: format!("transit:{}", config.key_name),
		})
	}

	fn endpoint(&self, op: &str) -> String {
		format!("{}/v1/transit/{op}/{}", self.base_url, self.key_name)
	}

	async fn post<B: Serialize + ?Sized>(&self, op: &str, body: &B) -> KmsResult<reqwest::Response> {
		let mut request = self.client.post(self.endpoint(op)).json(body);
		if let Some(token) = &self.token {
			request = request.bearer_auth(token.expose());
		}

		request.send().await.map_err(|e| {
			warn!(op, error = %e, "transit request failed");
			KmsError::KeyUnavailable(format!("transit {op} request failed"))
		})
	}
}

impl std::fmt::Debug for TransitKeyManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TransitKeyManager")
			.field("base_url", &self.base_url)
			.field("key_name", &self.key_name)
			.field("token", &self.token)
			.finish()
	}
}

#[async_trait]
impl KeyManager for TransitKeyManager {
	#[instrument(skip(self, plaintext), fields(key = %self.key_name))]
	async fn encrypt(&self, plaintext: &[u8]) -> KmsResult<Vec<u8>> {
		let encoded = Zeroizing::new(BASE64.encode(plaintext));
		let response = self
			.post("encrypt", &EncryptRequest {
				plaintext: encoded.as_str(),
			})
			.await?;

		let status = response.status();
		if !status.is_success() {
			return Err(KmsError::KeyUnavailable(format!(
				"transit encrypt returned {status}"
			)));
		}

		let body: EncryptResponse = response
			.json()
			.await
			.map_err(|_| KmsError::KeyUnavailable("malformed transit encrypt response".into()))?;

		BASE64
			.decode(body.ciphertext)
			.map_err(|_| KmsError::KeyUnavailable("transit ciphertext is not base64".into()))
	}

	#[instrument(skip(self, ciphertext), fields(key = %self.key_name, len = ciphertext.len()))]
	async fn decrypt(&self, ciphertext: &[u8]) -> KmsResult<Zeroizing<Vec<u8>>> {
		if ciphertext.is_empty() {
			return Err(KmsError::InvalidCiphertext("empty ciphertext".into()));
		}

		let encoded = BASE64.encode(ciphertext);
		let response = self
			.post("decrypt", &DecryptRequest {
				ciphertext: &encoded,
			})
			.await?;

		match response.status() {
			status if status.is_success() => {}
			StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
				return Err(KmsError::IntegrityError);
			}
			status => {
				return Err(KmsError::KeyUnavailable(format!(
					"transit decrypt returned {status}"
				)));
			}
		}

		let body: DecryptResponse = response
			.json()
			.await
			.map_err(|_| KmsError::KeyUnavailable("malformed transit decrypt response".into()))?;

		BASE64
			.decode(body.plaintext.expose())
			.map(Zeroizing::new)
			.map_err(|_| KmsError::KeyUnavailable("transit plaintext is not base64".into()))
	}

	async fn master_key(&self) -> KmsResult<Zeroizing<[u8; KEY_SIZE]>> {
		Err(KmsError::KeyUnavailable(
			"transit backend does not release its master key".into(),
		))
	}

	fn backend_id(&self) -> &str {
		&self.backend_id
	}
}
