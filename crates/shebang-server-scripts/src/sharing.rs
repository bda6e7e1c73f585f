// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Grants and share tokens. Every operation here is owner-only.

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use shebang_scripts_core::{
	AccessGrant, GrantId, GrantSubject, ScriptId, ShareToken, ShareTokenId, UserId,
};
use shebang_server_db::{AccessStore, KeyPairStore, ScriptStore};
use tracing::{info, instrument};

use crate::error::{ScriptsError, ScriptsResult};
use crate::service::ScriptService;

/// Random bytes behind each share token; rendered as lowercase hex.
pub const SHARE_TOKEN_BYTES: usize = 32;

fn generate_share_token() -> String {
	let mut bytes = [0u8; SHARE_TOKEN_BYTES];
	OsRng.fill_bytes(&mut bytes);
	hex::encode(bytes)
}

fn reject_past_expiry(expires_at: Option<DateTime<Utc>>) -> ScriptsResult<()> {
	match expires_at {
		Some(at) if at <= Utc::now() => Err(ScriptsError::InvalidInput(
			"grant expiry must be in the future".to_string(),
		)),
		_ => Ok(()),
	}
}

impl<S: ScriptStore, A: AccessStore, K: KeyPairStore> ScriptService<S, A, K> {
	/// Let anyone holding the link read an unlisted script. Re-granting
	/// replaces the expiry.
	#[instrument(skip(self), fields(owner = %owner, script_id = %script_id))]
	pub async fn grant_link(
		&self,
		owner: UserId,
		script_id: &ScriptId,
		expires_at: Option<DateTime<Utc>>,
	) -> ScriptsResult<AccessGrant> {
		let script = self.owned_script(owner, script_id).await?;
		reject_past_expiry(expires_at)?;

		let grant = self
			.access
			.upsert_grant(&script.id, GrantSubject::Link, owner, expires_at)
			.await?;
		info!(grant_id = %grant.id, expires_at = ?expires_at, "Granted link access");
		Ok(grant)
	}

	#[instrument(skip(self), fields(owner = %owner, script_id = %script_id, grantee = %grantee))]
	pub async fn grant_user(
		&self,
		owner: UserId,
		script_id: &ScriptId,
		grantee: UserId,
		expires_at: Option<DateTime<Utc>>,
	) -> ScriptsResult<AccessGrant> {
		let script = self.owned_script(owner, script_id).await?;
		if grantee == owner {
			return Err(ScriptsError::InvalidInput(
				"owners already have access to their scripts".to_string(),
			));
		}
		reject_past_expiry(expires_at)?;

		let grant = self
			.access
			.upsert_grant(&script.id, GrantSubject::User(grantee), owner, expires_at)
			.await?;
		info!(grant_id = %grant.id, expires_at = ?expires_at, "Granted user access");
		Ok(grant)
	}

	#[instrument(skip(self), fields(owner = %owner, script_id = %script_id, grant_id = %grant_id))]
	pub async fn revoke_grant(
		&self,
		owner: UserId,
		script_id: &ScriptId,
		grant_id: &GrantId,
	) -> ScriptsResult<()> {
		let script = self.owned_script(owner, script_id).await?;
		if !self.access.delete_grant(&script.id, grant_id).await? {
			return Err(ScriptsError::NotFound(format!("grant {grant_id}")));
		}
		info!("Revoked grant");
		Ok(())
	}

	pub async fn list_grants(&self, owner: UserId, script_id: &ScriptId) -> ScriptsResult<Vec<AccessGrant>> {
		let script = self.owned_script(owner, script_id).await?;
		Ok(self.access.list_grants(&script.id).await?)
	}

	/// Mint a share token. The token is returned once in the result; callers
	/// must not log it.
	#[instrument(skip(self), fields(owner = %owner, script_id = %script_id))]
	pub async fn create_share_token(&self, owner: UserId, script_id: &ScriptId) -> ScriptsResult<ShareToken> {
		let script = self.owned_script(owner, script_id).await?;

		let token = ShareToken {
			id: ShareTokenId::generate(),
			script_id: script.id,
			token: generate_share_token(),
			revoked: false,
			created_at: Utc::now(),
		};
		self.access.create_share_token(&token).await?;

		info!(token_id = %token.id, "Created share token");
		Ok(token)
	}

	#[instrument(skip(self), fields(owner = %owner, script_id = %script_id, token_id = %token_id))]
	pub async fn revoke_share_token(
		&self,
		owner: UserId,
		script_id: &ScriptId,
		token_id: &ShareTokenId,
	) -> ScriptsResult<()> {
		let script = self.owned_script(owner, script_id).await?;
		if !self.access.revoke_share_token(&script.id, token_id).await? {
			return Err(ScriptsError::NotFound(format!("share token {token_id}")));
		}
		info!("Revoked share token");
		Ok(())
	}

	pub async fn list_share_tokens(&self, owner: UserId, script_id: &ScriptId) -> ScriptsResult<Vec<ShareToken>> {
		let script = self.owned_script(owner, script_id).await?;
		Ok(self.access.list_share_tokens(&script.id).await?)
	}
}
