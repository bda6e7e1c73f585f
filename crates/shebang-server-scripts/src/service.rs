// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Script service: scripts, versions, tags and visibility.
//!
//! # Writes
//!
//! Content is protected by [`HybridScriptEncryptor`], written to the object
//! store under `{owner}/{script}/{version_id}` (or inline below the configured
//! threshold) and then committed together with the version row, the content
//! row and the `latest` tag in one transaction. A blob whose transaction never
//! commits is removed by a drop guard, so cancelled writes leave nothing
//! discoverable.
//!
//! # Reads
//!
//! Access is evaluated from grants and share tokens loaded for the request.
//! Stored bytes are checked against the version checksum before they are
//! returned.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use shebang_scripts_core::{
	can_access, can_access_ciphertext, storage_path, validate_script_name, validate_tag_name,
	AccessFacts, AccessGrant, ContentBlob, ContentEncoding, ContentLocation, KeyPairId, Script,
	ScriptId, ScriptVersion, ShareToken, Tag, UserId, VersionId, VersionSelector, Visibility,
	LATEST_TAG,
};
use shebang_server_config::{ScriptsConfig, StorageConfig};
use shebang_server_crypto::aead::{NONCE_SIZE, TAG_SIZE};
use shebang_server_crypto::checksum::{matches_sha256, sha256_hex};
use shebang_server_crypto::keys::parse_public_key_pem;
use shebang_server_crypto::signature::verify_signature;
use shebang_server_db::{AccessStore, KeyPairStore, NewVersion, ScriptStore};
use shebang_server_storage::{read_to_vec, reader_from_bytes, ObjectStore};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{ScriptsError, ScriptsResult};
use crate::hybrid::HybridScriptEncryptor;

/// Size limits applied to writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptLimits {
	pub max_script_size: u64,
	/// Protected content at or below this size is kept in the database. Zero
	/// sends everything to the object store.
	pub inline_threshold_bytes: usize,
}

impl ScriptLimits {
	pub fn from_config(scripts: &ScriptsConfig, storage: &StorageConfig) -> Self {
		Self {
			max_script_size: scripts.max_script_size,
			inline_threshold_bytes: storage.inline_threshold_bytes,
		}
	}

	/// Largest stored object a valid version can have.
	fn max_stored_size(&self) -> u64 {
		self
			.max_script_size
			.saturating_add((NONCE_SIZE + TAG_SIZE) as u64)
	}
}

impl Default for ScriptLimits {
	fn default() -> Self {
		Self::from_config(&ScriptsConfig::default(), &StorageConfig::default())
	}
}

/// Content submitted for a new version.
#[derive(Clone, Default)]
pub struct VersionUpload {
	pub content: Vec<u8>,
	pub keypair_id: Option<KeyPairId>,
	/// RSA-PSS(SHA-256) signature made client-side. The signed message is
	/// the lowercase hex sha256 of the plaintext as ASCII (64 bytes), not the
	/// content itself, so encrypted versions can be verified.
	pub signature: Option<Vec<u8>>,
}

impl VersionUpload {
	pub fn new(content: impl Into<Vec<u8>>) -> Self {
		Self {
			content: content.into(),
			..Default::default()
		}
	}

	pub fn with_keypair(mut self, keypair_id: KeyPairId) -> Self {
		self.keypair_id = Some(keypair_id);
		self
	}

	pub fn with_signature(mut self, signature: Vec<u8>) -> Self {
		self.signature = Some(signature);
		self
	}
}

impl fmt::Debug for VersionUpload {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("VersionUpload")
			.field("content_len", &self.content.len())
			.field("keypair_id", &self.keypair_id)
			.field("signed", &self.signature.is_some())
			.finish()
	}
}

/// A version as served to a reader: plaintext, or ciphertext plus the
/// wrapped key when the content is encrypted.
#[derive(Clone)]
pub struct VersionPayload {
	pub script: Script,
	pub version: ScriptVersion,
	pub encoding: ContentEncoding,
	pub content: Vec<u8>,
}

impl fmt::Debug for VersionPayload {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("VersionPayload")
			.field("script_id", &self.script.id)
			.field("version", &self.version.version)
			.field("encoding", &self.encoding)
			.field("content_len", &self.content.len())
			.finish()
	}
}

/// Result of a signature check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureStatus {
	pub version: u32,
	pub checksum: String,
	pub signed: bool,
	/// `None` when there is nothing to verify against: no signature, plain
	/// content, or the keypair has been deleted.
	pub verified: Option<bool>,
}

pub struct ScriptService<S: ScriptStore, A: AccessStore, K: KeyPairStore> {
	pub(crate) scripts: Arc<S>,
	pub(crate) access: Arc<A>,
	keypairs: Arc<K>,
	objects: Arc<dyn ObjectStore>,
	limits: ScriptLimits,
}

impl<S: ScriptStore, A: AccessStore, K: KeyPairStore> ScriptService<S, A, K> {
	pub fn new(
		scripts: Arc<S>,
		access: Arc<A>,
		keypairs: Arc<K>,
		objects: Arc<dyn ObjectStore>,
		limits: ScriptLimits,
	) -> Self {
		Self {
			scripts,
			access,
			keypairs,
			objects,
			limits,
		}
	}

	#[instrument(skip(self, description), fields(owner = %owner))]
	pub async fn create_script(
		&self,
		owner: UserId,
		name: &str,
		description: Option<String>,
		visibility: Visibility,
	) -> ScriptsResult<Script> {
		validate_script_name(name)?;

		let now = Utc::now();
		let script = Script {
			id: ScriptId::generate(),
			owner_id: owner,
			name: name.to_string(),
			description,
			visibility,
			created_at: now,
			updated_at: now,
		};
		self.scripts.create_script(&script).await?;

		info!(script_id = %script.id, name = %script.name, "Created script");
		Ok(script)
	}

	/// Script metadata, if the requester may read the script.
	pub async fn get_script(
		&self,
		requester: Option<UserId>,
		script_id: &ScriptId,
		share_token: Option<&str>,
	) -> ScriptsResult<Script> {
		let script = self.load_script(script_id).await?;
		self.ensure_readable(&script, requester, share_token).await?;
		Ok(script)
	}

	pub async fn get_script_by_name(
		&self,
		requester: Option<UserId>,
		owner: UserId,
		name: &str,
		share_token: Option<&str>,
	) -> ScriptsResult<Script> {
		let script = self
			.scripts
			.get_script_by_name(owner, name)
			.await?
			.ok_or_else(|| ScriptsError::NotFound(format!("script {owner}/{name}")))?;
		self.ensure_readable(&script, requester, share_token).await?;
		Ok(script)
	}

	pub async fn list_scripts(&self, owner: UserId) -> ScriptsResult<Vec<Script>> {
		Ok(self.scripts.list_scripts(owner).await?)
	}

	/// Store a new version. Only the owner may write.
	///
	/// # Errors
	/// - [`ScriptsError::Unauthorized`] if `owner` does not own the script
	/// - [`ScriptsError::ContentTooLarge`] above the configured limit
	/// - [`ScriptsError::KeyOwnershipMismatch`] / [`ScriptsError::InvalidPublicKey`]
	///   from the encryptor
	#[instrument(skip(self, upload), fields(owner = %owner, script_id = %script_id, size = upload.content.len()))]
	pub async fn write_version(
		&self,
		owner: UserId,
		script_id: &ScriptId,
		upload: VersionUpload,
	) -> ScriptsResult<ScriptVersion> {
		let script = self.owned_script(owner, script_id).await?;

		let size = upload.content.len() as u64;
		if size == 0 {
			return Err(ScriptsError::InvalidInput("script content is empty".to_string()));
		}
		if size > self.limits.max_script_size {
			return Err(ScriptsError::ContentTooLarge {
				size,
				max: self.limits.max_script_size,
			});
		}

		let keypair = match upload.keypair_id {
			Some(id) => Some(
				self
					.keypairs
					.get_keypair(&id)
					.await?
					.ok_or_else(|| ScriptsError::NotFound(format!("keypair {id}")))?,
			),
			None => None,
		};

		let content_hash = sha256_hex(&upload.content);
		let protected = HybridScriptEncryptor::protect(&script, upload.content, keypair.as_ref())?;
		let checksum = sha256_hex(&protected.bytes);
		let encrypted = protected.encoding.is_encrypted();
		let version_id = VersionId::generate();

		let threshold = self.limits.inline_threshold_bytes;
		let (location, pending) = if threshold > 0 && protected.bytes.len() <= threshold {
			(ContentLocation::Inline(protected.bytes), None)
		} else {
			let path = storage_path(owner, script.id, version_id);
			let len = protected.bytes.len() as u64;
			self
				.objects
				.put(&path, reader_from_bytes(protected.bytes), len)
				.await?;
			let guard = PendingBlob::new(Arc::clone(&self.objects), path.clone());
			(ContentLocation::Stored(path), Some(guard))
		};

		let version = self
			.scripts
			.create_version(&NewVersion {
				id: version_id,
				script_id: script.id,
				content_hash,
				checksum,
				size_bytes: size,
				signature: upload.signature,
				location,
				encoding: protected.encoding,
			})
			.await?;

		if let Some(guard) = pending {
			guard.commit();
		}

		info!(
			script_id = %script.id,
			version = version.version,
			encrypted,
			"Wrote script version"
		);
		Ok(version)
	}

	/// Fetch a version for `requester`.
	///
	/// Private scripts with encrypted content serve ciphertext to anyone; the
	/// wrapped key is only useful to the keypair holder.
	#[instrument(skip(self, share_token), fields(script_id = %script_id, selector = %selector))]
	pub async fn read_version(
		&self,
		requester: Option<UserId>,
		script_id: &ScriptId,
		selector: &VersionSelector,
		share_token: Option<&str>,
	) -> ScriptsResult<VersionPayload> {
		let (script, version, blob) = self
			.resolve_readable(requester, script_id, selector, share_token)
			.await?;
		let content = self.fetch_verified(&version, blob.location).await?;

		Ok(VersionPayload {
			script,
			version,
			encoding: blob.encoding,
			content,
		})
	}

	/// Versions of a script, newest first.
	pub async fn list_versions(
		&self,
		requester: Option<UserId>,
		script_id: &ScriptId,
		share_token: Option<&str>,
	) -> ScriptsResult<Vec<ScriptVersion>> {
		let script = self.load_script(script_id).await?;
		self.ensure_readable(&script, requester, share_token).await?;
		Ok(self.scripts.list_versions(&script.id).await?)
	}

	pub async fn list_tags(
		&self,
		requester: Option<UserId>,
		script_id: &ScriptId,
		share_token: Option<&str>,
	) -> ScriptsResult<Vec<Tag>> {
		let script = self.load_script(script_id).await?;
		self.ensure_readable(&script, requester, share_token).await?;
		Ok(self.scripts.list_tags(&script.id).await?)
	}

	/// Point `name` at version number `version`. `latest` is managed by
	/// writes and cannot be set by hand.
	#[instrument(skip(self), fields(owner = %owner, script_id = %script_id))]
	pub async fn set_tag(
		&self,
		owner: UserId,
		script_id: &ScriptId,
		name: &str,
		version: u32,
	) -> ScriptsResult<Tag> {
		let script = self.owned_script(owner, script_id).await?;
		validate_tag_name(name)?;

		let target = self
			.scripts
			.get_version_by_number(&script.id, version)
			.await?
			.ok_or_else(|| ScriptsError::NotFound(format!("version v{version} of script {script_id}")))?;

		let tag = self.scripts.set_tag(&script.id, name, &target.id).await?;
		info!(script_id = %script.id, tag = %name, version, "Set tag");
		Ok(tag)
	}

	/// Change visibility. Existing versions keep their encoding.
	#[instrument(skip(self), fields(owner = %owner, script_id = %script_id))]
	pub async fn set_visibility(
		&self,
		owner: UserId,
		script_id: &ScriptId,
		visibility: Visibility,
	) -> ScriptsResult<Script> {
		let script = self.owned_script(owner, script_id).await?;
		if script.visibility == visibility {
			return Ok(script);
		}

		if !self.scripts.update_visibility(&script.id, visibility).await? {
			return Err(ScriptsError::NotFound(format!("script {script_id}")));
		}
		info!(
			script_id = %script.id,
			from = script.visibility.as_str(),
			to = visibility.as_str(),
			"Changed script visibility"
		);
		self.load_script(&script.id).await
	}

	/// Delete the script, its versions, tags and grants, then its blobs.
	#[instrument(skip(self), fields(owner = %owner, script_id = %script_id))]
	pub async fn delete_script(&self, owner: UserId, script_id: &ScriptId) -> ScriptsResult<()> {
		let script = self.owned_script(owner, script_id).await?;
		let paths = self.scripts.delete_script(&script.id).await?;

		for path in &paths {
			if let Err(e) = self.objects.delete(path).await {
				warn!(error = %e, path = %path, "Failed to remove script blob");
			}
		}

		info!(script_id = %script.id, blobs = paths.len(), "Deleted script");
		Ok(())
	}

	/// Check a client-supplied signature against the content hash.
	#[instrument(skip(self, share_token), fields(script_id = %script_id, selector = %selector))]
	pub async fn verify_signature(
		&self,
		requester: Option<UserId>,
		script_id: &ScriptId,
		selector: &VersionSelector,
		share_token: Option<&str>,
	) -> ScriptsResult<SignatureStatus> {
		let (_, version, blob) = self
			.resolve_readable(requester, script_id, selector, share_token)
			.await?;
		self.fetch_verified(&version, blob.location).await?;

		let mut status = SignatureStatus {
			version: version.version,
			checksum: version.checksum.clone(),
			signed: version.signature.is_some(),
			verified: None,
		};

		let (Some(signature), Some(keypair_id)) =
			(version.signature.as_deref(), blob.encoding.keypair_id())
		else {
			return Ok(status);
		};
		let Some(keypair) = self.keypairs.get_keypair(&keypair_id).await? else {
			debug!(keypair_id = %keypair_id, "Signing keypair no longer exists");
			return Ok(status);
		};

		let public = parse_public_key_pem(&keypair.public_key_pem)?;
		let verified = verify_signature(&public, version.content_hash.as_bytes(), signature).is_ok();
		status.verified = Some(verified);
		Ok(status)
	}

	pub(crate) async fn load_script(&self, script_id: &ScriptId) -> ScriptsResult<Script> {
		self
			.scripts
			.get_script(script_id)
			.await?
			.ok_or_else(|| ScriptsError::NotFound(format!("script {script_id}")))
	}

	pub(crate) async fn owned_script(&self, owner: UserId, script_id: &ScriptId) -> ScriptsResult<Script> {
		let script = self.load_script(script_id).await?;
		if !script.is_owned_by(owner) {
			warn!(script_id = %script_id, user_id = %owner, "Denied owner-only script operation");
			return Err(ScriptsError::Unauthorized(format!(
				"user {owner} does not own script {script_id}"
			)));
		}
		Ok(script)
	}

	/// Grants and the presented share token, loaded fresh for each request.
	async fn load_facts(
		&self,
		script: &Script,
		share_token: Option<&str>,
	) -> ScriptsResult<(Vec<AccessGrant>, Option<ShareToken>)> {
		let grants = self.access.list_grants(&script.id).await?;
		let token = match share_token {
			Some(value) => self.access.get_share_token_by_value(value).await?,
			None => None,
		};
		Ok((grants, token))
	}

	async fn ensure_readable(
		&self,
		script: &Script,
		requester: Option<UserId>,
		share_token: Option<&str>,
	) -> ScriptsResult<()> {
		let (grants, token) = self.load_facts(script, share_token).await?;
		let facts = AccessFacts {
			grants: &grants,
			share_token: token.as_ref(),
		};
		if can_access(script, requester, facts, Utc::now()) {
			Ok(())
		} else {
			Err(denied(script, requester))
		}
	}

	async fn resolve_readable(
		&self,
		requester: Option<UserId>,
		script_id: &ScriptId,
		selector: &VersionSelector,
		share_token: Option<&str>,
	) -> ScriptsResult<(Script, ScriptVersion, ContentBlob)> {
		let script = self.load_script(script_id).await?;
		let (grants, token) = self.load_facts(&script, share_token).await?;
		let facts = AccessFacts {
			grants: &grants,
			share_token: token.as_ref(),
		};
		let now = Utc::now();

		let readable = can_access(&script, requester, facts, now);
		if !readable && !script.visibility.requires_confidentiality() {
			return Err(denied(&script, requester));
		}

		let version = match self.find_version(&script.id, selector).await {
			Err(ScriptsError::NotFound(_)) if !readable => return Err(denied(&script, requester)),
			found => found?,
		};
		let blob = self.scripts.get_content(&version.id).await?.ok_or_else(|| {
			ScriptsError::Internal(format!("version {} has no content row", version.id))
		})?;

		if !readable && !can_access_ciphertext(&script, &blob.encoding, requester, facts, now) {
			return Err(denied(&script, requester));
		}
		Ok((script, version, blob))
	}

	async fn find_version(
		&self,
		script_id: &ScriptId,
		selector: &VersionSelector,
	) -> ScriptsResult<ScriptVersion> {
		let found = match selector {
			VersionSelector::Latest => self.scripts.get_version_by_tag(script_id, LATEST_TAG).await?,
			VersionSelector::Number(n) => self.scripts.get_version_by_number(script_id, *n).await?,
			VersionSelector::Tag(name) => self.scripts.get_version_by_tag(script_id, name).await?,
		};
		found.ok_or_else(|| ScriptsError::NotFound(format!("version {selector} of script {script_id}")))
	}

	async fn fetch_verified(&self, version: &ScriptVersion, location: ContentLocation) -> ScriptsResult<Vec<u8>> {
		let bytes = match location {
			ContentLocation::Inline(bytes) => bytes,
			ContentLocation::Stored(path) => {
				let reader = self.objects.get(&path).await?;
				read_to_vec(reader, self.limits.max_stored_size()).await?
			}
		};

		if !matches_sha256(&version.checksum, &bytes) {
			error!(
				script_id = %version.script_id,
				version = version.version,
				"Stored script content does not match its checksum"
			);
			return Err(ScriptsError::ChecksumMismatch {
				version: version.version,
			});
		}
		Ok(bytes)
	}
}

fn denied(script: &Script, requester: Option<UserId>) -> ScriptsError {
	warn!(script_id = %script.id, requester = ?requester, "Denied script access");
	ScriptsError::Unauthorized(format!("access to script {} denied", script.id))
}

/// Removes a written blob unless the version that references it commits.
struct PendingBlob {
	objects: Arc<dyn ObjectStore>,
	path: Option<String>,
}

impl PendingBlob {
	fn new(objects: Arc<dyn ObjectStore>, path: String) -> Self {
		Self {
			objects,
			path: Some(path),
		}
	}

	fn commit(mut self) {
		self.path = None;
	}
}

impl Drop for PendingBlob {
	fn drop(&mut self) {
		let Some(path) = self.path.take() else {
			return;
		};
		let objects = Arc::clone(&self.objects);
		match tokio::runtime::Handle::try_current() {
			Ok(handle) => {
				handle.spawn(async move {
					match objects.delete(&path).await {
						Ok(()) => debug!(path = %path, "Removed uncommitted script blob"),
						Err(e) => warn!(error = %e, path = %path, "Failed to remove uncommitted script blob"),
					}
				});
			}
			Err(_) => warn!(path = %path, "No runtime to remove uncommitted script blob"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{harness, test_key, test_keypair, Harness};
	use chrono::Duration;
	use shebang_scripts_core::KeyPair;
	use shebang_server_crypto::signature::sign;
	use shebang_server_db::KeyPairRepository;
	use shebang_server_storage::MemoryObjectStore;

	const OWNER: UserId = UserId::new(1);
	const OTHER: UserId = UserId::new(2);

	async fn store_keypair(keypairs: &KeyPairRepository, owner: UserId) -> KeyPair {
		let keypair = test_keypair(owner, test_key());
		keypairs.create_keypair(&keypair).await.unwrap();
		keypair
	}

	async fn plain_script(h: &Harness, visibility: Visibility) -> Script {
		h.service
			.create_script(OWNER, "deploy.sh", Some("deploys".into()), visibility)
			.await
			.unwrap()
	}

	#[tokio::test]
	async fn duplicate_names_conflict() {
		let h = harness(ScriptLimits::default()).await;
		plain_script(&h, Visibility::Public).await;
		let err = h
			.service
			.create_script(OWNER, "deploy.sh", None, Visibility::Public)
			.await
			.unwrap_err();
		assert!(matches!(err, ScriptsError::Conflict(_)));

		h.service
			.create_script(OTHER, "deploy.sh", None, Visibility::Public)
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn invalid_names_are_rejected() {
		let h = harness(ScriptLimits::default()).await;
		let err = h
			.service
			.create_script(OWNER, "../etc", None, Visibility::Public)
			.await
			.unwrap_err();
		assert!(matches!(err, ScriptsError::InvalidInput(_)));
	}

	#[tokio::test]
	async fn write_then_read_by_every_selector() {
		let h = harness(ScriptLimits::default()).await;
		let script = plain_script(&h, Visibility::Public).await;

		let v1 = h
			.service
			.write_version(OWNER, &script.id, VersionUpload::new("echo one"))
			.await
			.unwrap();
		let v2 = h
			.service
			.write_version(OWNER, &script.id, VersionUpload::new("echo two"))
			.await
			.unwrap();
		assert_eq!((v1.version, v2.version), (1, 2));
		assert_eq!(v2.content_hash, sha256_hex(b"echo two"));

		let latest = h
			.service
			.read_version(None, &script.id, &VersionSelector::Latest, None)
			.await
			.unwrap();
		assert_eq!(latest.content, b"echo two");
		assert_eq!(latest.encoding, ContentEncoding::Plain);

		let first = h
			.service
			.read_version(None, &script.id, &"v1".parse().unwrap(), None)
			.await
			.unwrap();
		assert_eq!(first.content, b"echo one");

		h.service.set_tag(OWNER, &script.id, "stable", 1).await.unwrap();
		let stable = h
			.service
			.read_version(None, &script.id, &"stable".parse().unwrap(), None)
			.await
			.unwrap();
		assert_eq!(stable.version.version, 1);

		let missing = h
			.service
			.read_version(None, &script.id, &"v9".parse().unwrap(), None)
			.await
			.unwrap_err();
		assert!(matches!(missing, ScriptsError::NotFound(_)));
	}

	#[tokio::test]
	async fn blobs_are_keyed_by_owner_script_and_version() {
		let h = harness(ScriptLimits::default()).await;
		let script = plain_script(&h, Visibility::Public).await;
		let version = h
			.service
			.write_version(OWNER, &script.id, VersionUpload::new("echo hi"))
			.await
			.unwrap();

		let path = format!("{OWNER}/{}/{}", script.id, version.id);
		assert!(h.objects.exists(&path).await.unwrap());
	}

	#[tokio::test]
	async fn small_content_is_inlined_below_threshold() {
		let h = harness(ScriptLimits {
			max_script_size: 1024,
			inline_threshold_bytes: 64,
		})
		.await;
		let script = plain_script(&h, Visibility::Public).await;
		h.service
			.write_version(OWNER, &script.id, VersionUpload::new("echo tiny"))
			.await
			.unwrap();
		assert!(h.objects.is_empty().await);

		h.service
			.write_version(OWNER, &script.id, VersionUpload::new(vec![b'#'; 100]))
			.await
			.unwrap();
		assert_eq!(h.objects.len().await, 1);

		let payload = h
			.service
			.read_version(None, &script.id, &"v1".parse().unwrap(), None)
			.await
			.unwrap();
		assert_eq!(payload.content, b"echo tiny");
	}

	#[tokio::test]
	async fn size_limits_are_enforced() {
		let h = harness(ScriptLimits {
			max_script_size: 8,
			inline_threshold_bytes: 0,
		})
		.await;
		let script = plain_script(&h, Visibility::Public).await;

		let err = h
			.service
			.write_version(OWNER, &script.id, VersionUpload::new("echo too long"))
			.await
			.unwrap_err();
		assert!(matches!(err, ScriptsError::ContentTooLarge { size: 13, max: 8 }));

		let err = h
			.service
			.write_version(OWNER, &script.id, VersionUpload::new(Vec::new()))
			.await
			.unwrap_err();
		assert!(matches!(err, ScriptsError::InvalidInput(_)));
	}

	#[tokio::test]
	async fn only_owner_writes() {
		let h = harness(ScriptLimits::default()).await;
		let script = plain_script(&h, Visibility::Public).await;
		let err = h
			.service
			.write_version(OTHER, &script.id, VersionUpload::new("echo pwned"))
			.await
			.unwrap_err();
		assert!(matches!(err, ScriptsError::Unauthorized(_)));
		assert!(h.objects.is_empty().await);
	}

	#[tokio::test]
	async fn private_encrypted_content_serves_ciphertext_only() {
		let h = harness(ScriptLimits::default()).await;
		let script = plain_script(&h, Visibility::Private).await;
		let keypair = store_keypair(&h.keypairs, OWNER).await;

		h.service
			.write_version(
				OWNER,
				&script.id,
				VersionUpload::new("echo classified").with_keypair(keypair.id),
			)
			.await
			.unwrap();

		let payload = h
			.service
			.read_version(None, &script.id, &VersionSelector::Latest, None)
			.await
			.unwrap();
		assert_ne!(payload.content, b"echo classified");
		let ContentEncoding::Encrypted {
			keypair_id,
			wrapped_key,
		} = &payload.encoding
		else {
			panic!("expected encrypted content");
		};
		assert_eq!(*keypair_id, keypair.id);

		let opened =
			HybridScriptEncryptor::open(&test_key().private, &payload.content, wrapped_key).unwrap();
		assert_eq!(opened.as_slice(), b"echo classified");
		assert_eq!(payload.version.content_hash, sha256_hex(b"echo classified"));
		assert_eq!(payload.version.checksum, sha256_hex(&payload.content));
	}

	#[tokio::test]
	async fn private_plain_content_is_owner_only() {
		let h = harness(ScriptLimits::default()).await;
		let script = plain_script(&h, Visibility::Private).await;
		h.service
			.write_version(OWNER, &script.id, VersionUpload::new("echo mine"))
			.await
			.unwrap();

		let err = h
			.service
			.read_version(Some(OTHER), &script.id, &VersionSelector::Latest, None)
			.await
			.unwrap_err();
		assert!(matches!(err, ScriptsError::Unauthorized(_)));

		let own = h
			.service
			.read_version(Some(OWNER), &script.id, &VersionSelector::Latest, None)
			.await
			.unwrap();
		assert_eq!(own.content, b"echo mine");
	}

	#[tokio::test]
	async fn missing_versions_of_private_scripts_look_denied_to_strangers() {
		let h = harness(ScriptLimits::default()).await;
		let script = plain_script(&h, Visibility::Private).await;
		let keypair = store_keypair(&h.keypairs, OWNER).await;
		h.service
			.write_version(
				OWNER,
				&script.id,
				VersionUpload::new("echo sealed").with_keypair(keypair.id),
			)
			.await
			.unwrap();

		h.service
			.read_version(Some(OTHER), &script.id, &VersionSelector::Number(1), None)
			.await
			.unwrap();
		for selector in [VersionSelector::Number(9), VersionSelector::Tag("beta".to_string())] {
			let err = h
				.service
				.read_version(Some(OTHER), &script.id, &selector, None)
				.await
				.unwrap_err();
			assert!(matches!(err, ScriptsError::Unauthorized(_)), "{selector}");

			let err = h
				.service
				.read_version(Some(OWNER), &script.id, &selector, None)
				.await
				.unwrap_err();
			assert!(matches!(err, ScriptsError::NotFound(_)), "{selector}");
		}
	}

	#[tokio::test]
	async fn created_script_equals_stored_script() {
		let h = harness(ScriptLimits::default()).await;
		let created = plain_script(&h, Visibility::Public).await;
		let fetched = h.service.get_script(Some(OWNER), &created.id, None).await.unwrap();
		assert_eq!(fetched, created);
	}

	#[tokio::test]
	async fn foreign_keypair_is_refused_and_nothing_is_stored() {
		let h = harness(ScriptLimits::default()).await;
		let script = plain_script(&h, Visibility::Private).await;
		let foreign = store_keypair(&h.keypairs, OTHER).await;

		let err = h
			.service
			.write_version(
				OWNER,
				&script.id,
				VersionUpload::new("echo x").with_keypair(foreign.id),
			)
			.await
			.unwrap_err();
		assert!(matches!(err, ScriptsError::KeyOwnershipMismatch));
		assert!(h.objects.is_empty().await);
	}

	#[tokio::test]
	async fn tampered_blob_fails_checksum() {
		let h = harness(ScriptLimits::default()).await;
		let script = plain_script(&h, Visibility::Public).await;
		let version = h
			.service
			.write_version(OWNER, &script.id, VersionUpload::new("echo safe"))
			.await
			.unwrap();

		let path = storage_path(OWNER, script.id, version.id);
		h.objects.replace_raw(&path, &b"rm -rf /"[..]).await;

		let err = h
			.service
			.read_version(None, &script.id, &VersionSelector::Latest, None)
			.await
			.unwrap_err();
		assert!(matches!(err, ScriptsError::ChecksumMismatch { version: 1 }));
	}

	#[tokio::test]
	async fn latest_cannot_be_set_by_hand() {
		let h = harness(ScriptLimits::default()).await;
		let script = plain_script(&h, Visibility::Public).await;
		h.service
			.write_version(OWNER, &script.id, VersionUpload::new("echo"))
			.await
			.unwrap();

		let err = h
			.service
			.set_tag(OWNER, &script.id, LATEST_TAG, 1)
			.await
			.unwrap_err();
		assert!(matches!(err, ScriptsError::InvalidInput(_)));

		let err = h.service.set_tag(OWNER, &script.id, "beta", 5).await.unwrap_err();
		assert!(matches!(err, ScriptsError::NotFound(_)));
	}

	#[tokio::test]
	async fn visibility_change_gates_readers() {
		let h = harness(ScriptLimits::default()).await;
		let script = plain_script(&h, Visibility::Public).await;
		h.service
			.write_version(OWNER, &script.id, VersionUpload::new("echo"))
			.await
			.unwrap();

		let updated = h
			.service
			.set_visibility(OWNER, &script.id, Visibility::Unlisted)
			.await
			.unwrap();
		assert_eq!(updated.visibility, Visibility::Unlisted);

		let err = h
			.service
			.list_versions(Some(OTHER), &script.id, None)
			.await
			.unwrap_err();
		assert!(matches!(err, ScriptsError::Unauthorized(_)));

		let err = h
			.service
			.set_visibility(OTHER, &script.id, Visibility::Public)
			.await
			.unwrap_err();
		assert!(matches!(err, ScriptsError::Unauthorized(_)));
	}

	#[tokio::test]
	async fn delete_removes_rows_and_blobs() {
		let h = harness(ScriptLimits::default()).await;
		let script = plain_script(&h, Visibility::Public).await;
		for body in ["echo 1", "echo 2"] {
			h.service
				.write_version(OWNER, &script.id, VersionUpload::new(body))
				.await
				.unwrap();
		}
		assert_eq!(h.objects.len().await, 2);

		h.service.delete_script(OWNER, &script.id).await.unwrap();
		assert!(h.objects.is_empty().await);
		let err = h
			.service
			.get_script(Some(OWNER), &script.id, None)
			.await
			.unwrap_err();
		assert!(matches!(err, ScriptsError::NotFound(_)));
	}

	#[tokio::test]
	async fn signatures_verify_against_content_hash() {
		let h = harness(ScriptLimits::default()).await;
		let script = plain_script(&h, Visibility::Private).await;
		let keypair = store_keypair(&h.keypairs, OWNER).await;
		let body = b"echo signed";

		let signature = sign(&test_key().private, sha256_hex(body).as_bytes());
		h.service
			.write_version(
				OWNER,
				&script.id,
				VersionUpload::new(&body[..])
					.with_keypair(keypair.id)
					.with_signature(signature),
			)
			.await
			.unwrap();
		h.service
			.write_version(
				OWNER,
				&script.id,
				VersionUpload::new("echo forged")
					.with_keypair(keypair.id)
					.with_signature(sign(&test_key().private, b"something else")),
			)
			.await
			.unwrap();

		let good = h
			.service
			.verify_signature(None, &script.id, &"v1".parse().unwrap(), None)
			.await
			.unwrap();
		assert!(good.signed);
		assert_eq!(good.verified, Some(true));

		let bad = h
			.service
			.verify_signature(None, &script.id, &"v2".parse().unwrap(), None)
			.await
			.unwrap();
		assert_eq!(bad.verified, Some(false));
	}

	#[tokio::test]
	async fn unsigned_version_reports_nothing_to_verify() {
		let h = harness(ScriptLimits::default()).await;
		let script = plain_script(&h, Visibility::Public).await;
		h.service
			.write_version(OWNER, &script.id, VersionUpload::new("echo"))
			.await
			.unwrap();
		let status = h
			.service
			.verify_signature(None, &script.id, &VersionSelector::Latest, None)
			.await
			.unwrap();
		assert!(!status.signed);
		assert_eq!(status.verified, None);
	}

	#[tokio::test]
	async fn uncommitted_blob_is_removed_on_drop() {
		let objects = Arc::new(MemoryObjectStore::new());
		objects
			.put("1/s/v", reader_from_bytes(b"orphan".to_vec()), 6)
			.await
			.unwrap();

		drop(PendingBlob::new(objects.clone(), "1/s/v".to_string()));
		for _ in 0..50 {
			if objects.is_empty().await {
				break;
			}
			tokio::time::sleep(std::time::Duration::from_millis(10)).await;
		}
		assert!(objects.is_empty().await);

		objects
			.put("1/s/w", reader_from_bytes(b"kept".to_vec()), 4)
			.await
			.unwrap();
		PendingBlob::new(objects.clone(), "1/s/w".to_string()).commit();
		tokio::task::yield_now().await;
		assert!(objects.exists("1/s/w").await.unwrap());
	}

	#[tokio::test]
	async fn expired_grant_stops_unlisted_reads() {
		let h = harness(ScriptLimits::default()).await;
		let script = plain_script(&h, Visibility::Unlisted).await;
		h.service
			.write_version(OWNER, &script.id, VersionUpload::new("echo shared"))
			.await
			.unwrap();
		h.service
			.grant_user(OWNER, &script.id, OTHER, Some(Utc::now() + Duration::milliseconds(50)))
			.await
			.unwrap();

		h.service
			.read_version(Some(OTHER), &script.id, &VersionSelector::Latest, None)
			.await
			.unwrap();

		tokio::time::sleep(std::time::Duration::from_millis(100)).await;
		let err = h
			.service
			.read_version(Some(OTHER), &script.id, &VersionSelector::Latest, None)
			.await
			.unwrap_err();
		assert!(matches!(err, ScriptsError::Unauthorized(_)));
	}
}
