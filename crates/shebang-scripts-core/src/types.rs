// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Domain records shared by the repositories and services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::ids::{
	GrantId, KeyPairId, ScriptId, SecretId, ShareTokenId, UdekId, UserId, VersionId,
};
use crate::validate::is_version_selector;

/// Tag repointed at every new version.
pub const LATEST_TAG: &str = "latest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
	/// Anyone may read.
	Public,
	/// Readable through an active link grant or a user grant.
	Unlisted,
	/// Owner only, unless a share token is presented.
	Private,
}

impl Visibility {
	pub fn as_str(&self) -> &'static str {
		match self {
			Visibility::Public => "public",
			Visibility::Unlisted => "unlisted",
			Visibility::Private => "private",
		}
	}

	/// Whether content written under this visibility is encrypted when a
	/// keypair is supplied.
	pub fn requires_confidentiality(&self) -> bool {
		matches!(self, Visibility::Private)
	}
}

impl fmt::Display for Visibility {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Visibility {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"public" => Ok(Visibility::Public),
			"unlisted" => Ok(Visibility::Unlisted),
			"private" => Ok(Visibility::Private),
			other => Err(CoreError::UnknownVisibility(other.to_string())),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
	pub id: ScriptId,
	pub owner_id: UserId,
	pub name: String,
	pub description: Option<String>,
	pub visibility: Visibility,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Script {
	pub fn is_owned_by(&self, user: UserId) -> bool {
		self.owner_id == user
	}
}

/// One immutable version of a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptVersion {
	pub id: VersionId,
	pub script_id: ScriptId,
	pub version: u32,
	/// sha256 of the plaintext, hex.
	pub content_hash: String,
	/// sha256 of the bytes as stored (ciphertext for encrypted content), hex.
	pub checksum: String,
	pub size_bytes: u64,
	/// Client-supplied RSA-PSS signature over the stored bytes.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub signature: Option<Vec<u8>>,
	pub created_at: DateTime<Utc>,
}

/// RSA-OAEP(SHA-256) wrapped content key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WrappedKey(Vec<u8>);

impl WrappedKey {
	pub fn new(bytes: Vec<u8>) -> Self {
		Self(bytes)
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	pub fn into_bytes(self) -> Vec<u8> {
		self.0
	}
}

impl fmt::Debug for WrappedKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "WrappedKey({} bytes)", self.0.len())
	}
}

/// How a content blob is protected. A wrapped key exists exactly when the
/// content is encrypted, and always names the keypair it was wrapped for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentEncoding {
	Plain,
	Encrypted {
		keypair_id: KeyPairId,
		wrapped_key: WrappedKey,
	},
}

impl ContentEncoding {
	pub fn is_encrypted(&self) -> bool {
		matches!(self, ContentEncoding::Encrypted { .. })
	}

	pub fn keypair_id(&self) -> Option<KeyPairId> {
		match self {
			ContentEncoding::Plain => None,
			ContentEncoding::Encrypted { keypair_id, .. } => Some(*keypair_id),
		}
	}

	/// Rebuild from the paired nullable columns used for persistence.
	pub fn from_columns(
		keypair_id: Option<KeyPairId>,
		wrapped_key: Option<Vec<u8>>,
	) -> Result<Self, CoreError> {
		match (keypair_id, wrapped_key) {
			(None, None) => Ok(ContentEncoding::Plain),
			(Some(keypair_id), Some(wrapped)) => Ok(ContentEncoding::Encrypted {
				keypair_id,
				wrapped_key: WrappedKey::new(wrapped),
			}),
			(Some(_), None) => Err(CoreError::InconsistentEncoding(
				"keypair set without wrapped key",
			)),
			(None, Some(_)) => Err(CoreError::InconsistentEncoding(
				"wrapped key set without keypair",
			)),
		}
	}

	pub fn to_columns(&self) -> (Option<KeyPairId>, Option<&[u8]>) {
		match self {
			ContentEncoding::Plain => (None, None),
			ContentEncoding::Encrypted {
				keypair_id,
				wrapped_key,
			} => (Some(*keypair_id), Some(wrapped_key.as_bytes())),
		}
	}
}

/// Where a version's bytes live.
#[derive(Clone, PartialEq, Eq)]
pub enum ContentLocation {
	Inline(Vec<u8>),
	Stored(String),
}

impl fmt::Debug for ContentLocation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ContentLocation::Inline(bytes) => write!(f, "Inline({} bytes)", bytes.len()),
			ContentLocation::Stored(path) => f.debug_tuple("Stored").field(path).finish(),
		}
	}
}

/// Content row for a version: location plus protection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBlob {
	pub version_id: VersionId,
	pub location: ContentLocation,
	pub encoding: ContentEncoding,
}

/// Object store key for a version's content. Keyed by the version id, which
/// exists before the version number is allocated.
pub fn storage_path(owner: UserId, script: ScriptId, version: VersionId) -> String {
	format!("{owner}/{script}/{version}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
	pub script_id: ScriptId,
	pub name: String,
	pub version_id: VersionId,
	pub updated_at: DateTime<Utc>,
}

/// Which version a read refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSelector {
	Latest,
	Number(u32),
	Tag(String),
}

impl FromStr for VersionSelector {
	type Err = CoreError;

	/// `""` and `latest` select the newest version, `v<N>` a version number,
	/// anything else a tag.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() || s == LATEST_TAG {
			return Ok(VersionSelector::Latest);
		}
		if is_version_selector(s) {
			let n: u32 = s[1..]
				.parse()
				.map_err(|_| CoreError::invalid("version", format!("'{s}' is out of range")))?;
			if n == 0 {
				return Err(CoreError::invalid("version", "versions start at 1"));
			}
			return Ok(VersionSelector::Number(n));
		}
		Ok(VersionSelector::Tag(s.to_string()))
	}
}

impl fmt::Display for VersionSelector {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			VersionSelector::Latest => f.write_str(LATEST_TAG),
			VersionSelector::Number(n) => write!(f, "v{n}"),
			VersionSelector::Tag(name) => f.write_str(name),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "user_id", rename_all = "lowercase")]
pub enum GrantSubject {
	/// Anyone holding the link.
	Link,
	User(UserId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
	pub id: GrantId,
	pub script_id: ScriptId,
	pub subject: GrantSubject,
	pub granted_by: UserId,
	pub granted_at: DateTime<Utc>,
	pub expires_at: Option<DateTime<Utc>>,
}

impl AccessGrant {
	/// A grant with an expiry at or before `now` is inert.
	pub fn is_active(&self, now: DateTime<Utc>) -> bool {
		self.expires_at.map_or(true, |exp| exp > now)
	}
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareToken {
	pub id: ShareTokenId,
	pub script_id: ScriptId,
	pub token: String,
	pub revoked: bool,
	pub created_at: DateTime<Utc>,
}

impl ShareToken {
	pub fn is_valid_for(&self, script: ScriptId) -> bool {
		!self.revoked && self.script_id == script
	}
}

impl fmt::Debug for ShareToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ShareToken")
			.field("id", &self.id)
			.field("script_id", &self.script_id)
			.field("token", &"[REDACTED]")
			.field("revoked", &self.revoked)
			.field("created_at", &self.created_at)
			.finish()
	}
}

/// Public half of a user's RSA keypair. The private half is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
	pub id: KeyPairId,
	pub user_id: UserId,
	pub name: String,
	pub public_key_pem: String,
	pub fingerprint: String,
	pub created_at: DateTime<Utc>,
}

/// Caller identity as supplied by the identity collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
	pub user_id: UserId,
	pub is_admin: bool,
}

impl Requester {
	pub fn user(user_id: UserId) -> Self {
		Self {
			user_id,
			is_admin: false,
		}
	}

	pub fn admin(user_id: UserId) -> Self {
		Self {
			user_id,
			is_admin: true,
		}
	}
}

/// Vault entry without its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretMetadata {
	pub id: SecretId,
	pub user_id: UserId,
	pub key_name: String,
	pub version: u32,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub last_accessed_at: Option<DateTime<Utc>>,
	pub expires_at: Option<DateTime<Utc>>,
}

impl SecretMetadata {
	pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
		self.expires_at.is_some_and(|exp| exp <= now)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
	Read,
	Write,
	Delete,
}

impl AuditAction {
	pub fn as_str(&self) -> &'static str {
		match self {
			AuditAction::Read => "read",
			AuditAction::Write => "write",
			AuditAction::Delete => "delete",
		}
	}
}

impl fmt::Display for AuditAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for AuditAction {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"read" => Ok(AuditAction::Read),
			"write" => Ok(AuditAction::Write),
			"delete" => Ok(AuditAction::Delete),
			other => Err(CoreError::UnknownAuditAction(other.to_string())),
		}
	}
}

/// Request metadata recorded with every vault access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditContext {
	pub ip: Option<String>,
	pub user_agent: Option<String>,
}

impl AuditContext {
	pub fn new(ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
		Self {
			ip: Some(ip.into()),
			user_agent: Some(user_agent.into()),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretAuditEntry {
	pub id: i64,
	/// Kept after the secret is deleted; no foreign key.
	pub secret_id: SecretId,
	pub user_id: UserId,
	pub key_name: String,
	pub action: AuditAction,
	pub ip: Option<String>,
	pub user_agent: Option<String>,
	pub accessed_at: DateTime<Utc>,
}

/// KMS-wrapped user data key.
#[derive(Clone, PartialEq, Eq)]
pub struct UdekRecord {
	pub id: UdekId,
	pub user_id: UserId,
	pub encrypted_udek: Vec<u8>,
	pub key_version: u32,
	pub created_at: DateTime<Utc>,
	pub rotated_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for UdekRecord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("UdekRecord")
			.field("id", &self.id)
			.field("user_id", &self.user_id)
			.field("key_version", &self.key_version)
			.field("created_at", &self.created_at)
			.field("rotated_at", &self.rotated_at)
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;

	#[test]
	fn visibility_roundtrip() {
		for v in [Visibility::Public, Visibility::Unlisted, Visibility::Private] {
			assert_eq!(v.as_str().parse::<Visibility>().unwrap(), v);
		}
		assert!("secret".parse::<Visibility>().is_err());
		assert!(Visibility::Private.requires_confidentiality());
		assert!(!Visibility::Unlisted.requires_confidentiality());
	}

	#[test]
	fn selector_parsing() {
		assert_eq!("".parse::<VersionSelector>().unwrap(), VersionSelector::Latest);
		assert_eq!("latest".parse::<VersionSelector>().unwrap(), VersionSelector::Latest);
		assert_eq!("v12".parse::<VersionSelector>().unwrap(), VersionSelector::Number(12));
		assert_eq!(
			"beta".parse::<VersionSelector>().unwrap(),
			VersionSelector::Tag("beta".to_string())
		);
		assert!("v0".parse::<VersionSelector>().is_err());
		assert!("v99999999999".parse::<VersionSelector>().is_err());
		assert_eq!(VersionSelector::Number(3).to_string(), "v3");
	}

	#[test]
	fn encoding_columns_must_pair() {
		let kp = KeyPairId::generate();
		assert_eq!(ContentEncoding::from_columns(None, None).unwrap(), ContentEncoding::Plain);
		let enc = ContentEncoding::from_columns(Some(kp), Some(vec![1, 2, 3])).unwrap();
		assert!(enc.is_encrypted());
		assert_eq!(enc.keypair_id(), Some(kp));
		assert_eq!(enc.to_columns(), (Some(kp), Some(&[1u8, 2, 3][..])));
		assert!(ContentEncoding::from_columns(Some(kp), None).is_err());
		assert!(ContentEncoding::from_columns(None, Some(vec![1])).is_err());
	}

	#[test]
	fn grant_expiry_boundary() {
		let now = Utc::now();
		let mut grant = AccessGrant {
			id: GrantId::generate(),
			script_id: ScriptId::generate(),
			subject: GrantSubject::Link,
			granted_by: UserId::new(1),
			granted_at: now,
			expires_at: None,
		};
		assert!(grant.is_active(now));
		grant.expires_at = Some(now);
		assert!(!grant.is_active(now));
		grant.expires_at = Some(now + Duration::seconds(1));
		assert!(grant.is_active(now));
	}

	#[test]
	fn share_token_debug_hides_token() {
		let token = ShareToken {
			id: ShareTokenId::generate(),
			script_id: ScriptId::generate(),
			token: "abcdef0123".to_string(),
			revoked: false,
			created_at: Utc::now(),
		};
		assert!(!format!("{token:?}").contains("abcdef0123"));
	}

	#[test]
	fn storage_path_layout() {
		let script = ScriptId::generate();
		let version = VersionId::generate();
		assert_eq!(
			storage_path(UserId::new(7), script, version),
			format!("7/{script}/{version}")
		);
	}
}
