// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Script, version, content and tag repository.
//!
//! A version row, its content row and the `latest` tag move together in one
//! transaction. Version numbers are allocated inside that transaction with
//! `COALESCE(MAX(version), 0) + 1`, backed by `UNIQUE(script_id, version)`,
//! and the allocation is retried on a unique violation.

use async_trait::async_trait;
use chrono::Utc;
use shebang_scripts_core::{
	ContentBlob, ContentEncoding, ContentLocation, KeyPairId, Script, ScriptId, ScriptVersion, Tag,
	UserId, Visibility, VersionId, LATEST_TAG,
};
use sqlx::{sqlite::SqlitePool, Row};

use crate::codec::{format_timestamp, parse_id, parse_timestamp, to_u32};
use crate::error::{conflict_on_unique, DbError, Result};

/// Attempts at allocating a version number before giving up.
const MAX_VERSION_ATTEMPTS: usize = 5;

/// Everything needed to persist one version.
#[derive(Debug, Clone)]
pub struct NewVersion {
	pub id: VersionId,
	pub script_id: ScriptId,
	pub content_hash: String,
	pub checksum: String,
	pub size_bytes: u64,
	pub signature: Option<Vec<u8>>,
	pub location: ContentLocation,
	pub encoding: ContentEncoding,
}

#[async_trait]
pub trait ScriptStore: Send + Sync {
	async fn create_script(&self, script: &Script) -> Result<()>;
	async fn get_script(&self, id: &ScriptId) -> Result<Option<Script>>;
	async fn get_script_by_name(&self, owner_id: UserId, name: &str) -> Result<Option<Script>>;
	async fn list_scripts(&self, owner_id: UserId) -> Result<Vec<Script>>;
	async fn update_visibility(&self, id: &ScriptId, visibility: Visibility) -> Result<bool>;
	async fn delete_script(&self, id: &ScriptId) -> Result<Vec<String>>;
	async fn create_version(&self, new: &NewVersion) -> Result<ScriptVersion>;
	async fn get_version_by_number(&self, script_id: &ScriptId, version: u32) -> Result<Option<ScriptVersion>>;
	async fn get_version_by_tag(&self, script_id: &ScriptId, tag: &str) -> Result<Option<ScriptVersion>>;
	async fn list_versions(&self, script_id: &ScriptId) -> Result<Vec<ScriptVersion>>;
	async fn get_content(&self, version_id: &VersionId) -> Result<Option<ContentBlob>>;
	async fn set_tag(&self, script_id: &ScriptId, name: &str, version_id: &VersionId) -> Result<Tag>;
	async fn list_tags(&self, script_id: &ScriptId) -> Result<Vec<Tag>>;
}

#[async_trait]
impl ScriptStore for ScriptRepository {
	async fn create_script(&self, script: &Script) -> Result<()> {
		self.create_script(script).await
	}

	async fn get_script(&self, id: &ScriptId) -> Result<Option<Script>> {
		self.get_script(id).await
	}

	async fn get_script_by_name(&self, owner_id: UserId, name: &str) -> Result<Option<Script>> {
		self.get_script_by_name(owner_id, name).await
	}

	async fn list_scripts(&self, owner_id: UserId) -> Result<Vec<Script>> {
		self.list_scripts(owner_id).await
	}

	async fn update_visibility(&self, id: &ScriptId, visibility: Visibility) -> Result<bool> {
		self.update_visibility(id, visibility).await
	}

	async fn delete_script(&self, id: &ScriptId) -> Result<Vec<String>> {
		self.delete_script(id).await
	}

	async fn create_version(&self, new: &NewVersion) -> Result<ScriptVersion> {
		self.create_version(new).await
	}

	async fn get_version_by_number(&self, script_id: &ScriptId, version: u32) -> Result<Option<ScriptVersion>> {
		self.get_version_by_number(script_id, version).await
	}

	async fn get_version_by_tag(&self, script_id: &ScriptId, tag: &str) -> Result<Option<ScriptVersion>> {
		self.get_version_by_tag(script_id, tag).await
	}

	async fn list_versions(&self, script_id: &ScriptId) -> Result<Vec<ScriptVersion>> {
		self.list_versions(script_id).await
	}

	async fn get_content(&self, version_id: &VersionId) -> Result<Option<ContentBlob>> {
		self.get_content(version_id).await
	}

	async fn set_tag(&self, script_id: &ScriptId, name: &str, version_id: &VersionId) -> Result<Tag> {
		self.set_tag(script_id, name, version_id).await
	}

	async fn list_tags(&self, script_id: &ScriptId) -> Result<Vec<Tag>> {
		self.list_tags(script_id).await
	}
}

#[derive(Clone)]
pub struct ScriptRepository {
	pool: SqlitePool,
}

const SCRIPT_COLUMNS: &str =
	"SELECT id, owner_id, name, description, visibility, created_at, updated_at FROM scripts";

const VERSION_COLUMNS: &str = "v.id, v.script_id, v.version, v.content_hash, v.checksum, v.size_bytes, v.signature, v.created_at";

impl ScriptRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// # Errors
	/// `DbError::Conflict` if the owner already has a script with this name.
	#[tracing::instrument(skip(self, script), fields(script_id = %script.id, owner_id = %script.owner_id))]
	pub async fn create_script(&self, script: &Script) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO scripts (id, owner_id, name, description, visibility, created_at, updated_at)
			VALUES (?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(script.id.to_string())
		.bind(script.owner_id.get())
		.bind(&script.name)
		.bind(&script.description)
		.bind(script.visibility.as_str())
		.bind(format_timestamp(script.created_at))
		.bind(format_timestamp(script.updated_at))
		.execute(&self.pool)
		.await
		.map_err(|e| conflict_on_unique(e, || format!("script '{}' already exists", script.name)))?;

		tracing::debug!(script_id = %script.id, "script created");
		Ok(())
	}

	#[tracing::instrument(skip(self), fields(script_id = %id))]
	pub async fn get_script(&self, id: &ScriptId) -> Result<Option<Script>> {
		let row = sqlx::query(&format!("{SCRIPT_COLUMNS} WHERE id = ?"))
			.bind(id.to_string())
			.fetch_optional(&self.pool)
			.await?;

		row.as_ref().map(parse_script_row).transpose()
	}

	#[tracing::instrument(skip(self), fields(owner_id = %owner_id))]
	pub async fn get_script_by_name(&self, owner_id: UserId, name: &str) -> Result<Option<Script>> {
		let row = sqlx::query(&format!("{SCRIPT_COLUMNS} WHERE owner_id = ? AND name = ?"))
			.bind(owner_id.get())
			.bind(name)
			.fetch_optional(&self.pool)
			.await?;

		row.as_ref().map(parse_script_row).transpose()
	}

	#[tracing::instrument(skip(self), fields(owner_id = %owner_id))]
	pub async fn list_scripts(&self, owner_id: UserId) -> Result<Vec<Script>> {
		let rows = sqlx::query(&format!("{SCRIPT_COLUMNS} WHERE owner_id = ? ORDER BY name ASC"))
			.bind(owner_id.get())
			.fetch_all(&self.pool)
			.await?;

		rows.iter().map(parse_script_row).collect()
	}

	#[tracing::instrument(skip(self), fields(script_id = %id, visibility = %visibility))]
	pub async fn update_visibility(&self, id: &ScriptId, visibility: Visibility) -> Result<bool> {
		let result = sqlx::query("UPDATE scripts SET visibility = ?, updated_at = ? WHERE id = ?")
			.bind(visibility.as_str())
			.bind(format_timestamp(Utc::now()))
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected() > 0)
	}

	/// Delete a script with its versions, content rows, tags, grants and
	/// share tokens.
	///
	/// # Returns
	/// Object store paths of the deleted content, for the caller to remove.
	#[tracing::instrument(skip(self), fields(script_id = %id))]
	pub async fn delete_script(&self, id: &ScriptId) -> Result<Vec<String>> {
		let mut tx = self.pool.begin().await?;

		let paths: Vec<String> = sqlx::query_scalar(
			r#"
			SELECT c.storage_path
			FROM script_contents c
			JOIN script_versions v ON v.id = c.version_id
			WHERE v.script_id = ? AND c.storage_path IS NOT NULL
			"#,
		)
		.bind(id.to_string())
		.fetch_all(&mut *tx)
		.await?;

		let result = sqlx::query("DELETE FROM scripts WHERE id = ?")
			.bind(id.to_string())
			.execute(&mut *tx)
			.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("script {id}")));
		}

		tx.commit().await?;
		tracing::debug!(script_id = %id, blobs = paths.len(), "script deleted");
		Ok(paths)
	}

	/// Persist a version with its content and move `latest` to it.
	///
	/// # Errors
	/// - `DbError::NotFound` if the script does not exist
	/// - `DbError::Conflict` if no version number could be allocated after
	///   repeated unique violations
	#[tracing::instrument(skip(self, new), fields(script_id = %new.script_id, version_id = %new.id, encrypted = new.encoding.is_encrypted()))]
	pub async fn create_version(&self, new: &NewVersion) -> Result<ScriptVersion> {
		for attempt in 1..=MAX_VERSION_ATTEMPTS {
			match self.try_create_version(new).await {
				Ok(version) => {
					tracing::debug!(version = version.version, attempt, "version created");
					return Ok(version);
				}
				Err(e) if e.is_unique_violation() && attempt < MAX_VERSION_ATTEMPTS => {
					tracing::debug!(attempt, "version number taken, retrying");
				}
				Err(e) if e.is_unique_violation() => {
					return Err(DbError::Conflict(format!(
						"could not allocate a version for script {} after {MAX_VERSION_ATTEMPTS} attempts",
						new.script_id
					)));
				}
				Err(e) => return Err(e),
			}
		}

		Err(DbError::Internal("version allocation loop exhausted".to_string()))
	}

	async fn try_create_version(&self, new: &NewVersion) -> Result<ScriptVersion> {
		let now = Utc::now();
		let now_str = format_timestamp(now);
		let script_id = new.script_id.to_string();
		let version_id = new.id.to_string();
		let size = i64::try_from(new.size_bytes)
			.map_err(|_| DbError::Internal(format!("size {} out of range", new.size_bytes)))?;

		let mut tx = self.pool.begin().await?;

		let touched = sqlx::query("UPDATE scripts SET updated_at = ? WHERE id = ?")
			.bind(&now_str)
			.bind(&script_id)
			.execute(&mut *tx)
			.await?;
		if touched.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("script {}", new.script_id)));
		}

		let version: i64 = sqlx::query_scalar(
			r#"
			INSERT INTO script_versions (
				id, script_id, version, content_hash, checksum, size_bytes, signature, created_at
			)
			SELECT ?, ?, COALESCE(MAX(version), 0) + 1, ?, ?, ?, ?, ?
			FROM script_versions
			WHERE script_id = ?
			RETURNING version
			"#,
		)
		.bind(&version_id)
		.bind(&script_id)
		.bind(&new.content_hash)
		.bind(&new.checksum)
		.bind(size)
		.bind(new.signature.as_deref())
		.bind(&now_str)
		.bind(&script_id)
		.fetch_one(&mut *tx)
		.await?;

		let (inline, path) = match &new.location {
			ContentLocation::Inline(bytes) => (Some(bytes.as_slice()), None),
			ContentLocation::Stored(path) => (None, Some(path.as_str())),
		};
		let (keypair_id, wrapped_key) = new.encoding.to_columns();

		sqlx::query(
			r#"
			INSERT INTO script_contents (version_id, inline_content, storage_path, encryption_key_id, wrapped_key)
			VALUES (?, ?, ?, ?, ?)
			"#,
		)
		.bind(&version_id)
		.bind(inline)
		.bind(path)
		.bind(keypair_id.map(|id| id.to_string()))
		.bind(wrapped_key)
		.execute(&mut *tx)
		.await?;

		upsert_tag(&mut tx, &script_id, LATEST_TAG, &version_id, &now_str).await?;

		tx.commit().await?;

		Ok(ScriptVersion {
			id: new.id,
			script_id: new.script_id,
			version: to_u32("version", version)?,
			content_hash: new.content_hash.clone(),
			checksum: new.checksum.clone(),
			size_bytes: new.size_bytes,
			signature: new.signature.clone(),
			created_at: now,
		})
	}

	#[tracing::instrument(skip(self), fields(script_id = %script_id, version))]
	pub async fn get_version_by_number(
		&self,
		script_id: &ScriptId,
		version: u32,
	) -> Result<Option<ScriptVersion>> {
		let row = sqlx::query(&format!(
			"SELECT {VERSION_COLUMNS} FROM script_versions v WHERE v.script_id = ? AND v.version = ?"
		))
		.bind(script_id.to_string())
		.bind(i64::from(version))
		.fetch_optional(&self.pool)
		.await?;

		row.as_ref().map(parse_version_row).transpose()
	}

	#[tracing::instrument(skip(self), fields(script_id = %script_id, tag))]
	pub async fn get_version_by_tag(&self, script_id: &ScriptId, tag: &str) -> Result<Option<ScriptVersion>> {
		let row = sqlx::query(&format!(
			r#"
			SELECT {VERSION_COLUMNS}
			FROM script_tags t
			JOIN script_versions v ON v.id = t.version_id
			WHERE t.script_id = ? AND t.name = ?
			"#
		))
		.bind(script_id.to_string())
		.bind(tag)
		.fetch_optional(&self.pool)
		.await?;

		row.as_ref().map(parse_version_row).transpose()
	}

	/// Versions newest first.
	#[tracing::instrument(skip(self), fields(script_id = %script_id))]
	pub async fn list_versions(&self, script_id: &ScriptId) -> Result<Vec<ScriptVersion>> {
		let rows = sqlx::query(&format!(
			"SELECT {VERSION_COLUMNS} FROM script_versions v WHERE v.script_id = ? ORDER BY v.version DESC"
		))
		.bind(script_id.to_string())
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(parse_version_row).collect()
	}

	#[tracing::instrument(skip(self), fields(version_id = %version_id))]
	pub async fn get_content(&self, version_id: &VersionId) -> Result<Option<ContentBlob>> {
		let row = sqlx::query(
			r#"
			SELECT version_id, inline_content, storage_path, encryption_key_id, wrapped_key
			FROM script_contents
			WHERE version_id = ?
			"#,
		)
		.bind(version_id.to_string())
		.fetch_optional(&self.pool)
		.await?;

		row.as_ref().map(parse_content_row).transpose()
	}

	/// Point `name` at `version_id`, creating the tag if needed.
	///
	/// # Errors
	/// `DbError::NotFound` if the version does not belong to the script.
	#[tracing::instrument(skip(self), fields(script_id = %script_id, tag = name, version_id = %version_id))]
	pub async fn set_tag(&self, script_id: &ScriptId, name: &str, version_id: &VersionId) -> Result<Tag> {
		let now = Utc::now();
		let script_id_str = script_id.to_string();
		let version_id_str = version_id.to_string();
		let mut tx = self.pool.begin().await?;

		let belongs: Option<i64> =
			sqlx::query_scalar("SELECT 1 FROM script_versions WHERE id = ? AND script_id = ?")
				.bind(&version_id_str)
				.bind(&script_id_str)
				.fetch_optional(&mut *tx)
				.await?;
		if belongs.is_none() {
			return Err(DbError::NotFound(format!(
				"version {version_id} of script {script_id}"
			)));
		}

		upsert_tag(&mut tx, &script_id_str, name, &version_id_str, &format_timestamp(now)).await?;
		tx.commit().await?;

		Ok(Tag {
			script_id: *script_id,
			name: name.to_string(),
			version_id: *version_id,
			updated_at: now,
		})
	}

	#[tracing::instrument(skip(self), fields(script_id = %script_id))]
	pub async fn list_tags(&self, script_id: &ScriptId) -> Result<Vec<Tag>> {
		let rows = sqlx::query(
			"SELECT script_id, name, version_id, updated_at FROM script_tags WHERE script_id = ? ORDER BY name",
		)
		.bind(script_id.to_string())
		.fetch_all(&self.pool)
		.await?;

		rows.iter()
			.map(|row| {
				let script_id: String = row.get("script_id");
				let version_id: String = row.get("version_id");
				let updated_at: String = row.get("updated_at");
				Ok(Tag {
					script_id: parse_id("script id", &script_id)?,
					name: row.get("name"),
					version_id: parse_id("version id", &version_id)?,
					updated_at: parse_timestamp("updated_at", &updated_at)?,
				})
			})
			.collect()
	}
}

async fn upsert_tag(
	tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
	script_id: &str,
	name: &str,
	version_id: &str,
	now: &str,
) -> Result<()> {
	sqlx::query(
		r#"
		INSERT INTO script_tags (script_id, name, version_id, updated_at)
		VALUES (?, ?, ?, ?)
		ON CONFLICT (script_id, name) DO UPDATE SET
			version_id = excluded.version_id,
			updated_at = excluded.updated_at
		"#,
	)
	.bind(script_id)
	.bind(name)
	.bind(version_id)
	.bind(now)
	.execute(&mut **tx)
	.await?;
	Ok(())
}

fn parse_script_row(row: &sqlx::sqlite::SqliteRow) -> Result<Script> {
	let id: String = row.get("id");
	let visibility: String = row.get("visibility");
	let created_at: String = row.get("created_at");
	let updated_at: String = row.get("updated_at");

	Ok(Script {
		id: parse_id("script id", &id)?,
		owner_id: UserId::new(row.get("owner_id")),
		name: row.get("name"),
		description: row.get("description"),
		visibility: visibility.parse()?,
		created_at: parse_timestamp("created_at", &created_at)?,
		updated_at: parse_timestamp("updated_at", &updated_at)?,
	})
}

fn parse_version_row(row: &sqlx::sqlite::SqliteRow) -> Result<ScriptVersion> {
	let id: String = row.get("id");
	let script_id: String = row.get("script_id");
	let created_at: String = row.get("created_at");
	let size: i64 = row.get("size_bytes");

	Ok(ScriptVersion {
		id: parse_id("version id", &id)?,
		script_id: parse_id("script id", &script_id)?,
		version: to_u32("version", row.get("version"))?,
		content_hash: row.get("content_hash"),
		checksum: row.get("checksum"),
		size_bytes: u64::try_from(size)
			.map_err(|_| DbError::Internal(format!("negative size_bytes: {size}")))?,
		signature: row.get("signature"),
		created_at: parse_timestamp("created_at", &created_at)?,
	})
}

fn parse_content_row(row: &sqlx::sqlite::SqliteRow) -> Result<ContentBlob> {
	let version_id: String = row.get("version_id");
	let inline: Option<Vec<u8>> = row.get("inline_content");
	let path: Option<String> = row.get("storage_path");
	let keypair_id: Option<String> = row.get("encryption_key_id");
	let wrapped_key: Option<Vec<u8>> = row.get("wrapped_key");

	let location = match (inline, path) {
		(Some(bytes), None) => ContentLocation::Inline(bytes),
		(None, Some(path)) => ContentLocation::Stored(path),
		_ => {
			return Err(DbError::Internal(format!(
				"content row {version_id} must have exactly one of inline content or storage path"
			)))
		}
	};

	let keypair_id = keypair_id
		.map(|id| parse_id::<KeyPairId>("encryption key id", &id))
		.transpose()?;

	Ok(ContentBlob {
		version_id: parse_id("version id", &version_id)?,
		location,
		encoding: ContentEncoding::from_columns(keypair_id, wrapped_key)?,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{create_file_test_pool, create_migrated_test_pool};
	use shebang_scripts_core::WrappedKey;

	fn script(owner: i64, name: &str, visibility: Visibility) -> Script {
		let now = Utc::now();
		Script {
			id: ScriptId::generate(),
			owner_id: UserId::new(owner),
			name: name.to_string(),
			description: Some("test".to_string()),
			visibility,
			created_at: now,
			updated_at: now,
		}
	}

	fn new_version(script_id: ScriptId, content: &[u8]) -> NewVersion {
		NewVersion {
			id: VersionId::generate(),
			script_id,
			content_hash: format!("hash-{}", content.len()),
			checksum: format!("sum-{}", content.len()),
			size_bytes: content.len() as u64,
			signature: None,
			location: ContentLocation::Inline(content.to_vec()),
			encoding: ContentEncoding::Plain,
		}
	}

	async fn repo_with_script() -> (ScriptRepository, Script) {
		let repo = ScriptRepository::new(create_migrated_test_pool().await);
		let s = script(1, "deploy.sh", Visibility::Private);
		repo.create_script(&s).await.unwrap();
		(repo, s)
	}

	#[tokio::test]
	async fn script_crud() {
		let (repo, s) = repo_with_script().await;

		assert_eq!(repo.get_script(&s.id).await.unwrap().unwrap(), s);
		assert_eq!(
			repo.get_script_by_name(UserId::new(1), "deploy.sh").await.unwrap().unwrap().id,
			s.id
		);
		assert!(repo.update_visibility(&s.id, Visibility::Public).await.unwrap());
		assert_eq!(
			repo.get_script(&s.id).await.unwrap().unwrap().visibility,
			Visibility::Public
		);

		let dup = script(1, "deploy.sh", Visibility::Public);
		assert!(matches!(repo.create_script(&dup).await, Err(DbError::Conflict(_))));
		repo.create_script(&script(2, "deploy.sh", Visibility::Public)).await.unwrap();
		assert_eq!(repo.list_scripts(UserId::new(1)).await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn versions_increment_and_latest_follows() {
		let (repo, s) = repo_with_script().await;

		let v1 = repo.create_version(&new_version(s.id, b"one")).await.unwrap();
		let v2 = repo.create_version(&new_version(s.id, b"two!")).await.unwrap();
		assert_eq!((v1.version, v2.version), (1, 2));

		let latest = repo.get_version_by_tag(&s.id, LATEST_TAG).await.unwrap().unwrap();
		assert_eq!(latest.id, v2.id);
		assert_eq!(repo.get_version_by_number(&s.id, 1).await.unwrap().unwrap().id, v1.id);
		assert!(repo.get_version_by_number(&s.id, 3).await.unwrap().is_none());

		let listed: Vec<u32> = repo.list_versions(&s.id).await.unwrap().iter().map(|v| v.version).collect();
		assert_eq!(listed, vec![2, 1]);
	}

	#[tokio::test]
	async fn version_for_missing_script_is_not_found() {
		let repo = ScriptRepository::new(create_migrated_test_pool().await);
		let err = repo
			.create_version(&new_version(ScriptId::generate(), b"x"))
			.await
			.unwrap_err();
		assert!(matches!(err, DbError::NotFound(_)));
	}

	#[tokio::test]
	async fn encrypted_content_roundtrips() {
		let (repo, s) = repo_with_script().await;
		let keypair_id = KeyPairId::generate();
		let mut new = new_version(s.id, b"ciphertext");
		new.location = ContentLocation::Stored(format!("1/{}/{}", s.id, new.id));
		new.encoding = ContentEncoding::Encrypted {
			keypair_id,
			wrapped_key: WrappedKey::new(vec![7; 512]),
		};
		new.signature = Some(vec![1, 2, 3]);

		let version = repo.create_version(&new).await.unwrap();
		assert_eq!(version.signature, Some(vec![1, 2, 3]));

		let content = repo.get_content(&version.id).await.unwrap().unwrap();
		assert_eq!(content.location, new.location);
		assert_eq!(content.encoding, new.encoding);
	}

	#[tokio::test]
	async fn tags_point_at_versions_of_same_script() {
		let (repo, s) = repo_with_script().await;
		let v1 = repo.create_version(&new_version(s.id, b"one")).await.unwrap();
		repo.create_version(&new_version(s.id, b"two")).await.unwrap();

		repo.set_tag(&s.id, "stable", &v1.id).await.unwrap();
		assert_eq!(repo.get_version_by_tag(&s.id, "stable").await.unwrap().unwrap().version, 1);

		let other = script(1, "other.sh", Visibility::Public);
		repo.create_script(&other).await.unwrap();
		let err = repo.set_tag(&other.id, "stable", &v1.id).await.unwrap_err();
		assert!(matches!(err, DbError::NotFound(_)));

		let names: Vec<String> = repo.list_tags(&s.id).await.unwrap().into_iter().map(|t| t.name).collect();
		assert_eq!(names, vec!["latest".to_string(), "stable".to_string()]);
	}

	#[tokio::test]
	async fn delete_returns_stored_paths_and_cascades() {
		let (repo, s) = repo_with_script().await;
		repo.create_version(&new_version(s.id, b"inline")).await.unwrap();
		let mut stored = new_version(s.id, b"stored");
		stored.location = ContentLocation::Stored("1/s/v".to_string());
		let stored_version = repo.create_version(&stored).await.unwrap();

		let paths = repo.delete_script(&s.id).await.unwrap();
		assert_eq!(paths, vec!["1/s/v".to_string()]);
		assert!(repo.get_script(&s.id).await.unwrap().is_none());
		assert!(repo.get_content(&stored_version.id).await.unwrap().is_none());
		assert!(matches!(repo.delete_script(&s.id).await, Err(DbError::NotFound(_))));
	}

	#[tokio::test]
	async fn concurrent_writers_get_contiguous_versions() {
		let dir = tempfile::tempdir().unwrap();
		let repo = ScriptRepository::new(create_file_test_pool(dir.path(), 8).await);
		let s = script(1, "busy.sh", Visibility::Public);
		repo.create_script(&s).await.unwrap();

		let script_id = s.id;
		let tasks: Vec<_> = (0..20)
			.map(|i| {
				let repo = repo.clone();
				let content = format!("content {i}");
				tokio::spawn(async move {
					repo.create_version(&new_version(script_id, content.as_bytes()))
						.await
						.unwrap()
				})
			})
			.collect();
		for task in futures::future::join_all(tasks).await {
			task.unwrap();
		}

		let mut numbers: Vec<u32> = repo.list_versions(&s.id).await.unwrap().iter().map(|v| v.version).collect();
		numbers.sort_unstable();
		assert_eq!(numbers, (1..=20).collect::<Vec<u32>>());
		assert_eq!(repo.get_version_by_tag(&s.id, LATEST_TAG).await.unwrap().unwrap().version, 20);
	}
}
