// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Filesystem object store.
//!
//! Objects are written to a temporary sibling and renamed into place, so a
//! reader never sees a partially written object.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::key::validate_key;
use crate::{BoxAsyncRead, ObjectStore};

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
	root: PathBuf,
}

impl LocalObjectStore {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
		validate_key(key)?;
		Ok(self.root.join(key))
	}
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
	#[tracing::instrument(skip(self, reader), fields(root = %self.root.display()))]
	async fn put(&self, key: &str, mut reader: BoxAsyncRead, size: u64) -> StorageResult<()> {
		let path = self.path_for(key)?;
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).await?;
		}

		let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4().simple()));
		let written = async {
			let mut file = fs::File::create(&tmp).await?;
			// Read one byte past the declared size to detect oversized input.
			let mut limited = (&mut reader).take(size.saturating_add(1));
			let copied = tokio::io::copy(&mut limited, &mut file).await?;
			file.flush().await?;
			file.sync_all().await?;
			Ok::<u64, std::io::Error>(copied)
		}
		.await;

		let copied = match written {
			Ok(copied) => copied,
			Err(e) => {
				let _ = fs::remove_file(&tmp).await;
				return Err(e.into());
			}
		};

		if copied != size {
			let _ = fs::remove_file(&tmp).await;
			return Err(StorageError::SizeMismatch {
				expected: size,
				actual: copied,
			});
		}

		fs::rename(&tmp, &path).await?;
		tracing::debug!(size, "object stored");
		Ok(())
	}

	#[tracing::instrument(skip(self), fields(root = %self.root.display()))]
	async fn get(&self, key: &str) -> StorageResult<BoxAsyncRead> {
		let path = self.path_for(key)?;
		match fs::File::open(&path).await {
			Ok(file) => Ok(Box::pin(file)),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				Err(StorageError::NotFound(key.to_string()))
			}
			Err(e) => Err(e.into()),
		}
	}

	#[tracing::instrument(skip(self), fields(root = %self.root.display()))]
	async fn delete(&self, key: &str) -> StorageResult<()> {
		let path = self.path_for(key)?;
		match fs::remove_file(&path).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}

	async fn exists(&self, key: &str) -> StorageResult<bool> {
		let path = self.path_for(key)?;
		Ok(fs::try_exists(&path).await?)
	}

	fn name(&self) -> &str {
		"local"
	}
}
