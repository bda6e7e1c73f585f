// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;

use crate::error::{StorageError, StorageResult};
use crate::key::validate_key;
use crate::{BoxAsyncRead, ObjectStore};

/// In-process object store for tests and ephemeral deployments.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
	objects: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl MemoryObjectStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn len(&self) -> usize {
		self.objects.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.objects.read().await.is_empty()
	}

	/// Overwrite an object in place, bypassing `put`. Lets tests corrupt
	/// stored content.
	pub async fn replace_raw(&self, key: &str, data: impl Into<Bytes>) {
		self.objects.write().await.insert(key.to_string(), data.into());
	}
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
	async fn put(&self, key: &str, mut reader: BoxAsyncRead, size: u64) -> StorageResult<()> {
		validate_key(key)?;

		let capacity = usize::try_from(size).unwrap_or(usize::MAX).min(1 << 20);
		let mut buffer = Vec::with_capacity(capacity);
		let copied = (&mut reader)
			.take(size.saturating_add(1))
			.read_to_end(&mut buffer)
			.await? as u64;
		if copied != size {
			return Err(StorageError::SizeMismatch {
				expected: size,
				actual: copied,
			});
		}

		self.objects.write().await.insert(key.to_string(), Bytes::from(buffer));
		Ok(())
	}

	async fn get(&self, key: &str) -> StorageResult<BoxAsyncRead> {
		validate_key(key)?;
		let data = self
			.objects
			.read()
			.await
			.get(key)
			.cloned()
			.ok_or_else(|| StorageError::NotFound(key.to_string()))?;
		Ok(Box::pin(Cursor::new(data)))
	}

	async fn delete(&self, key: &str) -> StorageResult<()> {
		validate_key(key)?;
		self.objects.write().await.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> StorageResult<bool> {
		validate_key(key)?;
		Ok(self.objects.read().await.contains_key(key))
	}

	fn name(&self) -> &str {
		"memory"
	}
}
