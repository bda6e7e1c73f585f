// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Object storage for script content.
//!
//! Content is streamed in and out as [`BoxAsyncRead`]. Everything handed to
//! a store is already in its final form (ciphertext for encrypted scripts);
//! stores never inspect bytes.

pub mod error;
pub mod key;
pub mod local;
pub mod memory;

use std::io::Cursor;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use shebang_server_config::{StorageBackend, StorageConfig};
use tokio::io::{AsyncRead, AsyncReadExt};

pub use error::{StorageError, StorageResult};
pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;

/// A boxed async reader for streaming object content.
pub type BoxAsyncRead = Pin<Box<dyn AsyncRead + Send>>;

#[async_trait]
pub trait ObjectStore: Send + Sync {
	/// Store exactly `size` bytes read from `reader` under `key`, replacing
	/// any existing object. Fails with [`StorageError::SizeMismatch`] if the
	/// reader yields a different amount; nothing is stored in that case.
	async fn put(&self, key: &str, reader: BoxAsyncRead, size: u64) -> StorageResult<()>;

	/// Stream an object. [`StorageError::NotFound`] if absent.
	async fn get(&self, key: &str) -> StorageResult<BoxAsyncRead>;

	/// Remove an object. Succeeds if it does not exist.
	async fn delete(&self, key: &str) -> StorageResult<()>;

	async fn exists(&self, key: &str) -> StorageResult<bool>;

	/// Backend name, safe to log.
	fn name(&self) -> &str;
}

/// Wrap owned bytes as a [`BoxAsyncRead`].
pub fn reader_from_bytes(data: impl AsRef<[u8]> + Send + Unpin + 'static) -> BoxAsyncRead {
	Box::pin(Cursor::new(data))
}

/// Drain a reader into memory, failing if it yields more than `limit` bytes.
pub async fn read_to_vec(reader: BoxAsyncRead, limit: u64) -> StorageResult<Vec<u8>> {
	let mut buffer = Vec::new();
	let read = reader
		.take(limit.saturating_add(1))
		.read_to_end(&mut buffer)
		.await? as u64;
	if read > limit {
		return Err(StorageError::SizeMismatch {
			expected: limit,
			actual: read,
		});
	}
	Ok(buffer)
}

/// Build the configured object store.
pub fn object_store_from_config(config: &StorageConfig) -> Arc<dyn ObjectStore> {
	match config.backend {
		StorageBackend::Local => Arc::new(LocalObjectStore::new(config.path.clone())),
		StorageBackend::Memory => Arc::new(MemoryObjectStore::new()),
	}
}
