// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Script content storage configuration.

use std::path::PathBuf;

use serde::Deserialize;

/// Which object store holds script content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
	#[default]
	Local,
	Memory,
}

impl std::str::FromStr for StorageBackend {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"local" | "fs" => Ok(Self::Local),
			"memory" => Ok(Self::Memory),
			other => Err(format!("unknown storage backend '{other}'")),
		}
	}
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
	pub backend: StorageBackend,
	pub path: PathBuf,
	/// Content at or below this size is stored in the database row instead of
	/// the object store. Zero sends everything to the object store.
	pub inline_threshold_bytes: usize,
}

impl Default for StorageConfig {
	fn default() -> Self {
		StorageConfigLayer::default().finalize()
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfigLayer {
	#[serde(default)]
	pub backend: Option<StorageBackend>,
	#[serde(default)]
	pub path: Option<PathBuf>,
	#[serde(default)]
	pub inline_threshold_bytes: Option<usize>,
}

impl StorageConfigLayer {
	pub fn merge(&mut self, other: StorageConfigLayer) {
		if other.backend.is_some() {
			self.backend = other.backend;
		}
		if other.path.is_some() {
			self.path = other.path;
		}
		if other.inline_threshold_bytes.is_some() {
			self.inline_threshold_bytes = other.inline_threshold_bytes;
		}
	}

	pub fn finalize(self) -> StorageConfig {
		StorageConfig {
			backend: self.backend.unwrap_or_default(),
			path: self
				.path
				.unwrap_or_else(|| PathBuf::from("./data/scripts")),
			inline_threshold_bytes: self.inline_threshold_bytes.unwrap_or(0),
		}
	}
}
