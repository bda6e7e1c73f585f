// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Secret vault configuration.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultConfig {
	/// How long an unwrapped UDEK stays in the in-process cache. Zero disables
	/// caching so every call goes to the KMS.
	pub udek_cache_ttl_secs: u64,
	/// Maximum audit rows returned by an audit query.
	pub audit_query_limit: u32,
}

impl Default for VaultConfig {
	fn default() -> Self {
		Self {
			udek_cache_ttl_secs: 300,
			audit_query_limit: 100,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VaultConfigLayer {
	#[serde(default)]
	pub udek_cache_ttl_secs: Option<u64>,
	#[serde(default)]
	pub audit_query_limit: Option<u32>,
}

impl VaultConfigLayer {
	pub fn merge(&mut self, other: VaultConfigLayer) {
		if other.udek_cache_ttl_secs.is_some() {
			self.udek_cache_ttl_secs = other.udek_cache_ttl_secs;
		}
		if other.audit_query_limit.is_some() {
			self.audit_query_limit = other.audit_query_limit;
		}
	}

	pub fn finalize(self) -> VaultConfig {
		let defaults = VaultConfig::default();
		VaultConfig {
			udek_cache_ttl_secs: self
				.udek_cache_ttl_secs
				.unwrap_or(defaults.udek_cache_ttl_secs),
			audit_query_limit: self
				.audit_query_limit
				.unwrap_or(defaults.audit_query_limit),
		}
	}
}
