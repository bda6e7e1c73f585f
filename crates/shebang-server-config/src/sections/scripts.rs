// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::Deserialize;

const DEFAULT_MAX_SCRIPT_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptsConfig {
	pub max_script_size: u64,
}

impl Default for ScriptsConfig {
	fn default() -> Self {
		Self {
			max_script_size: DEFAULT_MAX_SCRIPT_SIZE,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptsConfigLayer {
	#[serde(default)]
	pub max_script_size: Option<u64>,
}

impl ScriptsConfigLayer {
	pub fn merge(&mut self, other: ScriptsConfigLayer) {
		if other.max_script_size.is_some() {
			self.max_script_size = other.max_script_size;
		}
	}

	pub fn finalize(self) -> ScriptsConfig {
		ScriptsConfig {
			max_script_size: self.max_script_size.unwrap_or(DEFAULT_MAX_SCRIPT_SIZE),
		}
	}
}
