// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-client request rate limit configuration.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
	pub requests_per_window: u32,
	pub window_secs: u64,
}

impl Default for RateLimitConfig {
	fn default() -> Self {
		Self {
			requests_per_window: 50,
			window_secs: 60,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RateLimitConfigLayer {
	#[serde(default)]
	pub requests_per_window: Option<u32>,
	#[serde(default)]
	pub window_secs: Option<u64>,
}

impl RateLimitConfigLayer {
	pub fn merge(&mut self, other: RateLimitConfigLayer) {
		if other.requests_per_window.is_some() {
			self.requests_per_window = other.requests_per_window;
		}
		if other.window_secs.is_some() {
			self.window_secs = other.window_secs;
		}
	}

	pub fn finalize(self) -> RateLimitConfig {
		let defaults = RateLimitConfig::default();
		RateLimitConfig {
			requests_per_window: self
				.requests_per_window
				.unwrap_or(defaults.requests_per_window),
			window_secs: self.window_secs.unwrap_or(defaults.window_secs),
		}
	}
}
