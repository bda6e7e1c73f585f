// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Sliding-window limiter.
//!
//! Each client key keeps the instants of its requests within the current
//! window. A request is allowed while fewer than `limit` remain inside the
//! window, and only allowed requests are recorded. Admin requests bypass the
//! limiter entirely and are not recorded.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use shebang_server_config::RateLimitConfig;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::clock::{Clock, SystemClock};

/// Outcome of a [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
	pub allowed: bool,
	/// Requests left in the current window after this one.
	pub remaining: u32,
	/// When denied, how long until the oldest request leaves the window.
	pub retry_after: Option<Duration>,
}

pub struct RateLimiter {
	clock: Arc<dyn Clock>,
	window: Duration,
	default_limit: u32,
	requests: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl std::fmt::Debug for RateLimiter {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RateLimiter")
			.field("window", &self.window)
			.field("default_limit", &self.default_limit)
			.finish_non_exhaustive()
	}
}

impl RateLimiter {
	pub fn new(clock: Arc<dyn Clock>, window: Duration, default_limit: u32) -> Self {
		Self {
			clock,
			window,
			default_limit,
			requests: Mutex::new(HashMap::new()),
		}
	}

	pub fn from_config(config: &RateLimitConfig) -> Self {
		Self::new(
			Arc::new(SystemClock),
			Duration::from_secs(config.window_secs),
			config.requests_per_window,
		)
	}

	pub fn window(&self) -> Duration {
		self.window
	}

	pub fn default_limit(&self) -> u32 {
		self.default_limit
	}

	/// Check and record a request against the configured default limit.
	pub async fn check(&self, key: &str, is_admin: bool) -> Decision {
		self.check_with_limit(key, self.default_limit, is_admin).await
	}

	/// Check and record a request against `limit`, e.g. a per-user or
	/// per-tier override.
	#[instrument(level = "debug", skip(self), fields(window_secs = self.window.as_secs()))]
	pub async fn check_with_limit(&self, key: &str, limit: u32, is_admin: bool) -> Decision {
		if is_admin {
			return Decision {
				allowed: true,
				remaining: limit,
				retry_after: None,
			};
		}

		let now = self.clock.now();
		let mut requests = self.requests.lock().await;
		let times = requests.entry(key.to_string()).or_default();
		evict_expired(times, now, self.window);

		let used = times.len() as u32;
		if used >= limit {
			let retry_after = times
				.front()
				.map(|oldest| (*oldest + self.window).saturating_duration_since(now));
			debug!(used, limit, "Rate limit exceeded");
			return Decision {
				allowed: false,
				remaining: 0,
				retry_after,
			};
		}

		times.push_back(now);
		Decision {
			allowed: true,
			remaining: limit - used - 1,
			retry_after: None,
		}
	}

	/// Drop request instants that left the window and forget idle keys.
	/// Returns how many keys were removed.
	pub async fn prune(&self) -> usize {
		let now = self.clock.now();
		let mut requests = self.requests.lock().await;
		let before = requests.len();
		requests.retain(|_, times| {
			evict_expired(times, now, self.window);
			!times.is_empty()
		});
		before - requests.len()
	}

	/// Number of keys currently tracked.
	pub async fn tracked_keys(&self) -> usize {
		self.requests.lock().await.len()
	}

	/// Prune on a fixed interval for the life of the process.
	pub fn spawn_prune_task(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			ticker.tick().await;

			loop {
				ticker.tick().await;
				let removed = self.prune().await;
				if removed > 0 {
					debug!(removed, "Pruned idle rate limit keys");
				}
			}
		})
	}
}

fn evict_expired(times: &mut VecDeque<Instant>, now: Instant, window: Duration) {
	while let Some(oldest) = times.front() {
		if now.saturating_duration_since(*oldest) < window {
			break;
		}
		times.pop_front();
	}
}
