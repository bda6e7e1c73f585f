// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Time sources for the limiter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
	fn now(&self) -> Instant;
}

/// Monotonic wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> Instant {
		Instant::now()
	}
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
	origin: Instant,
	elapsed_ms: AtomicU64,
}

impl ManualClock {
	pub fn new() -> Self {
		Self {
			origin: Instant::now(),
			elapsed_ms: AtomicU64::new(0),
		}
	}

	pub fn advance(&self, by: Duration) {
		self
			.elapsed_ms
			.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
	}
}

impl Default for ManualClock {
	fn default() -> Self {
		Self::new()
	}
}

impl Clock for ManualClock {
	fn now(&self) -> Instant {
		self.origin + Duration::from_millis(self.elapsed_ms.load(Ordering::SeqCst))
	}
}
