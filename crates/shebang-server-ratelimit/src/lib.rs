// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-client request rate limiting.
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use shebang_server_ratelimit::{ManualClock, RateLimiter};
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # rt.block_on(async {
//! let clock = Arc::new(ManualClock::new());
//! let limiter = RateLimiter::new(clock.clone(), Duration::from_secs(60), 1);
//! assert!(limiter.check("203.0.113.7", false).await.allowed);
//! assert!(!limiter.check("203.0.113.7", false).await.allowed);
//!
//! clock.advance(Duration::from_secs(60));
//! assert!(limiter.check("203.0.113.7", false).await.allowed);
//! # });
//! ```

pub mod clock;
pub mod limiter;

pub use clock::{Clock, ManualClock, SystemClock};
pub use limiter::{Decision, RateLimiter};
