// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections.

mod database;
mod kms;
mod logging;
mod ratelimit;
mod scripts;
mod storage;
mod vault;

pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use kms::{KmsBackend, KmsConfig, KmsConfigLayer, TransitConfig, TransitConfigLayer};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
pub use ratelimit::{RateLimitConfig, RateLimitConfigLayer};
pub use scripts::{ScriptsConfig, ScriptsConfigLayer};
pub use storage::{StorageBackend, StorageConfig, StorageConfigLayer};
pub use vault::{VaultConfig, VaultConfigLayer};
