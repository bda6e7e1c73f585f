// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-user data keys and the secret vault.
//!
//! - [`UdekManager`]: creates, caches, rotates and re-wraps the per-user data
//!   key that seals vault values
//! - [`SecretVault`]: put/get/delete/list of named secrets with an
//!   append-only audit trail
//!
//! Neither type enforces request-level authorization; callers pass the
//! authenticated user id.

pub mod error;
pub mod udek;
pub mod vault;

pub use error::{SecretsError, SecretsResult};
pub use udek::{rewrap_all, PendingRotation, RewrapReport, UdekManager, UserDataKey};
pub use vault::{SecretValue, SecretVault, MAX_AUDIT_LIMIT};
