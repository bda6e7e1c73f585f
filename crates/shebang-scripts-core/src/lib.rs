// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for shebang scripts and the vault.
//!
//! This crate has no I/O. It defines identifiers, the records persisted by
//! `shebang-server-db`, name validation, and the access evaluator that gates
//! every script read.

pub mod access;
pub mod error;
pub mod ids;
pub mod types;
pub mod validate;

pub use access::{can_access, can_access_ciphertext, evaluate, AccessFacts, AccessReason};
pub use error::{CoreError, Result};
pub use ids::{GrantId, KeyPairId, ScriptId, SecretId, ShareTokenId, UdekId, UserId, VersionId};
pub use types::*;
pub use validate::{
	validate_keypair_name, validate_script_name, validate_secret_name, validate_tag_name,
};
