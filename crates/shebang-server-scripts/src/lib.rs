// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! # shebang-server-scripts
//!
//! Script storage for the shebang server: immutable numbered versions with
//! tags, visibility and sharing, and optional hybrid encryption of private
//! content to a user's RSA public key.
//!
//! The server never holds a private key for encrypted scripts. Readers of a
//! private, encrypted script receive ciphertext and the wrapped content key,
//! which only the keypair holder can open.
//!
//! ## Components
//!
//! - [`ScriptService`]: scripts, versions, tags, visibility, grants and
//!   share tokens
//! - [`HybridScriptEncryptor`]: XChaCha20-Poly1305 content encryption with
//!   RSA-OAEP key wrapping
//! - [`KeyPairService`]: keypair generation and import

pub mod error;
pub mod hybrid;
pub mod keypair;
pub mod service;
pub mod sharing;

#[cfg(test)]
mod test_support;

pub use error::{ScriptsError, ScriptsResult};
pub use hybrid::{HybridScriptEncryptor, ProtectedContent};
pub use keypair::{GeneratedKey, KeyPairService};
pub use service::{ScriptLimits, ScriptService, SignatureStatus, VersionPayload, VersionUpload};
pub use sharing::SHARE_TOKEN_BYTES;
