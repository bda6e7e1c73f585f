// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cryptographic primitives for script content and vault values.
//!
//! - [`aead`]: XChaCha20-Poly1305 with a random 24-byte nonce prepended
//! - [`wrap`]: RSA-OAEP(SHA-256) wrapping of ephemeral content keys
//! - [`keys`]: RSA keypair generation and PEM parsing
//! - [`signature`]: RSA-PSS verification of client signatures
//! - [`checksum`]: sha256 digests for content hashes and checksums

pub mod aead;
pub mod checksum;
pub mod error;
pub mod keys;
pub mod signature;
pub mod wrap;

pub use error::{CryptoError, CryptoResult};
pub use rsa::{RsaPrivateKey, RsaPublicKey};
