// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sha2::{Digest, Sha256};

/// Lowercase hex sha256.
pub fn sha256_hex(data: &[u8]) -> String {
	hex::encode(Sha256::digest(data))
}

/// Compare a stored hex digest with fresh bytes.
pub fn matches_sha256(expected_hex: &str, data: &[u8]) -> bool {
	sha256_hex(data).eq_ignore_ascii_case(expected_hex)
}
