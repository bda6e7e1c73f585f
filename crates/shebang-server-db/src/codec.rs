// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Column encodings shared by the repositories.
//!
//! Timestamps are stored as RFC 3339 text with fixed nanosecond precision
//! and a `Z` suffix so that string comparison in SQL matches time order and
//! a value read back equals the value written.

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::error::DbError;

pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
	ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, DbError> {
	DateTime::parse_from_rfc3339(value)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| DbError::Internal(format!("Invalid {field}: {e}")))
}

pub(crate) fn parse_opt_timestamp(
	field: &str,
	value: Option<String>,
) -> Result<Option<DateTime<Utc>>, DbError> {
	value.map(|s| parse_timestamp(field, &s)).transpose()
}

pub(crate) fn parse_id<T: From<Uuid>>(field: &str, value: &str) -> Result<T, DbError> {
	Uuid::parse_str(value)
		.map(T::from)
		.map_err(|e| DbError::Internal(format!("Invalid {field} UUID: {e}")))
}

pub(crate) fn to_u32(field: &str, value: i64) -> Result<u32, DbError> {
	u32::try_from(value).map_err(|_| DbError::Internal(format!("{field} out of range: {value}")))
}
