// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Access evaluation for script content.
//!
//! Decisions are pure functions of the script, the requester and the
//! [`AccessFacts`] loaded for this request. Facts are never cached between
//! requests, so a revoked token or expired grant stops working immediately.
//!
//! Rules apply in a fixed order:
//!
//! 1. The owner is always allowed.
//! 2. Public scripts are readable by anyone.
//! 3. Private scripts are denied unless a non-revoked share token for the
//!    script is presented, or the caller asks for ciphertext of encrypted
//!    content (only private-key holders can use it).
//! 4. Unlisted scripts are readable through an active link grant, or an active
//!    user grant naming the requester.

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::ids::UserId;
use crate::types::{AccessGrant, ContentEncoding, GrantSubject, Script, ShareToken, Visibility};

/// Per-request inputs to the evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessFacts<'a> {
	/// All grants recorded for the script, active or not.
	pub grants: &'a [AccessGrant],
	/// The share token presented with the request, if it resolved to a row.
	pub share_token: Option<&'a ShareToken>,
}

/// Which rule let the request through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessReason {
	Owner,
	Public,
	ShareToken,
	EncryptedCiphertext,
	LinkGrant,
	UserGrant,
}

/// Evaluate the plaintext rules and report the matching rule.
pub fn evaluate(
	script: &Script,
	requester: Option<UserId>,
	facts: AccessFacts<'_>,
	now: DateTime<Utc>,
) -> Option<AccessReason> {
	if requester.is_some_and(|user| script.is_owned_by(user)) {
		return Some(AccessReason::Owner);
	}

	match script.visibility {
		Visibility::Public => Some(AccessReason::Public),
		Visibility::Private => facts
			.share_token
			.filter(|token| token.is_valid_for(script.id))
			.map(|_| AccessReason::ShareToken),
		Visibility::Unlisted => evaluate_unlisted(script, requester, facts.grants, now),
	}
}

fn evaluate_unlisted(
	script: &Script,
	requester: Option<UserId>,
	grants: &[AccessGrant],
	now: DateTime<Utc>,
) -> Option<AccessReason> {
	let active = grants
		.iter()
		.filter(|grant| grant.script_id == script.id && grant.is_active(now));

	let mut reason = None;
	for grant in active {
		match grant.subject {
			GrantSubject::Link => return Some(AccessReason::LinkGrant),
			GrantSubject::User(grantee) if Some(grantee) == requester => {
				reason = Some(AccessReason::UserGrant);
			}
			GrantSubject::User(_) => {}
		}
	}
	reason
}

/// Whether `requester` may read the script's content.
#[instrument(
	level = "debug",
	skip_all,
	fields(
		script_id = %script.id,
		visibility = %script.visibility,
		requester = ?requester,
	)
)]
pub fn can_access(
	script: &Script,
	requester: Option<UserId>,
	facts: AccessFacts<'_>,
	now: DateTime<Utc>,
) -> bool {
	let reason = evaluate(script, requester, facts, now);
	tracing::debug!(reason = ?reason, allowed = reason.is_some(), "access evaluated");
	reason.is_some()
}

/// Whether `requester` may fetch the stored bytes of a version with
/// `encoding`. Extends [`can_access`] with the encrypted-private rule.
#[instrument(
	level = "debug",
	skip_all,
	fields(
		script_id = %script.id,
		visibility = %script.visibility,
		encrypted = encoding.is_encrypted(),
		requester = ?requester,
	)
)]
pub fn can_access_ciphertext(
	script: &Script,
	encoding: &ContentEncoding,
	requester: Option<UserId>,
	facts: AccessFacts<'_>,
	now: DateTime<Utc>,
) -> bool {
	let reason = evaluate(script, requester, facts, now).or_else(|| {
		(script.visibility == Visibility::Private && encoding.is_encrypted())
			.then_some(AccessReason::EncryptedCiphertext)
	});
	tracing::debug!(reason = ?reason, allowed = reason.is_some(), "ciphertext access evaluated");
	reason.is_some()
}
