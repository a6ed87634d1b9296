//! Validity window checks.

use chrono::{DateTime, Utc};

use crate::license::LicenseDocument;

/// Where `now` falls relative to a license's validity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalVerdict {
    /// No verified document to check.
    Unchecked,
    /// `not_before <= now <= not_after`.
    Valid,
    /// `now > not_after`.
    Expired,
    /// `now < not_before`.
    NotYetValid,
}

/// Check a document's validity window.
///
/// Both bounds are inclusive. An inverted window (`not_after < not_before`)
/// is never valid; expiry is reported first so it cannot be mistaken for a
/// license that will become valid later.
#[must_use]
pub fn check(doc: &LicenseDocument, now: DateTime<Utc>) -> TemporalVerdict {
    if now > doc.not_after {
        TemporalVerdict::Expired
    } else if now < doc.not_before {
        TemporalVerdict::NotYetValid
    } else {
        TemporalVerdict::Valid
    }
}

/// First instant after `now` at which [`check`] can return a different verdict.
///
/// `None` when no later verdict change is representable.
#[must_use]
pub fn next_boundary(doc: &LicenseDocument, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match check(doc, now) {
        TemporalVerdict::NotYetValid => Some(doc.not_before),
        TemporalVerdict::Valid => doc
            .not_after
            .checked_add_signed(chrono::Duration::milliseconds(1)),
        TemporalVerdict::Expired | TemporalVerdict::Unchecked => None,
    }
}
