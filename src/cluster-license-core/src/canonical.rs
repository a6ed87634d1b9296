//! Canonical byte form of a license, the input to its signature.
//!
//! The parsed fields are re-serialized as compact JSON in declared field
//! order with `signature` set to the empty string. Timestamps are written
//! in UTC with the fractional seconds trimmed of trailing zeros. Building
//! from fields rather than the stored bytes means reordering keys or
//! reformatting the stored document never changes what gets verified.

use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;

use crate::license::{LicenseDocument, Party};

/// Signed projection of a license: every field, signature blanked.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalLicense<'a> {
    license_id: &'a str,
    license_type: &'a str,
    version: i64,
    subject: &'a Party,
    issuer: &'a Party,
    not_before: String,
    not_after: String,
    issue_at: String,
    max_cluster: u64,
    max_node: u64,
    max_core: u64,
    signature: &'static str,
}

/// `2021-11-23T11:55:32.793746Z`: no fraction when whole, otherwise up to
/// nanoseconds without trailing zeros.
fn timestamp(ts: &DateTime<Utc>) -> String {
    let mut out = ts.format("%Y-%m-%dT%H:%M:%S").to_string();

    let nanos = ts.nanosecond() % 1_000_000_000;
    if nanos != 0 {
        let fraction = format!("{nanos:09}");
        out.push('.');
        out.push_str(fraction.trim_end_matches('0'));
    }

    out.push('Z');
    out
}

/// Compute the canonical representation for signing.
///
/// # Errors
///
/// Returns error if JSON serialization fails.
pub fn canonical_bytes(doc: &LicenseDocument) -> Result<Vec<u8>, serde_json::Error> {
    let canonical = CanonicalLicense {
        license_id: &doc.license_id,
        license_type: &doc.license_type,
        version: doc.version,
        subject: &doc.subject,
        issuer: &doc.issuer,
        not_before: timestamp(&doc.not_before),
        not_after: timestamp(&doc.not_after),
        issue_at: timestamp(&doc.issue_at),
        max_cluster: doc.max_cluster,
        max_node: doc.max_node,
        max_core: doc.max_core,
        signature: "",
    };

    serde_json::to_vec(&canonical)
}
