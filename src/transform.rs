//! Payload transformations.
//!
//! The XML document inside `XML_DATEN` is never parsed. All operations match
//! attribute patterns on the literal text so the original formatting of the
//! document survives untouched. Every operation is total and idempotent, and
//! leaves the text as it was when nothing matches.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::record::Payload;

/// A `Patient_ID` attribute whose digit value starts with at least one zero.
/// The trailing group always keeps one digit, so an all-zero value becomes `"0"`.
static PATIENT_ID_LEADING_ZEROS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Patient_ID="0+([0-9]+)""#).expect("Invalid Patient_ID regex")
});

/// Schema version attribute of the report document, e.g. `Schema_Version="2.2.3"`
static SCHEMA_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Schema_Version="([^"]*)""#).expect("Invalid Schema_Version regex")
});

/// Operations applied to a record payload by the feature policy.
///
/// The default implementation is [`PatternTransformer`]. Another implementation
/// (e.g. a structural XML editor) can be swapped in without touching the policy
/// or the pipeline.
pub trait PayloadTransformer: Send + Sync {
    /// Strip leading zeros from every numeric `Patient_ID` attribute.
    ///
    /// Returns `true` when the payload was changed.
    fn remove_leading_patient_id_zeros(&self, payload: &mut Payload) -> bool;

    /// Whether the document declares a major-version-2 oBDS schema
    fn is_obds_version_2x(&self, payload: &Payload) -> bool;
}

/// Regex-based transformer working on the literal XML text
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternTransformer;

impl PayloadTransformer for PatternTransformer {
    fn remove_leading_patient_id_zeros(&self, payload: &mut Payload) -> bool {
        match remove_leading_patient_id_zeros(&payload.xml_data) {
            Cow::Borrowed(_) => false,
            Cow::Owned(fixed) => {
                payload.xml_data = fixed;
                true
            }
        }
    }

    fn is_obds_version_2x(&self, payload: &Payload) -> bool {
        is_obds_version_2x(&payload.xml_data)
    }
}

/// Rewrite `Patient_ID="00001234"` to `Patient_ID="1234"` at every position.
///
/// Values that are already free of leading zeros, or that contain anything
/// other than digits, are not matched. Returns the input borrowed when there
/// was nothing to rewrite.
pub fn remove_leading_patient_id_zeros(xml: &str) -> Cow<'_, str> {
    PATIENT_ID_LEADING_ZEROS.replace_all(xml, r#"Patient_ID="${1}""#)
}

/// Check the first `Schema_Version` attribute for major version 2.
///
/// Documents without a version attribute, or whose first version attribute
/// has no numeric major component, are not considered oBDS 2.x.
pub fn is_obds_version_2x(xml: &str) -> bool {
    SCHEMA_VERSION
        .captures(xml)
        .and_then(|caps| major_version(caps.get(1)?.as_str()))
        .is_some_and(|major| major == 2)
}

fn major_version(version: &str) -> Option<u64> {
    let major = version.split('.').next()?;
    if major.is_empty() || !major.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    major.parse().ok()
}
