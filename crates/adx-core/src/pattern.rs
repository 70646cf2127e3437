//! Blocked pattern validation
//!
//! A pattern is what the user typed into the custom blocking box: a bare
//! domain fragment (`ads.example.com`), a full URL (`https://ads.test/x`),
//! or either of those with `*` wildcards.

use crate::types::{MAX_PATTERN_LEN, WILDCARD};
use crate::url::{extract_web_scheme, is_web_url};

/// Why a pattern was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("URL cannot be empty")]
    EmptyPattern,
    #[error("URL is too long ({len} characters, maximum is {max})")]
    TooLong { len: usize, max: usize },
    #[error("This URL is already blocked")]
    Duplicate,
    #[error("Invalid URL or domain format")]
    InvalidFormat,
}

/// Whether the pattern carries a wildcard marker.
#[inline]
pub fn has_wildcard(pattern: &str) -> bool {
    pattern.contains(WILDCARD)
}

/// Domain-ish check for patterns without a web scheme: at least one `.` or a
/// wildcard.
#[inline]
pub fn is_plausible_domain(pattern: &str) -> bool {
    pattern.contains('.') || has_wildcard(pattern)
}

/// Check the shape of an already trimmed pattern.
///
/// Strings starting with `http://` or `https://` must be well-formed URLs
/// unless they carry a wildcard. Everything else must look like a domain.
/// Only printable ASCII is accepted; internationalized domains must be
/// entered punycoded.
pub fn check_format(pattern: &str) -> Result<(), ValidationError> {
    if !pattern.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(ValidationError::InvalidFormat);
    }
    // Passed through verbatim, and the host refuses this prefix
    if pattern.starts_with("||*") {
        return Err(ValidationError::InvalidFormat);
    }

    let well_formed = if extract_web_scheme(pattern).is_some() {
        is_web_url(pattern) || has_wildcard(pattern)
    } else {
        is_plausible_domain(pattern)
    };

    if well_formed {
        Ok(())
    } else {
        Err(ValidationError::InvalidFormat)
    }
}

/// Validate a raw pattern against the current list.
///
/// Returns the trimmed pattern that should be stored. Checks run in order:
/// empty, too long, duplicate (exact, case-sensitive), format.
pub fn validate_pattern<'a, 'b>(
    raw: &'a str,
    existing: impl IntoIterator<Item = &'b str>,
    max_len: usize,
) -> Result<&'a str, ValidationError> {
    let pattern = raw.trim();
    if pattern.is_empty() {
        return Err(ValidationError::EmptyPattern);
    }

    let len = pattern.chars().count();
    if len > max_len {
        return Err(ValidationError::TooLong { len, max: max_len });
    }

    if existing.into_iter().any(|p| p == pattern) {
        return Err(ValidationError::Duplicate);
    }

    check_format(pattern)?;
    Ok(pattern)
}

/// [`validate_pattern`] with the default length limit.
pub fn validate_pattern_default<'a, 'b>(
    raw: &'a str,
    existing: impl IntoIterator<Item = &'b str>,
) -> Result<&'a str, ValidationError> {
    validate_pattern(raw, existing, MAX_PATTERN_LEN)
}
