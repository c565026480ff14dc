// crates/swodlr-common/src/semver.rs
// ============================================================================
// Module: Semantic Versions
// Description: Lenient semantic-version extraction and ordering.
// Purpose: Rank SDS job-spec versions embedded in free-form labels.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Job-spec versions published to Mozart are free-form labels such as
//! `v1.2.3` or `release-1.2.3-hotfix`. [`SemVer::attempt_parse`] extracts the
//! first `major.minor.patch` run from such a label; labels without one (for
//! example branch names like `develop`) yield `None` and are ignored when
//! ranking versions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

// ============================================================================
// SECTION: Types
// ============================================================================

/// A `major.minor.patch` version triple.
///
/// # Invariants
/// - Ordering is lexicographic over `(major, minor, patch)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemVer {
    /// Major component.
    pub major: u64,
    /// Minor component.
    pub minor: u64,
    /// Patch component.
    pub patch: u64,
}

/// Strict version parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid semantic version: {0}")]
pub struct SemVerParseError(pub String);

impl SemVer {
    /// Creates a version from its components.
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Extracts the first `major.minor.patch` run found anywhere in `text`.
    ///
    /// Returns `None` when no such run exists or when a component does not fit
    /// in a `u64`.
    #[must_use]
    pub fn attempt_parse(text: &str) -> Option<Self> {
        let bytes = text.as_bytes();
        let mut start = 0;
        while start < bytes.len() {
            if bytes[start].is_ascii_digit() {
                if let Some(end) = match_at(bytes, start) {
                    return parse_triple(&text[start .. end]);
                }
                // Skip the rest of this digit run; a later start inside the
                // same run cannot match where the run start did not.
                while start < bytes.len() && bytes[start].is_ascii_digit() {
                    start += 1;
                }
                continue;
            }
            start += 1;
        }
        None
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemVer {
    type Err = SemVerParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let bytes = trimmed.as_bytes();
        match match_at(bytes, 0) {
            Some(end) if end == bytes.len() => {
                parse_triple(trimmed).ok_or_else(|| SemVerParseError(s.to_string()))
            }
            _ => Err(SemVerParseError(s.to_string())),
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Matches `digits '.' digits '.' digits` starting at `start`.
///
/// Returns the end offset of the match.
fn match_at(bytes: &[u8], start: usize) -> Option<usize> {
    let mut cursor = start;
    for component in 0 .. 3 {
        let digits_start = cursor;
        while cursor < bytes.len() && bytes[cursor].is_ascii_digit() {
            cursor += 1;
        }
        if cursor == digits_start {
            return None;
        }
        if component < 2 {
            if bytes.get(cursor) != Some(&b'.') {
                return None;
            }
            cursor += 1;
        }
    }
    Some(cursor)
}

/// Parses an already-matched `a.b.c` slice into a version.
fn parse_triple(text: &str) -> Option<SemVer> {
    let mut parts = text.splitn(3, '.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next()?.parse().ok()?;
    Some(SemVer::new(major, minor, patch))
}
