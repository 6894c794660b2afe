//! Region codes and the validated set every call is checked against.

use std::collections::BTreeSet;

use crate::error::{ApiError, Result};

/// Region codes accepted when no explicit set is configured.
pub const DEFAULT_REGIONS: &[&str] = &[
    "ir-thr-c2",
    "ir-thr-c3",
    "ir-thr-fr1",
    "ir-tbz-dc1",
    "ir-thr-mn1",
    "nl-ams-1",
    "de-fra-1",
];

/// A region code that has been checked against a [`RegionSet`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Region(String);

impl Region {
    /// Returns the region code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The set of region codes a client accepts.
///
/// Injected into every client instead of living in a global so tests can
/// supply their own fixtures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSet {
    codes: BTreeSet<String>,
}

impl Default for RegionSet {
    fn default() -> Self {
        Self::new(DEFAULT_REGIONS.iter().copied())
    }
}

impl RegionSet {
    /// Creates a set from the given codes. Blank entries are ignored.
    #[must_use]
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            codes: codes
                .into_iter()
                .map(|c| c.as_ref().trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }

    /// Parses a comma-separated list such as `ir-thr-c2,nl-ams-1`.
    #[must_use]
    pub fn from_csv(csv: &str) -> Self {
        Self::new(csv.split(','))
    }

    /// Returns true if the code is a member of the set.
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.codes.contains(code)
    }

    /// Checks a code and returns it as a [`Region`].
    ///
    /// # Errors
    ///
    /// Returns a validation error if the code is not in the set.
    pub fn validate(&self, code: &str) -> Result<Region> {
        if self.contains(code) {
            Ok(Region(code.to_string()))
        } else {
            Err(ApiError::validation(
                "region",
                format!("'{code}' is not one of: {}", self.to_csv()),
            )
            .into())
        }
    }

    /// Iterates the codes in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.codes.iter().map(String::as_str)
    }

    /// Returns the number of codes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Returns true if the set has no codes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    fn to_csv(&self) -> String {
        self.iter().collect::<Vec<_>>().join(", ")
    }
}
