use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical IMDb identity, always stored in the textual `tt0114709` form.
///
/// The provider returns this as a `tt`-prefixed string while older catalog
/// dumps carried a bare numeric column, so construction accepts both
/// encodings and normalizes once instead of coercing ad hoc at each seam.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImdbId(String);

impl ImdbId {
    /// Parse either encoding: `"tt0114709"` or a bare numeric string.
    /// Returns None for anything that is not digits after the optional prefix.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let digits = trimmed.strip_prefix("tt").unwrap_or(trimmed);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        // IMDb ids are zero-padded to at least seven digits in the tt form.
        Some(Self(format!("tt{digits:0>7}")))
    }

    pub fn from_numeric(n: i64) -> Option<Self> {
        if n < 0 {
            return None;
        }
        Some(Self(format!("tt{n:07}")))
    }

    /// Numeric part, for stores that keep a BIGINT column.
    pub fn numeric(&self) -> Option<i64> {
        self.0.trim_start_matches("tt").parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImdbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
