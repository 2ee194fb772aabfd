//! Registration prefix → nationality label resolution.
//!
//! The prefix table is an offline-built mapping such as `"CS" → "Portuguese"`.
//! Prefixes overlap across countries (`P` and `PK`, `C` and `CS`), so the
//! longest matching prefix wins.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::Result;

/// Label added for hyphenless registrations beginning with `Z`.
pub const MILITARY_Z_LABEL: &str = "British(?) military";

const BUILTIN_PREFIXES: &str = include_str!("../data/registration_prefixes.json");

/// One prefix table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixEntry<'a> {
    pub prefix: &'a str,
    pub label: &'a str,
}

/// Registration prefix table, ordered by prefix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrefixTable {
    entries: BTreeMap<String, String>,
}

impl PrefixTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The table shipped with the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_PREFIXES)
    }

    /// Parse a JSON object of `prefix: label` pairs.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Insert or replace the label for `prefix`. Empty prefixes are ignored.
    pub fn insert(&mut self, prefix: impl Into<String>, label: impl Into<String>) {
        let prefix = prefix.into();
        if !prefix.is_empty() {
            self.entries.insert(prefix, label.into());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry with the longest prefix that starts `registration`.
    pub fn longest_match(&self, registration: &str) -> Option<PrefixEntry<'_>> {
        self.entries
            .iter()
            .filter(|(prefix, _)| !prefix.is_empty() && registration.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(prefix, label)| PrefixEntry {
                prefix: prefix.as_str(),
                label: label.as_str(),
            })
    }
}

/// Nationality label for a registration, `""` when nothing matches.
///
/// Matching is exact and case-sensitive. The longest matching prefix supplies
/// the label; the military label is joined on with `/`.
pub fn nationality_for(registration: &str, table: &PrefixTable) -> String {
    let mut labels: Vec<&str> = table
        .longest_match(registration)
        .map(|entry| entry.label)
        .into_iter()
        .collect();

    if !registration.contains('-') && registration.starts_with('Z') {
        labels.push(MILITARY_Z_LABEL);
    }

    labels.join("/")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
