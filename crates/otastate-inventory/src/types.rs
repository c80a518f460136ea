//! Inventory type definitions

use std::collections::TryReserveError;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

/// A single inventory attribute
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InventoryEntry {
    /// Attribute name
    pub name: String,
    /// Attribute value, may be empty
    pub value: String,
}

impl InventoryEntry {
    /// Create a new entry
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Bytes owned by this entry's name and value
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.name.len() + self.value.len()
    }

    /// Deep copy with fallible allocation
    ///
    /// Either both fields are copied or the error is returned; a half-copied
    /// entry is never produced.
    pub(crate) fn try_clone(&self) -> Result<Self, TryReserveError> {
        Ok(Self {
            name: try_copy_str(&self.name)?,
            value: try_copy_str(&self.value)?,
        })
    }
}

fn try_copy_str(source: &str) -> Result<String, TryReserveError> {
    let mut copy = String::new();
    copy.try_reserve_exact(source.len())?;
    copy.push_str(source);
    Ok(copy)
}

/// Ordered list of inventory attributes with an explicit length
///
/// Name uniqueness is not enforced; publish order is not significant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InventoryList {
    entries: Vec<InventoryEntry>,
}

impl InventoryList {
    /// Create an empty list
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn push(&mut self, entry: InventoryEntry) {
        self.entries.push(entry);
    }

    /// Entries as a slice
    #[must_use]
    pub fn as_slice(&self) -> &[InventoryEntry] {
        &self.entries
    }

    /// Look up the first entry with the given name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.value.as_str())
    }

    /// Bytes owned by all names and values
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.entries.iter().map(InventoryEntry::byte_len).sum()
    }

    pub(crate) fn with_entries(entries: Vec<InventoryEntry>) -> Self {
        Self { entries }
    }
}

impl Deref for InventoryList {
    type Target = [InventoryEntry];

    fn deref(&self) -> &Self::Target {
        &self.entries
    }
}

impl From<Vec<InventoryEntry>> for InventoryList {
    fn from(entries: Vec<InventoryEntry>) -> Self {
        Self { entries }
    }
}

impl FromIterator<InventoryEntry> for InventoryList {
    fn from_iter<I: IntoIterator<Item = InventoryEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for InventoryList {
    type Item = InventoryEntry;
    type IntoIter = std::vec::IntoIter<InventoryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a InventoryList {
    type Item = &'a InventoryEntry;
    type IntoIter = std::slice::Iter<'a, InventoryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
