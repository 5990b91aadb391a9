//! Case-insensitive, insertion-ordered map.
//!
//! Keys keep the casing of their first occurrence for display and
//! iteration, while lookups go through a lowercased copy.

use std::collections::HashMap;

/// A map whose string keys compare case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseInsensitiveMap<V> {
    /// Entries in insertion order, with the key as first seen
    entries: Vec<(String, V)>,
    /// Lowercased key -> position in `entries`
    lookup: HashMap<String, usize>,
}

impl<V> Default for CaseInsensitiveMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            lookup: HashMap::new(),
        }
    }
}

fn fold(key: &str) -> String {
    key.to_lowercase()
}

impl<V> CaseInsensitiveMap<V> {
    /// Creates an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, returning the one it replaced.
    ///
    /// Replacing keeps the original key casing and position.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        match self.lookup.get(&fold(&key)) {
            Some(&idx) => Some(std::mem::replace(&mut self.entries[idx].1, value)),
            None => {
                self.lookup.insert(fold(&key), self.entries.len());
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Returns the value for `key`, inserting `default()` first if absent
    pub fn get_or_insert_with(&mut self, key: &str, default: impl FnOnce() -> V) -> &mut V {
        let idx = match self.lookup.get(&fold(key)) {
            Some(&idx) => idx,
            None => {
                let idx = self.entries.len();
                self.lookup.insert(fold(key), idx);
                self.entries.push((key.to_string(), default()));
                idx
            }
        };
        &mut self.entries[idx].1
    }

    /// Looks up a value by key, ignoring case
    pub fn get(&self, key: &str) -> Option<&V> {
        self.lookup.get(&fold(key)).map(|&idx| &self.entries[idx].1)
    }

    pub(crate) fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        let idx = *self.lookup.get(&fold(key))?;
        Some(&mut self.entries[idx].1)
    }

    /// Returns true if the key is present, ignoring case
    pub fn contains_key(&self, key: &str) -> bool {
        self.lookup.contains_key(&fold(key))
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the map holds no keys
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates keys in insertion order, as first seen
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Iterates values in insertion order
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_ignores_case() {
        let mut map = CaseInsensitiveMap::new();
        map.insert("sAMAccountName", 1);

        assert_eq!(map.get("samaccountname"), Some(&1));
        assert_eq!(map.get("SAMACCOUNTNAME"), Some(&1));
        assert!(map.contains_key("SamAccountName"));
        assert_eq!(map.get("cn"), None);
    }

    #[test]
    fn test_insert_keeps_first_casing_and_position() {
        let mut map = CaseInsensitiveMap::new();
        map.insert("objectClass", 1);
        map.insert("cn", 2);

        assert_eq!(map.insert("OBJECTCLASS", 3), Some(1));
        assert_eq!(map.len(), 2);
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["objectClass", "cn"]);
        assert_eq!(map.get("objectclass"), Some(&3));
    }

    #[test]
    fn test_get_or_insert_with_accumulates() {
        let mut map: CaseInsensitiveMap<Vec<&str>> = CaseInsensitiveMap::new();
        map.get_or_insert_with("member", Vec::new).push("a");
        map.get_or_insert_with("Member", Vec::new).push("b");

        assert_eq!(map.len(), 1);
        assert_eq!(map.get("MEMBER"), Some(&vec!["a", "b"]));
        assert_eq!(map.keys().next(), Some("member"));
    }
}
