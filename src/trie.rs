/// Ordered state traversal
///
/// The scanner needs one thing from a store: walk every entry of a trie in
/// ascending key order, once. `Trie` is that capability and nothing more.
/// Each call to `iterate_values` starts over from the first key; there is no
/// way to resume a traversal part way through.

use std::collections::BTreeMap;

use crate::bencodex::Value;
use crate::error::Result;

/// One stored entry: raw key bytes and the decoded value.
pub type TrieEntry = (Vec<u8>, Value);

pub type TrieIter<'a> = Box<dyn Iterator<Item = Result<TrieEntry>> + 'a>;

pub trait Trie {
    /// Root hash identifying this trie, for logs.
    fn hash(&self) -> [u8; 32];

    /// Every entry, keys strictly ascending.
    fn iterate_values(&self) -> TrieIter<'_>;
}

/// Trie held entirely in memory. Keys come out in `BTreeMap` order, which is
/// the byte order the store uses.
#[derive(Debug, Clone, Default)]
pub struct MemoryTrie {
    hash: [u8; 32],
    entries: BTreeMap<Vec<u8>, Value>,
}

impl MemoryTrie {
    pub fn new(hash: [u8; 32]) -> Self {
        Self { hash, entries: BTreeMap::new() }
    }

    pub fn insert(&mut self, key: impl Into<Vec<u8>>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<TrieEntry> for MemoryTrie {
    fn from_iter<I: IntoIterator<Item = TrieEntry>>(iter: I) -> Self {
        Self { hash: [0u8; 32], entries: iter.into_iter().collect() }
    }
}

impl Trie for MemoryTrie {
    fn hash(&self) -> [u8; 32] {
        self.hash
    }

    fn iterate_values(&self) -> TrieIter<'_> {
        Box::new(self.entries.iter().map(|(k, v)| Ok((k.clone(), v.clone()))))
    }
}
