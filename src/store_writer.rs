use std::collections::BTreeMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rocksdb::{Options, WriteBatch, DB};
use sha2::{Digest, Sha256};

use crate::address::Address;
use crate::bencodex::Value;
use crate::error::{CensusError, Result};
use crate::store::{
    chain_index_key, to_hash, BlockDigest, ChainId, TrieMetadata, CANONICAL_CHAIN_KEY,
    CF_BLOCKS, CF_CHAIN_METADATA, CF_STATES, CF_TRIE_METADATA, COLUMN_FAMILIES, HASH_SIZE,
};

/// Builds stores in the layout `ChainStore` reads.
///
/// Census itself never writes to a chain store; this exists to produce
/// fixtures and small stores for inspection.
pub struct ChainStoreWriter {
    db: DB,
    chain_id: ChainId,
    next_index: u64,
    previous_hash: [u8; HASH_SIZE],
}

impl ChainStoreWriter {
    /// Create a store at `path` and mark `chain_id` canonical.
    pub fn create(path: &Path, chain_id: ChainId) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = DB::open_cf(&opts, path, COLUMN_FAMILIES)?;
        let cf = db
            .cf_handle(CF_CHAIN_METADATA)
            .ok_or_else(|| CensusError::precondition("chain_metadata column family not found"))?;
        db.put_cf(cf, CANONICAL_CHAIN_KEY, chain_id)?;

        Ok(Self { db, chain_id, next_index: 0, previous_hash: [0u8; HASH_SIZE] })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| CensusError::precondition(format!("{} column family not found", name)))
    }

    /// Write a trie and return its root hash. The root is the SHA-256 of every
    /// length-prefixed key followed by its encoded value, in key order.
    pub fn put_trie<I>(&self, entries: I, metadata: Option<TrieMetadata>) -> Result<[u8; HASH_SIZE]>
    where
        I: IntoIterator<Item = (Vec<u8>, Value)>,
    {
        let sorted: BTreeMap<Vec<u8>, Vec<u8>> =
            entries.into_iter().map(|(k, v)| (k, v.encode())).collect();

        let mut hasher = Sha256::new();
        for (key, encoded) in &sorted {
            hasher.update((key.len() as u64).to_be_bytes());
            hasher.update(key);
            hasher.update(encoded);
        }
        let root = to_hash(&hasher.finalize());

        let states = self.cf(CF_STATES)?;
        let mut batch = WriteBatch::default();
        for (key, encoded) in &sorted {
            let mut full = Vec::with_capacity(HASH_SIZE + key.len());
            full.extend_from_slice(&root);
            full.extend_from_slice(key);
            batch.put_cf(states, full, encoded);
        }
        if let Some(metadata) = metadata {
            batch.put_cf(self.cf(CF_TRIE_METADATA)?, root, bincode::serialize(&metadata)?);
        }
        self.db.write(batch)?;

        Ok(root)
    }

    /// Write a world trie pointing each account at its trie root.
    pub fn put_world(
        &self,
        accounts: &BTreeMap<Address, [u8; HASH_SIZE]>,
        version: i32,
    ) -> Result<[u8; HASH_SIZE]> {
        let entries = accounts
            .iter()
            .map(|(address, root)| (address.as_bytes().to_vec(), Value::Binary(root.to_vec())));
        self.put_trie(entries, Some(TrieMetadata { version }))
    }

    /// Append a block to the canonical chain.
    pub fn append_block(&mut self, protocol_version: i32, state_root_hash: [u8; HASH_SIZE]) -> Result<BlockDigest> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(self.next_index.to_be_bytes());
        hasher.update(self.previous_hash);
        hasher.update(protocol_version.to_be_bytes());
        hasher.update(state_root_hash);
        hasher.update(timestamp.to_be_bytes());

        let block = BlockDigest {
            index: self.next_index,
            hash: to_hash(&hasher.finalize()),
            protocol_version,
            state_root_hash,
            timestamp,
        };

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_BLOCKS)?, block.hash, bincode::serialize(&block)?);
        batch.put_cf(self.cf(CF_CHAIN_METADATA)?, chain_index_key(&self.chain_id, block.index), block.hash);
        self.db.write(batch)?;

        self.next_index += 1;
        self.previous_hash = block.hash;
        Ok(block)
    }

    /// Flush everything to disk and close.
    pub fn finish(self) -> Result<()> {
        for name in COLUMN_FAMILIES {
            self.db.flush_cf(self.cf(name)?)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{empty_root_hash, ChainStore};
    use crate::trie::Trie;
    use tempfile::TempDir;

    #[test]
    fn test_empty_trie_root() {
        let dir = TempDir::new().unwrap();
        let writer = ChainStoreWriter::create(dir.path(), [1; 16]).unwrap();
        let root = writer.put_trie(Vec::new(), None).unwrap();
        assert_eq!(root, empty_root_hash());
    }

    #[test]
    fn test_root_depends_on_content() {
        let dir = TempDir::new().unwrap();
        let writer = ChainStoreWriter::create(dir.path(), [1; 16]).unwrap();
        let a = writer.put_trie(vec![(vec![1], Value::Null)], None).unwrap();
        let b = writer.put_trie(vec![(vec![1], Value::Boolean(true))], None).unwrap();
        let c = writer.put_trie(vec![(vec![1], Value::Null)], None).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_tries_do_not_bleed_into_each_other() {
        let dir = TempDir::new().unwrap();
        let writer = ChainStoreWriter::create(dir.path(), [1; 16]).unwrap();
        let a = writer
            .put_trie((0u8..3).map(|i| (vec![i], Value::Null)), None)
            .unwrap();
        let b = writer
            .put_trie((0u8..5).map(|i| (vec![i, i], Value::Null)), None)
            .unwrap();
        writer.finish().unwrap();

        let store = ChainStore::open_path(dir.path()).unwrap();
        let keys_a: Vec<_> = store.state_trie(a).unwrap().iterate_values().map(|e| e.unwrap().0).collect();
        let keys_b: Vec<_> = store.state_trie(b).unwrap().iterate_values().map(|e| e.unwrap().0).collect();
        assert_eq!(keys_a, vec![vec![0], vec![1], vec![2]]);
        assert_eq!(keys_b.len(), 5);
        assert_eq!(keys_b[4], vec![4, 4]);
    }
}
