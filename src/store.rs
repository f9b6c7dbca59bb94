/// Chain store access (read-only)
///
/// The store is a RocksDB database laid out in four column families:
///
///   chain_metadata  "canonical_chain_id" -> 16-byte chain id
///                   chain id ‖ index (u64 BE) -> 32-byte block hash
///   blocks          block hash -> bincode BlockDigest
///   trie_metadata   trie root hash -> bincode TrieMetadata
///   states          trie root hash ‖ trie key -> Bencodex value
///
/// Every trie lives under its root hash in `states`. The world trie maps
/// 20-byte account addresses to a binary value holding that account's own
/// trie root. Opening never writes; the database is opened read-only.

use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};
use rocksdb::{ColumnFamily, Direction, IteratorMode, Options, DB};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;
use url::Url;

use crate::address::Address;
use crate::bencodex::Value;
use crate::error::{CensusError, Result};
use crate::trie::{Trie, TrieEntry, TrieIter};

pub const CF_CHAIN_METADATA: &str = "chain_metadata";
pub const CF_BLOCKS: &str = "blocks";
pub const CF_TRIE_METADATA: &str = "trie_metadata";
pub const CF_STATES: &str = "states";

pub const COLUMN_FAMILIES: &[&str] = &[CF_CHAIN_METADATA, CF_BLOCKS, CF_TRIE_METADATA, CF_STATES];

pub const CANONICAL_CHAIN_KEY: &[u8] = b"canonical_chain_id";

/// Oldest block protocol version whose state is organised as a world trie.
pub const MIN_PROTOCOL_VERSION: i32 = 5;

pub const HASH_SIZE: usize = 32;
pub const CHAIN_ID_SIZE: usize = 16;

pub type ChainId = [u8; CHAIN_ID_SIZE];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDigest {
    pub index: u64,
    pub hash: [u8; HASH_SIZE],
    pub protocol_version: i32,
    pub state_root_hash: [u8; HASH_SIZE],
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrieMetadata {
    pub version: i32,
}

/// Root hash of a trie with no entries.
pub fn empty_root_hash() -> [u8; HASH_SIZE] {
    to_hash(&Sha256::digest(b""))
}

pub(crate) fn to_hash(digest: &[u8]) -> [u8; HASH_SIZE] {
    let mut hash = [0u8; HASH_SIZE];
    hash.copy_from_slice(&digest[..HASH_SIZE]);
    hash
}

/// Key of a block hash in `chain_metadata`.
pub fn chain_index_key(chain_id: &ChainId, index: u64) -> [u8; CHAIN_ID_SIZE + 8] {
    let mut key = [0u8; CHAIN_ID_SIZE + 8];
    key[..CHAIN_ID_SIZE].copy_from_slice(chain_id);
    BigEndian::write_u64(&mut key[CHAIN_ID_SIZE..], index);
    key
}

/// Resolve a store location to a filesystem path.
///
/// Accepts `rocksdb+file://<path>`, `file://<path>` (query strings dropped,
/// percent-escapes decoded) or a bare path with `~` expansion.
pub fn parse_store_uri(uri: &str) -> Result<PathBuf> {
    let uri = uri.trim();
    if uri.is_empty() {
        return Err(CensusError::precondition("empty store path"));
    }

    if let Some((scheme, rest)) = uri.split_once("://") {
        return match scheme {
            "rocksdb+file" | "file" => {
                let path = rest.split('?').next().unwrap_or(rest);
                if path.is_empty() {
                    return Err(CensusError::precondition(format!("no path in store URI {}", uri)));
                }
                Url::parse(&format!("file://{}", rest))
                    .ok()
                    .and_then(|url| url.to_file_path().ok())
                    .ok_or_else(|| CensusError::precondition(format!("invalid store URI {}", uri)))
            }
            other => Err(CensusError::precondition(format!(
                "unsupported store URI scheme {:?} in {}",
                other, uri
            ))),
        };
    }

    Ok(PathBuf::from(shellexpand::tilde(uri).into_owned()))
}

pub struct ChainStore {
    db: DB,
    path: PathBuf,
}

impl ChainStore {
    /// Open the store a location URI points at.
    pub fn open(uri: &str) -> Result<Self> {
        let path = parse_store_uri(uri)?;
        Self::open_path(&path)
    }

    pub fn open_path(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(CensusError::precondition(format!(
                "store not found at {}",
                path.display()
            )));
        }

        let opts = Options::default();
        let db = DB::open_cf_for_read_only(&opts, path, COLUMN_FAMILIES, false).map_err(|e| {
            CensusError::precondition(format!("failed to open store at {}: {}", path.display(), e))
        })?;

        info!(path = %path.display(), "Store opened read-only");
        Ok(Self { db, path: path.to_path_buf() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| CensusError::precondition(format!("{} column family not found", name)))
    }

    pub fn canonical_chain_id(&self) -> Result<ChainId> {
        let cf = self.cf(CF_CHAIN_METADATA)?;
        let raw = self
            .db
            .get_cf(cf, CANONICAL_CHAIN_KEY)?
            .ok_or_else(|| CensusError::precondition("Failed to load canonical chain from store"))?;
        raw.as_slice()
            .try_into()
            .map_err(|_| CensusError::precondition(format!("canonical chain id has {} bytes", raw.len())))
    }

    pub fn block_hash(&self, chain_id: &ChainId, index: u64) -> Result<Option<[u8; HASH_SIZE]>> {
        let cf = self.cf(CF_CHAIN_METADATA)?;
        match self.db.get_cf(cf, chain_index_key(chain_id, index))? {
            Some(raw) if raw.len() == HASH_SIZE => Ok(Some(to_hash(&raw))),
            Some(raw) => Err(CensusError::precondition(format!(
                "block hash at index {} has {} bytes",
                index,
                raw.len()
            ))),
            None => Ok(None),
        }
    }

    pub fn block(&self, hash: &[u8; HASH_SIZE]) -> Result<BlockDigest> {
        let cf = self.cf(CF_BLOCKS)?;
        let raw = self.db.get_cf(cf, hash)?.ok_or_else(|| {
            CensusError::precondition(format!("block {} not found", hex::encode(hash)))
        })?;
        Ok(bincode::deserialize(&raw)?)
    }

    /// Highest block on the canonical chain. Requires the genesis block to be
    /// indexed.
    pub fn tip(&self) -> Result<BlockDigest> {
        let chain_id = self.canonical_chain_id()?;
        if self.block_hash(&chain_id, 0)?.is_none() {
            return Err(CensusError::precondition("Failed to load genesis block from store"));
        }

        let cf = self.cf(CF_CHAIN_METADATA)?;
        let upper = chain_index_key(&chain_id, u64::MAX);
        let mut iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&upper, Direction::Reverse));

        let tip_hash = match iter.next() {
            Some(item) => {
                let (key, value) = item?;
                if key.len() != upper.len() || !key.starts_with(&chain_id) || value.len() != HASH_SIZE {
                    return Err(CensusError::precondition("canonical chain index is corrupt"));
                }
                to_hash(&value)
            }
            None => return Err(CensusError::precondition("canonical chain has no blocks")),
        };

        let tip = self.block(&tip_hash)?;
        info!(
            block_index = tip.index,
            block_hash = %hex::encode(tip.hash),
            state_root_hash = %hex::encode(tip.state_root_hash),
            "Chain loaded"
        );
        Ok(tip)
    }

    pub fn trie_metadata(&self, root: &[u8; HASH_SIZE]) -> Result<Option<TrieMetadata>> {
        let cf = self.cf(CF_TRIE_METADATA)?;
        match self.db.get_cf(cf, root)? {
            Some(raw) => Ok(Some(bincode::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn state_trie(&self, root: [u8; HASH_SIZE]) -> Result<StateTrie<'_>> {
        Ok(StateTrie { db: &self.db, cf: self.cf(CF_STATES)?, root })
    }

    /// World state at `tip`, after checking protocol version and trie
    /// metadata agree.
    pub fn world_trie(&self, tip: &BlockDigest) -> Result<WorldTrie<'_>> {
        if tip.protocol_version < MIN_PROTOCOL_VERSION {
            return Err(CensusError::precondition(format!(
                "Invalid block protocol version: {}",
                tip.protocol_version
            )));
        }
        info!(protocol_version = tip.protocol_version, "Block protocol version confirmed");

        match self.trie_metadata(&tip.state_root_hash)? {
            Some(metadata) if metadata.version == tip.protocol_version => {
                info!(version = metadata.version, "Trie metadata confirmed");
            }
            other => {
                return Err(CensusError::precondition(format!("Invalid trie metadata: {:?}", other)));
            }
        }

        Ok(WorldTrie { trie: self.state_trie(tip.state_root_hash)? })
    }
}

/// One trie stored under its root hash.
pub struct StateTrie<'a> {
    db: &'a DB,
    cf: &'a ColumnFamily,
    root: [u8; HASH_SIZE],
}

impl<'a> StateTrie<'a> {
    pub fn root(&self) -> [u8; HASH_SIZE] {
        self.root
    }

    fn state_key(&self, key: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(HASH_SIZE + key.len());
        full.extend_from_slice(&self.root);
        full.extend_from_slice(key);
        full
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Value>> {
        match self.db.get_cf(self.cf, self.state_key(key))? {
            Some(raw) => Ok(Some(Value::decode(&raw)?)),
            None => Ok(None),
        }
    }
}

impl<'a> Trie for StateTrie<'a> {
    fn hash(&self) -> [u8; 32] {
        self.root
    }

    fn iterate_values(&self) -> TrieIter<'_> {
        let root = self.root;
        let iter = self
            .db
            .iterator_cf(self.cf, IteratorMode::From(&root, Direction::Forward));

        Box::new(iter.map_while(move |item| -> Option<Result<TrieEntry>> {
            match item {
                Ok((key, raw)) if key.starts_with(&root) => Some(
                    Value::decode(&raw).map(|value| (key[HASH_SIZE..].to_vec(), value)),
                ),
                Ok(_) => None,
                Err(e) => Some(Err(CensusError::Store(e))),
            }
        }))
    }
}

/// Account address -> account trie root.
pub struct WorldTrie<'a> {
    trie: StateTrie<'a>,
}

impl<'a> WorldTrie<'a> {
    pub fn root(&self) -> [u8; HASH_SIZE] {
        self.trie.root()
    }

    pub fn as_trie(&self) -> &StateTrie<'a> {
        &self.trie
    }

    /// Trie of `address`. An account never written to has an empty trie.
    pub fn account_trie(&self, address: &Address) -> Result<StateTrie<'a>> {
        let root = match self.trie.get(address.as_bytes())? {
            Some(Value::Binary(raw)) if raw.len() == HASH_SIZE => to_hash(&raw),
            Some(other) => {
                return Err(CensusError::precondition(format!(
                    "account {} root is {}, not a {}-byte binary",
                    address, other, HASH_SIZE
                )))
            }
            None => empty_root_hash(),
        };

        Ok(StateTrie { db: self.trie.db, cf: self.trie.cf, root })
    }
}
