use thiserror::Error;

/// Every failure a census run can end with.
///
/// None of these are retried. A scan or derivation batch that hits one stops
/// and hands it to the caller; output written so far stays where it is.
#[derive(Debug, Error)]
pub enum CensusError {
    #[error("store error: {0}")]
    Store(#[from] rocksdb::Error),

    /// The store cannot be used at all: bad location, missing canonical chain,
    /// protocol version or trie metadata that does not check out.
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("malformed address {input:?}: {reason}")]
    MalformedAddress { input: String, reason: String },

    /// A batch input line failed to parse. `line` is 1-based.
    #[error("line {line}: {source}")]
    MalformedInput {
        line: u64,
        #[source]
        source: Box<CensusError>,
    },

    /// A record matched its marker but the field we extract has the wrong shape.
    #[error("field {field:?} has unexpected shape: expected {expected}, found {found}")]
    ExtractionShape {
        field: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error("decode error at offset {offset}: {reason}")]
    Decode { offset: usize, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("config error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CensusError {
    pub fn precondition(message: impl Into<String>) -> Self {
        CensusError::Precondition(message.into())
    }

    pub fn decode(offset: usize, reason: impl Into<String>) -> Self {
        CensusError::Decode { offset, reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, CensusError>;
