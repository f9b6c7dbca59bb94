//! Census: exports addresses and agent records from chain state, and derives
//! avatar addresses from agent addresses.

pub mod address;
pub mod bencodex;
pub mod commands;
pub mod config;
pub mod derive;
pub mod error;
pub mod observer;
pub mod predicate;
pub mod progress;
pub mod scanner;
pub mod store;
pub mod store_writer;
pub mod telemetry;
pub mod trie;


pub use address::Address;
pub use error::{CensusError, Result};
