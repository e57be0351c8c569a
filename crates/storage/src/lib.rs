use thiserror::Error;

pub mod dht;
pub mod memory;
pub mod traits;

pub use dht::*;
pub use memory::*;
pub use traits::*;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("No peers in routing table")]
    NoPeers,

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Common key prefix for all sample records
pub const SAMPLE_KEY_PREFIX: &str = "/das/sample";

/// Helper functions for encoding/decoding sample keys
///
/// The textual layout `/das/sample/{blockID}/{row|col}/{startingIndex}` is
/// relied upon by external tooling and must not change.
pub mod keys {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SampleKey {
        pub block_id: u64,
        pub is_row: bool,
        pub starting_index: usize,
    }

    pub fn axis(is_row: bool) -> &'static str {
        if is_row {
            "row"
        } else {
            "col"
        }
    }

    pub fn sample_key(block_id: u64, is_row: bool, starting_index: usize) -> String {
        format!(
            "{}/{}/{}/{}",
            SAMPLE_KEY_PREFIX,
            block_id,
            axis(is_row),
            starting_index
        )
    }

    pub fn block_prefix(block_id: u64) -> String {
        format!("{}/{}/", SAMPLE_KEY_PREFIX, block_id)
    }

    pub fn parse(key: &str) -> Result<SampleKey> {
        let invalid = || StorageError::InvalidKey(key.to_string());

        let rest = key
            .strip_prefix(SAMPLE_KEY_PREFIX)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(invalid)?;

        let mut parts = rest.split('/');
        let block_id = parts
            .next()
            .and_then(|p| p.parse::<u64>().ok())
            .ok_or_else(invalid)?;
        let is_row = match parts.next() {
            Some("row") => true,
            Some("col") => false,
            _ => return Err(invalid()),
        };
        let starting_index = parts
            .next()
            .and_then(|p| p.parse::<usize>().ok())
            .ok_or_else(invalid)?;

        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(SampleKey {
            block_id,
            is_row,
            starting_index,
        })
    }
}
