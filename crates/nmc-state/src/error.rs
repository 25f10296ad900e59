//! Error types for the name state storage.

use bitcoin::OutPoint;

/// Errors that can occur while reading or mutating the name state.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// RocksDB error.
    #[error("RocksDB error: {0}")]
    Rocksdb(#[from] rocksdb::Error),

    /// Bincode serialization/deserialization error.
    #[error("Bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Coin not found when trying to spend it.
    #[error("Coin not found: {0}")]
    CoinNotFound(OutPoint),

    /// Name record not found where one must exist.
    #[error("Name not found: {0}")]
    NameNotFound(String),

    /// Storage opened without the expected column families.
    #[error("Storage not initialized")]
    NotInitialized,

    /// A long-running scan was cancelled cooperatively.
    #[error("Operation interrupted")]
    Interrupted,

    /// The database contradicts an invariant that block validation is
    /// supposed to uphold.  Continuing would fork off the network, so
    /// callers treat this as fatal.
    #[error("Name database corruption: {0}")]
    Corruption(String),
}
