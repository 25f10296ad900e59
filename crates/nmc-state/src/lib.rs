//! Name database storage for the naming chain.
//!
//! The name state is a second, independently indexed state machine layered
//! on top of the UTXO set.  This crate provides:
//!
//! - **Persistent store**: direct RocksDB storage (`NameStore`) with four
//!   logical tables: current names, the optional full history log, the
//!   expire index (keyed so that range scans by height work) and the slice
//!   of the UTXO set the name rules read.
//! - **Layered cache**: `NameCache` records additions, deletions, history
//!   edits and expire-index deltas; `StateCache` stacks the deltas on any
//!   read-only view and flushes them in a single atomic batch.
//! - **Consistency verifier**: a full forward scan cross-checking the
//!   three name tables against the UTXO set.

mod cache;
mod error;
mod layer;
mod store;
mod view;

pub use cache::NameCache;
pub use error::Error;
pub use layer::StateCache;
pub use store::NameStore;
pub use view::{MemoryView, StateView};

/// Result type for name state operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Column family names for RocksDB.
mod cf {
    /// Current name records.
    /// Key: name bytes.  Value: `NameData` (bincode).
    pub const NAMES: &str = "names";

    /// Per-name history stacks.  Only populated when history is enabled;
    /// an empty stack means the key is deleted.
    /// Key: name bytes.  Value: `NameHistory` (bincode).
    pub const HISTORY: &str = "name_history";

    /// The expire index.
    /// Key: update height (u32, big-endian) || name bytes.  Value: empty;
    /// presence is membership.  Big-endian heights make the lexicographic
    /// key order equal the numeric order, so expiring heights are one
    /// contiguous range scan.
    pub const EXPIRE: &str = "name_expire";

    /// Unspent outputs.
    /// Key: txid (32 bytes, raw) || vout (4 bytes, little-endian).
    /// Value: `Coin` (bincode).
    pub const UTXOS: &str = "utxos";

    /// Metadata.
    pub const META: &str = "meta";
}

/// Metadata keys.
mod meta_keys {
    pub const BEST_BLOCK: &[u8] = b"best_block";
}
