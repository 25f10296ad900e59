//! Record model and chain parameters for the name database.
//!
//! Everything here is consensus-critical: the per-name data record, the
//! history stack, the expire-index entry, undo records and the
//! height-indexed chain parameters (expiration schedule, name-coin value
//! floor and the historic-bug allowlist needed to replay the production
//! chain).

mod coin;
mod data;
mod expire;
mod params;
mod settings;
mod undo;

pub use coin::Coin;
pub use data::{NameData, NameHistory};
pub use expire::ExpireEntry;
pub use params::{BugType, ChainParams};
pub use settings::NameSettings;
pub use undo::{BlockUndo, NameTxUndo};

/// A name: an opaque byte string.
pub type Name = Vec<u8>;

/// Maximum length of a name in bytes.
pub const MAX_NAME_LENGTH: usize = 255;

/// Maximum length of a value in bytes at consensus level.
pub const MAX_VALUE_LENGTH: usize = 1023;

/// Maximum length of a value accepted at the user-input boundary.
pub const MAX_VALUE_LENGTH_UI: usize = 520;

/// Number of confirmations a NAME_NEW needs before its FIRSTUPDATE can be
/// mined.
pub const MIN_FIRSTUPDATE_DEPTH: u32 = 12;

/// Sentinel height for coins that are not yet mined.
pub const MEMPOOL_HEIGHT: u32 = 0x7FFF_FFFF;

/// Render a name for log output.  Names are opaque bytes; anything
/// non-UTF-8 is rendered lossily.
pub fn display_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}
