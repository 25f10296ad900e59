//! Consensus rules for the naming subsystem.
//!
//! Every rule here is consensus-critical: a node that disagrees with the
//! network on any of them forks off the chain.  The crate provides the
//! transaction-level validator ([`check_name_tx`]), the chain mutator
//! ([`apply_name_tx`], [`expire_names`], [`unexpire_names`] and their
//! block-level drivers) and the `-checknamedb` cadence around the
//! database verifier.
//!
//! The validator is a pure function over an injected read-only view and
//! never panics; it returns a typed rejection.  The mutator runs after
//! validation and treats internal inconsistency (a missing name during
//! expiry, a wrong outpoint, a double unexpire) as fatal database
//! corruption.

mod apply;
mod block;
mod check;
mod error;

pub use apply::{apply_name_tx, expire_names, undo_name_op, unexpire_names};
pub use block::{apply_block, check_name_db, in_name_stealing_window, should_check_name_db, undo_block};
pub use check::{check_name_tx, CheckMode};
pub use error::NameTxError;
