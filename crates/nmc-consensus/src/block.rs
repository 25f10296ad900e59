//! Block-level drivers for the name subsystem.
//!
//! Within a block, name operations apply in transaction order and
//! outputs in index order; expirations apply after all transactions.  On
//! disconnect the order is reversed exactly: transaction undo records in
//! reverse, then the unexpirations.

use crate::apply::{apply_name_tx, expire_names, undo_name_op, unexpire_names};
use bitcoin::Transaction;
use nmc_primitives::{BlockUndo, ChainParams, Name};
use nmc_state::{Error, NameStore, Result, StateCache, StateView};
use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;

/// Apply the name side of a block: every transaction's name operations,
/// then the expirations for this height.
///
/// The caller has already validated the block and applied its coin
/// changes to `cache`.  Returns the block's name undo data and the set
/// of expired names (for mempool eviction).
pub fn apply_block<V: StateView>(
    height: u32,
    txs: &[Transaction],
    cache: &mut StateCache<V>,
    params: &ChainParams,
) -> Result<(BlockUndo, BTreeSet<Name>)> {
    let mut undo = BlockUndo::new();
    for tx in txs {
        apply_name_tx(tx, height, cache, &mut undo, params)?;
    }
    let expired = expire_names(height, cache, &mut undo, params)?;
    Ok((undo, expired))
}

/// Disconnect the name side of a block: undo records in reverse, then
/// the unexpirations.  Returns the set of un-expired names (for mempool
/// eviction).
pub fn undo_block<V: StateView>(
    height: u32,
    undo: &BlockUndo,
    cache: &mut StateCache<V>,
    params: &ChainParams,
) -> Result<BTreeSet<Name>> {
    for op in undo.name_ops.iter().rev() {
        undo_name_op(op, cache)?;
    }
    unexpire_names(height, undo, cache, params)
}

/// Whether the database check runs at this height given the configured
/// cadence: `-1` disabled, `0` every flush, `k > 0` every k-th block and
/// never on disconnect.
pub fn should_check_name_db(option: i32, height: u32, disconnect: bool) -> bool {
    match option {
        k if k < 0 => false,
        0 => true,
        k => !disconnect && height % (k as u32) == 0,
    }
}

/// The era in which the production chain's database is known to be
/// inconsistent: the name stealing spends name coins without touching
/// the name database, until the affected names expire.
pub fn in_name_stealing_window(height: u32) -> bool {
    (139_000..=180_000).contains(&height)
}

/// Run the configured name database check: flush the cache and cross-
/// check the persistent tables against the UTXO set.
///
/// Inside the name-stealing window a mismatch is reported but tolerated
/// (`Ok(false)`); outside it, a mismatch means the database is corrupt
/// and an error is returned so the host aborts.
pub fn check_name_db(
    store: &NameStore,
    cache: &mut StateCache<&NameStore>,
    height: u32,
    params: &ChainParams,
    disconnect: bool,
    interrupt: &AtomicBool,
) -> Result<bool> {
    if !should_check_name_db(store.settings().check_name_db, height, disconnect) {
        return Ok(true);
    }

    cache.flush(store)?;
    if store.validate_name_db(height, params, interrupt)? {
        return Ok(true);
    }

    tracing::error!("Name database is inconsistent at height {height}");
    if in_name_stealing_window(height) {
        tracing::warn!("This is expected due to 'name stealing'");
        return Ok(false);
    }

    Err(Error::Corruption(
        "name database is inconsistent".to_string(),
    ))
}
