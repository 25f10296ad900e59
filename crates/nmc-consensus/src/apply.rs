//! Applying and reversing name operations against the cached state.
//!
//! These routines run after validation.  Any inconsistency they detect
//! (a missing record during expiry, a wrong name coin script, a double
//! unexpire) means the database contradicts what validated blocks built,
//! so it surfaces as [`nmc_state::Error::Corruption`] and the host is
//! expected to abort.

use bitcoin::{OutPoint, Transaction};
use nmc_primitives::{
    display_name, BlockUndo, BugType, ChainParams, Name, NameData, NameTxUndo, MEMPOOL_HEIGHT,
};
use nmc_script::{is_name_transaction, NameScript};
use nmc_state::{Error, Result, StateCache, StateView};
use std::collections::BTreeSet;

/// Apply the name operations of one transaction, appending undo records
/// in output order.
pub fn apply_name_tx<V: StateView>(
    tx: &Transaction,
    height: u32,
    cache: &mut StateCache<V>,
    undo: &mut BlockUndo,
    params: &ChainParams,
) -> Result<()> {
    assert!(height != MEMPOOL_HEIGHT, "cannot apply at mempool height");

    let txid = tx.compute_txid();

    /* Historic bugs that must *not* be applied.  For fully ignored
       transactions the name outputs are marked spent as well; otherwise
       the UTXO set and the name database would drift apart.  */
    if let Some(bug) = params.historic_bug(&txid, height) {
        if bug != BugType::FullyApply {
            if bug == BugType::FullyIgnore {
                for (index, txout) in tx.output.iter().enumerate() {
                    let op = NameScript::parse(&txout.script_pubkey);
                    if op.is_any_update() {
                        let outpoint = OutPoint::new(txid, index as u32);
                        if let Err(err) = cache.spend_coin(&outpoint) {
                            tracing::error!("Spending buggy name output {outpoint} failed: {err}");
                        }
                    }
                }
            }
            return Ok(());
        }
    }

    /* This check must come *after* the bug handling: some of the names
       handled above are produced by transactions without the name
       version.  */
    if !is_name_transaction(tx) {
        return Ok(());
    }

    /* The changes are encoded in the outputs; everything is already
       validated, so simply apply them.  */
    for (index, txout) in tx.output.iter().enumerate() {
        let op = NameScript::parse(&txout.script_pubkey);
        if op.is_any_update() {
            let name = op.name().expect("any update carries a name; qed");
            tracing::debug!("Updating name {} at height {height}", display_name(name));

            undo.name_ops
                .push(NameTxUndo::new(name.to_vec(), cache.name(name)?));

            let data = NameData::from_script(height, OutPoint::new(txid, index as u32), &op);
            cache.set_name(name, data, false)?;
        }
    }

    Ok(())
}

/// Reverse one name operation from its undo record.
pub fn undo_name_op<V: StateView>(undo: &NameTxUndo, cache: &mut StateCache<V>) -> Result<()> {
    match &undo.old {
        None => cache.delete_name(&undo.name),
        Some(old) => cache.set_name(&undo.name, old.clone(), true),
    }
}

/// Spend the name coins of all names expiring at `height`.
///
/// Returns the set of expired names so the host can evict conflicting
/// mempool entries; the spent coins are recorded in the block's undo
/// data.
pub fn expire_names<V: StateView>(
    height: u32,
    cache: &mut StateCache<V>,
    undo: &mut BlockUndo,
    params: &ChainParams,
) -> Result<BTreeSet<Name>> {
    let mut names = BTreeSet::new();

    /* The genesis block contains no name expirations.  */
    if height == 0 {
        return Ok(names);
    }

    /* Find the update heights at which names have expired since the last
       block.  When the expiration depth steps at a fork height, this can
       span multiple heights at once.  */
    let depth_old = params.name_expiration_depth(height - 1);
    let depth_now = params.name_expiration_depth(height);

    if depth_now > height {
        return Ok(names);
    }
    let Some(expire_from) = height.checked_sub(depth_old) else {
        return Ok(names);
    };
    let expire_to = height - depth_now;

    /* expire_from == expire_to + 1 is possible when the depth is raised
       in lockstep with the height; then nothing expires in this step and
       the absolute expiration height stays flat.  */
    assert!(expire_from <= expire_to + 1, "expiring window went backwards");

    for h in expire_from..=expire_to {
        names.extend(cache.names_at_height(h)?);
    }

    for name in &names {
        let data = cache.name(name)?.ok_or_else(|| {
            Error::Corruption(format!(
                "expiring name '{}' not found in the database",
                display_name(name)
            ))
        })?;
        if !data.is_expired(height, params) {
            return Err(Error::Corruption(format!(
                "name '{}' is not actually expired",
                display_name(name)
            )));
        }

        /* Special rule: when d/postmortem expires, its coin is already
           spent due to the historic name stealing.  Ignore.  */
        if height == 175_868 && name.as_slice() == b"d/postmortem" {
            continue;
        }

        let coin = cache.coin(&data.outpoint)?.ok_or_else(|| {
            Error::Corruption(format!(
                "name coin for '{}' is not available",
                display_name(name)
            ))
        })?;
        let op = NameScript::parse(&coin.script_pubkey);
        if !op.is_any_update() || op.name() != Some(name.as_slice()) {
            return Err(Error::Corruption(format!(
                "name coin to be expired for '{}' has the wrong script",
                display_name(name)
            )));
        }

        let spent = cache.spend_coin(&data.outpoint)?;
        undo.expired.push(spent);
    }

    Ok(names)
}

/// Reinstate the name coins spent by [`expire_names`] at `height`, in
/// reverse order.  Returns the set of un-expired names.
pub fn unexpire_names<V: StateView>(
    height: u32,
    undo: &BlockUndo,
    cache: &mut StateCache<V>,
    params: &ChainParams,
) -> Result<BTreeSet<Name>> {
    let mut names = BTreeSet::new();

    /* The genesis block contains no name expirations.  */
    if height == 0 {
        return Ok(names);
    }

    for coin in undo.expired.iter().rev() {
        let op = NameScript::parse(&coin.script_pubkey);
        if !op.is_any_update() {
            return Err(Error::Corruption(
                "wrong script to be unexpired".to_string(),
            ));
        }
        let name = op.name().expect("any update carries a name; qed");

        if !names.insert(name.to_vec()) {
            return Err(Error::Corruption(format!(
                "name '{}' unexpired twice",
                display_name(name)
            )));
        }

        let data = cache.name(name)?.ok_or_else(|| {
            Error::Corruption(format!(
                "no data for name '{}' to be unexpired",
                display_name(name)
            ))
        })?;
        if !data.is_expired(height, params) || data.is_expired(height - 1, params) {
            return Err(Error::Corruption(format!(
                "name '{}' to be unexpired is not expired in the database \
                 or was already expired before the current height",
                display_name(name)
            )));
        }

        cache.add_coin(data.outpoint, coin.clone());
    }

    Ok(names)
}
