//! Transaction-level validation of name operations.

use crate::error::NameTxError;
use bitcoin::hashes::Hash as _;
use bitcoin::Transaction;
use nmc_primitives::{ChainParams, Coin, MAX_NAME_LENGTH, MAX_VALUE_LENGTH, MEMPOOL_HEIGHT, MIN_FIRSTUPDATE_DEPTH};
use nmc_script::{commitment, is_name_transaction, NameOp, NameScript};
use nmc_state::StateView;

/// Where a transaction is being admitted to.
///
/// The mempool path skips the NAME_NEW maturity check so that a
/// FIRSTUPDATE can be relayed shortly before its commitment matures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckMode {
    Block,
    Mempool,
}

/// Check a transaction according to the name rules.
///
/// Ensures that name operations (if any) are valid against the view and
/// that the transaction has name operations iff it is flagged as a name
/// transaction by its version.  `height` is the height the transaction
/// is validated for; mempool callers pass the next-block height.
pub fn check_name_tx<V: StateView>(
    tx: &Transaction,
    height: u32,
    view: &V,
    params: &ChainParams,
    mode: CheckMode,
) -> Result<(), NameTxError> {
    let txid = tx.compute_txid();

    /* Ignore historic bugs.  */
    if params.historic_bug(&txid, height).is_some() {
        return Ok(());
    }

    /* As a first step, locate the inputs and outputs of the transaction
       that are name scripts.  At most one of each is permitted.  */

    let mut name_in: Option<(NameScript, Coin)> = None;
    for input in &tx.input {
        let prevout = input.previous_output;
        let coin = view
            .coin(&prevout)?
            .ok_or(NameTxError::MissingInput(prevout))?;
        let op = NameScript::parse(&coin.script_pubkey);
        if op.is_name_op() {
            if name_in.is_some() {
                return Err(NameTxError::MultipleNameInputs);
            }
            name_in = Some((op, coin));
        }
    }

    let mut name_out: Option<(usize, NameScript)> = None;
    for (index, output) in tx.output.iter().enumerate() {
        let op = NameScript::parse(&output.script_pubkey);
        if op.is_name_op() {
            if name_out.is_some() {
                return Err(NameTxError::MultipleNameOutputs);
            }
            name_out = Some((index, op));
        }
    }

    /* Name inputs/outputs are only allowed on transactions marked as name
       transactions, and those must have a name output (NAME_NEW expects
       no input).  */

    if !is_name_transaction(tx) {
        if name_in.is_some() || name_out.is_some() {
            return Err(NameTxError::NonNameTxHasNameIO);
        }
        return Ok(());
    }

    let Some((out_index, op_out)) = name_out else {
        return Err(NameTxError::NameTxWithoutNameOutput);
    };

    /* Reject "greedy names".  */
    if tx.output[out_index].value < params.min_name_coin_amount(height) {
        return Err(NameTxError::GreedyName);
    }

    /* NAME_NEW is easy and different from the other operations.  */

    if let Some(NameOp::New { hash }) = op_out.op() {
        if name_in.is_some() {
            return Err(NameTxError::NewWithNameInput);
        }
        if hash.len() != 20 {
            return Err(NameTxError::BadNewHashSize(hash.len()));
        }
        return Ok(());
    }

    /* Now that NAME_NEW is ruled out, a previous name input being updated
       is required.  */

    let Some((op_in, coin_in)) = name_in else {
        return Err(NameTxError::UpdateWithoutNameInput);
    };

    let name = op_out.name().expect("any update carries a name; qed");
    let value = op_out.value().expect("any update carries a value; qed");
    if name.len() > MAX_NAME_LENGTH {
        return Err(NameTxError::NameTooLong);
    }
    if value.len() > MAX_VALUE_LENGTH {
        return Err(NameTxError::ValueTooLong);
    }

    match op_out.op().expect("located name output parses; qed") {
        NameOp::Update { .. } => {
            if !op_in.is_any_update() {
                return Err(NameTxError::UpdatePrevNotUpdate);
            }

            if op_in.name() != Some(name) {
                return Err(NameTxError::UpdateNameMismatch);
            }

            /* Redundant against the UTXO set (expired names are spent and
               unavailable anyway), but enforced defensively.  */
            if params.name_expired(coin_in.height, height) {
                return Err(NameTxError::UpdateOnExpiredName);
            }

            Ok(())
        }

        NameOp::FirstUpdate { rand, .. } => {
            if !matches!(op_in.op(), Some(NameOp::New { .. })) {
                return Err(NameTxError::FirstUpdatePrevNotNew);
            }

            /* Maturity of the NAME_NEW is checked only when not admitting
               to the mempool.  Block-level callers validate against a
               view whose input coins carry real heights; the sentinel
               would fail the depth check in any case.  */
            if mode == CheckMode::Block {
                debug_assert!(
                    coin_in.height != MEMPOOL_HEIGHT,
                    "block validation over an unconfirmed input coin"
                );
                if coin_in.height + MIN_FIRSTUPDATE_DEPTH > height {
                    return Err(NameTxError::FirstUpdateWithoutMatureNew);
                }
            }

            if rand.len() > 20 {
                return Err(NameTxError::RandTooLong);
            }

            let hash = commitment(rand, name);
            if op_in.new_hash() != Some(&hash.as_byte_array()[..]) {
                return Err(NameTxError::FirstUpdateCommitmentMismatch);
            }

            if let Some(old) = view.name(name)? {
                if !old.is_expired(height, params) {
                    return Err(NameTxError::FirstUpdateOnLiveName);
                }
            }

            /* Miners cannot create blocks with conflicting FIRSTUPDATEs:
               the block's own view already contains the first one when
               the second is checked.  */

            Ok(())
        }

        NameOp::New { .. } => unreachable!("NAME_NEW handled above"),
    }
}
