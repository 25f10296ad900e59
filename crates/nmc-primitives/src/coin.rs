//! The slice of the UTXO collaborator the name subsystem touches.

use bitcoin::{ScriptBuf, TxOut};
use serde::{Deserialize, Serialize};

/// An unspent transaction output as seen by the name subsystem.
///
/// The base UTXO store owns the full record; this is the projection the
/// name rules read (script classification, confirmation height) and that
/// the expire engine has to restore on disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    /// Amount in satoshis.
    pub amount: u64,
    /// Height of the block the output was confirmed in, or
    /// [`crate::MEMPOOL_HEIGHT`] for pending outputs.
    pub height: u32,
    /// The locking script.
    pub script_pubkey: ScriptBuf,
}

impl Coin {
    /// Build a coin from a transaction output confirmed at `height`.
    pub fn from_txout(output: &TxOut, height: u32) -> Self {
        Self {
            amount: output.value.to_sat(),
            height,
            script_pubkey: output.script_pubkey.clone(),
        }
    }
}
