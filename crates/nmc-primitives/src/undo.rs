//! Undo data for name operations.

use crate::{Coin, Name, NameData};
use serde::{Deserialize, Serialize};

/// Undo information for one name operation: either the name was newly
/// created (and is deleted entirely when undoing) or it was updated and
/// the old record is restored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameTxUndo {
    /// The name this concerns.
    pub name: Name,
    /// The record that was overwritten, or `None` if the name was absent.
    pub old: Option<NameData>,
}

impl NameTxUndo {
    pub fn new(name: Name, old: Option<NameData>) -> Self {
        Self { name, old }
    }
}

/// Name-related undo data of one block: the per-output undo records in
/// application order, and the name coins spent by the expire engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockUndo {
    /// One entry per applied name output, in transaction/output order.
    pub name_ops: Vec<NameTxUndo>,
    /// Name coins spent because their name expired at this block.
    pub expired: Vec<Coin>,
}

impl BlockUndo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize for storage alongside the block's UTXO undo data.
    pub fn encode(&self) -> Vec<u8> {
        bincode::serialize(self).expect("BlockUndo serialization should not fail")
    }

    /// Deserialize from storage.
    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    /// Whether no name changes were recorded.
    pub fn is_empty(&self) -> bool {
        self.name_ops.is_empty() && self.expired.is_empty()
    }
}
