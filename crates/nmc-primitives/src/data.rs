//! Per-name database records.

use crate::params::ChainParams;
use bitcoin::{OutPoint, ScriptBuf};
use nmc_script::NameScript;
use serde::{Deserialize, Serialize};

/// Information stored for an active name in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameData {
    /// The name's value.
    pub value: Vec<u8>,
    /// Height of the latest (first) update output.  Drives expiry.
    pub height: u32,
    /// The name's last update outpoint.
    pub outpoint: OutPoint,
    /// The script locking the name coin.  Kept here as well so it can be
    /// shown on demand without fetching the coin.
    pub address: ScriptBuf,
}

impl NameData {
    /// Build the record from a (first) update operation.  The height is
    /// not part of the script and is passed in by the block processor.
    pub fn from_script(height: u32, outpoint: OutPoint, script: &NameScript) -> Self {
        assert!(
            script.is_any_update(),
            "name data can only be built from an update operation"
        );
        Self {
            value: script
                .value()
                .expect("update operations carry a value; qed")
                .to_vec(),
            height,
            outpoint,
            address: script.address().to_owned(),
        }
    }

    /// Whether the record is expired at the given height.
    pub fn is_expired(&self, height: u32, params: &ChainParams) -> bool {
        params.name_expired(self.height, height)
    }
}

/// A name's history: the stack of records that have been superseded by
/// updates or expiration.  Only maintained when history is enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameHistory {
    data: Vec<NameData>,
}

impl NameHistory {
    /// Whether the stack is empty.  An empty history is deleted from the
    /// database instead of being stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read-only access to the stack, oldest first.
    pub fn entries(&self) -> &[NameData] {
        &self.data
    }

    /// Push a superseded record.  Entries are appended in chronological
    /// order, so the new entry's height must not be below the top's.
    pub fn push(&mut self, entry: NameData) {
        assert!(
            self.data.last().map_or(true, |top| top.height <= entry.height),
            "name history must stay ordered by height"
        );
        self.data.push(entry);
    }

    /// Pop the top entry while undoing a name change.  The name's
    /// restored record is passed in and must match the removed entry.
    pub fn pop(&mut self, entry: &NameData) {
        let top = self.data.pop();
        assert!(
            top.as_ref() == Some(entry),
            "name history top does not match the record being restored"
        );
    }
}
