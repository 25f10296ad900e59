//! Read-only access to the chain state seen by the name rules.

use crate::Result;
use bitcoin::{BlockHash, OutPoint};
use nmc_primitives::{ChainParams, Coin, ExpireEntry, Name, NameData, NameHistory};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Read-only view of the chain state the name subsystem depends on: the
/// name tables plus the slice of the UTXO set that name scripts live in.
///
/// Validators and the mempool read through this trait; the concrete view
/// is either the persistent store or a [`crate::StateCache`] stacked on
/// top of it.
pub trait StateView {
    /// Look up an unspent output.
    fn coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>>;

    /// Look up a name's current record.  Expired names keep their record
    /// until re-registered; use [`StateView::active_name`] for the
    /// "absent when expired" reading.
    fn name(&self, name: &[u8]) -> Result<Option<NameData>>;

    /// Look up a name's history stack.
    fn name_history(&self, name: &[u8]) -> Result<Option<NameHistory>>;

    /// All names whose expire-index entry sits at the given update
    /// height.
    fn names_at_height(&self, height: u32) -> Result<BTreeSet<Name>>;

    /// Hash of the block this view is a snapshot of.
    fn best_block(&self) -> Result<Option<BlockHash>>;

    /// A name's record if it exists and is not expired at `height`.
    fn active_name(
        &self,
        name: &[u8],
        height: u32,
        params: &ChainParams,
    ) -> Result<Option<NameData>> {
        Ok(self
            .name(name)?
            .filter(|data| !data.is_expired(height, params)))
    }
}

/// A plain in-memory [`StateView`].
///
/// Used as the ephemeral backing view in unit tests and by tools that
/// assemble a synthetic state (e.g. for dry-running a block template).
#[derive(Debug, Default)]
pub struct MemoryView {
    coins: HashMap<OutPoint, Coin>,
    names: BTreeMap<Name, NameData>,
    history: BTreeMap<Name, NameHistory>,
    expire_index: BTreeSet<ExpireEntry>,
    best_block: Option<BlockHash>,
}

impl MemoryView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) an unspent output.
    pub fn add_coin(&mut self, outpoint: OutPoint, coin: Coin) {
        self.coins.insert(outpoint, coin);
    }

    /// Remove an unspent output.
    pub fn remove_coin(&mut self, outpoint: &OutPoint) -> Option<Coin> {
        self.coins.remove(outpoint)
    }

    /// Insert a name record, keeping the expire index in sync.
    pub fn insert_name(&mut self, name: Name, data: NameData) {
        if let Some(old) = self.names.get(&name) {
            self.expire_index
                .remove(&ExpireEntry::new(old.height, name.clone()));
        }
        self.expire_index
            .insert(ExpireEntry::new(data.height, name.clone()));
        self.names.insert(name, data);
    }

    /// Remove a name record and its expire-index entry.
    pub fn delete_name(&mut self, name: &[u8]) {
        if let Some(old) = self.names.remove(name) {
            self.expire_index
                .remove(&ExpireEntry::new(old.height, name.to_vec()));
        }
    }

    pub fn set_best_block(&mut self, hash: BlockHash) {
        self.best_block = Some(hash);
    }
}

impl StateView for MemoryView {
    fn coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>> {
        Ok(self.coins.get(outpoint).cloned())
    }

    fn name(&self, name: &[u8]) -> Result<Option<NameData>> {
        Ok(self.names.get(name).cloned())
    }

    fn name_history(&self, name: &[u8]) -> Result<Option<NameHistory>> {
        Ok(self.history.get(name).cloned())
    }

    fn names_at_height(&self, height: u32) -> Result<BTreeSet<Name>> {
        let from = ExpireEntry::new(height, Vec::new());
        Ok(self
            .expire_index
            .range(from..)
            .take_while(|entry| entry.height == height)
            .map(|entry| entry.name.clone())
            .collect())
    }

    fn best_block(&self) -> Result<Option<BlockHash>> {
        Ok(self.best_block)
    }
}

impl<V: StateView + ?Sized> StateView for &V {
    fn coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>> {
        (**self).coin(outpoint)
    }

    fn name(&self, name: &[u8]) -> Result<Option<NameData>> {
        (**self).name(name)
    }

    fn name_history(&self, name: &[u8]) -> Result<Option<NameHistory>> {
        (**self).name_history(name)
    }

    fn names_at_height(&self, height: u32) -> Result<BTreeSet<Name>> {
        (**self).names_at_height(height)
    }

    fn best_block(&self) -> Result<Option<BlockHash>> {
        (**self).best_block()
    }
}
