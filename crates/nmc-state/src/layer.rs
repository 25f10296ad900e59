//! Write-through state overlay stacked on a backing view.

use crate::cache::NameCache;
use crate::store::NameStore;
use crate::view::StateView;
use crate::{Error, Result};
use bitcoin::{BlockHash, OutPoint};
use nmc_primitives::{display_name, Coin, Name, NameData, NameHistory, NameSettings};
use std::collections::{BTreeSet, HashMap};

/// A mutable overlay over a read-only [`StateView`].
///
/// Records coin additions/spends and name changes without touching the
/// backing view; [`StateCache::flush`] hands everything to the store as
/// one atomic batch.  Caches compose: a `StateCache` is itself a
/// `StateView`, so short-lived overlays (mempool checks, block template
/// dry runs) can stack on the long-lived one.
pub struct StateCache<V> {
    base: V,
    /// Coin overlay; `None` marks an output spent.
    coins: HashMap<OutPoint, Option<Coin>>,
    names: NameCache,
    best_block: Option<BlockHash>,
}

impl<V: StateView> StateCache<V> {
    pub fn new(base: V, settings: &NameSettings) -> Self {
        Self {
            base,
            coins: HashMap::new(),
            names: NameCache::new(settings.history),
            best_block: None,
        }
    }

    /// Add (or replace) an unspent output.
    pub fn add_coin(&mut self, outpoint: OutPoint, coin: Coin) {
        self.coins.insert(outpoint, Some(coin));
    }

    /// Spend an unspent output, returning the spent coin.
    pub fn spend_coin(&mut self, outpoint: &OutPoint) -> Result<Coin> {
        let coin = self
            .coin(outpoint)?
            .ok_or(Error::CoinNotFound(*outpoint))?;
        self.coins.insert(*outpoint, None);
        Ok(coin)
    }

    /// Record the block this overlay corresponds to.
    pub fn set_best_block(&mut self, hash: BlockHash) {
        self.best_block = Some(hash);
    }

    /// Insert or update a name.
    ///
    /// Maintains the expire index (the old entry is dropped, the new one
    /// added) and, when enabled, the history stack: a regular update
    /// pushes the superseded record, an `undo` pops the entry matching
    /// the restored record.
    pub fn set_name(&mut self, name: &[u8], data: NameData, undo: bool) -> Result<()> {
        if let Some(old) = self.name(name)? {
            self.names.remove_expire_index(name, old.height);
            if self.names.with_history() {
                let mut history = self.name_history(name)?.unwrap_or_default();
                if undo {
                    history.pop(&data);
                } else {
                    history.push(old);
                }
                self.names.set_history(name.to_vec(), history);
            }
        }

        self.names.add_expire_index(name, data.height);
        self.names.set(name.to_vec(), data);
        Ok(())
    }

    /// Delete a name, dropping its expire-index entry.  The name must
    /// exist; deleting an unknown name means an undo record and the
    /// database disagree.
    pub fn delete_name(&mut self, name: &[u8]) -> Result<()> {
        let old = self
            .name(name)?
            .ok_or_else(|| Error::NameNotFound(display_name(name)))?;
        self.names.remove_expire_index(name, old.height);
        self.names.remove(name.to_vec());
        Ok(())
    }

    /// Hand all recorded changes to the store as one atomic batch and
    /// reset the overlay.
    pub fn flush(&mut self, store: &NameStore) -> Result<()> {
        store.write_batch(&self.coins, self.best_block, &self.names)?;
        self.coins.clear();
        self.names.clear();
        self.best_block = None;
        Ok(())
    }

    /// The recorded name changes.
    pub fn name_cache(&self) -> &NameCache {
        &self.names
    }

    /// The backing view.
    pub fn base(&self) -> &V {
        &self.base
    }
}

impl<V: StateView> StateView for StateCache<V> {
    fn coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>> {
        match self.coins.get(outpoint) {
            Some(overlay) => Ok(overlay.clone()),
            None => self.base.coin(outpoint),
        }
    }

    fn name(&self, name: &[u8]) -> Result<Option<NameData>> {
        if let Some(data) = self.names.get(name) {
            return Ok(Some(data.clone()));
        }
        if self.names.is_deleted(name) {
            return Ok(None);
        }
        self.base.name(name)
    }

    fn name_history(&self, name: &[u8]) -> Result<Option<NameHistory>> {
        if self.names.with_history() {
            if let Some(history) = self.names.get_history(name) {
                return Ok(Some(history.clone()));
            }
        }
        self.base.name_history(name)
    }

    fn names_at_height(&self, height: u32) -> Result<BTreeSet<Name>> {
        let mut names = self.base.names_at_height(height)?;
        self.names.update_names_for_height(height, &mut names);
        Ok(names)
    }

    fn best_block(&self) -> Result<Option<BlockHash>> {
        match self.best_block {
            Some(hash) => Ok(Some(hash)),
            None => self.base.best_block(),
        }
    }
}
