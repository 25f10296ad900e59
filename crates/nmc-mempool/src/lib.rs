//! Name component of the transaction mempool.
//!
//! [`NameMemPool`] is an auxiliary index over the host pool's entries
//! that keeps pending name operations consistent: no two transactions may
//! register the same name, no two may update the same name, and pending
//! operations are evicted when a block confirms a conflicting
//! registration or moves a name across the expiration boundary.
//!
//! The index is advisory and never persisted.  It is protected by the
//! host pool's lock: every caller of the mutating operations must hold
//! it.

mod error;

pub use error::NamePoolError;

use bitcoin::{Transaction, Txid};
use nmc_primitives::{display_name, ChainParams, Name};
use nmc_script::{is_name_transaction, NameOp, NameScript};
use nmc_state::StateView;
use std::collections::{BTreeSet, HashMap};

/// How a pool transaction participates in the name protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTxClass {
    /// No name operation.
    None,
    /// Carries a NAME_NEW with the given commitment hash.
    New { hash: Vec<u8> },
    /// Registers the given name (NAME_FIRSTUPDATE).
    Registration { name: Name },
    /// Updates the given name (NAME_UPDATE).
    Update { name: Name },
}

/// Classify a transaction by its (single) name output.
pub fn classify_name_tx(tx: &Transaction) -> NameTxClass {
    if !is_name_transaction(tx) {
        return NameTxClass::None;
    }

    for output in &tx.output {
        let op = NameScript::parse(&output.script_pubkey);
        match op.op() {
            Some(NameOp::New { hash }) => {
                return NameTxClass::New { hash: hash.clone() };
            }
            Some(NameOp::FirstUpdate { name, .. }) => {
                return NameTxClass::Registration { name: name.clone() };
            }
            Some(NameOp::Update { name, .. }) => {
                return NameTxClass::Update { name: name.clone() };
            }
            None => {}
        }
    }

    NameTxClass::None
}

/// The name index over the host mempool.
#[derive(Debug, Default)]
pub struct NameMemPool {
    /// Classification of every tracked pool transaction.
    entries: HashMap<Txid, NameTxClass>,
    /// Names registered by pool transactions.
    map_name_regs: HashMap<Name, Txid>,
    /// Names updated by pool transactions.
    map_name_updates: HashMap<Name, Txid>,
    /// NAME_NEW commitment hashes seen in the pool.  Not required for
    /// consensus; it only tolerates duplicate broadcasts of the same
    /// transaction.
    map_name_news: HashMap<Vec<u8>, Txid>,
}

impl NameMemPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether some pool transaction registers the given name.
    pub fn registers_name(&self, name: &[u8]) -> bool {
        self.map_name_regs.contains_key(name)
    }

    /// Whether some pool transaction updates the given name.
    pub fn updates_name(&self, name: &[u8]) -> bool {
        self.map_name_updates.contains_key(name)
    }

    /// Number of tracked name transactions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all state.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.map_name_regs.clear();
        self.map_name_updates.clear();
        self.map_name_news.clear();
    }

    /// Track a transaction that has already been checked with
    /// [`NameMemPool::check_tx`].  Conflicting insertions are a caller
    /// bug.
    pub fn add_unchecked(&mut self, txid: Txid, class: NameTxClass) {
        match &class {
            NameTxClass::None => return,
            NameTxClass::New { hash } => {
                match self.map_name_news.get(hash) {
                    // Duplicate broadcasts of the same tx are tolerated.
                    Some(existing) => assert_eq!(
                        *existing, txid,
                        "conflicting NAME_NEW hash added unchecked"
                    ),
                    None => {
                        self.map_name_news.insert(hash.clone(), txid);
                    }
                }
            }
            NameTxClass::Registration { name } => {
                let previous = self.map_name_regs.insert(name.clone(), txid);
                assert!(previous.is_none(), "conflicting registration added unchecked");
            }
            NameTxClass::Update { name } => {
                let previous = self.map_name_updates.insert(name.clone(), txid);
                assert!(previous.is_none(), "conflicting update added unchecked");
            }
        }
        self.entries.insert(txid, class);
    }

    /// Stop tracking a transaction (evicted or confirmed).
    pub fn remove(&mut self, txid: &Txid) {
        let Some(class) = self.entries.remove(txid) else {
            return;
        };
        match class {
            NameTxClass::None => {}
            NameTxClass::New { hash } => {
                if self.map_name_news.get(&hash) == Some(txid) {
                    self.map_name_news.remove(&hash);
                }
            }
            NameTxClass::Registration { name } => {
                let removed = self.map_name_regs.remove(&name);
                assert_eq!(removed, Some(*txid), "registration index out of sync");
            }
            NameTxClass::Update { name } => {
                let removed = self.map_name_updates.remove(&name);
                assert_eq!(removed, Some(*txid), "update index out of sync");
            }
        }
    }

    /// Whether the transaction can be added without violating the
    /// at-most-one-pending rule per name.
    ///
    /// Multiple updates building on each other within the pool would be
    /// conceivable, but only a single update tx is tracked per name, so
    /// they are rejected here.
    pub fn check_tx(&self, tx: &Transaction) -> bool {
        match classify_name_tx(tx) {
            NameTxClass::None => true,
            NameTxClass::New { hash } => match self.map_name_news.get(&hash) {
                Some(existing) => *existing == tx.compute_txid(),
                None => true,
            },
            NameTxClass::Registration { name } => !self.registers_name(&name),
            NameTxClass::Update { name } => !self.updates_name(&name),
        }
    }

    /// A block confirmed `tx`: evict the pool registration conflicting
    /// with a confirmed FIRSTUPDATE, if any.  Returns the evicted txids;
    /// the host removes those transactions from its pool (their index
    /// entries are already gone).
    pub fn remove_conflicts(&mut self, tx: &Transaction) -> Vec<Txid> {
        let mut removed = Vec::new();

        if !is_name_transaction(tx) {
            return removed;
        }

        for output in &tx.output {
            let op = NameScript::parse(&output.script_pubkey);
            if let Some(NameOp::FirstUpdate { name, .. }) = op.op() {
                if let Some(txid) = self.map_name_regs.get(name).copied() {
                    self.evict(txid, &mut removed);
                }
            }
        }

        removed
    }

    /// Names were un-expired by a disconnect: they are no longer free, so
    /// evict pending registrations for them.
    pub fn remove_unexpire_conflicts(&mut self, unexpired: &BTreeSet<Name>) -> Vec<Txid> {
        let mut removed = Vec::new();
        for name in unexpired {
            if let Some(txid) = self.map_name_regs.get(name).copied() {
                self.evict(txid, &mut removed);
            }
        }
        removed
    }

    /// Names expired at the new tip: pending updates for them can never
    /// confirm, so evict them.
    pub fn remove_expire_conflicts(&mut self, expired: &BTreeSet<Name>) -> Vec<Txid> {
        let mut removed = Vec::new();
        for name in expired {
            if let Some(txid) = self.map_name_updates.get(name).copied() {
                self.evict(txid, &mut removed);
            }
        }
        removed
    }

    fn evict(&mut self, txid: Txid, removed: &mut Vec<Txid>) {
        tracing::debug!("Evicting conflicted name tx {txid} from the pool");
        self.remove(&txid);
        removed.push(txid);
    }

    /// Consistency scan.  Every pending registration must target a name
    /// that is free (absent or expired) at the next block, every pending
    /// update a name that is alive at the next block, and the maps must
    /// agree with the tracked entries.
    pub fn check<V: StateView>(
        &self,
        view: &V,
        tip_height: u32,
        params: &ChainParams,
    ) -> Result<(), NamePoolError> {
        // Mempool transactions are mined at tip + 1; judge expiry there.
        let next_height = tip_height + 1;

        let mut regs = 0usize;
        let mut updates = 0usize;

        for (txid, class) in &self.entries {
            match class {
                NameTxClass::None => {}
                NameTxClass::New { hash } => {
                    if self.map_name_news.get(hash) != Some(txid) {
                        return Err(NamePoolError::IndexMismatch(*txid));
                    }
                }
                NameTxClass::Registration { name } => {
                    if self.map_name_regs.get(name) != Some(txid) {
                        return Err(NamePoolError::IndexMismatch(*txid));
                    }
                    regs += 1;

                    if let Some(data) = view.name(name)? {
                        if !data.is_expired(next_height, params) {
                            return Err(NamePoolError::RegistrationOfLiveName(display_name(
                                name,
                            )));
                        }
                    }
                }
                NameTxClass::Update { name } => {
                    if self.map_name_updates.get(name) != Some(txid) {
                        return Err(NamePoolError::IndexMismatch(*txid));
                    }
                    updates += 1;

                    match view.name(name)? {
                        None => {
                            return Err(NamePoolError::UpdateOfMissingName(display_name(name)))
                        }
                        Some(data) if data.is_expired(next_height, params) => {
                            return Err(NamePoolError::UpdateOfMissingName(display_name(name)))
                        }
                        Some(_) => {}
                    }
                }
            }
        }

        if regs != self.map_name_regs.len() || updates != self.map_name_updates.len() {
            return Err(NamePoolError::IndexSizeMismatch);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::absolute::LockTime;
    use bitcoin::hashes::Hash;
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, Network, OutPoint, PubkeyHash, ScriptBuf, TxOut};
    use nmc_primitives::NameData;
    use nmc_script::{build_name_firstupdate, build_name_new, build_name_update, commitment, NAME_TX_VERSION};
    use nmc_state::MemoryView;

    fn test_address() -> ScriptBuf {
        ScriptBuf::new_p2pkh(&PubkeyHash::all_zeros())
    }

    fn name_tx(script: &ScriptBuf) -> Transaction {
        Transaction {
            version: NAME_TX_VERSION,
            lock_time: LockTime::ZERO,
            input: vec![],
            output: vec![TxOut {
                value: Amount::from_sat(100_000_000),
                script_pubkey: script.clone(),
            }],
        }
    }

    struct Fixture {
        tx_reg1: Transaction,
        tx_reg2: Transaction,
        tx_upd1: Transaction,
        tx_upd2: Transaction,
    }

    fn fixture() -> Fixture {
        let addr = test_address();
        let rand1 = vec![b'a'; 20];
        let rand2 = vec![b'b'; 20];

        let first1 = build_name_firstupdate(&addr, b"name-reg", b"value", &rand1);
        let first2 = build_name_firstupdate(&addr, b"name-reg", b"value", &rand2);
        let upd1 = build_name_update(&addr, b"name-upd", b"value-a");
        let upd2 = build_name_update(&addr, b"name-upd", b"value-b");

        Fixture {
            tx_reg1: name_tx(&first1),
            tx_reg2: name_tx(&first2),
            tx_upd1: name_tx(&upd1),
            tx_upd2: name_tx(&upd2),
        }
    }

    #[test]
    fn classification() {
        let fx = fixture();
        assert!(matches!(
            classify_name_tx(&fx.tx_reg1),
            NameTxClass::Registration { .. }
        ));
        assert!(matches!(
            classify_name_tx(&fx.tx_upd1),
            NameTxClass::Update { .. }
        ));

        let addr = test_address();
        let hash = commitment(&[b'x'; 20], b"name-new");
        let tx_new = name_tx(&build_name_new(&addr, &hash));
        assert!(matches!(classify_name_tx(&tx_new), NameTxClass::New { .. }));

        let mut plain = name_tx(&addr);
        assert_eq!(classify_name_tx(&plain), NameTxClass::None);
        plain.version = Version::ONE;
        assert_eq!(classify_name_tx(&plain), NameTxClass::None);
    }

    #[test]
    fn pending_exclusivity() {
        let fx = fixture();
        let mut pool = NameMemPool::new();

        // Empty pool admits everything.
        assert!(!pool.registers_name(b"name-reg"));
        assert!(!pool.updates_name(b"name-upd"));
        assert!(pool.check_tx(&fx.tx_reg1) && pool.check_tx(&fx.tx_reg2));
        assert!(pool.check_tx(&fx.tx_upd1) && pool.check_tx(&fx.tx_upd2));

        // A pending registration blocks the second one for the name.
        pool.add_unchecked(fx.tx_reg1.compute_txid(), classify_name_tx(&fx.tx_reg1));
        assert!(pool.registers_name(b"name-reg"));
        assert!(!pool.updates_name(b"name-reg"));
        assert!(!pool.check_tx(&fx.tx_reg2));
        assert!(pool.check_tx(&fx.tx_upd1));

        // Same for updates.
        pool.add_unchecked(fx.tx_upd1.compute_txid(), classify_name_tx(&fx.tx_upd1));
        assert!(pool.updates_name(b"name-upd"));
        assert!(!pool.check_tx(&fx.tx_upd2));

        // Removing frees the names again.
        pool.remove(&fx.tx_reg1.compute_txid());
        assert!(!pool.registers_name(b"name-reg"));
        assert!(pool.check_tx(&fx.tx_reg1) && pool.check_tx(&fx.tx_reg2));
        assert!(!pool.check_tx(&fx.tx_upd2));

        pool.remove(&fx.tx_upd1.compute_txid());
        assert!(!pool.updates_name(b"name-upd"));
        assert!(pool.check_tx(&fx.tx_upd1) && pool.check_tx(&fx.tx_upd2));
        assert!(pool.is_empty());
    }

    #[test]
    fn duplicate_new_broadcast_tolerated() {
        let addr = test_address();
        let hash = commitment(&[b'x'; 20], b"name-new");
        let tx_new = name_tx(&build_name_new(&addr, &hash));
        let mut pool = NameMemPool::new();

        pool.add_unchecked(tx_new.compute_txid(), classify_name_tx(&tx_new));
        // The same tx again is fine...
        assert!(pool.check_tx(&tx_new));
        pool.add_unchecked(tx_new.compute_txid(), classify_name_tx(&tx_new));

        // ...a different tx committing to the same hash is not.
        let mut other = tx_new.clone();
        other.lock_time = LockTime::from_consensus(7);
        assert!(!pool.check_tx(&other));
    }

    #[test]
    fn conflicts_from_confirmed_registration() {
        let fx = fixture();
        let mut pool = NameMemPool::new();

        pool.add_unchecked(fx.tx_reg1.compute_txid(), classify_name_tx(&fx.tx_reg1));
        assert!(!pool.check_tx(&fx.tx_reg2));

        // A block confirms the competing registration.
        let removed = pool.remove_conflicts(&fx.tx_reg2);
        assert_eq!(removed, vec![fx.tx_reg1.compute_txid()]);
        assert!(!pool.registers_name(b"name-reg"));
        assert!(pool.is_empty());
    }

    #[test]
    fn conflicts_from_expiration_boundary() {
        let fx = fixture();
        let mut pool = NameMemPool::new();

        // Expiring a name evicts its pending update.
        pool.add_unchecked(fx.tx_upd1.compute_txid(), classify_name_tx(&fx.tx_upd1));
        assert!(!pool.check_tx(&fx.tx_upd2));

        let names: BTreeSet<Name> = [b"name-upd".to_vec()].into_iter().collect();
        let removed = pool.remove_expire_conflicts(&names);
        assert_eq!(removed, vec![fx.tx_upd1.compute_txid()]);
        assert!(!pool.updates_name(b"name-upd"));
        assert!(pool.is_empty());

        // Un-expiring a name evicts its pending registration.
        pool.add_unchecked(fx.tx_reg1.compute_txid(), classify_name_tx(&fx.tx_reg1));
        let names: BTreeSet<Name> = [b"name-reg".to_vec()].into_iter().collect();
        let removed = pool.remove_unexpire_conflicts(&names);
        assert_eq!(removed, vec![fx.tx_reg1.compute_txid()]);
        assert!(!pool.registers_name(b"name-reg"));
        assert!(pool.is_empty());
    }

    #[test]
    fn consistency_check_against_view() {
        let fx = fixture();
        let params = ChainParams::new(Network::Regtest);
        let mut pool = NameMemPool::new();
        let mut view = MemoryView::new();

        pool.add_unchecked(fx.tx_reg1.compute_txid(), classify_name_tx(&fx.tx_reg1));
        pool.add_unchecked(fx.tx_upd1.compute_txid(), classify_name_tx(&fx.tx_upd1));

        // The updated name must exist in the view.
        assert!(pool.check(&view, 100, &params).is_err());

        let addr = test_address();
        let upd = build_name_update(&addr, b"name-upd", b"value");
        view.insert_name(
            b"name-upd".to_vec(),
            NameData::from_script(
                100,
                OutPoint::new(bitcoin::Txid::all_zeros(), 0),
                &NameScript::parse(&upd),
            ),
        );
        pool.check(&view, 100, &params).unwrap();

        // A live record for a pending registration is a conflict; an
        // expired one is fine (depth 30 here).
        let first = build_name_firstupdate(&addr, b"name-reg", b"value", &[b'a'; 20]);
        view.insert_name(
            b"name-reg".to_vec(),
            NameData::from_script(
                95,
                OutPoint::new(bitcoin::Txid::all_zeros(), 1),
                &NameScript::parse(&first),
            ),
        );
        assert!(matches!(
            pool.check(&view, 100, &params),
            Err(NamePoolError::RegistrationOfLiveName(_))
        ));

        // At tip 124 the name-reg record (height 95) expires at the next
        // block (95 + 30 = 125), but the name-upd record (height 100)
        // is still alive until 130.
        pool.check(&view, 124, &params).unwrap();
    }
}
