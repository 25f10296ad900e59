//! Persistent name database backed by RocksDB.

use crate::cache::NameCache;
use crate::view::StateView;
use crate::{cf, meta_keys, Error, Result};
use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, OutPoint};
use nmc_primitives::{display_name, ChainParams, Coin, Name, NameData, NameHistory, NameSettings};
use nmc_script::NameScript;
use parking_lot::RwLock;
use rocksdb::{ColumnFamilyDescriptor, Options, WriteBatch, DB};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Convert an outpoint to its storage key (36 bytes).
///
/// Format: txid (32 bytes, raw) || vout (4 bytes, little-endian)
fn outpoint_to_key(outpoint: &OutPoint) -> [u8; 36] {
    let mut key = [0u8; 36];
    key[..32].copy_from_slice(outpoint.txid.as_ref());
    key[32..].copy_from_slice(&outpoint.vout.to_le_bytes());
    key
}

/// Expire-index key: update height (big-endian) followed by the name.
/// Big-endian keeps lexicographic order equal to numeric height order.
fn expire_key(height: u32, name: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(4 + name.len());
    key.extend_from_slice(&height.to_be_bytes());
    key.extend_from_slice(name);
    key
}

/// Parse an expire-index key back into `(height, name)`.
fn parse_expire_key(key: &[u8]) -> Option<(u32, &[u8])> {
    if key.len() < 4 {
        return None;
    }
    let height = u32::from_be_bytes(key[..4].try_into().expect("length checked; qed"));
    Some((height, &key[4..]))
}

/// The persistent name database.
///
/// Holds the current-name table, the optional history log, the expire
/// index and the UTXO slice, all flushed in one atomic batch per block
/// flush.  Reads are concurrent with the single writer.
pub struct NameStore {
    db: DB,
    settings: NameSettings,
    /// Hash of the block the on-disk state corresponds to.
    best_block: RwLock<Option<BlockHash>>,
}

impl NameStore {
    /// Open or create the name database at the given path.
    pub fn open(path: &Path, settings: NameSettings) -> Result<Self> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        db_opts.set_block_based_table_factory(&block_opts);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(cf::NAMES, Options::default()),
            ColumnFamilyDescriptor::new(cf::HISTORY, Options::default()),
            ColumnFamilyDescriptor::new(cf::EXPIRE, Options::default()),
            ColumnFamilyDescriptor::new(cf::UTXOS, Options::default()),
            ColumnFamilyDescriptor::new(cf::META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;
        let best_block = Self::load_best_block(&db)?;

        tracing::info!(
            "Opened name database at {}, best block: {best_block:?}",
            path.display()
        );

        Ok(Self {
            db,
            settings,
            best_block: RwLock::new(best_block),
        })
    }

    fn load_best_block(db: &DB) -> Result<Option<BlockHash>> {
        let Some(cf) = db.cf_handle(cf::META) else {
            return Ok(None);
        };
        match db.get_cf(cf, meta_keys::BEST_BLOCK)? {
            Some(bytes) if bytes.len() == 32 => {
                let arr: [u8; 32] = bytes.try_into().expect("length checked; qed");
                Ok(Some(BlockHash::from_byte_array(arr)))
            }
            _ => Ok(None),
        }
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db.cf_handle(name).ok_or(Error::NotInitialized)
    }

    /// The settings the store was opened with.
    pub fn settings(&self) -> &NameSettings {
        &self.settings
    }

    /// Write a coin delta, best-block update and name cache to the
    /// database in one atomic batch.
    ///
    /// `None` coin entries are spends; partial flushes are impossible by
    /// construction.
    pub fn write_batch(
        &self,
        coins: &HashMap<OutPoint, Option<Coin>>,
        best_block: Option<BlockHash>,
        names: &NameCache,
    ) -> Result<()> {
        assert!(
            self.settings.history || names.history_edits().is_empty(),
            "history edits recorded while the history log is disabled"
        );

        let cf_utxos = self.cf(cf::UTXOS)?;
        let cf_names = self.cf(cf::NAMES)?;
        let cf_history = self.cf(cf::HISTORY)?;
        let cf_expire = self.cf(cf::EXPIRE)?;
        let cf_meta = self.cf(cf::META)?;

        let mut batch = WriteBatch::default();

        for (outpoint, coin) in coins {
            let key = outpoint_to_key(outpoint);
            match coin {
                Some(coin) => batch.put_cf(cf_utxos, key, bincode::serialize(coin)?),
                None => batch.delete_cf(cf_utxos, key),
            }
        }

        for (name, data) in names.entries() {
            batch.put_cf(cf_names, name, bincode::serialize(data)?);
        }
        for name in names.deleted() {
            batch.delete_cf(cf_names, name);
        }
        for (name, history) in names.history_edits() {
            if history.is_empty() {
                batch.delete_cf(cf_history, name);
            } else {
                batch.put_cf(cf_history, name, bincode::serialize(history)?);
            }
        }
        for (entry, add) in names.expire_index() {
            let key = expire_key(entry.height, &entry.name);
            if *add {
                batch.put_cf(cf_expire, key, b"");
            } else {
                batch.delete_cf(cf_expire, key);
            }
        }

        if let Some(hash) = best_block {
            batch.put_cf(cf_meta, meta_keys::BEST_BLOCK, hash.to_byte_array());
        }

        tracing::debug!(
            "Committing {} coin changes and {} name changes to the name database",
            coins.len(),
            names.entries().len() + names.deleted().len()
        );
        self.db.write(batch)?;

        if let Some(hash) = best_block {
            *self.best_block.write() = Some(hash);
        }

        Ok(())
    }

    /// Walk the current-name table in key order starting at `start`,
    /// feeding each record to `consumer` until it returns `false` or the
    /// table is exhausted.
    ///
    /// This is the composition point for RPC-style scans; consumers are
    /// plain closures rather than walker objects.
    pub fn walk_names<F>(&self, start: &[u8], mut consumer: F) -> Result<()>
    where
        F: FnMut(&[u8], &NameData) -> bool,
    {
        let cf_names = self.cf(cf::NAMES)?;
        let mut iter = self.db.raw_iterator_cf(cf_names);
        iter.seek(start);

        while iter.valid() {
            if let (Some(key), Some(value)) = (iter.key(), iter.value()) {
                let data: NameData = bincode::deserialize(value)?;
                if !consumer(key, &data) {
                    break;
                }
            }
            iter.next();
        }

        Ok(())
    }

    /// Validate the name database against itself and the UTXO set.
    ///
    /// One full forward scan collecting the update heights recorded in
    /// the current-name table, the heights recorded in the expire index
    /// and the names mentioned by unspent name-update outputs; the three
    /// must agree (with expired names excluded from the UTXO comparison).
    ///
    /// Returns `Ok(false)` on a consistency failure.  `interrupt` is
    /// checked once per record so long scans stay cancellable.
    pub fn validate_name_db(
        &self,
        tip_height: u32,
        params: &ChainParams,
        interrupt: &AtomicBool,
    ) -> Result<bool> {
        let mut name_heights_data: BTreeMap<Name, u32> = BTreeMap::new();
        let mut name_heights_index: BTreeMap<Name, u32> = BTreeMap::new();
        let mut names_in_db: BTreeSet<Name> = BTreeSet::new();
        let mut names_in_utxo: BTreeSet<Name> = BTreeSet::new();

        let cf_utxos = self.cf(cf::UTXOS)?;
        let mut iter = self.db.raw_iterator_cf(cf_utxos);
        iter.seek_to_first();
        while iter.valid() {
            if interrupt.load(Ordering::Relaxed) {
                return Err(Error::Interrupted);
            }
            if let Some(value) = iter.value() {
                let coin: Coin = bincode::deserialize(value)?;
                let op = NameScript::parse(&coin.script_pubkey);
                if op.is_any_update() {
                    let name = op.name().expect("any update carries a name; qed");
                    if !names_in_utxo.insert(name.to_vec()) {
                        tracing::warn!(
                            "Name {} duplicated in the UTXO set",
                            display_name(name)
                        );
                        return Ok(false);
                    }
                }
            }
            iter.next();
        }

        let cf_names = self.cf(cf::NAMES)?;
        let mut iter = self.db.raw_iterator_cf(cf_names);
        iter.seek_to_first();
        while iter.valid() {
            if interrupt.load(Ordering::Relaxed) {
                return Err(Error::Interrupted);
            }
            if let (Some(key), Some(value)) = (iter.key(), iter.value()) {
                let data: NameData = bincode::deserialize(value)?;
                if name_heights_data.insert(key.to_vec(), data.height).is_some() {
                    tracing::warn!("Name {} duplicated in the name table", display_name(key));
                    return Ok(false);
                }
                if !data.is_expired(tip_height, params) {
                    names_in_db.insert(key.to_vec());
                }
            }
            iter.next();
        }

        let cf_expire = self.cf(cf::EXPIRE)?;
        let mut iter = self.db.raw_iterator_cf(cf_expire);
        iter.seek_to_first();
        while iter.valid() {
            if interrupt.load(Ordering::Relaxed) {
                return Err(Error::Interrupted);
            }
            if let Some(key) = iter.key() {
                let (height, name) = parse_expire_key(key).ok_or_else(|| {
                    Error::Corruption("malformed expire-index key".to_string())
                })?;
                if name_heights_index.insert(name.to_vec(), height).is_some() {
                    tracing::warn!("Name {} duplicated in the expire index", display_name(name));
                    return Ok(false);
                }
            }
            iter.next();
        }

        if name_heights_index != name_heights_data {
            tracing::warn!("Name height data mismatch between name table and expire index");
            return Ok(false);
        }

        if names_in_db != names_in_utxo {
            tracing::warn!("Names in the UTXO set mismatch names in the database");
            return Ok(false);
        }

        tracing::info!(
            "Checked name database, {} unexpired names, {} total",
            names_in_db.len(),
            name_heights_data.len()
        );

        Ok(true)
    }
}

impl StateView for NameStore {
    fn coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>> {
        let cf = self.cf(cf::UTXOS)?;
        match self.db.get_cf(cf, outpoint_to_key(outpoint))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn name(&self, name: &[u8]) -> Result<Option<NameData>> {
        let cf = self.cf(cf::NAMES)?;
        match self.db.get_cf(cf, name)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn name_history(&self, name: &[u8]) -> Result<Option<NameHistory>> {
        let cf = self.cf(cf::HISTORY)?;
        match self.db.get_cf(cf, name)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn names_at_height(&self, height: u32) -> Result<BTreeSet<Name>> {
        let cf = self.cf(cf::EXPIRE)?;
        let mut names = BTreeSet::new();

        let mut iter = self.db.raw_iterator_cf(cf);
        iter.seek(expire_key(height, &[]));
        while iter.valid() {
            let Some(key) = iter.key() else { break };
            let (entry_height, name) = parse_expire_key(key)
                .ok_or_else(|| Error::Corruption("malformed expire-index key".to_string()))?;
            if entry_height > height {
                break;
            }
            if !names.insert(name.to_vec()) {
                return Err(Error::Corruption(format!(
                    "duplicate name '{}' in expire index",
                    display_name(name)
                )));
            }
            iter.next();
        }

        Ok(names)
    }

    fn best_block(&self) -> Result<Option<BlockHash>> {
        Ok(*self.best_block.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::{PubkeyHash, ScriptBuf, Txid};
    use nmc_script::build_name_update;

    fn open_temp(settings: NameSettings) -> (tempfile::TempDir, NameStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = NameStore::open(dir.path(), settings).unwrap();
        (dir, store)
    }

    fn update_script(name: &[u8]) -> ScriptBuf {
        let addr = ScriptBuf::new_p2pkh(&PubkeyHash::all_zeros());
        build_name_update(&addr, name, b"value")
    }

    fn name_data(name: &[u8], height: u32, vout: u32) -> NameData {
        NameData::from_script(
            height,
            OutPoint::new(Txid::all_zeros(), vout),
            &NameScript::parse(&update_script(name)),
        )
    }

    fn write_names(store: &NameStore, entries: &[(&[u8], NameData)]) {
        let mut cache = NameCache::new(store.settings().history);
        for (name, data) in entries {
            cache.add_expire_index(name, data.height);
            cache.set(name.to_vec(), data.clone());
        }
        store.write_batch(&HashMap::new(), None, &cache).unwrap();
    }

    #[test]
    fn name_roundtrip() {
        let (_dir, store) = open_temp(NameSettings::default());
        let data = name_data(b"d/test", 100, 0);
        write_names(&store, &[(b"d/test", data.clone())]);

        assert_eq!(store.name(b"d/test").unwrap(), Some(data));
        assert_eq!(store.name(b"d/other").unwrap(), None);
    }

    #[test]
    fn expire_index_orders_by_numeric_height() {
        // 0x00ff and 0x0142 would sort the wrong way round as
        // little-endian bytes.
        let (_dir, store) = open_temp(NameSettings::default());
        let low = name_data(b"name-1", 0x00ff, 0);
        let high = name_data(b"name-2", 0x0142, 1);
        write_names(&store, &[(b"name-1", low), (b"name-2", high)]);

        assert_eq!(
            store.names_at_height(0x00ff).unwrap(),
            [b"name-1".to_vec()].into_iter().collect()
        );
        assert_eq!(
            store.names_at_height(0x0142).unwrap(),
            [b"name-2".to_vec()].into_iter().collect()
        );
        assert!(store.names_at_height(0x0100).unwrap().is_empty());
    }

    #[test]
    fn deletions_and_expire_removals_flush() {
        let (_dir, store) = open_temp(NameSettings::default());
        let data = name_data(b"d/test", 100, 0);
        write_names(&store, &[(b"d/test", data.clone())]);

        let mut cache = NameCache::new(false);
        cache.remove(b"d/test".to_vec());
        cache.remove_expire_index(b"d/test", 100);
        store.write_batch(&HashMap::new(), None, &cache).unwrap();

        assert_eq!(store.name(b"d/test").unwrap(), None);
        assert!(store.names_at_height(100).unwrap().is_empty());
    }

    #[test]
    fn history_put_and_delete() {
        let (_dir, store) = open_temp(NameSettings::with_history());

        let mut history = NameHistory::default();
        history.push(name_data(b"d/test", 50, 0));

        let mut cache = NameCache::new(true);
        cache.set(b"d/test".to_vec(), name_data(b"d/test", 100, 1));
        cache.add_expire_index(b"d/test", 100);
        cache.set_history(b"d/test".to_vec(), history.clone());
        store.write_batch(&HashMap::new(), None, &cache).unwrap();
        assert_eq!(store.name_history(b"d/test").unwrap(), Some(history));

        // An emptied stack deletes the key.
        let mut cache = NameCache::new(true);
        cache.set(b"d/test".to_vec(), name_data(b"d/test", 100, 1));
        cache.set_history(b"d/test".to_vec(), NameHistory::default());
        store.write_batch(&HashMap::new(), None, &cache).unwrap();
        assert_eq!(store.name_history(b"d/test").unwrap(), None);
    }

    #[test]
    fn coins_and_best_block_roundtrip() {
        let (dir, store) = open_temp(NameSettings::default());
        let outpoint = OutPoint::new(Txid::all_zeros(), 7);
        let coin = Coin {
            amount: 1_000_000,
            height: 100,
            script_pubkey: update_script(b"d/test"),
        };
        let best = BlockHash::from_byte_array([0xab; 32]);

        let coins: HashMap<_, _> = [(outpoint, Some(coin.clone()))].into_iter().collect();
        store
            .write_batch(&coins, Some(best), &NameCache::new(false))
            .unwrap();
        assert_eq!(store.coin(&outpoint).unwrap(), Some(coin));
        assert_eq!(store.best_block().unwrap(), Some(best));

        // Reopen and check persistence.
        drop(store);
        let store = NameStore::open(dir.path(), NameSettings::default()).unwrap();
        assert_eq!(store.best_block().unwrap(), Some(best));

        let coins: HashMap<_, _> = [(outpoint, None)].into_iter().collect();
        store
            .write_batch(&coins, None, &NameCache::new(false))
            .unwrap();
        assert_eq!(store.coin(&outpoint).unwrap(), None);
    }

    #[test]
    fn walk_names_in_order_with_early_stop() {
        let (_dir, store) = open_temp(NameSettings::default());
        write_names(
            &store,
            &[
                (b"d/a", name_data(b"d/a", 10, 0)),
                (b"d/b", name_data(b"d/b", 11, 1)),
                (b"d/c", name_data(b"d/c", 12, 2)),
            ],
        );

        let mut seen = Vec::new();
        store
            .walk_names(b"", |name, _| {
                seen.push(name.to_vec());
                true
            })
            .unwrap();
        assert_eq!(seen, vec![b"d/a".to_vec(), b"d/b".to_vec(), b"d/c".to_vec()]);

        let mut seen = Vec::new();
        store
            .walk_names(b"d/b", |name, _| {
                seen.push(name.to_vec());
                false
            })
            .unwrap();
        assert_eq!(seen, vec![b"d/b".to_vec()]);
    }

    #[test]
    fn validate_name_db_detects_mismatches() {
        let params = ChainParams::new(bitcoin::Network::Bitcoin);
        let interrupt = AtomicBool::new(false);
        let (_dir, store) = open_temp(NameSettings::default());

        let data = name_data(b"d/test", 100_000, 0);
        let coin = Coin {
            amount: 1_000_000,
            height: 100_000,
            script_pubkey: update_script(b"d/test"),
        };
        let coins: HashMap<_, _> = [(data.outpoint, Some(coin))].into_iter().collect();
        let mut cache = NameCache::new(false);
        cache.set(b"d/test".to_vec(), data.clone());
        cache.add_expire_index(b"d/test", 100_000);
        store.write_batch(&coins, None, &cache).unwrap();

        assert!(store.validate_name_db(100_100, &params, &interrupt).unwrap());

        // Expired names are excluded from the UTXO comparison, so a
        // spent coin for an expired name is still consistent.
        let spent: HashMap<_, _> = [(data.outpoint, None)].into_iter().collect();
        store
            .write_batch(&spent, None, &NameCache::new(false))
            .unwrap();
        assert!(!store.validate_name_db(100_100, &params, &interrupt).unwrap());
        assert!(store.validate_name_db(136_000, &params, &interrupt).unwrap());

        let interrupted = AtomicBool::new(true);
        assert!(matches!(
            store.validate_name_db(136_000, &params, &interrupted),
            Err(Error::Interrupted)
        ));
    }
}
