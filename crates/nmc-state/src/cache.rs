//! Record of pending updates to the name database.

use nmc_primitives::{ExpireEntry, Name, NameData, NameHistory};
use std::collections::{BTreeMap, BTreeSet};

/// Cache of changes to the name database: new or updated names, deleted
/// names (from rolling back changes), history edits and expire-index
/// deltas.  The cache is an overlay; it never reads through to a backing
/// store itself.
#[derive(Debug, Clone)]
pub struct NameCache {
    /// New or updated names.
    entries: BTreeMap<Name, NameData>,
    /// Deleted names.
    deleted: BTreeSet<Name>,
    /// New or updated history stacks.  An empty stack deletes the
    /// corresponding database entry on flush.  Stays empty unless the
    /// history log is enabled.
    history: BTreeMap<Name, NameHistory>,
    /// Changes to the expire index: `true` adds the entry, `false`
    /// removes it.
    expire_index: BTreeMap<ExpireEntry, bool>,
    /// Whether the history log is enabled.
    with_history: bool,
}

impl NameCache {
    pub fn new(with_history: bool) -> Self {
        Self {
            entries: BTreeMap::new(),
            deleted: BTreeSet::new(),
            history: BTreeMap::new(),
            expire_index: BTreeMap::new(),
            with_history,
        }
    }

    /// Whether the history log is enabled for this cache.
    pub fn with_history(&self) -> bool {
        self.with_history
    }

    /// Drop all cached changes.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.deleted.clear();
        self.history.clear();
        self.expire_index.clear();
    }

    /// Check if the cache is clean (no cached changes).  Also validates
    /// the internal consistency of the delta sets.
    pub fn is_clean(&self) -> bool {
        if self.entries.is_empty() && self.deleted.is_empty() {
            assert!(
                self.history.is_empty() && self.expire_index.is_empty(),
                "history/expire deltas without name changes"
            );
            return true;
        }
        false
    }

    /// Whether the name is marked as deleted.
    pub fn is_deleted(&self, name: &[u8]) -> bool {
        self.deleted.contains(name)
    }

    /// Cached record for a name.  Looks only at new entries and does not
    /// care about deletions.
    pub fn get(&self, name: &[u8]) -> Option<&NameData> {
        self.entries.get(name)
    }

    /// Cached history stack for a name.
    pub fn get_history(&self, name: &[u8]) -> Option<&NameHistory> {
        assert!(self.with_history, "history log is disabled");
        self.history.get(name)
    }

    /// Apply the cached expire-index changes for one height to a set of
    /// names read from the backing store.
    pub fn update_names_for_height(&self, height: u32, names: &mut BTreeSet<Name>) {
        let from = ExpireEntry::new(height, Vec::new());
        for (entry, add) in self.expire_index.range(from..) {
            if entry.height > height {
                break;
            }
            if *add {
                names.insert(entry.name.clone());
            } else {
                names.remove(&entry.name);
            }
        }
    }

    /// Insert or update a name.  Clears a pending deletion of the same
    /// name.
    pub fn set(&mut self, name: Name, data: NameData) {
        self.deleted.remove(&name);
        self.entries.insert(name, data);
    }

    /// Record a new history stack for a name.
    pub fn set_history(&mut self, name: Name, history: NameHistory) {
        assert!(self.with_history, "history log is disabled");
        self.history.insert(name, history);
    }

    /// Delete a name.  Clears a pending update of the same name.
    pub fn remove(&mut self, name: Name) {
        self.entries.remove(&name);
        self.deleted.insert(name);
    }

    /// Record an expire-index addition.
    pub fn add_expire_index(&mut self, name: &[u8], height: u32) {
        self.expire_index
            .insert(ExpireEntry::new(height, name.to_vec()), true);
    }

    /// Record an expire-index removal.
    pub fn remove_expire_index(&mut self, name: &[u8], height: u32) {
        self.expire_index
            .insert(ExpireEntry::new(height, name.to_vec()), false);
    }

    /// Apply all changes of `other` on top of this cache.
    pub fn apply(&mut self, other: &NameCache) {
        for (name, data) in &other.entries {
            self.set(name.clone(), data.clone());
        }
        for name in &other.deleted {
            self.remove(name.clone());
        }
        for (name, history) in &other.history {
            self.set_history(name.clone(), history.clone());
        }
        for (entry, add) in &other.expire_index {
            self.expire_index.insert(entry.clone(), *add);
        }
    }

    pub(crate) fn entries(&self) -> &BTreeMap<Name, NameData> {
        &self.entries
    }

    pub(crate) fn deleted(&self) -> &BTreeSet<Name> {
        &self.deleted
    }

    pub(crate) fn history_edits(&self) -> &BTreeMap<Name, NameHistory> {
        &self.history
    }

    pub(crate) fn expire_index(&self) -> &BTreeMap<ExpireEntry, bool> {
        &self.expire_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;
    use bitcoin::{OutPoint, ScriptBuf, Txid};

    fn data(height: u32) -> NameData {
        NameData {
            value: b"value".to_vec(),
            height,
            outpoint: OutPoint::new(Txid::all_zeros(), 0),
            address: ScriptBuf::new(),
        }
    }

    #[test]
    fn set_supersedes_delete() {
        let mut cache = NameCache::new(false);
        cache.remove(b"d/x".to_vec());
        assert!(cache.is_deleted(b"d/x"));

        cache.set(b"d/x".to_vec(), data(10));
        assert!(!cache.is_deleted(b"d/x"));
        assert_eq!(cache.get(b"d/x"), Some(&data(10)));

        cache.remove(b"d/x".to_vec());
        assert!(cache.is_deleted(b"d/x"));
        assert_eq!(cache.get(b"d/x"), None);
    }

    #[test]
    fn expire_deltas_patch_height_sets() {
        let mut cache = NameCache::new(false);
        cache.add_expire_index(b"d/a", 100);
        cache.remove_expire_index(b"d/b", 100);
        cache.add_expire_index(b"d/c", 101);

        let mut names: BTreeSet<Name> = [b"d/b".to_vec()].into_iter().collect();
        cache.update_names_for_height(100, &mut names);
        assert_eq!(names, [b"d/a".to_vec()].into_iter().collect());

        let mut names = BTreeSet::new();
        cache.update_names_for_height(101, &mut names);
        assert_eq!(names, [b"d/c".to_vec()].into_iter().collect());
    }

    #[test]
    fn apply_merges_with_set_winning_over_delete() {
        let mut base = NameCache::new(false);
        base.remove(b"d/a".to_vec());
        base.set(b"d/b".to_vec(), data(1));

        let mut child = NameCache::new(false);
        child.set(b"d/a".to_vec(), data(2));
        child.remove(b"d/b".to_vec());

        base.apply(&child);
        assert_eq!(base.get(b"d/a"), Some(&data(2)));
        assert!(!base.is_deleted(b"d/a"));
        assert!(base.is_deleted(b"d/b"));
        assert_eq!(base.get(b"d/b"), None);
    }

    #[test]
    fn clean_cache_has_no_side_deltas() {
        let mut cache = NameCache::new(false);
        assert!(cache.is_clean());
        cache.set(b"d/a".to_vec(), data(1));
        assert!(!cache.is_clean());
        cache.clear();
        assert!(cache.is_clean());
    }
}
