//! # Derived-Result Cache
//!
//! Durable `ownerKey -> entry` store for expensive analysis results. Every entry
//! remembers the signature of the *inputs* that produced it, and is only ever
//! served while the owner's current input signature still matches.
//!
//! Entries disappear when:
//! - the owner is no longer in the backing list (`reconcile`),
//! - the owner's signature changed (`reconcile` or a mismatching `get_valid`),
//! - the user asks for recomputation (`invalidate` / `remove`).
//!
//! The whole map is rewritten to storage after every mutation. Unreadable or
//! malformed stored data is logged and treated as an empty cache.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::storage::CacheStorage;
use crate::core::fingerprint::Signature;
use crate::core::lock;
use crate::retrieve::api::AnalysisResult;

/// One cached result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Owner the result belongs to (e.g. a program id).
    pub owner_key: String,
    /// Signature of the inputs the result was computed from.
    pub signature: Signature,
    /// The analysis served on a hit. It is never returned once `signature`
    /// stops matching the owner's current inputs.
    pub result: AnalysisResult,
    /// When the entry was written.
    pub updated_at: DateTime<Utc>,
}

/// An owner as it appears in a freshly fetched backing list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerSignature {
    /// The owner key, matching [`CacheEntry::owner_key`].
    pub owner_key: String,
    /// Signature of the owner's inputs as they are now.
    pub signature: Signature,
}

impl OwnerSignature {
    /// Shorthand constructor.
    pub fn new(owner_key: impl Into<String>, signature: Signature) -> Self {
        Self {
            owner_key: owner_key.into(),
            signature,
        }
    }
}

/// What a `reconcile` pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Owners no longer present in the backing list.
    pub orphaned: Vec<String>,
    /// Owners whose input signature changed.
    pub stale: Vec<String>,
}

impl ReconcileReport {
    /// Number of evicted entries.
    pub fn evicted(&self) -> usize {
        self.orphaned.len() + self.stale.len()
    }
}

/// Signature-validated, durable result cache.
pub struct DerivedResultCache {
    storage: Box<dyn CacheStorage>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl DerivedResultCache {
    /// Opens the cache, loading whatever `storage` holds.
    pub fn open(storage: impl CacheStorage + 'static) -> Self {
        let entries = Self::load(&storage);
        log::debug!("Derived-result cache opened with {} entries", entries.len());
        Self {
            storage: Box::new(storage),
            entries: Mutex::new(entries),
        }
    }

    fn load(storage: &dyn CacheStorage) -> HashMap<String, CacheEntry> {
        let raw = match storage.read() {
            Ok(Some(raw)) => raw,
            Ok(None) => return HashMap::new(),
            Err(e) => {
                log::warn!("Cache storage unreadable, starting empty: {}", e);
                return HashMap::new();
            }
        };
        match serde_json::from_str::<HashMap<String, CacheEntry>>(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Stored cache is malformed, starting empty: {}", e);
                HashMap::new()
            }
        }
    }

    /// Raw lookup, without signature validation.
    pub fn get(&self, owner_key: &str) -> Option<CacheEntry> {
        lock(&self.entries).get(owner_key).cloned()
    }

    /// Lookup under the hit rule: returns the entry only if its signature equals
    /// `current`. A mismatching entry is evicted on the spot.
    pub fn get_valid(&self, owner_key: &str, current: &Signature) -> Option<CacheEntry> {
        let mut entries = lock(&self.entries);
        let matches = entries.get(owner_key).map(|entry| &entry.signature == current);
        match matches {
            Some(true) => {
                log::debug!("Cache hit for {}", owner_key);
                entries.get(owner_key).cloned()
            }
            Some(false) => {
                entries.remove(owner_key);
                log::info!("Cache entry for {} is stale, evicted", owner_key);
                self.persist(&entries);
                None
            }
            None => {
                log::debug!("Cache miss for {}", owner_key);
                None
            }
        }
    }

    /// Upserts the result for `owner_key`, always overwriting.
    pub fn put(&self, owner_key: &str, signature: Signature, result: AnalysisResult) -> CacheEntry {
        let entry = CacheEntry {
            owner_key: owner_key.to_owned(),
            signature,
            result,
            updated_at: Utc::now(),
        };
        let mut entries = lock(&self.entries);
        entries.insert(owner_key.to_owned(), entry.clone());
        self.persist(&entries);
        entry
    }

    /// Re-inserts a previously removed entry unless something newer took its slot.
    pub fn restore_if_absent(&self, entry: CacheEntry) -> bool {
        let mut entries = lock(&self.entries);
        if entries.contains_key(&entry.owner_key) {
            return false;
        }
        entries.insert(entry.owner_key.clone(), entry);
        self.persist(&entries);
        true
    }

    /// Removes and returns the entry for `owner_key`.
    pub fn remove(&self, owner_key: &str) -> Option<CacheEntry> {
        let mut entries = lock(&self.entries);
        let removed = entries.remove(owner_key);
        if removed.is_some() {
            self.persist(&entries);
        }
        removed
    }

    /// Explicit eviction. Returns whether an entry existed.
    pub fn invalidate(&self, owner_key: &str) -> bool {
        let removed = self.remove(owner_key).is_some();
        if removed {
            log::info!("Cache entry for {} invalidated", owner_key);
        }
        removed
    }

    /// Re-validates every entry against a freshly fetched backing list.
    pub fn reconcile(&self, current: &[OwnerSignature]) -> ReconcileReport {
        let by_owner: HashMap<&str, &Signature> = current
            .iter()
            .map(|o| (o.owner_key.as_str(), &o.signature))
            .collect();

        let mut report = ReconcileReport::default();
        let mut entries = lock(&self.entries);
        entries.retain(|owner, entry| match by_owner.get(owner.as_str()) {
            None => {
                report.orphaned.push(owner.clone());
                false
            }
            Some(sig) if *sig != &entry.signature => {
                report.stale.push(owner.clone());
                false
            }
            Some(_) => true,
        });

        if report.evicted() > 0 {
            report.orphaned.sort();
            report.stale.sort();
            log::info!(
                "Cache reconcile evicted {} orphaned and {} stale entries",
                report.orphaned.len(),
                report.stale.len()
            );
            self.persist(&entries);
        }
        report
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Owners with an entry, sorted.
    pub fn owners(&self) -> Vec<String> {
        let mut owners: Vec<String> = lock(&self.entries).keys().cloned().collect();
        owners.sort();
        owners
    }

    fn persist(&self, entries: &HashMap<String, CacheEntry>) {
        let written = serde_json::to_string(entries)
            .map_err(std::io::Error::from)
            .and_then(|raw| self.storage.write(&raw));
        if let Err(e) = written {
            // The in-memory map stays authoritative for this session.
            log::error!("Failed to persist derived-result cache: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::storage::{FileStorage, MemoryStorage};
    use crate::core::fingerprint::fingerprint;
    use crate::retrieve::api::StructuredItem;
    use serde_json::json;

    fn result(text: &str) -> AnalysisResult {
        AnalysisResult {
            analysis: text.to_string(),
            items: vec![StructuredItem {
                label: "Standard 1".into(),
                detail: "Met".into(),
                score: Some(0.8),
            }],
        }
    }

    fn sig(compliance: u32) -> Signature {
        fingerprint(&json!({"compliance": compliance})).unwrap()
    }

    #[test]
    fn hit_requires_matching_signature() {
        let cache = DerivedResultCache::open(MemoryStorage::new());
        cache.put("p1", sig(80), result("80% compliant"));

        assert_eq!(cache.get_valid("p1", &sig(80)).unwrap().result.analysis, "80% compliant");
        assert!(cache.get_valid("p1", &sig(95)).is_none());
        assert!(cache.get("p1").is_none(), "stale entry must be evicted");
    }

    #[test]
    fn put_overwrites() {
        let cache = DerivedResultCache::open(MemoryStorage::new());
        cache.put("p1", sig(80), result("old"));
        cache.put("p1", sig(95), result("new"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("p1").unwrap().result.analysis, "new");
    }

    #[test]
    fn reconcile_evicts_orphans_and_stale() {
        let cache = DerivedResultCache::open(MemoryStorage::new());
        cache.put("keep", sig(1), result("a"));
        cache.put("changed", sig(2), result("b"));
        cache.put("gone", sig(3), result("c"));

        let report = cache.reconcile(&[
            OwnerSignature::new("keep", sig(1)),
            OwnerSignature::new("changed", sig(20)),
            OwnerSignature::new("new", sig(4)),
        ]);

        assert_eq!(report.orphaned, vec!["gone".to_string()]);
        assert_eq!(report.stale, vec!["changed".to_string()]);
        assert_eq!(cache.owners(), vec!["keep".to_string()]);
    }

    #[test]
    fn reconcile_with_empty_list_empties_cache() {
        let cache = DerivedResultCache::open(MemoryStorage::new());
        cache.put("a", sig(1), result("a"));
        cache.put("b", sig(2), result("b"));
        assert_eq!(cache.reconcile(&[]).evicted(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_removes() {
        let cache = DerivedResultCache::open(MemoryStorage::new());
        cache.put("a", sig(1), result("a"));
        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert!(cache.is_empty());
    }

    #[test]
    fn malformed_storage_is_an_empty_cache() {
        let cache = DerivedResultCache::open(MemoryStorage::with_raw("{not json"));
        assert!(cache.is_empty());

        let cache = DerivedResultCache::open(MemoryStorage::with_raw("[1,2,3]"));
        assert!(cache.is_empty());
        cache.put("a", sig(1), result("a"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn survives_reopen_from_file() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = DerivedResultCache::open(FileStorage::new(dir.path(), "analysis"));
            cache.put("p1", sig(80), result("persisted"));
        }
        let reopened = DerivedResultCache::open(FileStorage::new(dir.path(), "analysis"));
        let entry = reopened.get_valid("p1", &sig(80)).unwrap();
        assert_eq!(entry.result.analysis, "persisted");
        assert_eq!(entry.result.items.len(), 1);
    }

    #[test]
    fn restore_if_absent_does_not_clobber_newer_entry() {
        let cache = DerivedResultCache::open(MemoryStorage::new());
        let old = cache.put("p1", sig(1), result("old"));
        cache.remove("p1");
        cache.put("p1", sig(2), result("newer"));
        assert!(!cache.restore_if_absent(old.clone()));
        assert_eq!(cache.get("p1").unwrap().result.analysis, "newer");

        cache.remove("p1");
        assert!(cache.restore_if_absent(old));
        assert_eq!(cache.get("p1").unwrap().result.analysis, "old");
    }
}
