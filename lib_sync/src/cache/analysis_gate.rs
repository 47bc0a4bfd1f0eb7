//! # Analysis Gate
//!
//! Puts the non-idempotent `POST /analyze` behind the derived-result cache.
//! A valid entry is served as is; a miss (or a stale entry, which the cache
//! evicts on lookup) triggers exactly one computation whose result is stored
//! under the signature the caller supplied.
//!
//! Compute-and-store is not atomic across the request: two near-simultaneous
//! loads for the same owner may both compute, and the last writer wins.

use std::sync::Arc;

use crate::cache::derived_cache::{CacheEntry, DerivedResultCache};
use crate::core::fingerprint::Signature;
use crate::errors::Result;
use crate::retrieve::api::AnalysisApi;

/// Where a served result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisSource {
    /// Served from a valid cache entry.
    Cache,
    /// Computed by the analyzer during this call.
    Computed,
}

/// A result ready to display.
#[derive(Debug, Clone)]
pub struct AnalysisView {
    /// The entry now in the cache.
    pub entry: CacheEntry,
    /// Hit or fresh computation.
    pub source: AnalysisSource,
}

/// Cache-first access to the analyzer.
#[derive(Clone)]
pub struct AnalysisGate {
    cache: Arc<DerivedResultCache>,
    api: Arc<dyn AnalysisApi>,
}

impl AnalysisGate {
    /// Combines a cache with the analyzer endpoint.
    pub fn new(cache: Arc<DerivedResultCache>, api: Arc<dyn AnalysisApi>) -> Self {
        Self { cache, api }
    }

    /// The underlying cache.
    pub fn cache(&self) -> &Arc<DerivedResultCache> {
        &self.cache
    }

    /// Serves the cached result for `owner_key` if it was computed from inputs
    /// with signature `current`; otherwise computes and stores a fresh one.
    ///
    /// On failure the cache is left as it was and the error is returned.
    pub async fn load(&self, owner_key: &str, current: &Signature) -> Result<AnalysisView> {
        if let Some(entry) = self.cache.get_valid(owner_key, current) {
            return Ok(AnalysisView {
                entry,
                source: AnalysisSource::Cache,
            });
        }
        self.compute(owner_key, current).await
    }

    /// User-triggered recomputation. The existing entry is evicted first; if the
    /// computation fails it is put back, unless something newer was stored meanwhile.
    pub async fn recompute(&self, owner_key: &str, current: &Signature) -> Result<AnalysisView> {
        let previous = self.cache.remove(owner_key);
        match self.compute(owner_key, current).await {
            Ok(view) => Ok(view),
            Err(e) => {
                if let Some(previous) = previous {
                    self.cache.restore_if_absent(previous);
                }
                Err(e)
            }
        }
    }

    async fn compute(&self, owner_key: &str, current: &Signature) -> Result<AnalysisView> {
        log::info!("Computing analysis for {} (signature {})", owner_key, current.short());
        let result = self.api.analyze(owner_key).await.map_err(|e| {
            log::warn!("Analysis for {} failed: {}", owner_key, e);
            e
        })?;
        let entry = self.cache.put(owner_key, current.clone(), result);
        Ok(AnalysisView {
            entry,
            source: AnalysisSource::Computed,
        })
    }
}
