//! Session-scoped memoization of expensive loads.
//!
//! Entries are keyed by canonical file path plus a free-form parameter
//! string (rank, mode, subgraph name). Values are `Arc`-shared and never
//! invalidated; a cache lives as long as the session that created it.
//! The maps are mutex-guarded so one cache can be shared across threads.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::data::AbundanceTable;
use crate::diversity::DissimilarityMatrix;
use crate::error::Result;
use crate::graph::Network;

type Slot<T> = Mutex<HashMap<(String, String), Arc<T>>>;

/// Memo tables for the three load-heavy value types.
#[derive(Default)]
pub struct AnalysisCache {
    tables: Slot<AbundanceTable>,
    matrices: Slot<DissimilarityMatrix>,
    networks: Slot<Network>,
}

impl AnalysisCache {
    pub fn new() -> Self {
        AnalysisCache::default()
    }

    /// Cached abundance table, or run `load` and remember its result.
    pub fn table_or_load<P, F>(&self, path: P, params: &str, load: F) -> Result<Arc<AbundanceTable>>
    where
        P: AsRef<Path>,
        F: FnOnce() -> Result<AbundanceTable>,
    {
        get_or_insert(&self.tables, path, params, load)
    }

    /// Cached dissimilarity matrix, or run `load` and remember its result.
    pub fn matrix_or_load<P, F>(
        &self,
        path: P,
        params: &str,
        load: F,
    ) -> Result<Arc<DissimilarityMatrix>>
    where
        P: AsRef<Path>,
        F: FnOnce() -> Result<DissimilarityMatrix>,
    {
        get_or_insert(&self.matrices, path, params, load)
    }

    /// Cached network, or run `load` and remember its result.
    pub fn network_or_load<P, F>(&self, path: P, params: &str, load: F) -> Result<Arc<Network>>
    where
        P: AsRef<Path>,
        F: FnOnce() -> Result<Network>,
    {
        get_or_insert(&self.networks, path, params, load)
    }

    /// Total number of memoized entries.
    pub fn len(&self) -> usize {
        lock(&self.tables).len() + lock(&self.matrices).len() + lock(&self.networks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn get_or_insert<T, P, F>(slot: &Slot<T>, path: P, params: &str, load: F) -> Result<Arc<T>>
where
    P: AsRef<Path>,
    F: FnOnce() -> Result<T>,
{
    let key = cache_key(path, params);
    if let Some(hit) = lock(slot).get(&key) {
        return Ok(Arc::clone(hit));
    }
    // the loader runs outside the lock; on a race the first insert wins
    let value = Arc::new(load()?);
    let mut guard = lock(slot);
    let entry = guard.entry(key).or_insert(value);
    Ok(Arc::clone(entry))
}

fn cache_key<P: AsRef<Path>>(path: P, params: &str) -> (String, String) {
    let path = path.as_ref();
    let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    (canonical.to_string_lossy().into_owned(), params.to_string())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MicrovizError;
    use nalgebra::DMatrix;
    use std::cell::Cell;

    fn test_table() -> AbundanceTable {
        AbundanceTable::new(
            DMatrix::from_row_slice(1, 2, &[1.0, 2.0]),
            vec!["taxon".to_string()],
            vec!["R1".to_string(), "R2".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_second_lookup_skips_loader() {
        let cache = AnalysisCache::new();
        let calls = Cell::new(0);
        for _ in 0..2 {
            cache
                .table_or_load("abundance.csv", "genus", || {
                    calls.set(calls.get() + 1);
                    Ok(test_table())
                })
                .unwrap();
        }
        assert_eq!(calls.get(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_entries_are_shared() {
        let cache = AnalysisCache::new();
        let first = cache
            .table_or_load("abundance.csv", "genus", || Ok(test_table()))
            .unwrap();
        let second = cache
            .table_or_load("abundance.csv", "genus", || Ok(test_table()))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_params_separate_entries() {
        let cache = AnalysisCache::new();
        cache
            .table_or_load("abundance.csv", "genus", || Ok(test_table()))
            .unwrap();
        cache
            .table_or_load("abundance.csv", "phylum", || Ok(test_table()))
            .unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let cache = AnalysisCache::new();
        let result = cache.network_or_load("net.graphml", "", || {
            Err(MicrovizError::EmptyData("nothing".to_string()))
        });
        assert!(result.is_err());
        assert!(cache.is_empty());
        // a later successful load still runs
        cache
            .network_or_load("net.graphml", "", || Ok(Network::new(false)))
            .unwrap();
        assert_eq!(cache.len(), 1);
    }
}
