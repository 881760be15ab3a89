//! Shared raster cache with in-flight request coalescing
//!
//! Every key owns a slot. The first caller for a key locks the slot and
//! fetches; concurrent callers for the same key block on that slot and then
//! read the stored raster, so a key is fetched at most once at a time. A
//! failed fetch leaves the slot empty and the next caller tries again.

use super::provider::Dataset;
use super::raster::Raster;
use crate::core_types::BoundingBox;
use crate::error::{CacheError, FetchError};
use chrono::NaiveDate;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Identity of a cached raster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Bounding box edges in micro-degrees (south, west, north, east)
    pub bbox: [i64; 4],
    /// Dataset
    pub dataset: Dataset,
    /// Acquisition date
    pub date: NaiveDate,
}

impl CacheKey {
    /// Key for a box, quantised to 1e-6 degrees
    #[must_use]
    pub fn new(bbox: &BoundingBox, dataset: Dataset, date: NaiveDate) -> Self {
        Self {
            bbox: bbox.quantized(),
            dataset,
            date,
        }
    }
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: usize,
    /// Lookups that had to call the provider
    pub misses: usize,
    /// Stored rasters
    pub entries: usize,
}

type Slot = Arc<Mutex<Option<Arc<Raster>>>>;

/// On-disk form of one entry
#[derive(Serialize, Deserialize)]
struct StoredRaster {
    key: CacheKey,
    raster: Raster,
}

/// Thread-safe raster cache
#[derive(Debug, Default)]
pub struct RasterCache {
    slots: Mutex<FxHashMap<CacheKey, Slot>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl RasterCache {
    /// Empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &CacheKey) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(*key).or_default())
    }

    /// Stored raster for `key`, without fetching
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Raster>> {
        let slot = {
            let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.get(key).cloned()
        }?;
        let stored = slot.lock().unwrap_or_else(PoisonError::into_inner);
        stored.clone()
    }

    /// Store a raster, replacing any previous value
    pub fn insert(&self, key: CacheKey, raster: Raster) {
        let slot = self.slot(&key);
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(raster));
    }

    /// Return the cached raster for `key`, or run `fetch` and cache its result.
    ///
    /// The boolean is `true` for a cache hit.
    ///
    /// # Errors
    ///
    /// Whatever `fetch` returns; failures are not cached.
    pub fn get_or_fetch<F>(
        &self,
        key: &CacheKey,
        fetch: F,
    ) -> Result<(Arc<Raster>, bool), FetchError>
    where
        F: FnOnce() -> Result<Raster, FetchError>,
    {
        let slot = self.slot(key);
        // Held across the fetch so duplicates wait instead of re-fetching
        let mut stored = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(raster) = stored.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(dataset = %key.dataset, "Raster cache hit");
            return Ok((Arc::clone(raster), true));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let raster = Arc::new(fetch()?);
        *stored = Some(Arc::clone(&raster));
        Ok((raster, false))
    }

    /// Number of stored rasters
    #[must_use]
    pub fn len(&self) -> usize {
        let slots: Vec<Slot> = {
            let map = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            map.values().cloned().collect()
        };
        slots
            .iter()
            .filter(|s| s.lock().unwrap_or_else(PoisonError::into_inner).is_some())
            .count()
    }

    /// Whether nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current counters
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    fn entries(&self) -> Vec<StoredRaster> {
        let slots: Vec<(CacheKey, Slot)> = {
            let map = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            map.iter().map(|(k, s)| (*k, Arc::clone(s))).collect()
        };
        let mut entries: Vec<StoredRaster> = slots
            .into_iter()
            .filter_map(|(key, slot)| {
                let stored = slot.lock().unwrap_or_else(PoisonError::into_inner);
                stored.as_ref().map(|r| StoredRaster {
                    key,
                    raster: Raster::clone(r),
                })
            })
            .collect();
        // Stable file contents regardless of hash order
        entries.sort_by_key(|e| (e.key.dataset, e.key.date, e.key.bbox));
        entries
    }

    /// Load a cache previously written with [`Self::save`]
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CacheError> {
        let contents =
            fs::read_to_string(path.as_ref()).map_err(|e| CacheError::LoadFailed(e.to_string()))?;
        let stored: Vec<StoredRaster> =
            serde_json::from_str(&contents).map_err(|e| CacheError::ParseFailed(e.to_string()))?;

        let cache = Self::new();
        let count = stored.len();
        for entry in stored {
            cache.insert(entry.key, entry.raster);
        }
        info!(entries = count, path = %path.as_ref().display(), "Raster cache loaded");
        Ok(cache)
    }

    /// Write every stored raster to `path` as JSON
    ///
    /// # Errors
    /// Returns error if the cache cannot be serialized or the file written
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), CacheError> {
        let entries = self.entries();
        let contents = serde_json::to_string(&entries)
            .map_err(|e| CacheError::SerializeFailed(e.to_string()))?;
        fs::write(path.as_ref(), contents).map_err(|e| CacheError::SaveFailed(e.to_string()))?;
        info!(entries = entries.len(), path = %path.as_ref().display(), "Raster cache saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn key(dataset: Dataset) -> CacheKey {
        CacheKey::new(
            &BoundingBox::new(45.0, 60.0, 45.1, 60.1),
            dataset,
            NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
        )
    }

    fn raster(value: f64) -> Raster {
        Raster::new(BoundingBox::new(45.0, 60.0, 45.1, 60.1), 1, 1, vec![Some(value)]).unwrap()
    }

    #[test]
    fn test_second_lookup_is_a_hit() {
        let cache = RasterCache::new();
        let calls = AtomicUsize::new(0);
        let fetch = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(raster(0.5))
        };
        let (_, hit) = cache.get_or_fetch(&key(Dataset::Vegetation), fetch).unwrap();
        assert!(!hit);
        let (r, hit) = cache
            .get_or_fetch(&key(Dataset::Vegetation), || Ok(raster(9.0)))
            .unwrap();
        assert!(hit);
        assert_eq!(r.get(0, 0), Some(0.5));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                entries: 1
            }
        );
    }

    #[test]
    fn test_failures_are_not_cached() {
        let cache = RasterCache::new();
        let k = key(Dataset::SoilClay);
        assert!(cache
            .get_or_fetch(&k, || Err(FetchError::MissingCoverage))
            .is_err());
        assert!(cache.get(&k).is_none());
        let (_, hit) = cache.get_or_fetch(&k, || Ok(raster(30.0))).unwrap();
        assert!(!hit);
    }

    #[test]
    fn test_concurrent_duplicates_coalesce() {
        let cache = Arc::new(RasterCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    cache
                        .get_or_fetch(&key(Dataset::Elevation), || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(50));
                            Ok(raster(100.0))
                        })
                        .map(|(r, _)| r.get(0, 0))
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), Some(100.0));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let cache = RasterCache::new();
        cache.insert(key(Dataset::Vegetation), raster(0.7));
        cache.insert(key(Dataset::SoilNitrogen), raster(1.4));
        let path = std::env::temp_dir().join(format!("otu-cache-{}.json", std::process::id()));
        cache.save(&path).unwrap();

        let loaded = RasterCache::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.len(), 2);
        assert_eq!(
            loaded.get(&key(Dataset::SoilNitrogen)).unwrap().get(0, 0),
            Some(1.4)
        );
        assert!(matches!(
            RasterCache::load("/nonexistent/otu-cache.json"),
            Err(CacheError::LoadFailed(_))
        ));
    }
}
