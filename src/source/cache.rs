use super::{Provider, SeriesInfo};
use moka::future::Cache;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Cache key for a fetched show graph
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
struct SeriesKey {
    provider: Provider,
    id: u64,
}

/// Cache key for a resolved cross-provider mapping
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
struct MappingKey {
    from: Provider,
    to: Provider,
    id: u64,
}

/// Shared cache of show graphs and resolved id mappings.
///
/// Passed explicitly to whatever needs it; cloning shares the storage.
#[derive(Clone)]
pub struct MetadataCache {
    series: Cache<SeriesKey, Arc<SeriesInfo>>,
    mappings: Cache<MappingKey, u64>,
    imdb: Cache<u64, String>,
}

impl MetadataCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            series: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
            mappings: Cache::builder().max_capacity(capacity * 4).build(),
            imdb: Cache::builder().max_capacity(capacity * 4).build(),
        }
    }

    pub async fn get_series(&self, provider: Provider, id: u64) -> Option<Arc<SeriesInfo>> {
        self.series.get(&SeriesKey { provider, id }).await
    }

    /// Store a graph, replacing any previous one for the same show
    pub async fn set_series(&self, series: SeriesInfo) -> Arc<SeriesInfo> {
        let key = SeriesKey {
            provider: series.provider,
            id: series.id,
        };
        if let Some(ref imdb) = series.external_ids.imdb
            && let Some(tvdb) = series.external_ids.tvdb
        {
            self.imdb.insert(tvdb, imdb.clone()).await;
        }
        let series = Arc::new(series);
        self.series.insert(key, Arc::clone(&series)).await;
        series
    }

    pub async fn get_mapping(&self, from: Provider, to: Provider, id: u64) -> Option<u64> {
        self.mappings.get(&MappingKey { from, to, id }).await
    }

    pub async fn set_mapping(&self, from: Provider, to: Provider, id: u64, target: u64) {
        self.mappings.insert(MappingKey { from, to, id }, target).await;
    }

    /// Imdb id last seen for a TheTVDB show
    pub async fn imdb_for_tvdb(&self, tvdb: u64) -> Option<String> {
        self.imdb.get(&tvdb).await
    }

    pub async fn remember_imdb(&self, tvdb: u64, imdb: impl Into<String>) {
        self.imdb.insert(tvdb, imdb.into()).await;
    }

    pub async fn invalidate(&self, provider: Provider, id: u64) {
        self.series.invalidate(&SeriesKey { provider, id }).await;
    }

    /// Drop every cached graph older than the change times the provider reported.
    ///
    /// Returns how many entries were invalidated.
    pub async fn apply_updates(&self, provider: Provider, updates: &HashMap<u64, i64>) -> usize {
        let mut invalidated = 0;
        for (&id, &changed) in updates {
            let key = SeriesKey { provider, id };
            if let Some(cached) = self.series.get(&key).await
                && cached.last_updated.timestamp() < changed
            {
                self.series.invalidate(&key).await;
                invalidated += 1;
            }
        }
        debug!(
            "{} reported {} updates, {} cached shows invalidated",
            provider,
            updates.len(),
            invalidated
        );
        invalidated
    }

    pub fn clear(&self) {
        self.series.invalidate_all();
        self.mappings.invalidate_all();
        self.imdb.invalidate_all();
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            series_entries: self.series.entry_count(),
            mapping_entries: self.mappings.entry_count(),
        }
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new(500, Duration::from_secs(86400))
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub series_entries: u64,
    pub mapping_entries: u64,
}
