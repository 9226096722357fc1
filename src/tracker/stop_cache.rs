use anyhow::Result;
use dashmap::DashMap;
use std::sync::Arc;

use crate::model::Stop;
use crate::services::store::Datastore;

/// Memoized resolution from a source-specific stop identifier to the
/// canonical stop record.
///
/// A miss triggers a two-step datastore lookup: the stop group by alternate
/// identifier, then the stop associated with that group. Only successful
/// resolutions are cached; entries are never evicted. Concurrent misses for
/// the same key may both query the store — duplicate fills are deterministic
/// and idempotent, so no per-key locking is needed.
pub struct StopResolutionCache {
    store: Arc<dyn Datastore>,
    entries: DashMap<String, Arc<Stop>>,
}

impl StopResolutionCache {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self {
            store,
            entries: DashMap::new(),
        }
    }

    pub async fn resolve(&self, source_stop_ref: &str) -> Result<Option<Arc<Stop>>> {
        if let Some(hit) = self.entries.get(source_stop_ref) {
            return Ok(Some(hit.clone()));
        }

        let Some(group) = self
            .store
            .find_stop_group_by_alternate(source_stop_ref)
            .await?
        else {
            return Ok(None);
        };

        let Some(stop) = self
            .store
            .find_stop_by_association(&group.primary_identifier)
            .await?
        else {
            return Ok(None);
        };

        let stop = Arc::new(stop);
        self.entries
            .insert(source_stop_ref.to_string(), stop.clone());

        Ok(Some(stop))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::memory::MemoryDatastore;
    use crate::model::StopGroup;
    use std::collections::HashMap;

    async fn seeded_store() -> Arc<MemoryDatastore> {
        let store = MemoryDatastore::new();
        store
            .add_stop_group(StopGroup {
                primary_identifier: "GB:STOPGRP:VIC".to_string(),
                other_identifiers: HashMap::from([(
                    "AtcoCode".to_string(),
                    "940GZZLUVIC".to_string(),
                )]),
            })
            .await;
        store
            .add_stop(Stop {
                primary_identifier: "GB:ATCO:490000248S".to_string(),
                primary_name: "Victoria".to_string(),
                location: None,
                associations: vec!["GB:STOPGRP:VIC".to_string()],
            })
            .await;
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_miss_resolves_and_caches() {
        let cache = StopResolutionCache::new(seeded_store().await);

        let stop = cache.resolve("940GZZLUVIC").await.unwrap().unwrap();
        assert_eq!(stop.primary_identifier, "GB:ATCO:490000248S");
        assert_eq!(cache.len(), 1);

        // Second resolution is a cache hit returning the same record.
        let again = cache.resolve("940GZZLUVIC").await.unwrap().unwrap();
        assert_eq!(again.primary_identifier, stop.primary_identifier);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_stop_is_absent_and_not_cached() {
        let cache = StopResolutionCache::new(seeded_store().await);

        assert!(cache.resolve("940GZZNOPE").await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_fills_are_idempotent() {
        let cache = Arc::new(StopResolutionCache::new(seeded_store().await));

        let (a, b, c) = tokio::join!(
            cache.resolve("940GZZLUVIC"),
            cache.resolve("940GZZLUVIC"),
            cache.resolve("940GZZLUVIC"),
        );

        for result in [a, b, c] {
            assert_eq!(
                result.unwrap().unwrap().primary_identifier,
                "GB:ATCO:490000248S"
            );
        }
        assert_eq!(cache.len(), 1);
    }
}
