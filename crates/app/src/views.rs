use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use async_trait::async_trait;
use metrics::counter;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

/// Marks cached renderings of a view as stale.
///
/// Callers do not consume a result; once this returns, the next read of
/// `path` renders from the store.
#[async_trait]
pub trait ViewInvalidator: Send + Sync {
    async fn revalidate_path(&self, path: &str);
}

/// Upper bound on cached query variants per path.
pub const MAX_VARIANTS_PER_PATH: usize = 64;

#[derive(Default)]
struct PathEntry {
    generation: u64,
    variants: HashMap<String, Arc<Value>>,
    // insertion order, oldest first
    order: VecDeque<String>,
}

impl PathEntry {
    fn insert(&mut self, variant: &str, body: Value) -> Option<String> {
        if self
            .variants
            .insert(variant.to_string(), Arc::new(body))
            .is_some()
        {
            return None;
        }
        self.order.push_back(variant.to_string());
        if self.order.len() <= MAX_VARIANTS_PER_PATH {
            return None;
        }
        let oldest = self.order.pop_front()?;
        self.variants.remove(&oldest);
        Some(oldest)
    }

    fn clear(&mut self) -> usize {
        let evicted = self.variants.len();
        self.variants.clear();
        self.order.clear();
        evicted
    }
}

/// Rendered JSON view models keyed by request path, then by query variant.
#[derive(Clone, Default)]
pub struct ViewCache {
    paths: Arc<RwLock<HashMap<String, PathEntry>>>,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, path: &str, variant: &str) -> Option<Arc<Value>> {
        let hit = {
            let paths = self.paths.read().await;
            paths
                .get(path)
                .and_then(|entry| entry.variants.get(variant))
                .cloned()
        };
        let result = if hit.is_some() { "hit" } else { "miss" };
        counter!("view_cache_requests_total", "result" => result).increment(1);
        hit
    }

    /// Generation to pass to [`ViewCache::store`] for a render starting now.
    pub async fn generation(&self, path: &str) -> u64 {
        let paths = self.paths.read().await;
        paths.get(path).map_or(0, |entry| entry.generation)
    }

    /// Stores a rendering unless `path` was revalidated after `generation`
    /// was read. Returns whether the body was kept.
    pub async fn store(&self, path: &str, variant: &str, generation: u64, body: Value) -> bool {
        let mut paths = self.paths.write().await;
        let entry = paths.entry(path.to_string()).or_default();
        if entry.generation != generation {
            debug!(stage = "invalidation", path, "discarding render that raced a revalidation");
            return false;
        }
        if let Some(dropped) = entry.insert(variant, body) {
            counter!("view_cache_evictions_total").increment(1);
            debug!(stage = "invalidation", path, variant = %dropped, "evicted oldest variant");
        }
        true
    }

    /// Drops every cached variant of `path` and returns how many were removed.
    pub async fn evict_path(&self, path: &str) -> usize {
        let mut paths = self.paths.write().await;
        let entry = paths.entry(path.to_string()).or_default();
        entry.generation += 1;
        entry.clear()
    }
}

#[async_trait]
impl ViewInvalidator for ViewCache {
    async fn revalidate_path(&self, path: &str) {
        let evicted = self.evict_path(path).await;
        counter!("view_invalidations_total", "path" => path.to_string()).increment(1);
        debug!(stage = "invalidation", path, evicted, "view revalidated");
    }
}
