//! Per-node plan registry and preview cache.
//!
//! After a run, every node's lazy plan is registered here together with its
//! structural schema and identity hash. Previews are materialized lazily on
//! request and cached under the plan hash, so a cached preview is served
//! only while the node's plan (including upstream data) is unchanged.

use crate::engine::exec;
use crate::engine::plan::LazyPlan;
use crate::error::{FlowError, Result};
use crate::flow::id::NodeId;
use crate::types::{Schema, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// Bounds on the preview cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_bytes: usize,
    /// Flat per-cell cost estimate used for the byte budget.
    pub per_cell_bytes: usize,
    /// Row cap used when the caller does not pick one.
    pub sample_rows: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 20,
            max_bytes: 50 * 1024 * 1024,
            per_cell_bytes: 64,
            sample_rows: 100,
        }
    }
}

/// A materialized row sample plus the exact full row count.
#[derive(Debug, Clone, PartialEq)]
pub struct Preview {
    pub schema: Schema,
    pub rows: Vec<Vec<Value>>,
    pub total_rows: usize,
}

#[derive(Debug, Clone)]
struct PlanEntry {
    plan: LazyPlan,
    schema: Schema,
    hash: u64,
}

#[derive(Debug, Clone)]
struct CachedPreview {
    preview: Arc<Preview>,
    plan_hash: u64,
    cost_bytes: usize,
}

/// Registry of node plans with an LRU-bounded preview cache.
#[derive(Debug, Default)]
pub struct PlanRegistry {
    plans: HashMap<NodeId, PlanEntry>,
    previews: HashMap<NodeId, CachedPreview>,
    /// LRU order, least recently used at the front.
    lru: VecDeque<NodeId>,
    config: CacheConfig,
}

impl PlanRegistry {
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            plans: HashMap::new(),
            previews: HashMap::new(),
            lru: VecDeque::new(),
            config,
        }
    }

    /// Register (or replace) a node's plan. A cached preview survives only
    /// if the new plan hashes identically to the one it was built from.
    pub fn store_plan(&mut self, id: NodeId, plan: LazyPlan) {
        let hash = plan.identity_hash();
        let schema = plan.schema();
        if let Some(cached) = self.previews.get(&id) {
            if cached.plan_hash != hash {
                debug!(node = %id, "plan changed, dropping stale preview");
                self.drop_preview(id);
            }
        }
        self.plans.insert(id, PlanEntry { plan, schema, hash });
    }

    pub fn get_plan(&self, id: NodeId) -> Option<&LazyPlan> {
        self.plans.get(&id).map(|entry| &entry.plan)
    }

    /// Structural schema of the registered plan.
    pub fn get_schema(&self, id: NodeId) -> Option<&Schema> {
        self.plans.get(&id).map(|entry| &entry.schema)
    }

    pub fn plan_hash(&self, id: NodeId) -> Option<u64> {
        self.plans.get(&id).map(|entry| entry.hash)
    }

    /// Drop everything registered for a node.
    pub fn remove(&mut self, id: NodeId) {
        self.plans.remove(&id);
        self.drop_preview(id);
    }

    /// Drop a node's cached preview but keep its plan.
    pub fn invalidate_preview(&mut self, id: NodeId) {
        self.drop_preview(id);
    }

    pub fn clear(&mut self) {
        self.plans.clear();
        self.previews.clear();
        self.lru.clear();
    }

    pub fn cached_preview_count(&self) -> usize {
        self.previews.len()
    }

    /// Row cap applied when callers have no preference of their own.
    pub fn default_sample_rows(&self) -> usize {
        self.config.sample_rows
    }

    /// Fetch a preview of up to `max_rows` rows for a node. The cache is
    /// served only when the plan is unchanged and the cached sample is
    /// exactly what this request would materialize; `force_refresh` always
    /// re-materializes.
    pub fn fetch_preview(
        &mut self,
        id: NodeId,
        max_rows: usize,
        force_refresh: bool,
    ) -> Result<Arc<Preview>> {
        let entry = self
            .plans
            .get(&id)
            .ok_or(FlowError::NodeNotFound(id))?
            .clone();

        if !force_refresh {
            if let Some(cached) = self.previews.get(&id) {
                let same_sample =
                    cached.preview.rows.len() == max_rows.min(cached.preview.total_rows);
                if cached.plan_hash == entry.hash && same_sample {
                    let preview = cached.preview.clone();
                    self.touch(id);
                    return Ok(preview);
                }
            }
        }

        let (sample, total_rows) = exec::preview(&entry.plan, max_rows)?;
        let preview = Arc::new(Preview {
            schema: sample.schema(),
            rows: (0..sample.height()).map(|i| sample.row(i)).collect(),
            total_rows,
        });
        let cost_bytes = preview.rows.len() * preview.schema.len().max(1) * self.config.per_cell_bytes;

        self.drop_preview(id);
        self.previews.insert(
            id,
            CachedPreview {
                preview: preview.clone(),
                plan_hash: entry.hash,
                cost_bytes,
            },
        );
        self.lru.push_back(id);
        self.enforce_budget();
        Ok(preview)
    }

    fn touch(&mut self, id: NodeId) {
        self.lru.retain(|entry| *entry != id);
        self.lru.push_back(id);
    }

    fn drop_preview(&mut self, id: NodeId) {
        if self.previews.remove(&id).is_some() {
            self.lru.retain(|entry| *entry != id);
        }
    }

    fn total_bytes(&self) -> usize {
        self.previews.values().map(|c| c.cost_bytes).sum()
    }

    /// Evict least recently used previews until within both bounds, always
    /// keeping the most recent entry.
    fn enforce_budget(&mut self) {
        while self.previews.len() > 1
            && (self.previews.len() > self.config.max_entries
                || self.total_bytes() > self.config.max_bytes)
        {
            if let Some(victim) = self.lru.pop_front() {
                debug!(node = %victim, "evicting preview from cache");
                self.previews.remove(&victim);
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::frame::DataFrame;

    fn plan(csv: &str) -> LazyPlan {
        LazyPlan::from_frame(DataFrame::from_csv_str(csv).unwrap(), "test")
    }

    #[test]
    fn test_preview_cache_hit_and_invalidation() {
        let mut registry = PlanRegistry::new();
        registry.store_plan(NodeId(1), plan("a\n1\n2\n3\n"));
        let first = registry.fetch_preview(NodeId(1), 100, false).unwrap();
        assert_eq!(first.total_rows, 3);

        // Same plan: cache hit returns the same allocation.
        let second = registry.fetch_preview(NodeId(1), 100, false).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        // Changed data changes the plan hash and drops the cached preview.
        registry.store_plan(NodeId(1), plan("a\n1\n2\n"));
        assert_eq!(registry.cached_preview_count(), 0);
        let third = registry.fetch_preview(NodeId(1), 100, false).unwrap();
        assert_eq!(third.total_rows, 2);
    }

    #[test]
    fn test_row_cap_is_per_request() {
        let mut registry = PlanRegistry::new();
        registry.store_plan(NodeId(1), plan("a\n1\n2\n3\n"));
        let wide = registry.fetch_preview(NodeId(1), 100, false).unwrap();
        assert_eq!(wide.rows.len(), 3);

        // A narrower request re-materializes with its own cap.
        let narrow = registry.fetch_preview(NodeId(1), 2, false).unwrap();
        assert_eq!(narrow.rows.len(), 2);
        assert_eq!(narrow.total_rows, 3);

        // Repeating the same cap hits the cache.
        let again = registry.fetch_preview(NodeId(1), 2, false).unwrap();
        assert!(Arc::ptr_eq(&narrow, &again));
    }

    #[test]
    fn test_force_refresh_rebuilds() {
        let mut registry = PlanRegistry::new();
        registry.store_plan(NodeId(1), plan("a\n1\n"));
        let first = registry.fetch_preview(NodeId(1), 100, false).unwrap();
        let second = registry.fetch_preview(NodeId(1), 100, true).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first, second);
    }

    #[test]
    fn test_lru_eviction_by_entry_count() {
        let mut registry = PlanRegistry::with_config(CacheConfig {
            max_entries: 2,
            ..CacheConfig::default()
        });
        for id in 1..=3u64 {
            registry.store_plan(NodeId(id), plan("a\n1\n"));
            registry.fetch_preview(NodeId(id), 100, false).unwrap();
        }
        assert_eq!(registry.cached_preview_count(), 2);
        // Node 1 was least recently used; its next fetch must rebuild.
        let rebuilt = registry.fetch_preview(NodeId(1), 100, false).unwrap();
        assert_eq!(rebuilt.total_rows, 1);
    }

    #[test]
    fn test_byte_budget_eviction() {
        let mut registry = PlanRegistry::with_config(CacheConfig {
            max_entries: 100,
            max_bytes: 200,
            per_cell_bytes: 64,
            sample_rows: 100,
        });
        registry.store_plan(NodeId(1), plan("a\n1\n2\n3\n"));
        registry.store_plan(NodeId(2), plan("a\n1\n2\n3\n"));
        registry.fetch_preview(NodeId(1), 100, false).unwrap();
        registry.fetch_preview(NodeId(2), 100, false).unwrap();
        // Each preview costs 3 rows * 1 col * 64 = 192 bytes; two exceed 200.
        assert_eq!(registry.cached_preview_count(), 1);
    }

    #[test]
    fn test_remove_clears_plan_and_preview() {
        let mut registry = PlanRegistry::new();
        registry.store_plan(NodeId(1), plan("a\n1\n"));
        registry.fetch_preview(NodeId(1), 100, false).unwrap();
        registry.remove(NodeId(1));
        assert!(registry.get_plan(NodeId(1)).is_none());
        assert!(registry.fetch_preview(NodeId(1), 100, false).is_err());
    }
}
