use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use crate::cache::{JsonCache, LoadOptions};
use crate::gate::FeatureGate;

/// The overlay's lookup path: category JSON files under a data directory,
/// served through the mtime cache and filtered by the feature gate.
pub struct DataIndex {
    data_dir: PathBuf,
    gate: FeatureGate,
    cache: JsonCache,
}

impl DataIndex {
    pub fn new(data_dir: impl Into<PathBuf>, gate: FeatureGate) -> Self {
        Self {
            data_dir: data_dir.into(),
            gate,
            cache: JsonCache::new(),
        }
    }

    pub fn category_path(&self, category: &str) -> PathBuf {
        self.data_dir.join(format!("{category}.json"))
    }

    /// Parsed contents of a category file, or `None` when the gate has
    /// the category disabled. Disk errors for enabled categories
    /// propagate.
    pub fn lookup(&self, category: &str) -> anyhow::Result<Option<Arc<Value>>> {
        if !self.gate.is_enabled(category) {
            tracing::debug!(category, "category disabled; skipping load");
            return Ok(None);
        }
        self.cache
            .fetch(&self.category_path(category), &LoadOptions::default())
            .map(Some)
    }

    /// Force a reload of one category from disk.
    pub fn reload(&self, category: &str) -> anyhow::Result<Option<Arc<Value>>> {
        if !self.gate.is_enabled(category) {
            return Ok(None);
        }
        self.cache
            .fetch(&self.category_path(category), &LoadOptions::forced())
            .map(Some)
    }

    /// Warm the cache for every enabled category. Missing files are
    /// logged and skipped; a category that fails to load never blocks
    /// the rest.
    pub fn prime(&self, categories: &[&str]) {
        for &category in categories {
            if !self.gate.is_enabled(category) {
                continue;
            }
            if let Err(e) = self.cache.prime(&self.category_path(category)) {
                tracing::warn!(category, error = %e, "failed to prime category");
            }
        }
    }

    pub fn invalidate(&self, category: Option<&str>) {
        match category {
            Some(category) => self.cache.clear(Some(&self.category_path(category))),
            None => self.cache.clear(None),
        }
    }
}
