//! Bounded cache of rendered diagrams
//!
//! Keyed by a SHA-256 digest over format, quality and the normalised
//! source, so re-rendering unchanged text skips the engine.

use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

use lru::LruCache;

use crate::renderer::{compute_source_hash, RenderedDiagram};
use crate::types::{OutputFormat, QualityOptions};

/// Default number of cached renders
pub const DEFAULT_CACHE_CAPACITY: usize = 32;

/// Cache key for one render
pub fn cache_key(source: &str, format: OutputFormat, quality: &QualityOptions) -> String {
    let quality = quality.for_format(format);
    let dpi = quality.dpi.map(|d| d.to_string()).unwrap_or_default();
    let scale = quality.scale.map(|s| s.to_string()).unwrap_or_default();
    compute_source_hash(&format!("{}|{}|{}|{}", format, dpi, scale, source))
}

/// Thread-safe LRU of rendered diagrams
///
/// A capacity of zero disables caching.
pub struct RenderCache {
    entries: Option<Mutex<LruCache<String, RenderedDiagram>>>,
}

impl Default for RenderCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl RenderCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    /// Look up a render, marking it most recently used
    pub fn get(&self, key: &str) -> Option<RenderedDiagram> {
        let entries = self.entries.as_ref()?;
        let mut entries = entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    /// Store a render, evicting the least recently used one when full
    pub fn insert(&self, key: String, diagram: RenderedDiagram) {
        if let Some(entries) = &self.entries {
            let mut entries = entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.put(key, diagram);
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .as_ref()
            .map(|e| e.lock().unwrap_or_else(PoisonError::into_inner).len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Some(entries) = &self.entries {
            entries.lock().unwrap_or_else(PoisonError::into_inner).clear();
        }
    }
}
