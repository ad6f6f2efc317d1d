//! Build-result caching keyed by vertex id and input fingerprint.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHasher};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::component::BuildInputs;
use crate::types::VertexId;

/// Identity of one build attempt: the vertex plus a fingerprint of the
/// exact inputs it was handed.
///
/// The fingerprint hashes inputs in sorted key order, so two input maps
/// holding the same entries always produce the same key regardless of
/// insertion order.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub vertex_id: VertexId,
    pub fingerprint: u64,
}

impl CacheKey {
    #[must_use]
    pub fn for_inputs(vertex_id: &str, inputs: &BuildInputs) -> Self {
        let mut hasher = FxHasher::default();
        let sorted: BTreeMap<&String, &Value> = inputs.iter().collect();
        for (name, value) in sorted {
            name.hash(&mut hasher);
            value.to_string().hash(&mut hasher);
        }
        Self {
            vertex_id: vertex_id.to_string(),
            fingerprint: hasher.finish(),
        }
    }
}

/// The reusable portion of a successful build.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CachedBuild {
    pub results: FxHashMap<String, Value>,
    pub artifacts: FxHashMap<String, Value>,
}

/// Storage backend for build results. Failed builds are never stored.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Option<CachedBuild>;

    async fn set(&self, key: CacheKey, build: CachedBuild);

    /// Drop every entry for the given vertex, across all fingerprints.
    async fn invalidate(&self, vertex_id: &str);
}

/// Process-local cache. Entries live for the lifetime of the value.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<FxHashMap<CacheKey, Arc<CachedBuild>>>,
}

impl InMemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &CacheKey) -> Option<CachedBuild> {
        self.entries.lock().get(key).map(|b| (**b).clone())
    }

    async fn set(&self, key: CacheKey, build: CachedBuild) {
        self.entries.lock().insert(key, Arc::new(build));
    }

    async fn invalidate(&self, vertex_id: &str) {
        self.entries
            .lock()
            .retain(|key, _| key.vertex_id != vertex_id);
    }
}
