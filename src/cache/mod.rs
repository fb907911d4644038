//! Persistent mesh cache (component C4) over an opaque key-value store.

pub mod codec;

use crate::coord::{ChunkCoord, Lod};
use crate::error::PipelineError;
use crate::mesh::MeshBuffers;
use dashmap::DashMap;

/// The host capability the cache is built on (spec.md §6.5): a
/// persistent key-value store. Implementations may be backed by an
/// embedded store (sled, RocksDB) or a remote service; `MemoryKv` below
/// is the in-process reference implementation used by tests and by
/// deployments with no persistence requirement.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PipelineError>;
    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), PipelineError>;
    fn delete(&self, key: &str) -> Result<(), PipelineError>;
    fn list_keys(&self) -> Result<Vec<String>, PipelineError>;
}

/// Thread-safe in-memory `KeyValueStore`. Never fails.
#[derive(Debug, Default)]
pub struct MemoryKv {
    map: DashMap<String, Vec<u8>>,
}

impl MemoryKv {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PipelineError> {
        Ok(self.map.get(key).map(|v| v.clone()))
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), PipelineError> {
        self.map.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), PipelineError> {
        self.map.remove(key);
        Ok(())
    }

    fn list_keys(&self) -> Result<Vec<String>, PipelineError> {
        Ok(self.map.iter().map(|e| e.key().clone()).collect())
    }
}

/// Content-addressed mesh cache keyed by `(coord, lod, fingerprint)`.
/// All operations are best-effort: a storage error is logged and
/// treated as a miss on read or a no-op on write, never propagated.
pub struct MeshCache<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> MeshCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn get(&self, coord: ChunkCoord, lod: Lod, fingerprint: &str) -> Option<MeshBuffers> {
        match self.store.get(&cache_key(coord, lod, fingerprint)) {
            Ok(Some(bytes)) => codec::decode_mesh_buffers(&bytes),
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(%err, "mesh cache read failed, treating as miss");
                None
            }
        }
    }

    pub fn put(&self, coord: ChunkCoord, lod: Lod, fingerprint: &str, buffers: &MeshBuffers) {
        let key = cache_key(coord, lod, fingerprint);
        let value = codec::encode_mesh_buffers(buffers);
        if let Err(err) = self.store.put(&key, value) {
            tracing::warn!(%err, %key, "mesh cache write failed, discarding");
        }
    }

    /// Remove every lod+fingerprint variant cached for `coord`.
    pub fn invalidate(&self, coord: ChunkCoord) {
        let prefix = format!("mesh:{coord}:");
        let keys = match self.store.list_keys() {
            Ok(keys) => keys,
            Err(err) => {
                tracing::warn!(%err, "mesh cache invalidate failed to list keys");
                return;
            }
        };
        for key in keys.into_iter().filter(|k| k.starts_with(&prefix)) {
            if let Err(err) = self.store.delete(&key) {
                tracing::warn!(%err, %key, "mesh cache invalidate failed to delete key");
            }
        }
    }

    pub fn clear(&self) {
        let keys = match self.store.list_keys() {
            Ok(keys) => keys,
            Err(err) => {
                tracing::warn!(%err, "mesh cache clear failed to list keys");
                return;
            }
        };
        for key in keys {
            let _ = self.store.delete(&key);
        }
    }
}

fn cache_key(coord: ChunkCoord, lod: Lod, fingerprint: &str) -> String {
    format!("mesh:{coord}:{lod}:{fingerprint}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_buffers() -> MeshBuffers {
        MeshBuffers {
            positions: vec![0.0, 0.0, 0.0],
            normals: vec![0.0, 1.0, 0.0],
            colors: vec![1.0, 1.0, 1.0],
            indices: vec![0],
        }
    }

    #[test]
    fn miss_on_empty_cache() {
        let cache = MeshCache::new(MemoryKv::new());
        assert_eq!(cache.get(ChunkCoord::new(1, 1), 0, "fp"), None);
    }

    #[test]
    fn put_then_get_round_trips() {
        let cache = MeshCache::new(MemoryKv::new());
        let buffers = sample_buffers();
        cache.put(ChunkCoord::new(2, 3), 1, "abc", &buffers);
        assert_eq!(cache.get(ChunkCoord::new(2, 3), 1, "abc"), Some(buffers));
    }

    #[test]
    fn distinct_fingerprints_do_not_collide() {
        let cache = MeshCache::new(MemoryKv::new());
        let buffers = sample_buffers();
        cache.put(ChunkCoord::new(0, 0), 0, "fp-a", &buffers);
        assert_eq!(cache.get(ChunkCoord::new(0, 0), 0, "fp-b"), None);
    }

    #[test]
    fn invalidate_removes_all_lods_for_a_coord() {
        let cache = MeshCache::new(MemoryKv::new());
        let buffers = sample_buffers();
        cache.put(ChunkCoord::new(5, 5), 0, "fp", &buffers);
        cache.put(ChunkCoord::new(5, 5), 2, "fp", &buffers);
        cache.put(ChunkCoord::new(6, 6), 0, "fp", &buffers);
        cache.invalidate(ChunkCoord::new(5, 5));
        assert_eq!(cache.get(ChunkCoord::new(5, 5), 0, "fp"), None);
        assert_eq!(cache.get(ChunkCoord::new(5, 5), 2, "fp"), None);
        assert!(cache.get(ChunkCoord::new(6, 6), 0, "fp").is_some());
    }

    #[test]
    fn clear_empties_the_whole_cache() {
        let cache = MeshCache::new(MemoryKv::new());
        let buffers = sample_buffers();
        cache.put(ChunkCoord::new(1, 1), 0, "fp", &buffers);
        cache.clear();
        assert_eq!(cache.get(ChunkCoord::new(1, 1), 0, "fp"), None);
    }
}
