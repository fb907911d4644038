//! On-demand diagnostic sweep over chunks near a coordinate.

use crate::coord::{ChunkCoord, Lod};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDebugEntry {
    pub coord: ChunkCoord,
    pub loaded_lod: Option<Lod>,
    pub pending: bool,
}

/// A snapshot of every chunk within `radius` (Chebyshev, chunks) of
/// `center`, reporting load/pending/LOD state. Triggered explicitly by
/// the caller; never run automatically by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugReport {
    pub center: ChunkCoord,
    pub radius: i32,
    pub entries: Vec<ChunkDebugEntry>,
}

impl DebugReport {
    #[must_use]
    pub fn loaded_count(&self) -> usize {
        self.entries.iter().filter(|e| e.loaded_lod.is_some()).count()
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|e| e.pending).count()
    }
}
