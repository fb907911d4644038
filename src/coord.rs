//! Chunk coordinates, LOD levels, and the distance metrics the scheduler
//! and generator both depend on.

use crate::constants::GRID_SIZE;
use std::fmt;

/// Level of detail: 0 is full resolution, 3 is the coarsest.
pub type Lod = u8;

/// Highest valid LOD index.
pub const MAX_LOD: Lod = 3;

/// Downsampling step (`2^lod`) for a given LOD.
#[must_use]
pub fn lod_step(lod: Lod) -> usize {
    1usize << lod
}

/// Chunk distance thresholds that select LOD 0..=3 (spec.md §4.7).
const LOD_THRESHOLDS: [i32; 3] = [9, 31, 94];

/// Map a Chebyshev chunk distance to the LOD that should be used at that
/// distance. Non-decreasing in `distance` (P10).
#[must_use]
pub fn distance_to_lod(distance: i32) -> Lod {
    for (i, &threshold) in LOD_THRESHOLDS.iter().enumerate() {
        if distance <= threshold {
            return i as Lod;
        }
    }
    MAX_LOD
}

/// Identifies a chunk on the fixed 64x64 world grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkCoord {
    pub cx: i32,
    pub cy: i32,
}

impl ChunkCoord {
    #[must_use]
    pub const fn new(cx: i32, cy: i32) -> Self {
        Self { cx, cy }
    }

    /// True when both axes fall inside `0..GRID_SIZE`.
    #[must_use]
    pub fn in_bounds(self) -> bool {
        (0..GRID_SIZE).contains(&self.cx) && (0..GRID_SIZE).contains(&self.cy)
    }

    /// Chebyshev distance in chunks, the metric used throughout the
    /// scheduler and LOD table.
    #[must_use]
    pub fn chebyshev_distance(self, other: ChunkCoord) -> i32 {
        (self.cx - other.cx).abs().max((self.cy - other.cy).abs())
    }

    /// Offset this coordinate by `(dx, dy)` chunks.
    #[must_use]
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.cx + dx, self.cy + dy)
    }
}

impl fmt::Display for ChunkCoord {
    /// The canonical `"cx,cy"` text form used as cache/event key.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.cx, self.cy)
    }
}

/// Build the canonical outward spiral of `(dx, dy)` offsets around the
/// origin, in non-decreasing Chebyshev distance, bounded by `radius`
/// (inclusive). Used to prioritise nearby chunks during the load pass.
#[must_use]
pub fn spiral_offsets(radius: i32) -> Vec<(i32, i32)> {
    let mut offsets = Vec::new();
    for d in 0..=radius {
        if d == 0 {
            offsets.push((0, 0));
            continue;
        }
        // Walk the perimeter of the square ring at Chebyshev distance `d`.
        for dx in -d..=d {
            offsets.push((dx, -d));
            offsets.push((dx, d));
        }
        for dy in -(d - 1)..=(d - 1) {
            offsets.push((-d, dy));
            offsets.push((d, dy));
        }
    }
    offsets
}
