//! World-wide compile-time constants shared by every component of the
//! chunk pipeline.

/// Tiles along one edge of a chunk.
pub const CHUNK_SIZE: usize = 32;
/// Chunks along one edge of the world grid.
pub const GRID_SIZE: i32 = 64;
/// World size in tile units (`GRID_SIZE * CHUNK_SIZE`).
pub const MAP_SIZE: f64 = (GRID_SIZE as usize * CHUNK_SIZE) as f64;
/// Highest representable terrain height.
pub const MAX_HEIGHT: u8 = 127;
/// Height below which a tile is considered water.
pub const WATER_LEVEL: u8 = 62;

/// Number of tiles in a chunk's flat tile arrays (`CHUNK_SIZE^2`).
pub const TILE_COUNT: usize = CHUNK_SIZE * CHUNK_SIZE;

/// Number of distinct LOD levels.
pub const LOD_COUNT: usize = 4;

/// Number of Voronoi province seeds, including the four barbarian corners.
pub const PROVINCE_SEED_COUNT: usize = 42;

/// Tile-local index for `(lx, ly)`, `0 <= lx, ly < CHUNK_SIZE`.
#[must_use]
pub const fn tile_index(lx: usize, ly: usize) -> usize {
    ly * CHUNK_SIZE + lx
}
