//! Deterministic chunk data generation (component C1).
//!
//! `generate` is a pure, total function of `(ChunkCoord, optional
//! rasters)`: equal inputs yield bitwise-identical `ChunkData` across
//! processes and platforms (P1), and heights agree across chunk borders
//! because every height sample re-derives from absolute world
//! coordinates rather than from neighbouring-chunk state (P2).

pub mod biome;
pub mod noise;
pub mod provinces;
pub mod roads;

use crate::constants::{tile_index, CHUNK_SIZE, MAX_HEIGHT, TILE_COUNT, WATER_LEVEL};
use crate::coord::ChunkCoord;
use biome::biomes;
use rayon::prelude::*;

/// Tile flag: the tile is land adjacent to at least one water tile.
pub const FLAG_IS_COAST: u8 = 1 << 0;
/// Tile flag: the tile lies on a procedural road (biome is overridden to
/// [`biomes::ROAD`] when this is set).
pub const FLAG_HAS_ROAD: u8 = 1 << 1;

/// Per-tile per-chunk terrain data. Every array has exactly
/// [`TILE_COUNT`] entries, tile `i = ly*CHUNK_SIZE + lx`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkData {
    pub coord: ChunkCoord,
    pub heights: Box<[u8; TILE_COUNT]>,
    pub biomes: Box<[u8; TILE_COUNT]>,
    pub flags: Box<[u8; TILE_COUNT]>,
    pub provinces: Box<[u8; TILE_COUNT]>,
}

/// An externally registered height raster, `(MAP_SIZE x MAP_SIZE)` of
/// `u8`, sampled with clamped bounds at absolute tile coordinates.
pub trait HeightRaster: Send + Sync {
    fn sample(&self, wx: i32, wy: i32) -> u8;
}

/// An externally registered province raster sampled the same way.
pub trait ProvinceRasterSource: Send + Sync {
    fn sample(&self, wx: i32, wy: i32) -> u8;
}

/// Generate the full per-tile data for `coord`. Cannot fail: an
/// out-of-bounds coord still produces a valid, edge-faded `ChunkData`
/// (the scheduler is responsible for gating world bounds separately).
#[must_use]
pub fn generate(
    coord: ChunkCoord,
    height_raster: Option<&dyn HeightRaster>,
    province_raster: Option<&dyn ProvinceRasterSource>,
) -> ChunkData {
    let mut heights = Box::new([0u8; TILE_COUNT]);
    let mut biomes_arr = Box::new([0u8; TILE_COUNT]);
    let mut flags = Box::new([0u8; TILE_COUNT]);
    let mut provinces = Box::new([0u8; TILE_COUNT]);

    // Pass 1: heights. Rows are independent, so they're sampled in
    // parallel across the chunk.
    heights.par_chunks_mut(CHUNK_SIZE).enumerate().for_each(|(ly, row)| {
        for (lx, h) in row.iter_mut().enumerate() {
            let (wx, wy) = world_pos(coord, lx, ly);
            *h = sample_height(wx, wy, height_raster);
        }
    });

    // Pass 2: coast detection, biome, road overlay, province. Again
    // row-parallel; every row only reads the (already-complete) height
    // buffer and writes its own disjoint slice of the other three.
    biomes_arr
        .par_chunks_mut(CHUNK_SIZE)
        .zip(flags.par_chunks_mut(CHUNK_SIZE))
        .zip(provinces.par_chunks_mut(CHUNK_SIZE))
        .enumerate()
        .for_each(|(ly, ((biome_row, flag_row), province_row))| {
            for lx in 0..CHUNK_SIZE {
                let (wx, wy) = world_pos(coord, lx, ly);
                let h = heights[tile_index(lx, ly)];

                let is_coast = h >= WATER_LEVEL && has_adjacent_water(wx, wy, height_raster);
                let mut b = biome::biome(h, wx as f64, wy as f64, is_coast);
                let mut flag_bits = if is_coast { FLAG_IS_COAST } else { 0 };

                if h >= WATER_LEVEL && roads::on_road(wx as f64, wy as f64) {
                    flag_bits |= FLAG_HAS_ROAD;
                    b = biomes::ROAD;
                }

                biome_row[lx] = b;
                flag_row[lx] = flag_bits;
                province_row[lx] = sample_province(wx, wy, h, province_raster);
            }
        });

    ChunkData {
        coord,
        heights,
        biomes: biomes_arr,
        flags,
        provinces,
    }
}

/// Absolute world tile coordinates for local `(lx, ly)` in `coord`.
#[must_use]
pub fn world_pos(coord: ChunkCoord, lx: usize, ly: usize) -> (i32, i32) {
    (
        coord.cx * CHUNK_SIZE as i32 + lx as i32,
        coord.cy * CHUNK_SIZE as i32 + ly as i32,
    )
}

fn sample_height(wx: i32, wy: i32, raster: Option<&dyn HeightRaster>) -> u8 {
    if let Some(r) = raster {
        return r.sample(wx, wy);
    }
    let wxf = f64::from(wx);
    let wyf = f64::from(wy);
    let n = noise::base_height_noise(wxf, wyf);
    let boost = noise::mountain_boost(wxf, wyf);
    let fade = noise::edge_fade(wxf, wyf);
    let raw = f64::from(MAX_HEIGHT) * (n + boost + 0.4) * fade;
    raw.round().clamp(0.0, f64::from(MAX_HEIGHT)) as u8
}

fn has_adjacent_water(wx: i32, wy: i32, raster: Option<&dyn HeightRaster>) -> bool {
    for dy in -1..=1 {
        for dx in -1..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            if sample_height(wx + dx, wy + dy, raster) < WATER_LEVEL {
                return true;
            }
        }
    }
    false
}

fn sample_province(wx: i32, wy: i32, height: u8, raster: Option<&dyn ProvinceRasterSource>) -> u8 {
    if height < WATER_LEVEL {
        return 0;
    }
    if let Some(r) = raster {
        return r.sample(wx, wy);
    }
    provinces::nearest_seed_id(f64::from(wx), f64::from(wy))
}
