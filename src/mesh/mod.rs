//! Pure column-extrusion greedy mesher (component C2).
//!
//! `mesh` never touches I/O or shared state: given the same
//! `(ChunkData, Lod)` it returns byte-identical buffers every time,
//! which is what lets the worker pool run it off-thread without
//! synchronisation.

use crate::constants::{tile_index, CHUNK_SIZE, TILE_COUNT};
use crate::coord::{lod_step, Lod};
use crate::generator::biome::biomes;
use crate::generator::noise::hash2d;
use crate::generator::ChunkData;

/// Vertex/index buffers for one chunk at one LOD. Positions are in
/// chunk-local space; world offset is applied by the caller at
/// instance placement time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshBuffers {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub colors: Vec<f32>,
    pub indices: Vec<u32>,
}

impl MeshBuffers {
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

const TOP_SHADE: f32 = 1.0;
const EAST_SHADE: f32 = 0.88;
const NORTH_SHADE: f32 = 0.80;
const SOUTH_SHADE: f32 = 0.80;
const WEST_SHADE: f32 = 0.65;

#[derive(Clone, Copy)]
struct Direction {
    dx: i32,
    dy: i32,
    normal: [f32; 3],
    shade: f32,
}

const EAST: Direction = Direction { dx: 1, dy: 0, normal: [1.0, 0.0, 0.0], shade: EAST_SHADE };
const WEST: Direction = Direction { dx: -1, dy: 0, normal: [-1.0, 0.0, 0.0], shade: WEST_SHADE };
const NORTH: Direction = Direction { dx: 0, dy: 1, normal: [0.0, 0.0, -1.0], shade: NORTH_SHADE };
const SOUTH: Direction = Direction { dx: 0, dy: -1, normal: [0.0, 0.0, 1.0], shade: SOUTH_SHADE };

/// Greedy-mesh `chunk` at `lod`. Panics only if `chunk`'s arrays are not
/// exactly [`TILE_COUNT`] long, which never happens for a `ChunkData`
/// produced by [`crate::generator::generate`].
#[must_use]
pub fn mesh(chunk: &ChunkData, lod: Lod) -> MeshBuffers {
    assert_eq!(chunk.heights.len(), TILE_COUNT);
    let step = lod_step(lod);
    let tiles_per_axis = CHUNK_SIZE / step;

    let worst_case_faces = 5 * tiles_per_axis * tiles_per_axis;
    let mut buffers = MeshBuffers {
        positions: Vec::with_capacity(worst_case_faces * 4 * 3),
        normals: Vec::with_capacity(worst_case_faces * 4 * 3),
        colors: Vec::with_capacity(worst_case_faces * 4 * 3),
        indices: Vec::with_capacity(worst_case_faces * 6),
    };

    let heights: Vec<u8> = (0..tiles_per_axis)
        .flat_map(|gy| (0..tiles_per_axis).map(move |gx| (gx, gy)))
        .map(|(gx, gy)| supertile_height(chunk, step, tiles_per_axis, gx, gy))
        .collect();
    let biomes_at: Vec<u8> = (0..tiles_per_axis)
        .flat_map(|gy| (0..tiles_per_axis).map(move |gx| (gx, gy)))
        .map(|(gx, gy)| supertile_biome(chunk, step, tiles_per_axis, gx, gy))
        .collect();

    let height_at = |gx: i32, gy: i32| -> Option<u8> {
        if gx < 0 || gy < 0 || gx as usize >= tiles_per_axis || gy as usize >= tiles_per_axis {
            return None;
        }
        Some(heights[gy as usize * tiles_per_axis + gx as usize])
    };

    for gy in 0..tiles_per_axis {
        for gx in 0..tiles_per_axis {
            let h = heights[gy * tiles_per_axis + gx];
            let b = biomes_at[gy * tiles_per_axis + gx];
            let wx = chunk.coord.cx * CHUNK_SIZE as i32 + (gx * step) as i32;
            let wy = chunk.coord.cy * CHUNK_SIZE as i32 + (gy * step) as i32;
            let noise_factor = 0.85 + 0.3 * hash2d(f64::from(wx), f64::from(wy));
            let base_color = biome_color(b);
            let color = |shade: f32| {
                [
                    (base_color[0] * shade * noise_factor as f32).clamp(0.0, 1.0),
                    (base_color[1] * shade * noise_factor as f32).clamp(0.0, 1.0),
                    (base_color[2] * shade * noise_factor as f32).clamp(0.0, 1.0),
                ]
            };

            let s = step as f32;
            let x0 = (gx * step) as f32;
            let z0 = (gy * step) as f32;
            let y = f32::from(h);

            emit_top(&mut buffers, x0, y, z0, s, color(TOP_SHADE));

            for dir in [EAST, WEST, NORTH, SOUTH] {
                if let Some(neighbor_h) = height_at(gx as i32 + dir.dx, gy as i32 + dir.dy) {
                    if neighbor_h < h {
                        emit_side(
                            &mut buffers,
                            x0,
                            z0,
                            s,
                            y,
                            f32::from(neighbor_h),
                            dir,
                            color(dir.shade),
                        );
                    }
                }
            }
        }
    }

    buffers.positions.shrink_to_fit();
    buffers.normals.shrink_to_fit();
    buffers.colors.shrink_to_fit();
    buffers.indices.shrink_to_fit();
    buffers
}

fn supertile_height(chunk: &ChunkData, step: usize, tiles_per_axis: usize, gx: usize, gy: usize) -> u8 {
    let _ = tiles_per_axis;
    let mut max_h = 0u8;
    for ly in gy * step..(gy + 1) * step {
        for lx in gx * step..(gx + 1) * step {
            max_h = max_h.max(chunk.heights[tile_index(lx, ly)]);
        }
    }
    max_h
}

fn supertile_biome(chunk: &ChunkData, step: usize, tiles_per_axis: usize, gx: usize, gy: usize) -> u8 {
    let _ = tiles_per_axis;
    let center_lx = gx * step + step / 2;
    let center_ly = gy * step + step / 2;
    chunk.biomes[tile_index(center_lx.min(CHUNK_SIZE - 1), center_ly.min(CHUNK_SIZE - 1))]
}

fn push_vertex(buffers: &mut MeshBuffers, pos: [f32; 3], normal: [f32; 3], color: [f32; 3]) {
    buffers.positions.extend_from_slice(&pos);
    buffers.normals.extend_from_slice(&normal);
    buffers.colors.extend_from_slice(&color);
}

fn push_quad_indices(buffers: &mut MeshBuffers, base: u32) {
    buffers.indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
}

fn emit_top(buffers: &mut MeshBuffers, x0: f32, y: f32, z0: f32, s: f32, color: [f32; 3]) {
    let base = buffers.vertex_count() as u32;
    let normal = [0.0, 1.0, 0.0];
    push_vertex(buffers, [x0, y, z0], normal, color);
    push_vertex(buffers, [x0, y, z0 + s], normal, color);
    push_vertex(buffers, [x0 + s, y, z0 + s], normal, color);
    push_vertex(buffers, [x0 + s, y, z0], normal, color);
    push_quad_indices(buffers, base);
}

fn emit_side(
    buffers: &mut MeshBuffers,
    x0: f32,
    z0: f32,
    s: f32,
    top_y: f32,
    bottom_y: f32,
    dir: Direction,
    color: [f32; 3],
) {
    let base = buffers.vertex_count() as u32;
    let normal = dir.normal;

    // Pick the shared edge on the side facing `dir`.
    let (a, b) = match (dir.dx, dir.dy) {
        (1, 0) => ([x0 + s, z0], [x0 + s, z0 + s]),
        (-1, 0) => ([x0, z0 + s], [x0, z0]),
        (0, 1) => ([x0 + s, z0 + s], [x0, z0 + s]),
        (0, -1) => ([x0, z0], [x0 + s, z0]),
        _ => unreachable!("axis-aligned direction"),
    };

    push_vertex(buffers, [a[0], top_y, a[1]], normal, color);
    push_vertex(buffers, [b[0], top_y, b[1]], normal, color);
    push_vertex(buffers, [b[0], bottom_y, b[1]], normal, color);
    push_vertex(buffers, [a[0], bottom_y, a[1]], normal, color);
    push_quad_indices(buffers, base);
}

/// Base RGB for each biome id before shading/noise are applied.
#[must_use]
pub fn biome_color(biome: u8) -> [f32; 3] {
    match biome {
        biomes::WATER_DEEP => [0.05, 0.15, 0.45],
        biomes::WATER_SHALLOW => [0.15, 0.45, 0.65],
        biomes::SAND => [0.86, 0.78, 0.55],
        biomes::COAST => [0.80, 0.74, 0.52],
        biomes::GRASS => [0.35, 0.55, 0.25],
        biomes::FOREST => [0.20, 0.42, 0.18],
        biomes::DENSE_FOREST => [0.12, 0.30, 0.12],
        biomes::SCRUB => [0.55, 0.52, 0.30],
        biomes::FARMLAND => [0.62, 0.55, 0.25],
        biomes::OLIVE_GROVE => [0.47, 0.52, 0.30],
        biomes::VINEYARD => [0.45, 0.35, 0.28],
        biomes::DESERT => [0.80, 0.68, 0.42],
        biomes::MOUNTAIN => [0.45, 0.42, 0.40],
        biomes::SNOW => [0.92, 0.92, 0.95],
        biomes::ROAD => [0.40, 0.38, 0.36],
        _ => [1.0, 0.0, 1.0],
    }
}
