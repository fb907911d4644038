//! Per-LOD shared draw resource (component C6): one arena collapses all
//! loaded chunks of a given LOD into a handful of draw calls.

use crate::coord::Lod;
use crate::error::PipelineError;
use crate::mesh::MeshBuffers;
use glam::Mat4;
use std::collections::HashMap;

/// Fixed capacity budgets for one LOD's slab (spec.md §4.6; illustrative
/// defaults, tunable per deployment).
#[derive(Debug, Clone, Copy)]
pub struct SlabLimits {
    pub max_chunks: usize,
    pub max_verts: usize,
    pub max_indices: usize,
}

/// The default budget table, one row per LOD (`lod as usize` indexes it).
pub const DEFAULT_LIMITS: [SlabLimits; 4] = [
    SlabLimits { max_chunks: 150, max_verts: 150 * 5000, max_indices: 150 * 8000 },
    SlabLimits { max_chunks: 250, max_verts: 250 * 1500, max_indices: 250 * 2500 },
    SlabLimits { max_chunks: 400, max_verts: 400 * 500, max_indices: 400 * 800 },
    SlabLimits { max_chunks: 400, max_verts: 400 * 12, max_indices: 400 * 12 },
];

struct GeometryEntry {
    vertex_count: usize,
    index_count: usize,
}

struct InstanceEntry {
    #[allow(dead_code)]
    geometry_id: u32,
    matrix: Mat4,
    tint: [f32; 4],
}

/// Opaque handle a slab hands to the renderer; C6 owns its meaning, the
/// renderer only reads it back through a [`RenderBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlabHandle {
    pub lod: Lod,
}

/// The renderer-side capability a `BatchSlab` submits itself through.
/// No implementation is provided here; an actual renderer plugs in by
/// implementing this trait (spec.md §9's capability-interface pattern).
pub trait RenderBackend: Send + Sync {
    fn submit(&self, handle: SlabHandle, slab: &BatchSlab);
}

pub struct BatchSlab {
    lod: Lod,
    limits: SlabLimits,
    geometries: HashMap<u32, GeometryEntry>,
    instances: HashMap<u32, InstanceEntry>,
    next_geometry_id: u32,
    next_instance_id: u32,
    used_verts: usize,
    used_indices: usize,
    /// Vertex-coloured, flat-shaded, alpha-fading material hints for an
    /// external renderer; the pipeline does not and cannot enforce draw
    /// order itself.
    pub depth_write: bool,
    pub render_order: u8,
}

impl BatchSlab {
    #[must_use]
    pub fn new(lod: Lod) -> Self {
        Self::with_limits(lod, DEFAULT_LIMITS[lod as usize])
    }

    #[must_use]
    pub fn with_limits(lod: Lod, limits: SlabLimits) -> Self {
        Self {
            lod,
            limits,
            geometries: HashMap::new(),
            instances: HashMap::new(),
            next_geometry_id: 0,
            next_instance_id: 0,
            used_verts: 0,
            used_indices: 0,
            depth_write: false,
            render_order: lod,
        }
    }

    #[must_use]
    pub fn handle(&self) -> SlabHandle {
        SlabHandle { lod: self.lod }
    }

    /// Copy `buffers` into the arena. Fails with [`PipelineError::SlabFull`]
    /// when no geometry slot or vertex/index budget remains.
    pub fn add_geometry(&mut self, buffers: &MeshBuffers) -> Result<u32, PipelineError> {
        let vcount = buffers.vertex_count();
        let icount = buffers.indices.len();
        if self.geometries.len() >= self.limits.max_chunks
            || self.used_verts + vcount > self.limits.max_verts
            || self.used_indices + icount > self.limits.max_indices
        {
            return Err(PipelineError::SlabFull);
        }
        let id = self.next_geometry_id;
        self.next_geometry_id += 1;
        self.geometries.insert(id, GeometryEntry { vertex_count: vcount, index_count: icount });
        self.used_verts += vcount;
        self.used_indices += icount;
        Ok(id)
    }

    /// Logically instantiate `geometry_id`. New instances default to an
    /// identity matrix and opaque tint `(1,1,1,1)`.
    pub fn add_instance(&mut self, geometry_id: u32) -> Result<u32, PipelineError> {
        if !self.geometries.contains_key(&geometry_id) {
            return Err(PipelineError::SlabFull);
        }
        if self.instances.len() >= self.limits.max_chunks {
            return Err(PipelineError::SlabFull);
        }
        let id = self.next_instance_id;
        self.next_instance_id += 1;
        self.instances.insert(id, InstanceEntry { geometry_id, matrix: Mat4::IDENTITY, tint: [1.0, 1.0, 1.0, 1.0] });
        Ok(id)
    }

    /// Set an instance's world transform, e.g. placing a chunk at
    /// `(cx*32 - 1024, 0, cy*32 - 1024)`. A no-op for an unknown id.
    pub fn set_matrix(&mut self, instance_id: u32, matrix: Mat4) {
        if let Some(entry) = self.instances.get_mut(&instance_id) {
            entry.matrix = matrix;
        }
    }

    /// Set the per-instance RGBA tint used for LOD-boundary alpha
    /// blending. A no-op for an unknown id.
    pub fn set_tint(&mut self, instance_id: u32, r: f32, g: f32, b: f32, a: f32) {
        if let Some(entry) = self.instances.get_mut(&instance_id) {
            entry.tint = [r, g, b, a];
        }
    }

    pub fn delete_instance(&mut self, instance_id: u32) {
        self.instances.remove(&instance_id);
    }

    pub fn delete_geometry(&mut self, geometry_id: u32) {
        if let Some(entry) = self.geometries.remove(&geometry_id) {
            self.used_verts -= entry.vertex_count;
            self.used_indices -= entry.index_count;
        }
    }

    #[must_use]
    pub fn instance_matrix(&self, instance_id: u32) -> Option<Mat4> {
        self.instances.get(&instance_id).map(|e| e.matrix)
    }

    #[must_use]
    pub fn instance_tint(&self, instance_id: u32) -> Option<[f32; 4]> {
        self.instances.get(&instance_id).map(|e| e.tint)
    }

    #[must_use]
    pub fn geometry_count(&self) -> usize {
        self.geometries.len()
    }

    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty() && self.instances.is_empty() && self.used_verts == 0 && self.used_indices == 0
    }
}

/// The chunk-to-world placement matrix used by the scheduler when
/// setting an instance's transform: a chunk's local origin maps to
/// `(cx*CHUNK_SIZE - MAP_SIZE/2, 0, cy*CHUNK_SIZE - MAP_SIZE/2)`.
#[must_use]
pub fn chunk_world_matrix(coord: crate::coord::ChunkCoord) -> Mat4 {
    let half_map = crate::constants::MAP_SIZE as f32 / 2.0;
    let x = coord.cx as f32 * crate::constants::CHUNK_SIZE as f32 - half_map;
    let z = coord.cy as f32 * crate::constants::CHUNK_SIZE as f32 - half_map;
    Mat4::from_translation(glam::Vec3::new(x, 0.0, z))
}
