//! The chunk scheduler (component C7): the controller that ties the
//! generator, mesher, cache, worker pool and slabs together.

pub mod debug;
pub mod stats;

use crate::cache::{KeyValueStore, MeshCache};
use crate::config::Tunables;
use crate::constants::{CHUNK_SIZE, MAP_SIZE};
use crate::coord::{distance_to_lod, spiral_offsets, ChunkCoord, Lod};
use crate::generator::{generate, HeightRaster, ProvinceRasterSource};
use crate::hash::fingerprint;
use crate::mesh::{self, MeshBuffers};
use crate::slab::{chunk_world_matrix, BatchSlab};
use crate::worker::{MeshFuture, WorkerPool};
use debug::{ChunkDebugEntry, DebugReport};
use stats::PipelineStats;
use std::collections::HashMap;

const LOD_BOUNDARIES: [i32; 3] = [9, 31, 94];

/// Events the scheduler publishes for external subscribers (cities,
/// roads, water renderers) and the two direct-handle hooks for systems
/// that need slab ids. All methods default to a no-op so implementers
/// only override what they use.
pub trait EventSink: Send + Sync {
    fn chunk_loaded(&self, _cx: i32, _cy: i32) {}
    fn chunk_unloaded(&self, _cx: i32, _cy: i32) {}
    fn lod_changed(&self, _cx: i32, _cy: i32, _lod: Lod) {}
    fn on_chunk_mesh_ready(&self, _cx: i32, _cy: i32, _lod: Lod, _geometry_id: u32, _instance_id: u32) {}
    fn on_chunk_unloaded(&self, _cx: i32, _cy: i32) {}
}

/// An `EventSink` that drops every notification; the default for
/// headless use and for tests that don't assert on events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpEventSink;
impl EventSink for NoOpEventSink {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LoadedEntry {
    lod: Lod,
    geometry_id: u32,
    instance_id: u32,
}

struct PendingRequest {
    lod: Lod,
    fingerprint: String,
    future: Option<MeshFuture>,
}

/// The controller described in spec.md §4.7. Owns the loaded-chunk map,
/// the pending-request set, and (indirectly, through `BatchSlab`) the
/// four per-LOD slabs.
pub struct ChunkScheduler<S: KeyValueStore> {
    tunables: Tunables,
    cache: MeshCache<S>,
    pool: Option<WorkerPool>,
    slabs: [BatchSlab; 4],
    loaded: HashMap<ChunkCoord, LoadedEntry>,
    pending: HashMap<ChunkCoord, PendingRequest>,
    events: Box<dyn EventSink>,
    stats: PipelineStats,
    camera_chunk: Option<ChunkCoord>,
    load_radius: i32,
    unload_radius: i32,
    height_raster: Option<Box<dyn HeightRaster>>,
    province_raster: Option<Box<dyn ProvinceRasterSource>>,
    /// `(camera_chunk, load_radius)` as of the last call whose load pass
    /// finished without hitting `load_budget_per_frame` — i.e. the window
    /// is fully loaded/pending and a repeat call with the same camera
    /// chunk and radius has nothing left to do.
    converged: Option<(ChunkCoord, i32)>,
}

impl<S: KeyValueStore> ChunkScheduler<S> {
    #[must_use]
    pub fn new(tunables: Tunables, cache: MeshCache<S>, pool: Option<WorkerPool>) -> Self {
        Self::with_event_sink(tunables, cache, pool, Box::new(NoOpEventSink))
    }

    #[must_use]
    pub fn with_event_sink(
        tunables: Tunables,
        cache: MeshCache<S>,
        pool: Option<WorkerPool>,
        events: Box<dyn EventSink>,
    ) -> Self {
        let load_radius = tunables.load_radius;
        let unload_radius = tunables.unload_radius;
        Self {
            tunables,
            cache,
            pool,
            slabs: [BatchSlab::new(0), BatchSlab::new(1), BatchSlab::new(2), BatchSlab::new(3)],
            loaded: HashMap::new(),
            pending: HashMap::new(),
            events,
            stats: PipelineStats::new(),
            camera_chunk: None,
            load_radius,
            unload_radius,
            height_raster: None,
            province_raster: None,
            converged: None,
        }
    }

    pub fn set_height_raster(&mut self, raster: Box<dyn HeightRaster>) {
        self.height_raster = Some(raster);
    }

    pub fn set_province_raster(&mut self, raster: Box<dyn ProvinceRasterSource>) {
        self.province_raster = Some(raster);
    }

    #[must_use]
    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_loaded(&self, coord: ChunkCoord) -> bool {
        self.loaded.contains_key(&coord)
    }

    #[must_use]
    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    #[must_use]
    pub fn loaded_lod(&self, coord: ChunkCoord) -> Option<Lod> {
        self.loaded.get(&coord).map(|e| e.lod)
    }

    /// Current render alpha (LOD-boundary blend) of a loaded chunk, as
    /// set on its slab instance. `None` if `coord` is not loaded.
    #[must_use]
    pub fn loaded_alpha(&self, coord: ChunkCoord) -> Option<f32> {
        let entry = self.loaded.get(&coord)?;
        self.slabs[entry.lod as usize].instance_tint(entry.instance_id).map(|t| t[3])
    }

    /// Run one scheduling pass for the current camera position.
    pub fn update(&mut self, camera_x: f64, camera_z: f64, view_range: Option<i32>) {
        self.drain_pending_responses();

        let camera_chunk = camera_to_chunk(camera_x, camera_z);
        self.camera_chunk = Some(camera_chunk);

        if let Some(vr) = view_range {
            self.load_radius = vr;
            self.unload_radius = vr + 4;
        }

        // Alpha blending always runs; it's cheap and depends only on the
        // (possibly unchanged) camera chunk, not on the load/unload state.
        self.update_alpha_blend(camera_chunk);

        // If camera chunk and load radius match the state as of the last
        // call whose load pass didn't get cut off by the budget, the
        // window is already fully loaded/pending and there's nothing left
        // for the load/unload/LOD passes to do. Skip them rather than
        // re-walking the spiral and rescanning `loaded` every frame.
        if self.converged == Some((camera_chunk, self.load_radius)) {
            return;
        }

        let submitted = self.load_pass(camera_chunk);
        self.unload_pass(camera_chunk);
        self.lod_reassignment_pass(camera_chunk);

        self.converged =
            (submitted < self.tunables.load_budget_per_frame).then_some((camera_chunk, self.load_radius));
    }

    /// Returns the number of new requests submitted, so callers can tell
    /// whether the budget cut the pass short (more work remains) or the
    /// whole spiral was scanned with nothing left to do.
    fn load_pass(&mut self, camera_chunk: ChunkCoord) -> usize {
        let mut submitted = 0usize;
        for (dx, dy) in spiral_offsets(self.load_radius) {
            if submitted >= self.tunables.load_budget_per_frame {
                break;
            }
            let candidate = camera_chunk.offset(dx, dy);
            if !candidate.in_bounds() || self.loaded.contains_key(&candidate) || self.pending.contains_key(&candidate)
            {
                continue;
            }
            let distance = candidate.chebyshev_distance(camera_chunk);
            let lod = distance_to_lod(distance);
            self.submit_request(candidate, lod);
            submitted += 1;
        }
        submitted
    }

    fn unload_pass(&mut self, camera_chunk: ChunkCoord) {
        let to_unload: Vec<ChunkCoord> = self
            .loaded
            .keys()
            .copied()
            .filter(|c| c.chebyshev_distance(camera_chunk) > self.unload_radius)
            .collect();

        for coord in to_unload {
            if let Some(entry) = self.loaded.remove(&coord) {
                self.slabs[entry.lod as usize].delete_instance(entry.instance_id);
                self.slabs[entry.lod as usize].delete_geometry(entry.geometry_id);
                self.stats.remove_chunk(coord);
            }
            self.pending.remove(&coord);
            self.events.chunk_unloaded(coord.cx, coord.cy);
            self.events.on_chunk_unloaded(coord.cx, coord.cy);
        }
    }

    fn lod_reassignment_pass(&mut self, camera_chunk: ChunkCoord) {
        let swaps: Vec<(ChunkCoord, Lod)> = self
            .loaded
            .iter()
            .filter_map(|(coord, entry)| {
                let desired = distance_to_lod(coord.chebyshev_distance(camera_chunk));
                (desired != entry.lod).then_some((*coord, desired))
            })
            .filter(|(coord, _)| !self.pending.contains_key(coord))
            .collect();

        for (coord, desired_lod) in swaps {
            self.submit_request(coord, desired_lod);
        }
    }

    /// Load/meshing protocol (spec.md §4.7): mark pending, generate,
    /// fingerprint, check the cache, else dispatch to the worker pool
    /// (or mesh synchronously with no pool configured).
    fn submit_request(&mut self, coord: ChunkCoord, lod: Lod) {
        self.pending.insert(coord, PendingRequest { lod, fingerprint: String::new(), future: None });

        let chunk = generate(coord, self.height_raster.as_deref(), self.province_raster.as_deref());
        let fp = fingerprint(&chunk);

        if let Some(buffers) = self.cache.get(coord, lod, &fp) {
            self.finalize(coord, lod, buffers);
            return;
        }

        match &self.pool {
            Some(pool) => {
                let future = pool.request_mesh(chunk, lod);
                if let Some(entry) = self.pending.get_mut(&coord) {
                    entry.fingerprint = fp;
                    entry.future = Some(future);
                }
            }
            None => {
                let buffers = mesh::mesh(&chunk, lod);
                self.cache.put(coord, lod, &fp, &buffers);
                self.finalize(coord, lod, buffers);
            }
        }
    }

    /// Poll the worker pool and resolve any pending requests whose
    /// futures have completed, falling back to synchronous meshing on
    /// timeout or crash.
    fn drain_pending_responses(&mut self) {
        if let Some(pool) = &self.pool {
            pool.poll();
        }

        let coords: Vec<ChunkCoord> = self.pending.keys().copied().collect();
        for coord in coords {
            // Scoped so the mutable borrow of `self.pending` ends before
            // `self.finalize`/`self.cache` (which need all of `self`) run.
            let outcome = {
                let Some(request) = self.pending.get_mut(&coord) else { continue };
                let Some(future) = request.future.as_mut() else { continue };
                match future.try_recv() {
                    Ok(Some(Ok(buffers))) => {
                        Some(Ok((request.lod, std::mem::take(&mut request.fingerprint), buffers)))
                    }
                    Ok(Some(Err(_))) | Err(_) => Some(Err(request.lod)),
                    Ok(None) => None,
                }
            };

            match outcome {
                Some(Ok((lod, fp, buffers))) => {
                    self.cache.put(coord, lod, &fp, &buffers);
                    self.finalize(coord, lod, buffers);
                }
                Some(Err(lod)) => {
                    // Worker timeout or crash: fall back to synchronous
                    // meshing on the scheduling thread.
                    tracing::warn!(%coord, lod, "worker meshing failed, falling back to synchronous mesh");
                    let chunk = generate(coord, self.height_raster.as_deref(), self.province_raster.as_deref());
                    let fp = fingerprint(&chunk);
                    let buffers = mesh::mesh(&chunk, lod);
                    self.cache.put(coord, lod, &fp, &buffers);
                    self.finalize(coord, lod, buffers);
                }
                None => {}
            }
        }
    }

    /// Apply the mesh result to the appropriate slab, discarding it if
    /// the coord is no longer pending at this LOD (stale/cancelled) or
    /// is somehow already loaded at the target LOD (race).
    fn finalize(&mut self, coord: ChunkCoord, lod: Lod, buffers: MeshBuffers) {
        let Some(pending_lod) = self.pending.get(&coord).map(|p| p.lod) else {
            return;
        };
        if pending_lod != lod {
            return;
        }
        self.pending.remove(&coord);

        let previous = self.loaded.get(&coord).copied();
        if let Some(existing) = previous {
            if existing.lod == lod {
                return;
            }
            self.slabs[existing.lod as usize].delete_instance(existing.instance_id);
            self.slabs[existing.lod as usize].delete_geometry(existing.geometry_id);
            self.loaded.remove(&coord);
        }

        let triangle_count = buffers.triangle_count();
        let slab = &mut self.slabs[lod as usize];
        let geometry_id = match slab.add_geometry(&buffers) {
            Ok(id) => id,
            Err(_) => {
                tracing::warn!(%coord, lod, "slab full, dropping chunk; will retry next pass");
                return;
            }
        };
        let instance_id = match slab.add_instance(geometry_id) {
            Ok(id) => id,
            Err(_) => {
                slab.delete_geometry(geometry_id);
                tracing::warn!(%coord, lod, "slab full (instances), dropping chunk");
                return;
            }
        };
        slab.set_matrix(instance_id, chunk_world_matrix(coord));
        slab.set_tint(instance_id, 1.0, 1.0, 1.0, 1.0);
        self.loaded.insert(coord, LoadedEntry { lod, geometry_id, instance_id });
        self.stats.record_chunk(coord, triangle_count);

        self.events.on_chunk_mesh_ready(coord.cx, coord.cy, lod, geometry_id, instance_id);
        if previous.is_some() {
            self.events.lod_changed(coord.cx, coord.cy, lod);
        } else {
            self.events.chunk_loaded(coord.cx, coord.cy);
        }
    }

    fn update_alpha_blend(&mut self, camera_chunk: ChunkCoord) {
        let blend = self.tunables.lod_blend_chunks;
        for (coord, entry) in &self.loaded {
            let distance = f64::from(coord.chebyshev_distance(camera_chunk));
            let alpha = lod_alpha(distance, blend);
            self.slabs[entry.lod as usize].set_tint(entry.instance_id, 1.0, 1.0, 1.0, alpha);
        }
    }

    /// On-demand diagnostic sweep over chunks within `radius` of
    /// `center`. Never invoked automatically.
    #[must_use]
    pub fn debug_report(&self, center: ChunkCoord, radius: i32) -> DebugReport {
        let mut entries = Vec::new();
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let coord = center.offset(dx, dy);
                if !coord.in_bounds() {
                    continue;
                }
                entries.push(ChunkDebugEntry {
                    coord,
                    loaded_lod: self.loaded.get(&coord).map(|e| e.lod),
                    pending: self.pending.contains_key(&coord),
                });
            }
        }
        DebugReport { center, radius, entries }
    }
}

/// `cx = floor((camera_x + MAP_SIZE/2) / CHUNK_SIZE)`, same for `cy`.
#[must_use]
pub fn camera_to_chunk(camera_x: f64, camera_z: f64) -> ChunkCoord {
    let half_map = MAP_SIZE / 2.0;
    let cx = ((camera_x + half_map) / CHUNK_SIZE as f64).floor() as i32;
    let cy = ((camera_z + half_map) / CHUNK_SIZE as f64).floor() as i32;
    ChunkCoord::new(cx, cy)
}

/// LOD-boundary alpha (spec.md §4.7): fades a chunk in/out across the
/// `{9, 31, 94}`-chunk LOD boundaries, floored at 0.05 so a chunk is
/// never fully invisible.
#[must_use]
fn lod_alpha(distance: f64, blend: f64) -> f32 {
    let mut nearest: Option<(f64, f64)> = None; // (boundary, |distance - boundary|)
    for &b in &LOD_BOUNDARIES {
        let delta = (distance - f64::from(b)).abs();
        if nearest.map_or(true, |(_, best)| delta < best) {
            nearest = Some((f64::from(b), delta));
        }
    }
    let Some((boundary, delta)) = nearest else { return 1.0 };
    if delta >= blend {
        return 1.0;
    }
    let frac = (delta / blend).clamp(0.0, 1.0);
    let alpha = if distance > boundary { frac } else { 1.0 - frac };
    alpha.max(0.05) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryKv;

    fn new_scheduler() -> ChunkScheduler<MemoryKv> {
        let tunables = Tunables { load_radius: 2, unload_radius: 3, load_budget_per_frame: 2, ..Tunables::default() };
        ChunkScheduler::new(tunables, MeshCache::new(MemoryKv::new()), None)
    }

    fn centre_world_xz() -> (f64, f64) {
        // World position whose chunk is (32, 32), the centre of the grid.
        let half_map = MAP_SIZE / 2.0;
        (32.0 * CHUNK_SIZE as f64 - half_map + 1.0, 32.0 * CHUNK_SIZE as f64 - half_map + 1.0)
    }

    #[test]
    fn camera_to_chunk_maps_origin_to_map_centre() {
        let c = camera_to_chunk(0.0, 0.0);
        assert_eq!(c, ChunkCoord::new(32, 32));
    }

    #[test]
    fn repeated_updates_eventually_load_full_window() {
        let mut sched = new_scheduler();
        let (x, z) = centre_world_xz();
        for _ in 0..20 {
            sched.update(x, z, None);
        }
        // 5x5 window around the centre chunk, radius 2.
        assert_eq!(sched.loaded_count(), 25);
    }

    #[test]
    fn load_budget_caps_submissions_per_call() {
        let mut sched = new_scheduler();
        let (x, z) = centre_world_xz();
        sched.update(x, z, None);
        assert!(sched.loaded_count() + sched.pending_count() <= 2);
    }

    #[test]
    fn idempotent_once_converged() {
        let mut sched = new_scheduler();
        let (x, z) = centre_world_xz();
        for _ in 0..20 {
            sched.update(x, z, None);
        }
        let count_before = sched.loaded_count();
        sched.update(x, z, None);
        assert_eq!(sched.loaded_count(), count_before);
    }

    #[test]
    fn unload_respects_hysteresis_band() {
        let mut sched = new_scheduler();
        let (x, z) = centre_world_xz();
        for _ in 0..20 {
            sched.update(x, z, None);
        }
        assert_eq!(sched.loaded_count(), 25);
        // A tiny camera move that keeps every chunk within unload_radius=3
        // must not evict anything.
        for _ in 0..5 {
            sched.update(x + 1.0, z, None);
        }
        assert_eq!(sched.loaded_count(), 25);
    }

    #[test]
    fn lod_alpha_never_drops_below_floor() {
        assert!(lod_alpha(9.0, 5.0) >= 0.05);
        assert!(lod_alpha(4.0, 5.0) >= 0.05);
        assert_eq!(lod_alpha(0.0, 5.0), 1.0);
    }

    #[test]
    fn debug_report_reflects_loaded_state() {
        let mut sched = new_scheduler();
        let (x, z) = centre_world_xz();
        for _ in 0..20 {
            sched.update(x, z, None);
        }
        let report = sched.debug_report(ChunkCoord::new(32, 32), 2);
        assert_eq!(report.loaded_count(), 25);
        assert_eq!(report.pending_count(), 0);
    }
}
