//! End-to-end scenarios exercising the full generator -> mesher -> cache
//! -> worker pool -> scheduler pipeline through its public API.

use std::sync::{Arc, Mutex};

use terra_pipeline::cache::{MemoryKv, MeshCache};
use terra_pipeline::config::Tunables;
use terra_pipeline::constants::{CHUNK_SIZE, MAP_SIZE};
use terra_pipeline::coord::{ChunkCoord, Lod};
use terra_pipeline::generator;
use terra_pipeline::hash::fingerprint;
use terra_pipeline::mesh;
use terra_pipeline::scheduler::{camera_to_chunk, ChunkScheduler, EventSink};
use terra_pipeline::wire;
use terra_pipeline::worker::WorkerPool;

/// Surfaces the pipeline's `tracing::warn!` fallback/failure logs under
/// `cargo test -- --nocapture`. Safe to call from every test: subsequent
/// calls are no-ops once a subscriber is installed.
fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[derive(Default)]
struct Recorder {
    loaded: Arc<Mutex<Vec<(i32, i32)>>>,
    unloaded: Arc<Mutex<Vec<(i32, i32)>>>,
    lod_changed: Arc<Mutex<Vec<(i32, i32, Lod)>>>,
}

impl EventSink for Recorder {
    fn chunk_loaded(&self, cx: i32, cy: i32) {
        self.loaded.lock().unwrap().push((cx, cy));
    }
    fn chunk_unloaded(&self, cx: i32, cy: i32) {
        self.unloaded.lock().unwrap().push((cx, cy));
    }
    fn lod_changed(&self, cx: i32, cy: i32, lod: Lod) {
        self.lod_changed.lock().unwrap().push((cx, cy, lod));
    }
}

/// World (x, z) whose camera chunk is the centre of the 64x64 grid,
/// (32, 32).
fn centre_world_xz() -> (f64, f64) {
    let half_map = MAP_SIZE / 2.0;
    (32.0 * CHUNK_SIZE as f64 - half_map + 1.0, 32.0 * CHUNK_SIZE as f64 - half_map + 1.0)
}

#[test]
fn s1_fresh_boot_loads_full_window_with_one_event_per_coord() {
    init_tracing();
    let tunables = Tunables { load_radius: 2, unload_radius: 3, load_budget_per_frame: 2, ..Tunables::default() };
    let recorder = Recorder::default();
    let loaded = recorder.loaded.clone();
    let mut sched =
        ChunkScheduler::with_event_sink(tunables, MeshCache::new(MemoryKv::new()), None, Box::new(recorder));

    let (x, z) = centre_world_xz();
    // ceil(25 / 2) = 13 updates to fully drain the load window.
    for _ in 0..13 {
        sched.update(x, z, None);
    }

    assert_eq!(sched.loaded_count(), 25);
    let events = loaded.lock().unwrap();
    assert_eq!(events.len(), 25);
    let mut unique: Vec<(i32, i32)> = events.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), 25, "every coord must fire chunk_loaded exactly once");
}

#[test]
fn s2_move_by_one_chunk_swaps_exactly_one_column() {
    init_tracing();
    // No hysteresis band here (unload_radius == load_radius) so a single
    // chunk of camera movement swaps exactly one column in, one out.
    let tunables = Tunables { load_radius: 2, unload_radius: 2, load_budget_per_frame: 25, ..Tunables::default() };
    let recorder = Recorder::default();
    let loaded = recorder.loaded.clone();
    let unloaded = recorder.unloaded.clone();
    let mut sched =
        ChunkScheduler::with_event_sink(tunables, MeshCache::new(MemoryKv::new()), None, Box::new(recorder));

    let (x, z) = centre_world_xz();
    sched.update(x, z, None);
    assert_eq!(sched.loaded_count(), 25);
    let loaded_before = loaded.lock().unwrap().len();
    let unloaded_before = unloaded.lock().unwrap().len();

    // Shift the camera east by exactly one chunk.
    sched.update(x + CHUNK_SIZE as f64, z, None);

    assert_eq!(sched.loaded_count(), 25);
    assert_eq!(camera_to_chunk(x + CHUNK_SIZE as f64, z), ChunkCoord::new(33, 32));
    assert_eq!(loaded.lock().unwrap().len() - loaded_before, 5, "one new 5-chunk column should load");
    assert_eq!(unloaded.lock().unwrap().len() - unloaded_before, 5, "one stale 5-chunk column should unload");

    for cy in 30..=34 {
        assert!(sched.is_loaded(ChunkCoord::new(35, cy)));
        assert!(!sched.is_loaded(ChunkCoord::new(30, cy)));
    }
}

#[test]
fn s3_lod_boundary_sweep_transitions_at_distance_ten() {
    init_tracing();
    let tunables = Tunables {
        load_radius: 15,
        unload_radius: 30,
        load_budget_per_frame: 64,
        lod_blend_chunks: 5.0,
        ..Tunables::default()
    };
    let recorder = Recorder::default();
    let lod_changed = recorder.lod_changed.clone();
    let mut sched =
        ChunkScheduler::with_event_sink(tunables, MeshCache::new(MemoryKv::new()), None, Box::new(recorder));

    let (x0, z) = centre_world_xz();
    let target = ChunkCoord::new(32, 32);
    sched.update(x0, z, None);
    assert_eq!(sched.loaded_lod(target), Some(0));

    for step in 1..=14 {
        let x = x0 + step as f64 * CHUNK_SIZE as f64;
        sched.update(x, z, None);
        let distance = target.chebyshev_distance(camera_to_chunk(x, z));
        let lod = sched.loaded_lod(target);
        let alpha = sched.loaded_alpha(target);

        if distance <= 9 {
            assert_eq!(lod, Some(0), "distance {distance}");
        } else {
            assert_eq!(lod, Some(1), "distance {distance}");
        }
        if let Some(a) = alpha {
            assert!(a >= 0.05, "alpha must never drop below the floor: {a}");
        }
    }

    let events = lod_changed.lock().unwrap();
    let target_events: Vec<Lod> =
        events.iter().filter(|(cx, cy, _)| (*cx, *cy) == (32, 32)).map(|(_, _, lod)| *lod).collect();
    assert_eq!(target_events, vec![1]);
}

#[test]
fn s4_pool_survives_a_burst_larger_than_its_worker_count() {
    init_tracing();
    let pool = WorkerPool::new(4);
    let receivers: Vec<_> = (0..8)
        .map(|i| {
            let chunk = generator::generate(ChunkCoord::new(i, 0), None, None);
            pool.request_mesh(chunk, 0)
        })
        .collect();

    // Terminate worker 0 immediately, mid-burst: 4 of the 8 requests are
    // already dispatched (one per worker) and the other 4 are sitting in
    // the overflow queue. The replacement worker spawned for slot 0 must
    // drain its share of that backlog rather than stall.
    pool.kill_worker_for_test(0);

    let mut resolved = vec![false; receivers.len()];
    let mut receivers = receivers;
    let mut spins = 0;
    while resolved.iter().any(|r| !r) {
        pool.poll();
        for (rx, done) in receivers.iter_mut().zip(resolved.iter_mut()) {
            if !*done {
                if let Ok(Some(_)) = rx.try_recv() {
                    *done = true;
                }
            }
        }
        spins += 1;
        assert!(spins < 10_000, "requests never resolved");
        std::thread::sleep(std::time::Duration::from_millis(1));
    }

    assert_eq!(pool.live_worker_count(), 4, "the killed worker's slot must be respawned");
}

#[test]
fn s5_cache_hit_path_converges_with_zero_live_workers() {
    init_tracing();
    let tunables = Tunables { load_radius: 2, unload_radius: 3, load_budget_per_frame: 2, ..Tunables::default() };

    // Pre-populate the cache as if it had persisted from a prior run.
    let cache = MeshCache::new(MemoryKv::new());
    let centre = ChunkCoord::new(32, 32);
    for dy in -2..=2 {
        for dx in -2..=2 {
            let coord = centre.offset(dx, dy);
            let chunk = generator::generate(coord, None, None);
            let fp = fingerprint(&chunk);
            let buffers = mesh::mesh(&chunk, 0);
            cache.put(coord, 0, &fp, &buffers);
        }
    }

    // Zero workers: any cache miss would stall forever in the overflow
    // queue, so full convergence here proves every load was a hit.
    let mut sched = ChunkScheduler::new(tunables, cache, Some(WorkerPool::new(0)));
    let (x, z) = centre_world_xz();
    for _ in 0..13 {
        sched.update(x, z, None);
    }

    assert_eq!(sched.loaded_count(), 25);
}

#[test]
fn s6_corner_chunk_output_is_sane_and_round_trips() {
    init_tracing();
    let chunk = generator::generate(ChunkCoord::new(0, 0), None, None);
    assert_eq!(chunk.coord, ChunkCoord::new(0, 0));

    let water_count = chunk.heights.iter().filter(|&&h| h < terra_pipeline::constants::WATER_LEVEL).count();
    assert!(water_count * 2 >= terra_pipeline::constants::TILE_COUNT);
    assert!(chunk.heights.iter().all(|&h| h <= terra_pipeline::constants::MAX_HEIGHT));
    for (i, &h) in chunk.heights.iter().enumerate() {
        let is_water = h < terra_pipeline::constants::WATER_LEVEL;
        assert_eq!(chunk.provinces[i] == 0, is_water);
    }

    let bytes = wire::encode_chunk_data(&chunk);
    assert_eq!(bytes.len(), 4104);
    let decoded = wire::decode_chunk_data(&bytes).unwrap();
    assert_eq!(chunk, decoded);
}
