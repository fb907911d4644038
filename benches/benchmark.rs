use criterion::{black_box, criterion_group, criterion_main, Criterion};

use terra_pipeline::cache::{MemoryKv, MeshCache};
use terra_pipeline::config::Tunables;
use terra_pipeline::coord::ChunkCoord;
use terra_pipeline::generator;
use terra_pipeline::hash::fingerprint;
use terra_pipeline::mesh;
use terra_pipeline::scheduler::ChunkScheduler;
use terra_pipeline::worker::WorkerPool;

/// Generation of a single chunk's terrain data.
fn bench_generate_single_chunk(c: &mut Criterion) {
    c.bench_function("generate_single_chunk", |b| {
        b.iter(|| {
            let chunk = generator::generate(black_box(ChunkCoord::new(32, 32)), None, None);
            black_box(chunk);
        })
    });
}

/// Generation across a realistic streaming window (9x9 chunks).
fn bench_generate_streaming_window(c: &mut Criterion) {
    c.bench_function("generate_streaming_window_9x9", |b| {
        b.iter(|| {
            for cx in 28..37 {
                for cy in 28..37 {
                    let chunk = generator::generate(ChunkCoord::new(cx, cy), None, None);
                    black_box(&chunk);
                }
            }
        })
    });
}

/// Greedy meshing at every LOD for one chunk.
fn bench_mesh_lod_variants(c: &mut Criterion) {
    let chunk = generator::generate(ChunkCoord::new(32, 10), None, None);

    c.bench_function("mesh_lod_variants", |b| {
        b.iter(|| {
            for lod in 0..=terra_pipeline::coord::MAX_LOD {
                black_box(mesh::mesh(&chunk, lod));
            }
        })
    });
}

/// Content fingerprinting, exercised at the rate the scheduler calls it.
fn bench_fingerprint(c: &mut Criterion) {
    let chunk = generator::generate(ChunkCoord::new(5, 5), None, None);
    c.bench_function("fingerprint_single_chunk", |b| {
        b.iter(|| black_box(fingerprint(&chunk)))
    });
}

/// End-to-end scheduler convergence: repeated `update()` calls from a
/// stationary camera until the full load window settles, worker pool
/// enabled so meshing happens off the benchmarking thread.
fn bench_scheduler_convergence(c: &mut Criterion) {
    c.bench_function("scheduler_converge_radius_4", |b| {
        b.iter(|| {
            let tunables = Tunables { load_radius: 4, unload_radius: 8, load_budget_per_frame: 4, ..Tunables::default() };
            let pool = WorkerPool::new(4);
            let mut sched = ChunkScheduler::new(tunables, MeshCache::new(MemoryKv::new()), Some(pool));
            for _ in 0..40 {
                sched.update(black_box(0.0), black_box(0.0), None);
            }
            black_box(sched.loaded_count());
        })
    });
}

/// Dispatch fairness under a burst far larger than the worker count.
fn bench_worker_pool_burst(c: &mut Criterion) {
    c.bench_function("worker_pool_burst_32_on_4", |b| {
        b.iter(|| {
            let pool = WorkerPool::new(4);
            let mut receivers: Vec<_> = (0..32)
                .map(|i| {
                    let chunk = generator::generate(ChunkCoord::new(i, 0), None, None);
                    pool.request_mesh(chunk, 0)
                })
                .collect();
            while !receivers.is_empty() {
                pool.poll();
                receivers.retain_mut(|rx| !matches!(rx.try_recv(), Ok(Some(_))));
            }
            black_box(pool.live_worker_count());
        })
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(30);
    targets =
        bench_generate_single_chunk,
        bench_generate_streaming_window,
        bench_mesh_lod_variants,
        bench_fingerprint,
        bench_scheduler_convergence,
        bench_worker_pool_burst
}
criterion_main!(benches);
