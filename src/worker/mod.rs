//! Fixed-size worker pool offloading greedy meshing from the scheduling
//! thread (component C5).
//!
//! Dispatch is least-loaded with the lowest index winning ties; once
//! every worker holds a job, further requests queue in FIFO order
//! rather than piling onto a busy worker. The pool is driven by an
//! explicit [`WorkerPool::poll`] call once per scheduling pass, mirroring
//! a cooperative task-completion check rather than a full async runtime.

use crate::coord::{ChunkCoord, Lod};
use crate::error::PipelineError;
use crate::generator::ChunkData;
use crate::mesh::{self, MeshBuffers};
use futures::channel::oneshot;
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

struct WorkerJob {
    request_id: u64,
    chunk: ChunkData,
    lod: Lod,
    /// Set only by `kill_worker_for_test`: makes the worker panic instead
    /// of meshing, so crash recovery is exercised for real.
    poison: bool,
}

struct WorkerResponse {
    request_id: u64,
    worker_index: usize,
    result: Result<MeshBuffers, ()>,
}

struct PendingEntry {
    coord: ChunkCoord,
    lod: Lod,
    worker_index: Option<usize>,
    deadline: Instant,
    responder: oneshot::Sender<Result<MeshBuffers, PipelineError>>,
}

struct QueuedJob {
    request_id: u64,
    chunk: ChunkData,
    lod: Lod,
}

struct Worker {
    job_tx: Option<mpsc::Sender<WorkerJob>>,
    handle: Option<JoinHandle<()>>,
    busy: bool,
    alive: bool,
    /// Set by `set_pool_size` when shrinking; the worker is dropped the
    /// next time it goes idle instead of receiving further jobs.
    retiring: bool,
}

/// A future resolving to the meshed buffers or a [`PipelineError`].
pub type MeshFuture = oneshot::Receiver<Result<MeshBuffers, PipelineError>>;

pub struct WorkerPool {
    workers: Mutex<Vec<Worker>>,
    target_size: AtomicU64,
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, PendingEntry>>,
    overflow: Mutex<VecDeque<QueuedJob>>,
    response_rx: Mutex<mpsc::Receiver<WorkerResponse>>,
    response_tx: mpsc::Sender<WorkerResponse>,
    disposed: AtomicBool,
    default_timeout: Duration,
}

impl WorkerPool {
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self::with_timeout(size, DEFAULT_TIMEOUT)
    }

    #[must_use]
    pub fn with_timeout(size: usize, default_timeout: Duration) -> Self {
        let (response_tx, response_rx) = mpsc::channel();
        let mut workers = Vec::with_capacity(size);
        for i in 0..size {
            workers.push(spawn_worker(i, response_tx.clone()));
        }
        Self {
            workers: Mutex::new(workers),
            target_size: AtomicU64::new(size as u64),
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            overflow: Mutex::new(VecDeque::new()),
            response_rx: Mutex::new(response_rx),
            response_tx,
            disposed: AtomicBool::new(false),
            default_timeout,
        }
    }

    /// Submit a meshing job using the pool's default timeout.
    pub fn request_mesh(&self, chunk: ChunkData, lod: Lod) -> MeshFuture {
        self.request_mesh_with_timeout(chunk, lod, self.default_timeout)
    }

    pub fn request_mesh_with_timeout(&self, chunk: ChunkData, lod: Lod, timeout: Duration) -> MeshFuture {
        let (tx, rx) = oneshot::channel();

        if self.disposed.load(Ordering::SeqCst) {
            let _ = tx.send(Err(PipelineError::PoolDisposed));
            return rx;
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let coord = chunk.coord;
        let deadline = Instant::now() + timeout;
        let entry = PendingEntry { coord, lod, worker_index: None, deadline, responder: tx };

        let mut workers = self.workers.lock().unwrap();
        if let Some(idx) = pick_idle_worker(&workers) {
            workers[idx].busy = true;
            let job = WorkerJob { request_id: id, chunk, lod, poison: false };
            let sent = workers[idx]
                .job_tx
                .as_ref()
                .expect("idle worker has a live channel")
                .send(job)
                .is_ok();
            drop(workers);
            let mut entry = entry;
            if sent {
                entry.worker_index = Some(idx);
            }
            self.pending.lock().unwrap().insert(id, entry);
        } else {
            drop(workers);
            self.pending.lock().unwrap().insert(id, entry);
            self.overflow.lock().unwrap().push_back(QueuedJob { request_id: id, chunk, lod });
        }

        rx
    }

    /// Drain completed/timed-out work. Call once per scheduling pass.
    pub fn poll(&self) {
        self.drain_responses();
        self.drain_timeouts();
        self.respawn_dead_workers();
    }

    fn drain_responses(&self) {
        let responses: Vec<WorkerResponse> = {
            let rx = self.response_rx.lock().unwrap();
            std::iter::from_fn(|| rx.try_recv().ok()).collect()
        };

        for response in responses {
            let mut workers = self.workers.lock().unwrap();
            let crashed = response.result.is_err();
            if let Some(worker) = workers.get_mut(response.worker_index) {
                worker.busy = false;
                if crashed {
                    worker.alive = false;
                    worker.job_tx = None;
                }
            }
            let should_retire = workers
                .get(response.worker_index)
                .map(|w| w.retiring && !w.busy)
                .unwrap_or(false);
            if should_retire {
                if let Some(worker) = workers.get_mut(response.worker_index) {
                    worker.job_tx = None;
                    worker.alive = false;
                }
            } else if !crashed {
                self.try_dispatch_to(&mut workers, response.worker_index);
            }
            drop(workers);

            if let Some(entry) = self.pending.lock().unwrap().remove(&response.request_id) {
                let result = match response.result {
                    Ok(buffers) => Ok(buffers),
                    Err(()) => Err(PipelineError::WorkerCrashed),
                };
                let _ = entry.responder.send(result);
            }
        }
    }

    fn drain_timeouts(&self) {
        let now = Instant::now();
        let mut pending = self.pending.lock().unwrap();
        let timed_out: Vec<u64> = pending
            .iter()
            .filter(|(_, e)| e.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in timed_out {
            if let Some(entry) = pending.remove(&id) {
                let err = PipelineError::WorkerTimeout { cx: entry.coord.cx, cy: entry.coord.cy, lod: entry.lod };
                let _ = entry.responder.send(Err(err));
                if let Some(idx) = entry.worker_index {
                    drop(pending);
                    let mut workers = self.workers.lock().unwrap();
                    if let Some(w) = workers.get_mut(idx) {
                        w.busy = false;
                    }
                    self.try_dispatch_to(&mut workers, idx);
                    drop(workers);
                    pending = self.pending.lock().unwrap();
                }
            }
        }
    }

    /// Send the next queued job (if any) to worker `idx`, assuming it is
    /// idle and alive.
    fn try_dispatch_to(&self, workers: &mut [Worker], idx: usize) {
        let Some(worker) = workers.get_mut(idx) else { return };
        if worker.busy || !worker.alive || worker.retiring {
            return;
        }
        let Some(job_tx) = worker.job_tx.as_ref() else { return };
        let mut overflow = self.overflow.lock().unwrap();
        if let Some(queued) = overflow.pop_front() {
            let QueuedJob { request_id, chunk, lod } = queued;
            drop(overflow);
            if job_tx.send(WorkerJob { request_id, chunk, lod, poison: false }).is_ok() {
                worker.busy = true;
                if let Some(entry) = self.pending.lock().unwrap().get_mut(&request_id) {
                    entry.worker_index = Some(idx);
                }
            }
        }
    }

    /// Replace any dead, non-retiring worker slot in place (preserving
    /// indices, since dispatch tie-breaking depends on them) and grow the
    /// vector up to the target size. Each newly live index is handed the
    /// next `overflow` job immediately, so a backlog queued while a
    /// worker was down or before the pool grew doesn't wait for some
    /// unrelated future response to trigger dispatch.
    fn respawn_dead_workers(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        let target = self.target_size.load(Ordering::SeqCst) as usize;
        let mut workers = self.workers.lock().unwrap();
        for i in 0..workers.len().min(target) {
            if !workers[i].alive && !workers[i].retiring {
                workers[i] = spawn_worker(i, self.response_tx.clone());
                self.try_dispatch_to(&mut workers, i);
            }
        }
        while workers.len() < target {
            let idx = workers.len();
            workers.push(spawn_worker(idx, self.response_tx.clone()));
            self.try_dispatch_to(&mut workers, idx);
        }
    }

    /// Grow or shrink the pool. Growing spawns workers immediately;
    /// shrinking only terminates currently-idle workers, deferring the
    /// rest until they finish their in-flight job.
    pub fn set_pool_size(&self, size: usize) {
        self.target_size.store(size as u64, Ordering::SeqCst);
        let mut workers = self.workers.lock().unwrap();
        while workers.len() < size {
            let idx = workers.len();
            workers.push(spawn_worker(idx, self.response_tx.clone()));
            self.try_dispatch_to(&mut workers, idx);
        }
        if workers.len() > size {
            for worker in workers.iter_mut().skip(size) {
                if worker.busy {
                    worker.retiring = true;
                } else {
                    worker.job_tx = None;
                    worker.alive = false;
                }
            }
        }
    }

    #[must_use]
    pub fn live_worker_count(&self) -> usize {
        self.workers.lock().unwrap().iter().filter(|w| w.alive).count()
    }

    /// Test-only hook: queues a job on worker `idx` that panics instead
    /// of meshing, so integration tests can exercise the real
    /// crash-detection/respawn/backlog-drain path instead of injecting a
    /// fake response on the private channel. If `idx` is currently busy
    /// the worker crashes right after finishing its in-flight job — Rust
    /// has no safe way to abort a thread mid-instruction, so this is the
    /// closest a test gets to "terminate a worker mid-burst".
    #[cfg(feature = "test-support")]
    pub fn kill_worker_for_test(&self, idx: usize) {
        let workers = self.workers.lock().unwrap();
        let Some(worker) = workers.get(idx) else { return };
        let Some(job_tx) = worker.job_tx.as_ref() else { return };
        let chunk = crate::generator::generate(ChunkCoord::new(0, 0), None, None);
        let _ = job_tx.send(WorkerJob { request_id: 0, chunk, lod: 0, poison: true });
    }

    /// Reject all in-flight and queued requests, then terminate every
    /// worker thread.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        let ids: Vec<u64> = {
            let pending = self.pending.lock().unwrap();
            pending.keys().copied().collect()
        };
        for id in ids {
            if let Some(entry) = self.pending.lock().unwrap().remove(&id) {
                let _ = entry.responder.send(Err(PipelineError::PoolDisposed));
            }
        }
        self.overflow.lock().unwrap().clear();
        let mut workers = self.workers.lock().unwrap();
        for worker in workers.iter_mut() {
            worker.job_tx = None;
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn pick_idle_worker(workers: &[Worker]) -> Option<usize> {
    workers
        .iter()
        .enumerate()
        .find(|(_, w)| w.alive && !w.busy && !w.retiring && w.job_tx.is_some())
        .map(|(i, _)| i)
}

fn spawn_worker(index: usize, response_tx: mpsc::Sender<WorkerResponse>) -> Worker {
    let (job_tx, job_rx) = mpsc::channel::<WorkerJob>();
    let handle = std::thread::Builder::new()
        .name(format!("terra-worker-{index}"))
        .spawn(move || {
            for job in job_rx.iter() {
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    if job.poison {
                        panic!("terra-worker-{index} killed for test");
                    }
                    mesh::mesh(&job.chunk, job.lod)
                }));
                let crashed = outcome.is_err();
                let response = WorkerResponse {
                    request_id: job.request_id,
                    worker_index: index,
                    result: outcome.map_err(|_| ()),
                };
                if response_tx.send(response).is_err() || crashed {
                    break;
                }
            }
        })
        .expect("failed to spawn worker thread");

    Worker { job_tx: Some(job_tx), handle: Some(handle), busy: false, alive: true, retiring: false }
}
