//! Semantic error kinds for the chunk pipeline (spec.md §7).
//!
//! Most of these are handled internally by the scheduler and never
//! surface to a caller; they exist as named variants so logging and
//! tests can distinguish failure modes. Only decode APIs and the
//! worker pool's request future actually return/reject with these.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// A slab has no remaining geometry or instance capacity.
    SlabFull,
    /// A meshing request exceeded its deadline.
    WorkerTimeout { cx: i32, cy: i32, lod: u8 },
    /// A worker thread failed unrecoverably while processing a request.
    WorkerCrashed,
    /// A request was submitted after the pool was disposed.
    PoolDisposed,
    /// The backing KV store returned an error.
    CacheFailure(String),
    /// Malformed serialised `ChunkData` on the external wire.
    DecodeError(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::SlabFull => write!(f, "slab full"),
            PipelineError::WorkerTimeout { cx, cy, lod } => {
                write!(f, "Timed Out for ({cx},{cy}) LOD{lod}")
            }
            PipelineError::WorkerCrashed => write!(f, "worker crashed"),
            PipelineError::PoolDisposed => write!(f, "pool disposed"),
            PipelineError::CacheFailure(msg) => write!(f, "cache failure: {msg}"),
            PipelineError::DecodeError(msg) => write!(f, "decode error: {msg}"),
        }
    }
}

impl std::error::Error for PipelineError {}
