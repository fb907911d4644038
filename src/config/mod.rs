//! Scheduler tunables (spec.md §6.4), hot-reloadable from a RON file.

pub mod loader;

use serde::{Deserialize, Serialize};

fn default_load_radius() -> i32 {
    8
}
fn default_unload_radius() -> i32 {
    12
}
fn default_load_budget_per_frame() -> usize {
    2
}
fn default_worker_count() -> usize {
    4
}
fn default_worker_timeout_ms() -> u64 {
    5000
}
fn default_lod_blend_chunks() -> f64 {
    5.0
}

/// Runtime-adjustable knobs for the chunk scheduler and worker pool.
/// Fields round-trip through RON the same way the teacher's graphics
/// settings do, with a `#[serde(default = ...)]` per field so a partial
/// tunables file still loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tunables {
    #[serde(default = "default_load_radius")]
    pub load_radius: i32,
    #[serde(default = "default_unload_radius")]
    pub unload_radius: i32,
    #[serde(default = "default_load_budget_per_frame")]
    pub load_budget_per_frame: usize,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_worker_timeout_ms")]
    pub worker_timeout_ms: u64,
    #[serde(default = "default_lod_blend_chunks")]
    pub lod_blend_chunks: f64,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            load_radius: default_load_radius(),
            unload_radius: default_unload_radius(),
            load_budget_per_frame: default_load_budget_per_frame(),
            worker_count: default_worker_count(),
            worker_timeout_ms: default_worker_timeout_ms(),
            lod_blend_chunks: default_lod_blend_chunks(),
        }
    }
}

impl Tunables {
    /// True when `unload_radius > load_radius`, the invariant the
    /// hysteresis band depends on.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.unload_radius > self.load_radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_table() {
        let t = Tunables::default();
        assert_eq!(t.load_radius, 8);
        assert_eq!(t.unload_radius, 12);
        assert_eq!(t.load_budget_per_frame, 2);
        assert_eq!(t.worker_count, 4);
        assert!(t.is_valid());
    }

    #[test]
    fn partial_ron_fills_defaults() {
        let parsed: Tunables = ron::from_str("(load_radius: 3)").unwrap();
        assert_eq!(parsed.load_radius, 3);
        assert_eq!(parsed.unload_radius, default_unload_radius());
    }
}
