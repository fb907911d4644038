//! Loads [`Tunables`] from a RON file, with optional hot-reload via the
//! shared `ron::RonWatcher` utility.

use super::Tunables;
use crate::ron::{setup_ron_watcher, RonWatcher};
use std::path::Path;

/// Read and deserialize `path` as a [`Tunables`] RON document, falling
/// back to defaults (logged at `warn`) if the file is missing or
/// malformed.
#[must_use]
pub fn load_tunables(path: &str) -> Tunables {
    match std::fs::read_to_string(path) {
        Ok(contents) => match ron::from_str(&contents) {
            Ok(tunables) => tunables,
            Err(err) => {
                tracing::warn!(%err, path, "failed to parse tunables RON, using defaults");
                Tunables::default()
            }
        },
        Err(err) => {
            tracing::warn!(%err, path, "failed to read tunables file, using defaults");
            Tunables::default()
        }
    }
}

/// Watch the directory containing `path` for changes and return both
/// the initially loaded tunables and the watcher handle. Callers poll
/// `watcher.changed` and call [`load_tunables`] again when it flips.
pub fn load_tunables_with_watch(path: &str) -> (Tunables, Option<RonWatcher>) {
    let tunables = load_tunables(path);
    let dir = Path::new(path).parent().unwrap_or_else(|| Path::new("."));
    let watcher = match setup_ron_watcher(dir.to_string_lossy().as_ref()) {
        Ok(w) => Some(w),
        Err(err) => {
            tracing::warn!(%err, "failed to start tunables file watcher");
            None
        }
    };
    (tunables, watcher)
}

/// Reload `path` if `watcher` reports a change since the last call,
/// clearing its `changed` flag on the way out.
#[must_use]
pub fn reload_if_changed(path: &str, watcher: &RonWatcher) -> Option<Tunables> {
    let mut changed = watcher.changed.lock().unwrap();
    if !*changed {
        return None;
    }
    *changed = false;
    drop(changed);
    Some(load_tunables(path))
}
