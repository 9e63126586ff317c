//! Scoped process-environment overlay
//!
//! [`PluginEnvContext`] overlays a set of environment variables for the
//! lifetime of the guard and restores the previous environment on drop —
//! including on panic. Restoration is clear-then-restore: variables set by
//! inner code during the scope do not leak out either.
//!
//! Only sound under the crate's single-threaded execution model; nothing
//! here synchronizes with other threads mutating the environment.

use std::collections::HashMap;
use std::env;

/// RAII guard for a scoped environment overlay.
#[must_use = "the overlay is reverted when the guard is dropped"]
pub struct PluginEnvContext {
    snapshot: HashMap<String, String>,
}

impl PluginEnvContext {
    /// Snapshot the current environment, then apply the overlay.
    pub fn enter<I, K, V>(overlay: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let snapshot: HashMap<String, String> = env::vars().collect();
        for (key, value) in overlay {
            env::set_var(key.as_ref(), value.as_ref());
        }
        Self { snapshot }
    }
}

impl Drop for PluginEnvContext {
    fn drop(&mut self) {
        let current: Vec<String> = env::vars().map(|(k, _)| k).collect();
        for key in current {
            env::remove_var(&key);
        }
        for (key, value) in &self.snapshot {
            env::set_var(key, value);
        }
    }
}
