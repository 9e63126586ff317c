//! Environment materialization
//!
//! Turns a plugin's validated configuration (plus the environments of its
//! dependency plugins) into the flat, ordered map of environment variables
//! a supervised process runs with. Optionally cached on disk, keyed by a
//! content hash over every contributing configuration source, so unchanged
//! plugins skip the whole validation pipeline at launch time.

use crate::metadata::{parse_dependencies, CONFIGURATION_CACHE_FILE, DEPENDENCIES_FILE};
use crate::plugin::Plugin;
use brokkr_core::names::label_to_plugin_name;
use brokkr_core::{Error, Result};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use tracing::{debug, warn};

/// Ordered environment-variable map with unique keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentMap {
    entries: Vec<(String, String)>,
}

impl EnvironmentMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key, overriding any earlier value in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Overlay another map: its keys win.
    pub fn merge_from(&mut self, other: &EnvironmentMap) {
        for (key, value) in &other.entries {
            self.set(key.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Marker key suffix flagging a cache-served map.
pub const CACHE_MARKER_SUFFIX: &str = "_PLUGIN_ENV_CACHE";

/// Materialization options. The defaults produce the "full" shape the
/// cache stores.
#[derive(Debug, Clone, Copy)]
pub struct MaterializeOptions {
    pub add_current_env_keys: bool,
    pub set_tmp_dir: bool,
    pub use_cache: bool,
}

impl Default for MaterializeOptions {
    fn default() -> Self {
        Self {
            add_current_env_keys: true,
            set_tmp_dir: true,
            use_cache: false,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct CacheRecord {
    hash: String,
    /// Static flag lifted out of the configuration so a cache hit never
    /// has to run the validation pipeline.
    add_to_search_path: bool,
    map: EnvironmentMap,
}

/// Materialize the environment of a plugin.
pub fn materialize(plugin: &mut Plugin, opts: &MaterializeOptions) -> Result<EnvironmentMap> {
    if opts.use_cache && (!opts.add_current_env_keys || !opts.set_tmp_dir) {
        return Err(Error::invalid_options(
            "use_cache requires add_current_env_keys and set_tmp_dir \
             (the cache only ever stores the full shape)",
        ));
    }

    let cache_path = plugin.home().join(CONFIGURATION_CACHE_FILE);
    let config_hash = if opts.use_cache {
        let hash = compute_config_hash(plugin)?;
        if let Some(record) = read_cache(&cache_path, &hash) {
            debug!("environment cache hit for {}", plugin.name());
            let mut map = record.map;
            map.set(
                format!("{}{CACHE_MARKER_SUFFIX}", plugin.module_env().module),
                "1",
            );
            ensure_tmp_dir(plugin, &mut map)?;
            apply_search_path_injection(plugin, record.add_to_search_path, &mut map);
            return Ok(map);
        }
        Some(hash)
    } else {
        None
    };

    let mut visited = HashSet::new();
    visited.insert(plugin.name().to_string());
    let mut map = build_map(plugin, opts, &mut visited)?;
    let add_to_search_path = plugin.configuration()?.add_plugin_dir_to_python_path()?;

    if let Some(hash) = config_hash {
        write_cache(&cache_path, &hash, add_to_search_path, &map)?;
    }

    apply_search_path_injection(plugin, add_to_search_path, &mut map);
    Ok(map)
}

fn build_map(
    plugin: &mut Plugin,
    opts: &MaterializeOptions,
    visited: &mut HashSet<String>,
) -> Result<EnvironmentMap> {
    let mut map = EnvironmentMap::new();

    // dependency environments first: lowest precedence
    for mut dep in dependency_plugins(plugin, visited) {
        let dep_opts = MaterializeOptions {
            add_current_env_keys: false,
            set_tmp_dir: false,
            use_cache: false,
        };
        match build_map(&mut dep, &dep_opts, visited) {
            Ok(dep_map) => map.merge_from(&dep_map),
            Err(e) => warn!(
                "can't materialize environment of dependency {}: {e}",
                dep.name()
            ),
        }
    }

    // own configuration, internal fields excluded from export
    for (key, value) in plugin.configuration()?.env_pairs(true)? {
        map.set(key, value);
    }

    if opts.add_current_env_keys {
        let module = plugin.module_env().module.clone();
        map.set(
            format!("{module}_CURRENT_PLUGIN_NAME"),
            plugin.name().to_string(),
        );
        map.set(
            format!("{module}_CURRENT_PLUGIN_DIR"),
            plugin.home().to_string(),
        );
        map.set(format!("{module}_CURRENT_PLUGIN_LABEL"), plugin.label());
        for (key, value) in plugin.configuration()?.current_custom_env_pairs()? {
            map.set(key, value);
        }
    }

    if opts.set_tmp_dir {
        ensure_tmp_dir(plugin, &mut map)?;
    }

    Ok(map)
}

/// Resolve the plugin's dependency declarations to installed plugins.
/// Unresolvable labels are skipped, not fatal; optional (`-`) declarations
/// are merged exactly like required ones when they resolve.
fn dependency_plugins(plugin: &Plugin, visited: &mut HashSet<String>) -> Vec<Plugin> {
    let deps_path = plugin.home().join(DEPENDENCIES_FILE);
    let Ok(content) = fs::read_to_string(&deps_path) else {
        return Vec::new();
    };
    let module_env = plugin.module_env().clone();
    let mut out = Vec::new();
    for decl in parse_dependencies(&content) {
        let name = match label_to_plugin_name(&decl.label, &module_env.module_lowercase) {
            Ok(name) => name,
            Err(_) => {
                debug!("skipping non-plugin dependency label: {}", decl.label);
                continue;
            }
        };
        if !visited.insert(name.clone()) {
            continue;
        }
        let home = plugin.plugins_base_dir().join(&name);
        if !home.as_std_path().exists() {
            debug!(
                "dependency {} of {} not installed => skipping",
                name,
                plugin.name()
            );
            continue;
        }
        out.push(Plugin::new(
            plugin.plugins_base_dir(),
            &name,
            &home,
            &module_env,
        ));
    }
    out
}

fn ensure_tmp_dir(plugin: &Plugin, map: &mut EnvironmentMap) -> Result<()> {
    let tmp_dir = plugin
        .module_env()
        .runtime_home
        .join("tmp")
        .join(plugin.name());
    fs::create_dir_all(&tmp_dir)?;
    map.set("TMPDIR", tmp_dir.to_string());
    Ok(())
}

/// Search-path injection is computed from the live process environment, so
/// it is deliberately applied after caching, never stored.
fn apply_search_path_injection(plugin: &Plugin, enabled: bool, map: &mut EnvironmentMap) {
    if !enabled {
        return;
    }
    let home = plugin.home().to_string();
    let current = std::env::var("PYTHONPATH").unwrap_or_default();
    let mut parts: Vec<&str> = vec![&home];
    parts.extend(current.split(':').filter(|p| !p.is_empty() && *p != home));
    map.set("PYTHONPATH", parts.join(":"));
}

/// Content hash over every configuration source contributing to the
/// materialized environment.
fn compute_config_hash(plugin: &mut Plugin) -> Result<String> {
    let mut hasher = Sha256::new();
    let deps_path = plugin.home().join(DEPENDENCIES_FILE);
    hash_file(&mut hasher, &deps_path);
    for path in plugin.configuration()?.paths() {
        hash_file(&mut hasher, &path);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn hash_file(hasher: &mut Sha256, path: &Utf8PathBuf) {
    hasher.update(path.as_str().as_bytes());
    hasher.update([0u8]);
    match fs::read(path) {
        Ok(content) => hasher.update(&content),
        Err(_) => hasher.update(b"<absent>"),
    }
    hasher.update([0u8]);
}

fn read_cache(path: &Utf8PathBuf, expected_hash: &str) -> Option<CacheRecord> {
    let content = fs::read_to_string(path).ok()?;
    let record: CacheRecord = serde_json::from_str(&content).ok()?;
    if record.hash == expected_hash {
        Some(record)
    } else {
        debug!("environment cache stale at {path}");
        None
    }
}

/// Persist atomically: write a temp sidecar, then rename over the
/// canonical path, so readers never observe a partial cache.
fn write_cache(
    path: &Utf8PathBuf,
    hash: &str,
    add_to_search_path: bool,
    map: &EnvironmentMap,
) -> Result<()> {
    let record = CacheRecord {
        hash: hash.to_string(),
        add_to_search_path,
        map: map.clone(),
    };
    let content = serde_json::to_string(&record)?;
    let dir = path
        .parent()
        .ok_or_else(|| Error::internal(format!("cache path {path} has no parent")))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.persist(path)
        .map_err(|e| Error::internal(format!("can't persist environment cache: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_overrides_in_place() {
        let mut map = EnvironmentMap::new();
        map.set("A", "1");
        map.set("B", "2");
        map.set("A", "3");
        assert_eq!(map.get("A"), Some("3"));
        assert_eq!(map.len(), 2);
        let keys: Vec<&str> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["A", "B"]);
    }

    #[test]
    fn test_merge_from_overlay_wins() {
        let mut base = EnvironmentMap::new();
        base.set("A", "base");
        base.set("B", "base");
        let mut overlay = EnvironmentMap::new();
        overlay.set("B", "overlay");
        overlay.set("C", "overlay");
        base.merge_from(&overlay);
        assert_eq!(base.get("A"), Some("base"));
        assert_eq!(base.get("B"), Some("overlay"));
        assert_eq!(base.get("C"), Some("overlay"));
    }

    #[test]
    fn test_use_cache_requires_full_shape() {
        let dir = tempfile::TempDir::new().unwrap();
        let base = camino::Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let env = brokkr_core::ModuleEnv::new("GENERIC", base.join("runtime"));
        let mut plugin = Plugin::new(&base, "p", &base.join("p"), &env);
        let opts = MaterializeOptions {
            add_current_env_keys: false,
            set_tmp_dir: true,
            use_cache: true,
        };
        let err = materialize(&mut plugin, &opts).unwrap_err();
        assert!(matches!(err, Error::InvalidOptions { .. }));
    }
}
