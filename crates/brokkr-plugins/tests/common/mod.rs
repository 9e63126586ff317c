//! Shared fixtures for brokkr-plugins integration tests

#![allow(dead_code)]

use brokkr_core::ModuleEnv;
use brokkr_plugins::{Plugin, PluginsManager};
use camino::Utf8PathBuf;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

pub const MINIMAL_CONFIG: &str = "\
[general]
_version = 1.2.3
_summary = a test plugin
_license = MIT
_url = https://example.org
_maintainer = team@example.org
_vendor = example
";

/// One temporary plugins base + runtime home.
pub struct TestBase {
    temp: TempDir,
    pub base_dir: Utf8PathBuf,
    pub module_env: ModuleEnv,
}

impl TestBase {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("create temp dir");
        let base_dir =
            Utf8PathBuf::from_path_buf(temp.path().join("plugins_base")).unwrap();
        let runtime =
            Utf8PathBuf::from_path_buf(temp.path().join("runtime")).unwrap();
        fs::create_dir_all(&runtime).unwrap();
        let module_env = ModuleEnv::new("GENERIC", runtime);
        Self {
            temp,
            base_dir,
            module_env,
        }
    }

    /// A manager over this base with a short lock wait.
    pub fn manager(&self) -> PluginsManager {
        PluginsManager::new(&self.module_env, Some(&self.base_dir))
            .with_lock_timeout(Duration::from_secs(2))
    }

    /// An initialized manager.
    pub fn initialized_manager(&self) -> PluginsManager {
        let manager = self.manager();
        manager
            .initialize_plugins_base()
            .expect("initialize plugins base")
            .expect("lock acquired");
        manager
    }

    /// Create a plugin home outside the base (a "working copy").
    pub fn plugin_home(&self, name: &str, config_extra: &str) -> Utf8PathBuf {
        let home =
            Utf8PathBuf::from_path_buf(self.temp.path().join("src").join(name)).unwrap();
        fs::create_dir_all(&home).unwrap();
        fs::write(
            home.join("config.ini"),
            format!("{MINIMAL_CONFIG}{config_extra}"),
        )
        .unwrap();
        fs::write(home.join(".plugin_format_version"), "2.0.0\n").unwrap();
        fs::write(
            home.join(".layerapi2_label"),
            format!("plugin_{name}@generic\n"),
        )
        .unwrap();
        home
    }

    /// Build a `.plugin` artifact for a fresh plugin home.
    pub fn build_artifact(&self, name: &str, config_extra: &str) -> Utf8PathBuf {
        let home = self.plugin_home(name, config_extra);
        let mut plugin = Plugin::new(&self.base_dir, name, &home, &self.module_env);
        let out = Utf8PathBuf::from_path_buf(self.temp.path().join("out")).unwrap();
        plugin.build(&out).expect("build plugin artifact")
    }

    /// Names of the entries currently under the base, sorted.
    pub fn base_entries(&self) -> Vec<String> {
        let mut entries: Vec<String> = fs::read_dir(self.base_dir.as_std_path())
            .map(|it| {
                it.filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();
        entries.sort();
        entries
    }
}
