//! Plugin lifecycle management
//!
//! [`PluginsManager`] owns a plugins base directory and serializes every
//! mutating operation (initialize/install/uninstall/develop) behind one
//! coarse cross-process advisory lock. Lock acquisition waits a bounded
//! time; on timeout the operation is abandoned with a warning — callers
//! get `Ok(None)`, never a hang and never a crash.
//!
//! Install and develop are transactional from the caller's point of view:
//! if post-extraction validation or the post-install hook fails, the
//! half-installed plugin is rolled back before the error propagates.

use crate::archive::PluginArchive;
use crate::plugin::{write_label_file, Plugin};
use brokkr_core::names::validate_plugin_name;
use brokkr_core::{Error, ModuleEnv, Result};
use camino::{Utf8Path, Utf8PathBuf};
use fs4::fs_std::FileExt;
use std::fs::{self, OpenOptions};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Reserved directory under the base (package-database metadata).
pub const BASE_METADATA_DIR: &str = "base";

/// Pre/post lifecycle hooks, injected as a strategy object.
pub trait LifecycleHooks {
    /// Runs after a successful install/develop, before commit. A failure
    /// rolls the installation back.
    fn post_install(&self, _plugin: &mut Plugin) -> Result<()> {
        Ok(())
    }

    /// Runs before uninstall. A failure is remembered and surfaced after
    /// the removal, but never blocks it.
    fn pre_uninstall(&self, _plugin: &mut Plugin) -> Result<()> {
        Ok(())
    }
}

/// Default hooks: nothing to do.
pub struct NoopLifecycleHooks;

impl LifecycleHooks for NoopLifecycleHooks {}

/// Manager for a plugins base directory.
pub struct PluginsManager {
    plugins_base_dir: Utf8PathBuf,
    module_env: ModuleEnv,
    hooks: Box<dyn LifecycleHooks>,
    lock_timeout: Duration,
}

impl PluginsManager {
    /// Create a manager. With no explicit base directory the module
    /// default applies (`MFMODULE_PLUGINS_BASE_DIR` or
    /// `{runtime_home}/var/plugins`).
    pub fn new(module_env: &ModuleEnv, plugins_base_dir: Option<&Utf8Path>) -> Self {
        let plugins_base_dir = plugins_base_dir
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|| module_env.default_plugins_base_dir());
        Self {
            plugins_base_dir,
            module_env: module_env.clone(),
            hooks: Box::new(NoopLifecycleHooks),
            lock_timeout: Duration::from_secs(10),
        }
    }

    /// Install custom lifecycle hooks.
    pub fn with_hooks(mut self, hooks: Box<dyn LifecycleHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Shorten/lengthen the lock wait (tests).
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn plugins_base_dir(&self) -> &Utf8Path {
        &self.plugins_base_dir
    }

    pub fn module_env(&self) -> &ModuleEnv {
        &self.module_env
    }

    /// Is the base ready for plugin operations?
    pub fn initialized(&self) -> bool {
        self.plugins_base_dir.join(BASE_METADATA_DIR).is_dir()
    }

    fn check_initialized(&self) -> Result<()> {
        if !self.initialized() {
            return Err(Error::base_not_initialized(self.plugins_base_dir.as_str()));
        }
        Ok(())
    }

    /// Run `f` under the cross-process lock. `Ok(None)` means the lock
    /// could not be acquired within the timeout (already logged); a
    /// successful run additionally touches the conf-monitor marker.
    fn with_lock<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<Option<T>> {
        let lock_path = self.module_env.plugins_lock_path();
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        let deadline = Instant::now() + self.lock_timeout;
        loop {
            if file.try_lock_exclusive()? {
                break;
            }
            if Instant::now() >= deadline {
                warn!(
                    "can't acquire plugin management lock ({lock_path}) \
                     => another install/uninstall running?"
                );
                return Ok(None);
            }
            std::thread::sleep(Duration::from_secs(1));
        }
        let result = f();
        let _ = fs4::fs_std::FileExt::unlock(&file);
        match result {
            Ok(value) => {
                self.touch_conf_monitor();
                Ok(Some(value))
            }
            Err(e) => Err(e),
        }
    }

    /// Signal external watchers that the plugin set changed.
    fn touch_conf_monitor(&self) {
        let path = self.module_env.conf_monitor_path();
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Err(e) = fs::write(&path, b"") {
            warn!("can't touch conf monitor file {path}: {e}");
        }
    }

    /// (Re)create an empty plugins base.
    pub fn initialize_plugins_base(&self) -> Result<Option<()>> {
        self.with_lock(|| {
            let _ = fs::remove_dir_all(&self.plugins_base_dir);
            fs::create_dir_all(&self.plugins_base_dir)?;
            fs::create_dir_all(self.plugins_base_dir.join(BASE_METADATA_DIR))?;
            Ok(())
        })
    }

    /// Construct a plugin from an arbitrary home directory.
    pub fn make_plugin(&self, home: &Utf8Path) -> Result<Plugin> {
        self.check_initialized()?;
        Plugin::from_directory(&self.plugins_base_dir, home, &self.module_env)
    }

    /// Look up an installed plugin by name.
    pub fn get_plugin(&self, name: &str) -> Result<Plugin> {
        self.check_initialized()?;
        let home = self.plugins_base_dir.join(name);
        if !home.as_std_path().exists() {
            return Err(Error::not_installed(name));
        }
        let plugin = self.make_plugin(&home)?;
        if plugin.name() != name {
            return Err(Error::bad_plugin(format!(
                "label/directory mismatch under {home}: expected {name}, found {}",
                plugin.name()
            )));
        }
        Ok(plugin)
    }

    /// Every plugin under the base, sorted by name. Entries whose label or
    /// layout is broken are skipped with a warning, not fatal.
    pub fn plugins(&self) -> Result<Vec<Plugin>> {
        self.check_initialized()?;
        let mut plugins = Vec::new();
        for entry in fs::read_dir(self.plugins_base_dir.as_std_path())? {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().to_string();
            if file_name == BASE_METADATA_DIR {
                continue;
            }
            let home = self.plugins_base_dir.join(&file_name);
            match self.make_plugin(&home) {
                Ok(plugin) => plugins.push(plugin),
                Err(e) => {
                    warn!("found bad plugin in {home} => ignoring it (details: {e})");
                }
            }
        }
        plugins.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(plugins)
    }

    /// Eagerly validate every plugin.
    pub fn load_full(&self) -> Result<Vec<Plugin>> {
        let mut plugins = self.plugins()?;
        for plugin in &mut plugins {
            plugin.load_full()?;
        }
        Ok(plugins)
    }

    fn before_install_develop(&self, name: &str) -> Result<()> {
        match self.get_plugin(name) {
            Err(Error::NotInstalledPlugin { .. }) => Ok(()),
            Ok(_) => Err(Error::already_installed(name)),
            Err(other) => Err(other),
        }
    }

    /// Post-extraction validation + hook, rolling back on any failure.
    fn after_install_develop(&self, name: &str) -> Result<()> {
        let mut plugin = self
            .get_plugin(name)
            .map_err(|_| Error::cant_install(name, "plugin not resolvable after install"))?;
        let check = plugin
            .load_full()
            .and_then(|()| self.hooks.post_install(&mut plugin));
        if let Err(e) = check {
            debug!("install of {name} failed post-checks => rolling back");
            if let Err(rollback_err) = self.remove_plugin_entry(name) {
                warn!("rollback of {name} failed too: {rollback_err}");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Install a plugin from a `.plugin` artifact.
    pub fn install_plugin(
        &self,
        plugin_filepath: &Utf8Path,
        new_name: Option<&str>,
    ) -> Result<Option<()>> {
        self.check_initialized()?;
        self.with_lock(|| {
            // fail before any filesystem mutation
            let archive = PluginArchive::load(plugin_filepath)?;
            let name = new_name.unwrap_or_else(|| archive.name()).to_string();
            validate_plugin_name(&name)?;
            self.before_install_develop(&name)?;
            let home = self.plugins_base_dir.join(&name);
            archive
                .extract_to(&home)
                .map_err(|e| Error::cant_install(&name, e.to_string()))?;
            if new_name.is_some() {
                write_label_file(&home, &name, &self.module_env)?;
            }
            self.after_install_develop(&name)
        })
    }

    /// Install a plugin in development mode (symlink to a working copy).
    pub fn develop_plugin(&self, plugin_home: &Utf8Path) -> Result<Option<()>> {
        self.check_initialized()?;
        self.with_lock(|| {
            let plugin = self.make_plugin(plugin_home)?;
            let name = plugin.name().to_string();
            self.before_install_develop(&name)?;
            let entry = self.plugins_base_dir.join(&name);
            let _ = fs::remove_dir_all(&entry);
            std::os::unix::fs::symlink(plugin_home.as_std_path(), entry.as_std_path())
                .map_err(|e| Error::cant_install(&name, e.to_string()))?;
            self.after_install_develop(&name)
        })
    }

    /// Uninstall a plugin by name.
    pub fn uninstall_plugin(&self, name: &str) -> Result<Option<()>> {
        self.check_initialized()?;
        self.with_lock(|| {
            let mut plugin = self.get_plugin(name)?;
            // remembered, never blocking
            let pre_uninstall_failure = self.hooks.pre_uninstall(&mut plugin).err();
            self.remove_plugin_entry(name)?;
            match self.get_plugin(name) {
                Err(Error::NotInstalledPlugin { .. }) => {}
                _ => {
                    return Err(Error::cant_uninstall(
                        name,
                        "plugin still resolvable after removal",
                    ))
                }
            }
            if self.plugins_base_dir.join(name).as_std_path().exists() {
                return Err(Error::cant_uninstall(name, "directory still here"));
            }
            if let Some(e) = pre_uninstall_failure {
                return Err(Error::cant_uninstall(
                    name,
                    format!(
                        "the plugin is uninstalled but the preuninstall hook failed: {e}"
                    ),
                ));
            }
            Ok(())
        })
    }

    /// Remove a base entry, symlink or directory.
    fn remove_plugin_entry(&self, name: &str) -> Result<()> {
        let entry = self.plugins_base_dir.join(name);
        let std_entry = entry.as_std_path();
        let is_symlink = std_entry
            .symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if is_symlink {
            fs::remove_file(std_entry)
                .map_err(|e| Error::cant_uninstall(name, e.to_string()))?;
        } else if std_entry.exists() {
            fs::remove_dir_all(std_entry)
                .map_err(|e| Error::cant_uninstall(name, e.to_string()))?;
        }
        Ok(())
    }
}
