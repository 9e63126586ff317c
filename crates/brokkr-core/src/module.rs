//! Module-level environment: identity, homes and global defaults
//!
//! Everything the platform injects through environment variables is read
//! once into a [`ModuleEnv`] value and passed explicitly from there on, so
//! library code never reaches for `std::env` behind the caller's back and
//! tests can construct arbitrary module contexts.

use camino::Utf8PathBuf;
use std::env;

/// Environment variable carrying the module name (e.g. `GENERIC`).
pub const MODULE_VAR: &str = "MFMODULE";
/// Environment variable carrying the lowercase module name.
pub const MODULE_LOWERCASE_VAR: &str = "MFMODULE_LOWERCASE";
/// Environment variable carrying the runtime home directory.
pub const RUNTIME_HOME_VAR: &str = "MFMODULE_RUNTIME_HOME";
/// Environment variable overriding the plugins base directory.
pub const PLUGINS_BASE_DIR_VAR: &str = "MFMODULE_PLUGINS_BASE_DIR";

/// The module context a manager/plugin operates in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEnv {
    /// Module name, uppercase (env-var prefix)
    pub module: String,
    /// Module name, lowercase (label suffix)
    pub module_lowercase: String,
    /// Runtime home (logs, tmp, runtime config overrides)
    pub runtime_home: Utf8PathBuf,
    /// Global default for splitting stdout/stderr log streams
    pub log_split_stdout_stderr: bool,
    /// Global default for splitting logs across workers
    pub log_split_multiple_workers: bool,
}

impl ModuleEnv {
    /// Read the module context from the process environment.
    ///
    /// Missing variables fall back to the `GENERIC` module rooted at
    /// `/tmp`, which is what a bare development shell gets.
    pub fn from_env() -> Self {
        let module = env::var(MODULE_VAR).unwrap_or_else(|_| "GENERIC".to_string());
        let module_lowercase =
            env::var(MODULE_LOWERCASE_VAR).unwrap_or_else(|_| module.to_lowercase());
        let runtime_home = Utf8PathBuf::from(
            env::var(RUNTIME_HOME_VAR).unwrap_or_else(|_| "/tmp".to_string()),
        );
        let log_split_stdout_stderr = env::var(format!(
            "{module}_LOG_TRY_TO_SPLIT_STDOUT_STDERR"
        ))
        .map(|v| v == "1")
        .unwrap_or(false);
        let log_split_multiple_workers = env::var(format!(
            "{module}_LOG_TRY_TO_SPLIT_MULTIPLE_WORKERS"
        ))
        .map(|v| v == "1")
        .unwrap_or(false);
        Self {
            module,
            module_lowercase,
            runtime_home,
            log_split_stdout_stderr,
            log_split_multiple_workers,
        }
    }

    /// Build a context by hand (tests, embedders).
    pub fn new(module: impl Into<String>, runtime_home: impl Into<Utf8PathBuf>) -> Self {
        let module = module.into();
        let module_lowercase = module.to_lowercase();
        Self {
            module,
            module_lowercase,
            runtime_home: runtime_home.into(),
            log_split_stdout_stderr: false,
            log_split_multiple_workers: false,
        }
    }

    /// Default plugins base directory for this module.
    ///
    /// `MFMODULE_PLUGINS_BASE_DIR` wins when set (hotswap scenarios),
    /// else `{runtime_home}/var/plugins`.
    pub fn default_plugins_base_dir(&self) -> Utf8PathBuf {
        match env::var(PLUGINS_BASE_DIR_VAR) {
            Ok(dir) if !dir.is_empty() => Utf8PathBuf::from(dir),
            _ => self.runtime_home.join("var").join("plugins"),
        }
    }

    /// Runtime-scoped configuration override for a plugin.
    pub fn runtime_override_path(&self, plugin_name: &str) -> Utf8PathBuf {
        self.runtime_home
            .join("config")
            .join("plugins")
            .join(format!("{plugin_name}.ini"))
    }

    /// System-wide configuration override for a plugin.
    pub fn system_override_path(&self, plugin_name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from(format!(
            "/etc/{}.config.d/plugins/{plugin_name}.ini",
            self.module_lowercase
        ))
    }

    /// Marker file touched after every successful mutating operation.
    pub fn conf_monitor_path(&self) -> Utf8PathBuf {
        self.runtime_home.join("var").join("conf_monitor_control")
    }

    /// Lock file guarding install/uninstall/develop/initialize.
    pub fn plugins_lock_path(&self) -> Utf8PathBuf {
        self.runtime_home.join("tmp").join("plugins_management.lock")
    }

    /// Name of the `…_CURRENT_PLUGIN_NAME` reserved key.
    pub fn current_plugin_name_var(&self) -> String {
        format!("{}_CURRENT_PLUGIN_NAME", self.module)
    }

    /// True when the calling process already runs inside a plugin env.
    pub fn inside_a_plugin_env(&self) -> bool {
        env::var(self.current_plugin_name_var()).is_ok()
    }
}
