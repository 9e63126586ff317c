//! CLI subcommand implementations

pub mod develop;
pub mod env;
pub mod info;
pub mod init;
pub mod init_base;
pub mod install;
pub mod list;
pub mod make;
pub mod uninstall;
pub mod validate_name;

use anyhow::{bail, Result};
use brokkr_core::ModuleEnv;
use brokkr_plugins::PluginsManager;
use camino::Utf8Path;

/// Build a manager over the requested (or default) plugins base.
pub fn manager(plugins_base_dir: Option<&Utf8Path>) -> (ModuleEnv, PluginsManager) {
    let module_env = ModuleEnv::from_env();
    let manager = PluginsManager::new(&module_env, plugins_base_dir);
    (module_env, manager)
}

/// Mutating operations must not run from inside a plugin environment:
/// the scoped overlay would leak into the freshly validated plugin.
pub fn refuse_inside_plugin_env(module_env: &ModuleEnv) -> Result<()> {
    if module_env.inside_a_plugin_env() {
        bail!("don't use install/uninstall/develop inside a plugin environment");
    }
    Ok(())
}

/// Mutating operations also need an initialized base.
pub fn require_initialized(manager: &PluginsManager) -> Result<()> {
    if !manager.initialized() {
        bail!(
            "the plugins base ({}) is not initialized => start the module once first",
            manager.plugins_base_dir()
        );
    }
    Ok(())
}
