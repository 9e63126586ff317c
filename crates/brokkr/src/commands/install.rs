//! `brokkr install` - install a .plugin artifact

use crate::cli::InstallArgs;
use crate::commands::{manager, refuse_inside_plugin_env, require_initialized};
use crate::output;
use anyhow::{bail, Result};
use brokkr_plugins::PluginArchive;
use camino::Utf8Path;

pub fn run(args: InstallArgs, plugins_base_dir: Option<&Utf8Path>) -> Result<()> {
    let (module_env, manager) = manager(plugins_base_dir);
    refuse_inside_plugin_env(&module_env)?;
    require_initialized(&manager)?;

    // identify the artifact before taking the lock
    let archive = match PluginArchive::load(&args.plugin_filepath) {
        Ok(archive) => archive,
        Err(e) => {
            output::error(&format!("bad plugin file: {e}"));
            std::process::exit(1);
        }
    };
    let name = args
        .new_name
        .clone()
        .unwrap_or_else(|| archive.name().to_string());

    let pb = output::spinner(&format!(
        "Installing plugin {name} ({}-{})...",
        archive.version(),
        archive.release()
    ));
    let outcome = manager.install_plugin(&args.plugin_filepath, args.new_name.as_deref());
    pb.finish_and_clear();

    match outcome {
        Ok(Some(())) => {
            output::success(&format!("plugin {name} installed"));
            Ok(())
        }
        Ok(None) => {
            output::warning("plugin management lock is busy => nothing done");
            std::process::exit(3);
        }
        Err(e) => {
            output::error(&format!("can't install plugin {name}"));
            bail!("{e}");
        }
    }
}
