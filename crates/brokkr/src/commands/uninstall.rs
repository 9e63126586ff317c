//! `brokkr uninstall` - remove an installed plugin

use crate::cli::UninstallArgs;
use crate::commands::{manager, refuse_inside_plugin_env, require_initialized};
use crate::output;
use anyhow::{bail, Result};
use brokkr_core::Error;
use camino::Utf8Path;

pub fn run(args: UninstallArgs, plugins_base_dir: Option<&Utf8Path>) -> Result<()> {
    let (module_env, manager) = manager(plugins_base_dir);
    refuse_inside_plugin_env(&module_env)?;
    require_initialized(&manager)?;

    let pb = output::spinner(&format!("Uninstalling plugin {}...", args.name));
    let outcome = manager.uninstall_plugin(&args.name);
    pb.finish_and_clear();

    match outcome {
        Ok(Some(())) => {
            output::success(&format!("plugin {} uninstalled", args.name));
            Ok(())
        }
        Ok(None) => {
            output::warning("plugin management lock is busy => nothing done");
            std::process::exit(3);
        }
        Err(Error::NotInstalledPlugin { name }) => {
            output::error(&format!("plugin {name} is not installed"));
            std::process::exit(1);
        }
        Err(e) => {
            output::error(&format!("can't uninstall plugin {}", args.name));
            bail!("{e}");
        }
    }
}
