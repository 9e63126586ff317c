//! `brokkr develop` - dev-link a working copy into the plugins base

use crate::cli::DevelopArgs;
use crate::commands::{manager, refuse_inside_plugin_env, require_initialized};
use crate::output;
use anyhow::{bail, Result};
use camino::Utf8Path;

pub fn run(args: DevelopArgs, plugins_base_dir: Option<&Utf8Path>) -> Result<()> {
    let (module_env, manager) = manager(plugins_base_dir);
    refuse_inside_plugin_env(&module_env)?;
    require_initialized(&manager)?;

    if !args.plugin_home.is_dir() {
        output::error(&format!("{} is not a directory", args.plugin_home));
        std::process::exit(1);
    }
    let home = args
        .plugin_home
        .canonicalize_utf8()
        .unwrap_or_else(|_| args.plugin_home.clone());

    let outcome = manager.develop_plugin(&home);
    match outcome {
        Ok(Some(())) => {
            output::success(&format!("plugin dev-linked from {home}"));
            Ok(())
        }
        Ok(None) => {
            output::warning("plugin management lock is busy => nothing done");
            std::process::exit(3);
        }
        Err(e) => {
            output::error("can't dev-link plugin");
            bail!("{e}");
        }
    }
}
