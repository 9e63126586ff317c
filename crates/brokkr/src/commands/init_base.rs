//! `brokkr init-base` - (re)create an empty plugins base

use crate::cli::InitBaseArgs;
use crate::commands::{manager, refuse_inside_plugin_env};
use crate::output;
use anyhow::Result;
use camino::Utf8Path;

pub fn run(args: InitBaseArgs, plugins_base_dir: Option<&Utf8Path>) -> Result<()> {
    let (module_env, manager) = manager(plugins_base_dir);
    refuse_inside_plugin_env(&module_env)?;

    if manager.initialized() && !args.force {
        output::error(&format!(
            "{} is already initialized (use --force to wipe it)",
            manager.plugins_base_dir()
        ));
        std::process::exit(1);
    }

    match manager.initialize_plugins_base()? {
        Some(()) => {
            output::success(&format!(
                "plugins base initialized at {}",
                manager.plugins_base_dir()
            ));
            Ok(())
        }
        None => {
            output::warning("plugin management lock is busy => nothing done");
            std::process::exit(3);
        }
    }
}
