//! `brokkr make` - build a .plugin artifact from a plugin directory

use crate::cli::MakeArgs;
use crate::commands::manager;
use crate::output;
use anyhow::{bail, Result};
use brokkr_plugins::Plugin;
use camino::{Utf8Path, Utf8PathBuf};

pub fn run(args: MakeArgs, plugins_base_dir: Option<&Utf8Path>) -> Result<()> {
    let (module_env, manager) = manager(plugins_base_dir);
    let home: Utf8PathBuf = match args.plugin_home {
        Some(home) => home,
        None => Utf8PathBuf::from_path_buf(std::env::current_dir()?)
            .map_err(|p| anyhow::anyhow!("current directory is not UTF-8: {}", p.display()))?,
    };
    let home = home.canonicalize_utf8().unwrap_or(home);

    let mut plugin =
        Plugin::from_directory(manager.plugins_base_dir(), &home, &module_env)?;
    let output_dir = args.output_dir.unwrap_or_else(|| home.clone());

    let pb = output::spinner(&format!("Building plugin {}...", plugin.name()));
    let result = plugin.build(&output_dir);
    pb.finish_and_clear();

    match result {
        Ok(artifact) => {
            output::success(&format!("built {artifact}"));
            Ok(())
        }
        Err(e) => {
            output::error(&format!("can't build plugin {}", plugin.name()));
            bail!("{e}");
        }
    }
}
