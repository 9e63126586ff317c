//! `brokkr env` - print the materialized environment of a plugin

use crate::cli::EnvArgs;
use crate::commands::manager;
use anyhow::Result;
use brokkr_plugins::{materialize, MaterializeOptions};
use camino::Utf8Path;

pub fn run(args: EnvArgs, plugins_base_dir: Option<&Utf8Path>) -> Result<()> {
    let (_module_env, manager) = manager(plugins_base_dir);
    let mut plugin = manager.get_plugin(&args.name)?;
    let opts = MaterializeOptions {
        use_cache: !args.ignore_cache,
        ..MaterializeOptions::default()
    };
    let map = materialize(&mut plugin, &opts)?;
    for (key, value) in map.iter() {
        if args.export {
            println!("export {key}=\"{}\"", value.replace('"', "\\\""));
        } else {
            println!("{key}={value}");
        }
    }
    Ok(())
}
