//! `brokkr init` - scaffold a new plugin working directory

use crate::cli::InitArgs;
use crate::commands::manager;
use crate::output;
use anyhow::{bail, Result};
use brokkr_core::names::validate_plugin_name;
use brokkr_plugins::archive::PLUGIN_FORMAT_VERSION;
use brokkr_plugins::plugin::write_label_file;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

const CONFIG_TEMPLATE: &str = "\
[general]
_version = 0.0.1
_summary = {name} plugin
_license = proprietary
_url = https://example.org/{name}
_maintainer = someone@example.org
_vendor = example

# [app_main]
# _cmd_and_args = {plugin_dir}/bin/run
# numprocesses = 1

[custom]
";

pub fn run(args: InitArgs, plugins_base_dir: Option<&Utf8Path>) -> Result<()> {
    let (module_env, _manager) = manager(plugins_base_dir);
    validate_plugin_name(&args.name)?;

    let directory: Utf8PathBuf = args
        .directory
        .unwrap_or_else(|| Utf8PathBuf::from(&args.name));
    if directory.exists() {
        output::error(&format!("{directory} already exists"));
        std::process::exit(1);
    }
    fs::create_dir_all(&directory)?;

    fs::write(
        directory.join("config.ini"),
        CONFIG_TEMPLATE.replace("{name}", &args.name),
    )?;
    fs::write(
        directory.join(".plugin_format_version"),
        format!("{PLUGIN_FORMAT_VERSION}\n"),
    )?;
    if let Err(e) = write_label_file(&directory, &args.name, &module_env) {
        bail!("can't write label file: {e}");
    }
    fs::write(directory.join(".releaseignore"), "*.log\n*.pyc\n")?;

    output::success(&format!("plugin {} scaffolded in {directory}", args.name));
    Ok(())
}
