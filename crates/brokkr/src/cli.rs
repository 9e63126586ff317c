//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Brokkr - plugin management for the modular runtime platform
#[derive(Parser, Debug)]
#[command(name = "brokkr")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Alternate plugins base directory (default: MFMODULE_PLUGINS_BASE_DIR
    /// or the module standard location)
    #[arg(long, global = true)]
    pub plugins_base_dir: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List installed plugins
    List(ListArgs),

    /// Install a plugin from a .plugin file
    Install(InstallArgs),

    /// Uninstall a plugin
    Uninstall(UninstallArgs),

    /// Install a plugin in development mode (symlink)
    Develop(DevelopArgs),

    /// Scaffold a new plugin directory
    Init(InitArgs),

    /// (Re)create an empty plugins base directory
    InitBase(InitBaseArgs),

    /// Show detailed information about a plugin
    Info(InfoArgs),

    /// Print the materialized environment of a plugin
    Env(EnvArgs),

    /// Check whether a plugin name is acceptable
    ValidateName(ValidateNameArgs),

    /// Build a .plugin file from a plugin directory
    Make(MakeArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Machine-friendly one-line-per-plugin output
    #[arg(long, conflicts_with = "json")]
    pub raw: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Path to the .plugin file
    pub plugin_filepath: Utf8PathBuf,

    /// Install under a different plugin name
    #[arg(long)]
    pub new_name: Option<String>,
}

#[derive(Args, Debug)]
pub struct UninstallArgs {
    /// Plugin name
    pub name: String,
}

#[derive(Args, Debug)]
pub struct DevelopArgs {
    /// Path to the plugin working directory
    pub plugin_home: Utf8PathBuf,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// New plugin name
    pub name: String,

    /// Directory to create the plugin in (default: the plugin name)
    #[arg(long)]
    pub directory: Option<Utf8PathBuf>,
}

#[derive(Args, Debug)]
pub struct InitBaseArgs {
    /// Wipe an already-initialized base too
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Plugin name, or path to a .plugin file
    pub name_or_filepath: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct EnvArgs {
    /// Plugin name
    pub name: String,

    /// Bypass the environment cache
    #[arg(long)]
    pub ignore_cache: bool,

    /// Emit `export KEY="VALUE"` lines instead of KEY=VALUE
    #[arg(long)]
    pub export: bool,
}

#[derive(Args, Debug)]
pub struct ValidateNameArgs {
    /// Candidate plugin name
    pub name: String,
}

#[derive(Args, Debug)]
pub struct MakeArgs {
    /// Plugin directory to package (default: current directory)
    pub plugin_home: Option<Utf8PathBuf>,

    /// Where to put the artifact (default: the plugin directory)
    #[arg(long)]
    pub output_dir: Option<Utf8PathBuf>,
}
