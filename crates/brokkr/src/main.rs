//! Brokkr CLI - plugin management for the modular runtime platform
//!
//! This is the main entry point for the brokkr command-line interface.

mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let base = cli.plugins_base_dir.as_deref();
    match cli.command {
        Commands::List(args) => commands::list::run(args, base),
        Commands::Install(args) => commands::install::run(args, base),
        Commands::Uninstall(args) => commands::uninstall::run(args, base),
        Commands::Develop(args) => commands::develop::run(args, base),
        Commands::Init(args) => commands::init::run(args, base),
        Commands::InitBase(args) => commands::init_base::run(args, base),
        Commands::Info(args) => commands::info::run(args, base),
        Commands::Env(args) => commands::env::run(args, base),
        Commands::ValidateName(args) => commands::validate_name::run(args),
        Commands::Make(args) => commands::make::run(args, base),
    }
}

/// Initialize tracing with appropriate verbosity
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}
