//! `brokkr validate-name` - plugin name rules check

use crate::cli::ValidateNameArgs;
use crate::output;
use anyhow::Result;
use brokkr_core::names::validate_plugin_name;

pub fn run(args: ValidateNameArgs) -> Result<()> {
    match validate_plugin_name(&args.name) {
        Ok(()) => {
            output::success(&format!("{} is a valid plugin name", args.name));
            Ok(())
        }
        Err(e) => {
            output::error(&e.to_string());
            std::process::exit(1);
        }
    }
}
