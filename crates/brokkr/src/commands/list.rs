//! `brokkr list` - installed plugins listing

use crate::cli::ListArgs;
use crate::commands::manager;
use anyhow::Result;
use camino::Utf8Path;
use serde::Serialize;
use tabled::{Table, Tabled};
use tracing::warn;

#[derive(Tabled)]
struct PluginRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Release")]
    release: String,
    #[tabled(rename = "Home")]
    home: String,
}

#[derive(Serialize)]
struct PluginEntry {
    name: String,
    version: String,
    release: String,
    home: String,
}

pub fn run(args: ListArgs, plugins_base_dir: Option<&Utf8Path>) -> Result<()> {
    let (_module_env, manager) = manager(plugins_base_dir);
    let mut entries = Vec::new();
    for mut plugin in manager.plugins()? {
        let (version, release) = match (plugin.version(), plugin.release()) {
            (Ok(version), Ok(release)) => (version, release),
            (Err(e), _) | (_, Err(e)) => {
                warn!(
                    "bad plugin ({}, {}): {e}",
                    plugin.name(),
                    plugin.home()
                );
                ("error".to_string(), "error".to_string())
            }
        };
        entries.push(PluginEntry {
            name: plugin.name().to_string(),
            version,
            release,
            home: plugin.home().to_string(),
        });
    }

    if args.raw {
        for e in &entries {
            println!("{}~~~{}~~~{}~~~{}", e.name, e.version, e.release, e.home);
        }
    } else if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        let rows: Vec<PluginRow> = entries
            .iter()
            .map(|e| PluginRow {
                name: e.name.clone(),
                version: e.version.clone(),
                release: e.release.clone(),
                home: e.home.clone(),
            })
            .collect();
        println!("Installed plugins ({})", rows.len());
        println!("{}", Table::new(rows));
    }
    Ok(())
}
