//! `brokkr info` - plugin details, from a name or an artifact

use crate::cli::InfoArgs;
use crate::commands::manager;
use crate::output;
use anyhow::Result;
use brokkr_plugins::PluginArchive;
use camino::{Utf8Path, Utf8PathBuf};
use serde_json::json;

pub fn run(args: InfoArgs, plugins_base_dir: Option<&Utf8Path>) -> Result<()> {
    // a path-looking argument (or an existing file) is treated as an
    // artifact, anything else as an installed plugin name
    let as_path = Utf8PathBuf::from(&args.name_or_filepath);
    let is_file_mode = args.name_or_filepath.contains('/')
        || args.name_or_filepath.contains('.')
        || as_path.is_file();

    let details = if is_file_mode {
        let archive = PluginArchive::load(&as_path)?;
        let metadata = archive.metadata();
        json!({
            "name": archive.name(),
            "version": archive.version(),
            "release": archive.release(),
            "size": metadata.size,
            "build_host": metadata.build_host,
            "build_date": metadata.build_date,
            "summary": metadata.summary,
            "license": metadata.license,
            "packager": metadata.packager,
            "vendor": metadata.vendor,
            "url": metadata.url,
            "files": archive.files(),
        })
    } else {
        let (_module_env, manager) = manager(plugins_base_dir);
        let mut plugin = manager.get_plugin(&args.name_or_filepath)?;
        let version = plugin.version()?;
        let release = plugin.release()?;
        let build_host = plugin.build_host()?;
        let build_date = plugin.build_date()?;
        let size = plugin.size()?;
        let files = plugin.files()?;
        let configuration = plugin.configuration()?;
        json!({
            "name": args.name_or_filepath,
            "version": version,
            "release": release,
            "size": size,
            "build_host": build_host,
            "build_date": build_date,
            "summary": configuration.summary()?,
            "license": configuration.license()?,
            "packager": configuration.packager()?,
            "vendor": configuration.vendor()?,
            "url": configuration.url()?,
            "files": files,
        })
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&details)?);
    } else {
        for key in [
            "name",
            "version",
            "release",
            "summary",
            "license",
            "packager",
            "vendor",
            "url",
            "build_host",
            "build_date",
        ] {
            if let Some(value) = details.get(key).and_then(|v| v.as_str()) {
                output::kv(key, value);
            }
        }
        if let Some(size) = details.get("size").and_then(|v| v.as_u64()) {
            output::kv("size", &size.to_string());
        }
        if let Some(files) = details.get("files").and_then(|v| v.as_array()) {
            output::kv("files", &files.len().to_string());
        }
    }
    Ok(())
}
