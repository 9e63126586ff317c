//! Plugin home sidecar files
//!
//! Every plugin home carries a handful of dotfiles describing the installed
//! package: its label, format version, metadata and file manifest. This
//! module names them and owns their (de)serialization.

use brokkr_core::{Error, Result};
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::fs;

/// Single-line label file, the authoritative source of the plugin name.
pub const LABEL_FILE: &str = ".layerapi2_label";
/// Dotted format version, >= 3 numeric components.
pub const FORMAT_VERSION_FILE: &str = ".plugin_format_version";
/// Installed-package metadata.
pub const METADATA_FILE: &str = ".metadata.json";
/// JSON array of file paths belonging to the package.
pub const FILES_FILE: &str = ".files.json";
/// Newline-separated dependency labels.
pub const DEPENDENCIES_FILE: &str = ".layerapi2_dependencies";
/// gitignore-syntax patterns excluded from release packages.
pub const RELEASEIGNORE_FILE: &str = ".releaseignore";
/// Environment cache sidecar.
pub const CONFIGURATION_CACHE_FILE: &str = ".configuration_cache";
/// The plugin's own configuration.
pub const CONFIG_FILE: &str = "config.ini";

/// Sentinel for non-numeric format version components.
pub const FORMAT_VERSION_SENTINEL: u32 = 9999;

/// Installed-package metadata sidecar (`.metadata.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub version: String,
    #[serde(default = "default_release")]
    pub release: String,
    #[serde(default)]
    pub build_host: String,
    #[serde(default)]
    pub build_date: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub packager: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub url: String,
}

fn default_release() -> String {
    "1".to_string()
}

impl PluginMetadata {
    pub fn read(path: &Utf8Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn write(&self, path: &Utf8Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Read the file manifest sidecar (`.files.json`).
pub fn read_files_manifest(path: &Utf8Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Write the file manifest sidecar.
pub fn write_files_manifest(path: &Utf8Path, files: &[String]) -> Result<()> {
    let content = serde_json::to_string_pretty(files)?;
    fs::write(path, content)?;
    Ok(())
}

/// Parse a `.plugin_format_version` file.
///
/// At least three dot-separated components are required; components that
/// are not plain integers coerce to [`FORMAT_VERSION_SENTINEL`] instead of
/// failing (a pre-release suffix must not break installs).
pub fn parse_format_version(content: &str, origin: &Utf8Path) -> Result<[u32; 3]> {
    let parts: Vec<&str> = content.trim().split('.').collect();
    if parts.len() < 3 {
        return Err(Error::bad_plugin(format!(
            "bad format version in {origin}: expected at least 3 components"
        )));
    }
    let mut out = [0u32; 3];
    for (slot, part) in out.iter_mut().zip(parts.iter()) {
        *slot = part.parse().unwrap_or(FORMAT_VERSION_SENTINEL);
    }
    Ok(out)
}

/// Read and parse the format version sidecar of a plugin home.
pub fn read_format_version(home: &Utf8Path) -> Result<[u32; 3]> {
    let path = home.join(FORMAT_VERSION_FILE);
    if !path.is_file() {
        return Err(Error::bad_plugin(format!("{path} is missing")));
    }
    let content = fs::read_to_string(&path)?;
    parse_format_version(&content, &path)
}

/// One parsed dependency declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyDecl {
    pub label: String,
    /// Leading `-` in the declarations file: the dependency may be absent.
    pub optional: bool,
}

/// Parse a `.layerapi2_dependencies` file body.
pub fn parse_dependencies(content: &str) -> Vec<DependencyDecl> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| match line.strip_prefix('-') {
            Some(rest) => DependencyDecl {
                label: rest.trim().to_string(),
                optional: true,
            },
            None => DependencyDecl {
                label: line.to_string(),
                optional: false,
            },
        })
        .collect()
}
