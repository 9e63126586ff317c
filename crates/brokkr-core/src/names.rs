//! Plugin name validation and layer-label mapping
//!
//! A plugin name is the user-facing identifier; the layer label is the
//! platform-wide unique identifier (`plugin_<name>@<module>`) the loading
//! layer uses to locate a plugin home. The label prefix is reserved, so a
//! plugin name may never start with it.

use crate::error::{Error, Result};
use camino::Utf8Path;
use regex::Regex;
use std::fs;
use std::sync::OnceLock;

/// Prefix of every generated layer label. Reserved: plugin names must not
/// start with it.
pub const LABEL_PREFIX: &str = "plugin_";

/// Names a plugin can never take (special directories in the base).
pub const RESERVED_NAMES: [&str; 2] = ["base", "config"];

/// Allowed plugin name characters.
pub const PLUGIN_NAME_REGEX: &str = "^[A-Za-z0-9_-]+$";

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(PLUGIN_NAME_REGEX).expect("hardcoded regex"))
}

/// Validate a plugin name.
pub fn validate_plugin_name(name: &str) -> Result<()> {
    if name.starts_with(LABEL_PREFIX) {
        return Err(Error::bad_plugin_name(format!(
            "a plugin name can't start with '{LABEL_PREFIX}'"
        )));
    }
    if name.starts_with("__") {
        return Err(Error::bad_plugin_name("a plugin name can't start with '__'"));
    }
    if RESERVED_NAMES.contains(&name) {
        return Err(Error::bad_plugin_name(format!(
            "a plugin name can't be '{name}'"
        )));
    }
    if !name_regex().is_match(name) {
        return Err(Error::bad_plugin_name(format!(
            "a plugin name must follow {PLUGIN_NAME_REGEX}"
        )));
    }
    Ok(())
}

/// Derive the layer label for a plugin name.
///
/// One-way under a varying module: the inverse below only round-trips when
/// `module_lowercase` is held constant.
pub fn plugin_name_to_label(name: &str, module_lowercase: &str) -> String {
    format!("{LABEL_PREFIX}{name}@{module_lowercase}")
}

/// Extract the plugin name back out of a layer label.
pub fn label_to_plugin_name(label: &str, module_lowercase: &str) -> Result<String> {
    let suffix = format!("@{module_lowercase}");
    if !label.starts_with(LABEL_PREFIX) || !label.ends_with(&suffix) {
        return Err(Error::bad_plugin_label(label));
    }
    let name = &label[LABEL_PREFIX.len()..label.len() - suffix.len()];
    if name.is_empty() {
        return Err(Error::bad_plugin_label(label));
    }
    Ok(name.to_string())
}

/// Read a `.layerapi2_label` file and extract the plugin name from it.
pub fn label_file_to_plugin_name(path: &Utf8Path, module_lowercase: &str) -> Result<String> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::bad_plugin(format!("can't read label file {path}: {e}")))?;
    label_to_plugin_name(content.trim(), module_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["plugin1", "my-plugin", "My_Plugin2", "a"] {
            assert!(validate_plugin_name(name).is_ok(), "rejected: {name}");
        }
    }

    #[test]
    fn test_reserved_prefix_rejected() {
        let err = validate_plugin_name("plugin_foo").unwrap_err();
        assert!(matches!(err, Error::BadPluginName { .. }));
        assert!(err.to_string().contains("plugin_"));
    }

    #[test]
    fn test_double_underscore_rejected() {
        assert!(validate_plugin_name("__foo").is_err());
    }

    #[test]
    fn test_reserved_literals_rejected() {
        assert!(validate_plugin_name("base").is_err());
        assert!(validate_plugin_name("config").is_err());
    }

    #[test]
    fn test_bad_characters_rejected() {
        for name in ["foo bar", "foo.bar", "foo/bar", "", "é"] {
            assert!(validate_plugin_name(name).is_err(), "accepted: {name}");
        }
    }

    #[test]
    fn test_label_round_trip() {
        for name in ["plugin1", "my-plugin", "A_b-2"] {
            let label = plugin_name_to_label(name, "generic");
            assert_eq!(label_to_plugin_name(&label, "generic").unwrap(), name);
        }
    }

    #[test]
    fn test_label_wrong_prefix() {
        assert!(label_to_plugin_name("layer_foo@generic", "generic").is_err());
    }

    #[test]
    fn test_label_wrong_module() {
        assert!(label_to_plugin_name("plugin_foo@other", "generic").is_err());
    }

    #[test]
    fn test_label_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(".layerapi2_label");
        std::fs::write(&path, "plugin_demo@generic\n").unwrap();
        let utf8 = camino::Utf8Path::from_path(&path).unwrap();
        assert_eq!(label_file_to_plugin_name(utf8, "generic").unwrap(), "demo");
    }

    #[test]
    fn test_label_file_missing() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(".layerapi2_label");
        let utf8 = camino::Utf8Path::from_path(&path).unwrap();
        assert!(label_file_to_plugin_name(utf8, "generic").is_err());
    }
}
