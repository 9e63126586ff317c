//! Error types for brokkr-core

use thiserror::Error;

/// Result type alias using brokkr-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// One validation diagnostic: which section/key failed and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub section: String,
    /// Empty when the issue concerns the section itself (missing, unknown).
    pub key: String,
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.key.is_empty() {
            write!(f, "[section: {}] {}", self.section, self.message)
        } else {
            write!(
                f,
                "[section: {}][key: {}] {}",
                self.section, self.key, self.message
            )
        }
    }
}

/// Render a complete, stable (sorted) multi-line diagnostic.
pub fn issues_to_string(issues: &[ValidationIssue]) -> String {
    let mut lines: Vec<String> = issues.iter().map(|i| i.to_string()).collect();
    lines.sort();
    lines.join("\n")
}

/// Core error types for Brokkr
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid plugin name
    #[error("bad plugin name: {message}")]
    BadPluginName { message: String },

    /// Invalid layer label (not a plugin label for this module)
    #[error("bad plugin label: {label}")]
    BadPluginLabel { label: String },

    /// Structural or schema validation failure for a plugin
    #[error("{}", render_bad_plugin(.message, .issues))]
    BadPlugin {
        message: String,
        issues: Vec<ValidationIssue>,
    },

    /// Malformed .plugin package artifact
    #[error("bad plugin file: {message}")]
    BadPluginFile { message: String },

    /// A present configuration file cannot be parsed at all
    #[error("can't read configuration file {path}: {message}")]
    ConfigUnreadable { path: String, message: String },

    /// Lookup miss: the plugin is not installed
    #[error("plugin: {name} not installed")]
    NotInstalledPlugin { name: String },

    /// Install precondition failure: the name is already taken
    #[error("plugin: {name} is already installed")]
    AlreadyInstalledPlugin { name: String },

    /// Wraps an underlying failure during install
    #[error("can't install plugin {name}: {message}")]
    CantInstallPlugin { name: String, message: String },

    /// Wraps an underlying failure during uninstall
    #[error("can't uninstall plugin {name}: {message}")]
    CantUninstallPlugin { name: String, message: String },

    /// Wraps an underlying failure during package build
    #[error("can't build plugin {name}: {message}")]
    CantBuildPlugin { name: String, message: String },

    /// Precondition failure on base-scoped mutating operations
    #[error("plugins base not initialized: {path}")]
    PluginsBaseNotInitialized { path: String },

    /// Incompatible option combination
    #[error("invalid option combination: {message}")]
    InvalidOptions { message: String },

    /// Unexpected internal failure (e.g. a configuration hook blew up)
    #[error("internal error: {message}")]
    Internal { message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

fn render_bad_plugin(message: &str, issues: &[ValidationIssue]) -> String {
    if issues.is_empty() {
        format!("bad plugin: {message}")
    } else {
        format!("bad plugin: {message}\n{}", issues_to_string(issues))
    }
}

impl Error {
    /// Create a bad plugin name error
    pub fn bad_plugin_name(message: impl Into<String>) -> Self {
        Self::BadPluginName {
            message: message.into(),
        }
    }

    /// Create a bad plugin label error
    pub fn bad_plugin_label(label: impl Into<String>) -> Self {
        Self::BadPluginLabel {
            label: label.into(),
        }
    }

    /// Create a bad plugin error without validation details
    pub fn bad_plugin(message: impl Into<String>) -> Self {
        Self::BadPlugin {
            message: message.into(),
            issues: Vec::new(),
        }
    }

    /// Create a bad plugin error carrying the full diagnostic
    pub fn bad_plugin_with_issues(
        message: impl Into<String>,
        issues: Vec<ValidationIssue>,
    ) -> Self {
        Self::BadPlugin {
            message: message.into(),
            issues,
        }
    }

    /// Create a bad plugin file error
    pub fn bad_plugin_file(message: impl Into<String>) -> Self {
        Self::BadPluginFile {
            message: message.into(),
        }
    }

    /// Create a config unreadable error
    pub fn config_unreadable(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigUnreadable {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a not installed error
    pub fn not_installed(name: impl Into<String>) -> Self {
        Self::NotInstalledPlugin { name: name.into() }
    }

    /// Create an already installed error
    pub fn already_installed(name: impl Into<String>) -> Self {
        Self::AlreadyInstalledPlugin { name: name.into() }
    }

    /// Create a can't install error
    pub fn cant_install(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CantInstallPlugin {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a can't uninstall error
    pub fn cant_uninstall(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CantUninstallPlugin {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a can't build error
    pub fn cant_build(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CantBuildPlugin {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a base-not-initialized error
    pub fn base_not_initialized(path: impl Into<String>) -> Self {
        Self::PluginsBaseNotInitialized { path: path.into() }
    }

    /// Create an invalid options error
    pub fn invalid_options(message: impl Into<String>) -> Self {
        Self::InvalidOptions {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
