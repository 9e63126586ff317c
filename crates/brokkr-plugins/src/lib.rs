//! Plugin management for Brokkr
//!
//! This crate handles:
//! - Plugin records and their metadata sidecars
//! - Per-plugin configuration loading and validation
//! - App / extra-daemon command specifications
//! - Environment materialization with content-hash caching
//! - Scoped process-environment overlays
//! - Install/uninstall/develop lifecycle under a cross-process lock
//! - `.plugin` artifact build and introspection

pub mod archive;
pub mod command;
pub mod configuration;
pub mod env_scope;
pub mod environment;
pub mod manager;
pub mod metadata;
pub mod plugin;

pub use archive::{build_plugin, PluginArchive};
pub use command::{CommandKind, CommandSpec};
pub use configuration::Configuration;
pub use env_scope::PluginEnvContext;
pub use environment::{materialize, EnvironmentMap, MaterializeOptions};
pub use manager::{LifecycleHooks, NoopLifecycleHooks, PluginsManager};
pub use metadata::PluginMetadata;
pub use plugin::Plugin;
