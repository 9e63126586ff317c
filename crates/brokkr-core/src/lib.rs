//! # brokkr-core
//!
//! Core library for the Brokkr plugin manager providing:
//! - Ordered, layered INI configuration documents
//! - Typed schema model with wildcard section expansion
//! - Document validation (coercion, defaulting, constraint checks)
//! - Post-validation finalization (hostname resolution, hooks)
//! - Plugin name and layer-label rules
//! - The module-level environment context

pub mod document;
pub mod error;
pub mod module;
pub mod names;
pub mod postprocess;
pub mod schema;
pub mod validator;

pub use document::RawDocument;
pub use error::{Error, Result, ValidationIssue};
pub use module::ModuleEnv;
pub use schema::{plugin_config_schema, ConfigSchema};
pub use validator::{ConfigValue, TriState, ValidatedDocument};
