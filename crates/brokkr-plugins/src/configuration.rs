//! Per-plugin configuration pipeline
//!
//! [`Configuration`] ties the core pieces together for one plugin: candidate
//! paths (plugin-local, runtime override, system override) are merged into a
//! raw document, validated against the expanded schema, finalized
//! (hostname resolution + hook), and the `app_*`/`extra_daemon_*` sections
//! are turned into [`CommandSpec`]s.
//!
//! Loading is driven by an explicit state machine: `Unloaded` until the
//! first access, then `Loaded` or `Failed`. A failed load stays failed
//! until [`Configuration::reload`]; repeated accessor calls re-report the
//! same diagnostic instead of silently retrying.

use crate::command::CommandSpec;
use crate::metadata::CONFIG_FILE;
use brokkr_core::document::{candidate_paths, RawDocument};
use brokkr_core::error::ValidationIssue;
use brokkr_core::postprocess::{finalize, ConfigHook, NoopHook, Resolver, SystemResolver};
use brokkr_core::schema::INTERNAL_MARKER;
use brokkr_core::validator::validate;
use brokkr_core::{plugin_config_schema, Error, ModuleEnv, Result, ValidatedDocument};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

enum LoadState {
    Unloaded,
    Loaded(Box<LoadedConfiguration>),
    Failed {
        message: String,
        issues: Vec<ValidationIssue>,
    },
}

struct LoadedConfiguration {
    doc: ValidatedDocument,
    commands: Vec<CommandSpec>,
}

/// The validated configuration of one plugin.
pub struct Configuration {
    plugin_name: String,
    plugin_home: Utf8PathBuf,
    module_env: ModuleEnv,
    config_filepath: Utf8PathBuf,
    resolver: Box<dyn Resolver>,
    hook: Box<dyn ConfigHook>,
    state: LoadState,
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("plugin_name", &self.plugin_name)
            .field("plugin_home", &self.plugin_home)
            .field("module_env", &self.module_env)
            .field("config_filepath", &self.config_filepath)
            .finish_non_exhaustive()
    }
}

impl Configuration {
    /// Create a configuration rooted at `<plugin_home>/config.ini`.
    ///
    /// Fails immediately when the plugin's own configuration file is
    /// missing; override files are optional.
    pub fn new(
        plugin_name: &str,
        plugin_home: &Utf8Path,
        module_env: &ModuleEnv,
    ) -> Result<Self> {
        let config_filepath = plugin_home.join(CONFIG_FILE);
        if !config_filepath.is_file() {
            return Err(Error::bad_plugin(format!(
                "configuration file: {config_filepath} is missing"
            )));
        }
        Ok(Self {
            plugin_name: plugin_name.to_string(),
            plugin_home: plugin_home.to_path_buf(),
            module_env: module_env.clone(),
            config_filepath,
            resolver: Box::new(SystemResolver::new()),
            hook: Box::new(NoopHook),
            state: LoadState::Unloaded,
        })
    }

    /// Swap the hostname resolver (tests, embedders).
    pub fn with_resolver(mut self, resolver: Box<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Install a final-document shaping hook.
    pub fn with_hook(mut self, hook: Box<dyn ConfigHook>) -> Self {
        self.hook = hook;
        self
    }

    /// Candidate configuration paths, lowest precedence first.
    pub fn paths(&self) -> Vec<Utf8PathBuf> {
        candidate_paths(&self.config_filepath, &self.module_env, &self.plugin_name)
    }

    /// The plugin's own configuration file path.
    pub fn config_filepath(&self) -> &Utf8Path {
        &self.config_filepath
    }

    /// Load and validate, if not already done. Idempotent; a failed load
    /// keeps failing with the same diagnostic until [`Self::reload`].
    pub fn ensure_loaded(&mut self) -> Result<()> {
        match &self.state {
            LoadState::Loaded(_) => return Ok(()),
            LoadState::Failed { message, issues } => {
                return Err(Error::bad_plugin_with_issues(
                    message.clone(),
                    issues.clone(),
                ))
            }
            LoadState::Unloaded => {}
        }
        match self.run_pipeline() {
            Ok(loaded) => {
                self.state = LoadState::Loaded(Box::new(loaded));
                Ok(())
            }
            Err(err) => {
                let (message, issues) = match &err {
                    Error::BadPlugin { message, issues } => {
                        (message.clone(), issues.clone())
                    }
                    other => (other.to_string(), Vec::new()),
                };
                self.state = LoadState::Failed {
                    message: message.clone(),
                    issues: issues.clone(),
                };
                Err(Error::bad_plugin_with_issues(message, issues))
            }
        }
    }

    /// Alias kept for call sites that want "validate everything now".
    pub fn load_full(&mut self) -> Result<()> {
        self.ensure_loaded()
    }

    /// Throw away any loaded state and validate again.
    pub fn reload(&mut self) -> Result<()> {
        self.state = LoadState::Unloaded;
        self.ensure_loaded()
    }

    fn run_pipeline(&self) -> Result<LoadedConfiguration> {
        let paths = self.paths();
        debug!("loading configuration for {} from {:?}", self.plugin_name, paths);
        let raw = RawDocument::from_paths(&paths)?;
        let schema = plugin_config_schema();
        let expanded = schema.expand(&raw.section_names());
        let doc = match validate(&raw, &expanded, &self.module_env) {
            Ok(doc) => doc,
            Err(issues) => return Err(self.narrow_culprit(&paths, issues)),
        };
        let doc = finalize(doc, self.resolver.as_ref(), self.hook.as_ref())?;
        let commands = CommandSpec::extract_all(&doc, &self.plugin_name, &self.plugin_home)?;
        Ok(LoadedConfiguration { doc, commands })
    }

    /// On a merged-document failure with several source files, narrow the
    /// diagnostic: re-validate the plugin-local file alone (full schema),
    /// then each override file alone (public schema — override files may
    /// not redefine internal fields). The first file failing on its own is
    /// the culprit; failing that, the merged result is reported against
    /// all candidates.
    fn narrow_culprit(
        &self,
        paths: &[Utf8PathBuf],
        merged_issues: Vec<ValidationIssue>,
    ) -> Error {
        let existing: Vec<&Utf8PathBuf> = paths.iter().filter(|p| p.is_file()).collect();
        if existing.len() > 1 {
            let schema = plugin_config_schema();
            let first_alone = [self.config_filepath.clone()];
            if let Ok(raw) = RawDocument::from_paths(&first_alone) {
                let expanded = schema.expand(&raw.section_names());
                if let Err(issues) = validate(&raw, &expanded, &self.module_env) {
                    return Error::bad_plugin_with_issues(
                        format!("invalid configuration file: {}", self.config_filepath),
                        issues,
                    );
                }
            }
            for path in existing.iter().filter(|p| ***p != self.config_filepath) {
                let alone = [(*path).clone()];
                let Ok(raw) = RawDocument::from_paths(&alone) else {
                    continue;
                };
                let public = schema.expand_public(&raw.section_names());
                if let Err(issues) = validate(&raw, &public, &self.module_env) {
                    return Error::bad_plugin_with_issues(
                        format!("invalid configuration, please fix: {path}"),
                        issues,
                    );
                }
            }
            let candidates: Vec<&str> = existing.iter().map(|p| p.as_str()).collect();
            return Error::bad_plugin_with_issues(
                format!("invalid configuration, please fix: {}", candidates.join(" or ")),
                merged_issues,
            );
        }
        Error::bad_plugin_with_issues(
            format!("invalid configuration file: {}", self.config_filepath),
            merged_issues,
        )
    }

    fn loaded(&mut self) -> Result<&LoadedConfiguration> {
        self.ensure_loaded()?;
        match &self.state {
            LoadState::Loaded(loaded) => Ok(loaded),
            _ => unreachable!("ensure_loaded returned Ok"),
        }
    }

    /// The final validated + post-processed document.
    pub fn document(&mut self) -> Result<&ValidatedDocument> {
        Ok(&self.loaded()?.doc)
    }

    /// Every app and extra daemon, in section order.
    pub fn commands(&mut self) -> Result<&[CommandSpec]> {
        Ok(&self.loaded()?.commands)
    }

    /// Apps only.
    pub fn apps(&mut self) -> Result<Vec<&CommandSpec>> {
        Ok(self
            .loaded()?
            .commands
            .iter()
            .filter(|c| c.kind() == crate::command::CommandKind::App)
            .collect())
    }

    /// Extra daemons only.
    pub fn extra_daemons(&mut self) -> Result<Vec<&CommandSpec>> {
        Ok(self
            .loaded()?
            .commands
            .iter()
            .filter(|c| c.kind() == crate::command::CommandKind::ExtraDaemon)
            .collect())
    }

    fn general_str(&mut self, key: &str) -> Result<String> {
        let doc = self.document()?;
        doc.get("general", key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::internal(format!("validated document lacks general.{key}")))
    }

    /// Declared version (`general._version`).
    pub fn version(&mut self) -> Result<String> {
        self.general_str("_version")
    }

    pub fn summary(&mut self) -> Result<String> {
        self.general_str("_summary")
    }

    pub fn license(&mut self) -> Result<String> {
        self.general_str("_license")
    }

    pub fn maintainer(&mut self) -> Result<String> {
        self.general_str("_maintainer")
    }

    /// Packager is the maintainer, by another name.
    pub fn packager(&mut self) -> Result<String> {
        self.maintainer()
    }

    pub fn vendor(&mut self) -> Result<String> {
        self.general_str("_vendor")
    }

    pub fn url(&mut self) -> Result<String> {
        self.general_str("_url")
    }

    pub fn add_plugin_dir_to_python_path(&mut self) -> Result<bool> {
        let doc = self.document()?;
        Ok(doc
            .get("general", "_add_plugin_dir_to_python_path")
            .and_then(|v| v.as_bool())
            .unwrap_or(true))
    }

    /// Flatten the document into environment-variable pairs.
    ///
    /// Naming: `{MODULE}_PLUGIN_{NAME}_{SECTION}_{KEY}`, uppercased with
    /// `-` mapped to `_`. With `ignore_internal`, fields starting with the
    /// internal marker are skipped (the export surface).
    pub fn env_pairs(&mut self, ignore_internal: bool) -> Result<Vec<(String, String)>> {
        let module = self.module_env.module.clone();
        let plugin = self.plugin_name.clone();
        let doc = self.document()?;
        let mut pairs = Vec::new();
        for section in doc.sections() {
            for (key, value) in section.iter() {
                if ignore_internal && key.starts_with(INTERNAL_MARKER) {
                    continue;
                }
                let name = format!(
                    "{}_PLUGIN_{}_{}_{}",
                    module,
                    plugin.to_uppercase(),
                    section.name.to_uppercase().replace('-', "_"),
                    key.to_uppercase().replace('-', "_"),
                );
                pairs.push((name, value.to_env_string()));
            }
        }
        Ok(pairs)
    }

    /// `custom`-section pairs under the current-plugin naming
    /// (`{MODULE}_CURRENT_PLUGIN_CUSTOM_{KEY}`), exported only for the
    /// plugin whose environment is being entered.
    pub fn current_custom_env_pairs(&mut self) -> Result<Vec<(String, String)>> {
        let module = self.module_env.module.clone();
        let doc = self.document()?;
        let Some(section) = doc.section("custom") else {
            return Ok(Vec::new());
        };
        let mut pairs = Vec::new();
        for (key, value) in section.iter() {
            if key.starts_with(INTERNAL_MARKER) {
                continue;
            }
            pairs.push((
                format!(
                    "{module}_CURRENT_PLUGIN_CUSTOM_{}",
                    key.to_uppercase().replace('-', "_")
                ),
                value.to_env_string(),
            ));
        }
        Ok(pairs)
    }
}
