//! Plugin records
//!
//! A [`Plugin`] is cheap to construct: name and home only. The first
//! attribute access drives the `Unloaded -> Loaded | Failed` state machine,
//! which validates the configuration and reads the metadata sidecars.
//! Records only change through [`Plugin::reload`].

use crate::configuration::Configuration;
use crate::metadata::{
    read_files_manifest, read_format_version, PluginMetadata, FILES_FILE, LABEL_FILE,
    METADATA_FILE,
};
use brokkr_core::names::{label_file_to_plugin_name, plugin_name_to_label};
use brokkr_core::{Error, ModuleEnv, Result};
use camino::{Utf8Path, Utf8PathBuf};
use sha2::{Digest, Sha256};
use std::fs;

/// Version/release reported for dev-linked plugins.
pub const DEVLINK_VERSION: &str = "devlink";

enum LoadState {
    Unloaded,
    Loaded(Box<LoadedPlugin>),
    Failed(String),
}

struct LoadedPlugin {
    configuration: Configuration,
    format_version: [u32; 3],
    version: String,
    release: String,
    build_host: String,
    build_date: String,
    size: u64,
    files: Vec<String>,
}

/// One plugin, installed or not.
pub struct Plugin {
    name: String,
    home: Utf8PathBuf,
    plugins_base_dir: Utf8PathBuf,
    module_env: ModuleEnv,
    state: LoadState,
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("home", &self.home)
            .field("plugins_base_dir", &self.plugins_base_dir)
            .finish_non_exhaustive()
    }
}

impl Plugin {
    /// Construct from a known name and home. Lazy: nothing is read yet.
    pub fn new(
        plugins_base_dir: &Utf8Path,
        name: &str,
        home: &Utf8Path,
        module_env: &ModuleEnv,
    ) -> Self {
        Self {
            name: name.to_string(),
            home: home.to_path_buf(),
            plugins_base_dir: plugins_base_dir.to_path_buf(),
            module_env: module_env.clone(),
            state: LoadState::Unloaded,
        }
    }

    /// Construct from a plugin home, taking the name from its label file.
    pub fn from_directory(
        plugins_base_dir: &Utf8Path,
        home: &Utf8Path,
        module_env: &ModuleEnv,
    ) -> Result<Self> {
        let label_path = home.join(LABEL_FILE);
        let name = label_file_to_plugin_name(&label_path, &module_env.module_lowercase)?;
        Ok(Self::new(plugins_base_dir, &name, home, module_env))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn home(&self) -> &Utf8Path {
        &self.home
    }

    pub fn plugins_base_dir(&self) -> &Utf8Path {
        &self.plugins_base_dir
    }

    pub fn module_env(&self) -> &ModuleEnv {
        &self.module_env
    }

    /// The plugin's layer label.
    pub fn label(&self) -> String {
        plugin_name_to_label(&self.name, &self.module_env.module_lowercase)
    }

    /// Entry under the plugins base this plugin would occupy.
    pub fn base_entry(&self) -> Utf8PathBuf {
        self.plugins_base_dir.join(&self.name)
    }

    /// Installed as a symlink to a development directory?
    pub fn is_dev_linked(&self) -> bool {
        self.base_entry()
            .as_std_path()
            .symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    /// Resolvable under the plugins base?
    pub fn is_installed(&self) -> bool {
        self.base_entry().as_std_path().exists() || self.is_dev_linked()
    }

    /// Load sidecars and validate the configuration, if not already done.
    pub fn ensure_loaded(&mut self) -> Result<()> {
        match &self.state {
            LoadState::Loaded(_) => return Ok(()),
            LoadState::Failed(message) => return Err(Error::bad_plugin(message.clone())),
            LoadState::Unloaded => {}
        }
        match self.run_load() {
            Ok(loaded) => {
                self.state = LoadState::Loaded(Box::new(loaded));
                Ok(())
            }
            Err(err) => {
                self.state = LoadState::Failed(err.to_string());
                Err(err)
            }
        }
    }

    /// Force a fresh load.
    pub fn reload(&mut self) -> Result<()> {
        self.state = LoadState::Unloaded;
        self.ensure_loaded()
    }

    /// Validate the whole plugin, configuration included.
    pub fn load_full(&mut self) -> Result<()> {
        self.ensure_loaded()?;
        self.loaded_mut()?.configuration.load_full()
    }

    fn run_load(&self) -> Result<LoadedPlugin> {
        let format_version = read_format_version(&self.home)?;
        let mut configuration =
            Configuration::new(&self.name, &self.home, &self.module_env)?;
        let metadata_path = self.home.join(METADATA_FILE);
        let (version, release, build_host, build_date, size, files) =
            if self.is_dev_linked() {
                (
                    DEVLINK_VERSION.to_string(),
                    DEVLINK_VERSION.to_string(),
                    String::new(),
                    String::new(),
                    0,
                    Vec::new(),
                )
            } else if metadata_path.is_file() {
                let metadata = PluginMetadata::read(&metadata_path)?;
                let files_path = self.home.join(FILES_FILE);
                let files = if files_path.is_file() {
                    read_files_manifest(&files_path)?
                } else {
                    Vec::new()
                };
                (
                    metadata.version,
                    metadata.release,
                    metadata.build_host,
                    metadata.build_date,
                    metadata.size,
                    files,
                )
            } else {
                // not installed yet (e.g. during build): the declared
                // configuration version, release 1
                let version = configuration.version()?;
                (
                    version,
                    "1".to_string(),
                    String::new(),
                    String::new(),
                    0,
                    Vec::new(),
                )
            };
        Ok(LoadedPlugin {
            configuration,
            format_version,
            version,
            release,
            build_host,
            build_date,
            size,
            files,
        })
    }

    fn loaded(&mut self) -> Result<&LoadedPlugin> {
        self.ensure_loaded()?;
        match &self.state {
            LoadState::Loaded(loaded) => Ok(loaded),
            _ => unreachable!("ensure_loaded returned Ok"),
        }
    }

    fn loaded_mut(&mut self) -> Result<&mut LoadedPlugin> {
        self.ensure_loaded()?;
        match &mut self.state {
            LoadState::Loaded(loaded) => Ok(loaded),
            _ => unreachable!("ensure_loaded returned Ok"),
        }
    }

    /// The validated configuration.
    pub fn configuration(&mut self) -> Result<&mut Configuration> {
        Ok(&mut self.loaded_mut()?.configuration)
    }

    pub fn format_version(&mut self) -> Result<[u32; 3]> {
        Ok(self.loaded()?.format_version)
    }

    pub fn version(&mut self) -> Result<String> {
        Ok(self.loaded()?.version.clone())
    }

    pub fn release(&mut self) -> Result<String> {
        Ok(self.loaded()?.release.clone())
    }

    pub fn build_host(&mut self) -> Result<String> {
        Ok(self.loaded()?.build_host.clone())
    }

    pub fn build_date(&mut self) -> Result<String> {
        Ok(self.loaded()?.build_date.clone())
    }

    pub fn size(&mut self) -> Result<u64> {
        Ok(self.loaded()?.size)
    }

    pub fn files(&mut self) -> Result<Vec<String>> {
        Ok(self.loaded()?.files.clone())
    }

    /// Identity digest over the package metadata.
    pub fn get_hash(&mut self) -> Result<String> {
        let loaded = self.loaded()?;
        let sid = format!(
            "{}, {}, {}, {}, {}",
            loaded.build_host, loaded.build_date, loaded.size, loaded.version, loaded.release
        );
        let mut hasher = Sha256::new();
        hasher.update(sid.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Package this plugin home into a `.plugin` artifact.
    pub fn build(&mut self, output_dir: &Utf8Path) -> Result<Utf8PathBuf> {
        crate::archive::build_plugin(self, output_dir)
    }
}

/// Write the sidecar files a fresh plugin home needs.
pub fn write_label_file(home: &Utf8Path, name: &str, module_env: &ModuleEnv) -> Result<()> {
    let label = plugin_name_to_label(name, &module_env.module_lowercase);
    fs::write(home.join(LABEL_FILE), format!("{label}\n"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{CONFIG_FILE, FORMAT_VERSION_FILE};
    use tempfile::TempDir;

    const MINIMAL_CONFIG: &str = "\
[general]
_version = 1.2.3
_summary = a test plugin
_license = MIT
_url = https://example.org
_maintainer = team@example.org
_vendor = example
";

    fn make_home(dir: &TempDir, name: &str) -> Utf8PathBuf {
        let home = dir.path().join(name);
        fs::create_dir_all(&home).unwrap();
        fs::write(home.join(CONFIG_FILE), MINIMAL_CONFIG).unwrap();
        fs::write(home.join(FORMAT_VERSION_FILE), "2.0.0\n").unwrap();
        fs::write(
            home.join(LABEL_FILE),
            format!("plugin_{name}@generic\n"),
        )
        .unwrap();
        Utf8PathBuf::from_path_buf(home).unwrap()
    }

    fn setup(dir: &TempDir) -> (Utf8PathBuf, ModuleEnv) {
        let base = dir.path().join("base");
        fs::create_dir_all(&base).unwrap();
        let env = ModuleEnv::new(
            "GENERIC",
            Utf8PathBuf::from_path_buf(dir.path().join("runtime")).unwrap(),
        );
        (Utf8PathBuf::from_path_buf(base).unwrap(), env)
    }

    #[test]
    fn test_from_directory_reads_label() {
        let dir = TempDir::new().unwrap();
        let (base, env) = setup(&dir);
        let home = make_home(&dir, "plugin1");
        let plugin = Plugin::from_directory(&base, &home, &env).unwrap();
        assert_eq!(plugin.name(), "plugin1");
        assert_eq!(plugin.label(), "plugin_plugin1@generic");
    }

    #[test]
    fn test_from_directory_bad_label() {
        let dir = TempDir::new().unwrap();
        let (base, env) = setup(&dir);
        let home = make_home(&dir, "plugin1");
        fs::write(home.join(LABEL_FILE), "garbage\n").unwrap();
        assert!(Plugin::from_directory(&base, &home, &env).is_err());
    }

    #[test]
    fn test_uninstalled_version_from_configuration() {
        let dir = TempDir::new().unwrap();
        let (base, env) = setup(&dir);
        let home = make_home(&dir, "plugin1");
        let mut plugin = Plugin::new(&base, "plugin1", &home, &env);
        assert!(!plugin.is_installed());
        assert!(!plugin.is_dev_linked());
        assert_eq!(plugin.version().unwrap(), "1.2.3");
        assert_eq!(plugin.release().unwrap(), "1");
    }

    #[test]
    fn test_installed_version_from_metadata() {
        let dir = TempDir::new().unwrap();
        let (base, env) = setup(&dir);
        let home = make_home(&dir, "plugin1");
        let metadata = PluginMetadata {
            version: "9.9.9".to_string(),
            release: "3".to_string(),
            ..PluginMetadata::default()
        };
        metadata.write(&home.join(METADATA_FILE)).unwrap();
        let mut plugin = Plugin::new(&base, "plugin1", &home, &env);
        assert_eq!(plugin.version().unwrap(), "9.9.9");
        assert_eq!(plugin.release().unwrap(), "3");
    }

    #[test]
    fn test_missing_format_version_is_bad_plugin() {
        let dir = TempDir::new().unwrap();
        let (base, env) = setup(&dir);
        let home = make_home(&dir, "plugin1");
        fs::remove_file(home.join(FORMAT_VERSION_FILE)).unwrap();
        let mut plugin = Plugin::new(&base, "plugin1", &home, &env);
        assert!(matches!(
            plugin.ensure_loaded().unwrap_err(),
            Error::BadPlugin { .. }
        ));
    }

    #[test]
    fn test_failed_load_remembered_until_reload() {
        let dir = TempDir::new().unwrap();
        let (base, env) = setup(&dir);
        let home = make_home(&dir, "plugin1");
        fs::remove_file(home.join(FORMAT_VERSION_FILE)).unwrap();
        let mut plugin = Plugin::new(&base, "plugin1", &home, &env);
        assert!(plugin.ensure_loaded().is_err());
        fs::write(home.join(FORMAT_VERSION_FILE), "2.0.0\n").unwrap();
        // still failed without an explicit reload
        assert!(plugin.ensure_loaded().is_err());
        assert!(plugin.reload().is_ok());
    }

    #[test]
    fn test_dev_linked_version() {
        let dir = TempDir::new().unwrap();
        let (base, env) = setup(&dir);
        let home = make_home(&dir, "plugin1");
        std::os::unix::fs::symlink(&home, base.join("plugin1")).unwrap();
        let mut plugin = Plugin::new(&base, "plugin1", &home, &env);
        assert!(plugin.is_dev_linked());
        assert!(plugin.is_installed());
        assert_eq!(plugin.version().unwrap(), DEVLINK_VERSION);
        assert_eq!(plugin.release().unwrap(), DEVLINK_VERSION);
    }

    #[test]
    fn test_get_hash_is_stable() {
        let dir = TempDir::new().unwrap();
        let (base, env) = setup(&dir);
        let home = make_home(&dir, "plugin1");
        let mut plugin = Plugin::new(&base, "plugin1", &home, &env);
        let h1 = plugin.get_hash().unwrap();
        let h2 = plugin.get_hash().unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }
}
