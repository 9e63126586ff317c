//! `.plugin` package artifacts
//!
//! A `.plugin` file is a gzip-compressed tarball of a plugin home with the
//! metadata sidecars stamped in at build time. [`PluginArchive`] reads the
//! identity of an artifact without installing it; [`build_plugin`] produces
//! one from a plugin home, honoring `.releaseignore` patterns.

use crate::metadata::{
    PluginMetadata, CONFIGURATION_CACHE_FILE, FILES_FILE, FORMAT_VERSION_FILE, LABEL_FILE,
    METADATA_FILE, RELEASEIGNORE_FILE,
};
use crate::plugin::Plugin;
use brokkr_core::{Error, Result};
use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs::File;
use std::io::Read;
use tracing::debug;
use walkdir::WalkDir;

/// Format version stamped into every artifact this build produces.
pub const PLUGIN_FORMAT_VERSION: &str = "2.0.0";

/// Identity and metadata of a `.plugin` artifact, read without installing.
#[derive(Debug)]
pub struct PluginArchive {
    path: Utf8PathBuf,
    name: String,
    metadata: PluginMetadata,
    files: Vec<String>,
}

impl PluginArchive {
    /// Open and scan an artifact.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::bad_plugin_file(format!("file: {path} not found")));
        }
        let mut label: Option<String> = None;
        let mut metadata: Option<PluginMetadata> = None;
        let mut files: Option<Vec<String>> = None;
        let mut format_version_seen = false;

        let file = File::open(path)?;
        let mut tar = tar::Archive::new(GzDecoder::new(file));
        for entry in tar
            .entries()
            .map_err(|e| Error::bad_plugin_file(format!("can't read {path}: {e}")))?
        {
            let mut entry =
                entry.map_err(|e| Error::bad_plugin_file(format!("can't read {path}: {e}")))?;
            let entry_path = entry
                .path()
                .map_err(|e| Error::bad_plugin_file(format!("bad entry in {path}: {e}")))?
                .to_string_lossy()
                .trim_start_matches("./")
                .to_string();
            match entry_path.as_str() {
                LABEL_FILE => {
                    let mut content = String::new();
                    entry.read_to_string(&mut content)?;
                    label = Some(content.trim().to_string());
                }
                METADATA_FILE => {
                    let mut content = String::new();
                    entry.read_to_string(&mut content)?;
                    metadata = Some(serde_json::from_str(&content).map_err(|e| {
                        Error::bad_plugin_file(format!("bad {METADATA_FILE} in {path}: {e}"))
                    })?);
                }
                FILES_FILE => {
                    let mut content = String::new();
                    entry.read_to_string(&mut content)?;
                    files = Some(serde_json::from_str(&content).map_err(|e| {
                        Error::bad_plugin_file(format!("bad {FILES_FILE} in {path}: {e}"))
                    })?);
                }
                FORMAT_VERSION_FILE => format_version_seen = true,
                _ => {}
            }
        }

        if !format_version_seen {
            return Err(Error::bad_plugin_file(format!(
                "{path} carries no {FORMAT_VERSION_FILE} => it is too old, rebuild it"
            )));
        }
        let label = label.ok_or_else(|| {
            Error::bad_plugin_file(format!("{path} carries no {LABEL_FILE}"))
        })?;
        // the artifact name is module-agnostic: strip prefix and suffix
        let name = label
            .strip_prefix("plugin_")
            .and_then(|rest| rest.split('@').next())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                Error::bad_plugin_file(format!("{path} carries a bad label: {label}"))
            })?
            .to_string();
        let metadata = metadata.ok_or_else(|| {
            Error::bad_plugin_file(format!("{path} carries no {METADATA_FILE}"))
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            name,
            metadata,
            files: files.unwrap_or_default(),
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    pub fn release(&self) -> &str {
        &self.metadata.release
    }

    pub fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Unpack into a plugin home directory.
    pub fn extract_to(&self, dest: &Utf8Path) -> Result<()> {
        std::fs::create_dir_all(dest)?;
        let file = File::open(&self.path)?;
        let mut tar = tar::Archive::new(GzDecoder::new(file));
        tar.unpack(dest)
            .map_err(|e| Error::bad_plugin_file(format!("can't extract {}: {e}", self.path)))?;
        Ok(())
    }

}

/// Build a `.plugin` artifact from a plugin home.
///
/// The configuration must validate first (no broken artifact ever leaves
/// the build). `.releaseignore` patterns and the environment cache sidecar
/// are excluded; fresh `.metadata.json`, `.files.json` and
/// `.plugin_format_version` are stamped in.
pub fn build_plugin(plugin: &mut Plugin, output_dir: &Utf8Path) -> Result<Utf8PathBuf> {
    let name = plugin.name().to_string();
    plugin
        .load_full()
        .map_err(|e| Error::cant_build(&name, e.to_string()))?;

    let home = plugin.home().to_path_buf();
    let ignore = load_releaseignore(&home)?;
    let files = collect_files(&home, ignore.as_ref())?;

    let configuration = plugin.configuration()?;
    let version = configuration.version()?;
    let metadata = PluginMetadata {
        version: version.clone(),
        release: "1".to_string(),
        build_host: std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string()),
        build_date: chrono::Utc::now().to_rfc3339(),
        size: files.iter().map(|(_, size)| size).sum(),
        summary: configuration.summary()?,
        license: configuration.license()?,
        packager: configuration.packager()?,
        vendor: configuration.vendor()?,
        url: configuration.url()?,
    };

    std::fs::create_dir_all(output_dir)?;
    let output_path = output_dir.join(format!("{name}-{version}-1.plugin"));
    let out = File::create(&output_path).map_err(|e| Error::cant_build(&name, e.to_string()))?;
    let encoder = GzEncoder::new(out, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut manifest: Vec<String> = Vec::new();
    for (rel, _) in &files {
        if rel == METADATA_FILE || rel == FILES_FILE || rel == FORMAT_VERSION_FILE {
            continue;
        }
        builder
            .append_path_with_name(home.join(rel), rel)
            .map_err(|e| Error::cant_build(&name, format!("can't pack {rel}: {e}")))?;
        manifest.push(rel.clone());
    }
    manifest.push(METADATA_FILE.to_string());
    manifest.push(FILES_FILE.to_string());
    manifest.push(FORMAT_VERSION_FILE.to_string());
    manifest.sort();

    append_bytes(&mut builder, METADATA_FILE, &serde_json::to_vec_pretty(&metadata)?)?;
    append_bytes(&mut builder, FILES_FILE, &serde_json::to_vec_pretty(&manifest)?)?;
    append_bytes(
        &mut builder,
        FORMAT_VERSION_FILE,
        format!("{PLUGIN_FORMAT_VERSION}\n").as_bytes(),
    )?;

    builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .map_err(|e| Error::cant_build(&name, e.to_string()))?;
    debug!("built plugin artifact: {output_path}");
    Ok(output_path)
}

fn append_bytes<W: std::io::Write>(
    builder: &mut tar::Builder<W>,
    name: &str,
    content: &[u8],
) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, name, content)?;
    Ok(())
}

fn load_releaseignore(home: &Utf8Path) -> Result<Option<GlobSet>> {
    let path = home.join(RELEASEIGNORE_FILE);
    if !path.is_file() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)?;
    let mut builder = GlobSetBuilder::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let pattern = line.trim_end_matches('/');
        let glob = Glob::new(pattern)
            .map_err(|e| Error::bad_plugin(format!("bad pattern in {path}: {e}")))?;
        builder.add(glob);
    }
    let set = builder
        .build()
        .map_err(|e| Error::bad_plugin(format!("bad {RELEASEIGNORE_FILE}: {e}")))?;
    Ok(Some(set))
}

/// Collect (relative path, size) of every file to package.
fn collect_files(home: &Utf8Path, ignore: Option<&GlobSet>) -> Result<Vec<(String, u64)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(home.as_std_path()).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::bad_plugin(format!("can't walk {home}: {e}")))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(home.as_std_path())
            .expect("walkdir stays under its root")
            .to_string_lossy()
            .to_string();
        if rel == CONFIGURATION_CACHE_FILE || rel == RELEASEIGNORE_FILE {
            continue;
        }
        if let Some(set) = ignore {
            if is_ignored(set, &rel) {
                continue;
            }
        }
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        files.push((rel, size));
    }
    Ok(files)
}

/// A path is ignored when it or any of its ancestors matches a pattern.
fn is_ignored(set: &GlobSet, rel: &str) -> bool {
    if set.is_match(rel) {
        return true;
    }
    let mut ancestor = String::new();
    for component in rel.split('/') {
        if !ancestor.is_empty() {
            ancestor.push('/');
        }
        ancestor.push_str(component);
        if set.is_match(&ancestor) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::CONFIG_FILE;
    use brokkr_core::ModuleEnv;
    use std::fs;
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
        fs::create_dir_all(home.join("bin")).unwrap();
        fs::write(home.join(CONFIG_FILE), MINIMAL_CONFIG).unwrap();
        fs::write(home.join(FORMAT_VERSION_FILE), "2.0.0\n").unwrap();
        fs::write(home.join(LABEL_FILE), format!("plugin_{name}@generic\n")).unwrap();
        fs::write(home.join("bin/run"), "#!/bin/sh\n").unwrap();
        Utf8PathBuf::from_path_buf(home).unwrap()
    }

    fn build_fixture(dir: &TempDir, name: &str) -> Utf8PathBuf {
        let home = make_home(dir, name);
        let base = Utf8PathBuf::from_path_buf(dir.path().join("base")).unwrap();
        fs::create_dir_all(&base).unwrap();
        let env = ModuleEnv::new(
            "GENERIC",
            Utf8PathBuf::from_path_buf(dir.path().join("runtime")).unwrap(),
        );
        let mut plugin = Plugin::new(&base, name, &home, &env);
        let out = Utf8PathBuf::from_path_buf(dir.path().join("out")).unwrap();
        plugin.build(&out).unwrap()
    }

    #[test]
    fn test_build_then_load() {
        let dir = TempDir::new().unwrap();
        let artifact = build_fixture(&dir, "plugin1");
        assert!(artifact.as_str().ends_with("plugin1-1.2.3-1.plugin"));
        let archive = PluginArchive::load(&artifact).unwrap();
        assert_eq!(archive.name(), "plugin1");
        assert_eq!(archive.version(), "1.2.3");
        assert_eq!(archive.release(), "1");
        assert!(archive
            .files()
            .iter()
            .any(|f| f == CONFIG_FILE));
        assert_eq!(archive.metadata().license, "MIT");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("nope.plugin")).unwrap();
        let err = PluginArchive::load(&path).unwrap_err();
        assert!(matches!(err, Error::BadPluginFile { .. }));
    }

    #[test]
    fn test_load_garbage_file() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("bad.plugin")).unwrap();
        fs::write(&path, "not a tarball").unwrap();
        assert!(PluginArchive::load(&path).is_err());
    }

    #[test]
    fn test_extract_round_trip() {
        let dir = TempDir::new().unwrap();
        let artifact = build_fixture(&dir, "plugin1");
        let archive = PluginArchive::load(&artifact).unwrap();
        let dest = Utf8PathBuf::from_path_buf(dir.path().join("extracted")).unwrap();
        archive.extract_to(&dest).unwrap();
        assert!(dest.join(CONFIG_FILE).is_file());
        assert!(dest.join(METADATA_FILE).is_file());
        assert!(dest.join(FORMAT_VERSION_FILE).is_file());
        assert!(dest.join("bin/run").is_file());
    }

    #[test]
    fn test_releaseignore_excludes_files() {
        let dir = TempDir::new().unwrap();
        let home = make_home(&dir, "plugin1");
        fs::create_dir_all(home.join("work")).unwrap();
        fs::write(home.join("work/scratch.dat"), "x").unwrap();
        fs::write(home.join("debug.log"), "x").unwrap();
        fs::write(home.join(RELEASEIGNORE_FILE), "*.log\nwork/\n").unwrap();
        let base = Utf8PathBuf::from_path_buf(dir.path().join("base")).unwrap();
        fs::create_dir_all(&base).unwrap();
        let env = ModuleEnv::new(
            "GENERIC",
            Utf8PathBuf::from_path_buf(dir.path().join("runtime")).unwrap(),
        );
        let mut plugin = Plugin::new(&base, "plugin1", &home, &env);
        let out = Utf8PathBuf::from_path_buf(dir.path().join("out")).unwrap();
        let artifact = plugin.build(&out).unwrap();
        let archive = PluginArchive::load(&artifact).unwrap();
        assert!(!archive.files().iter().any(|f| f.ends_with(".log")));
        assert!(!archive.files().iter().any(|f| f.starts_with("work/")));
        assert!(archive.files().iter().any(|f| f == "bin/run"));
    }

    #[test]
    fn test_too_old_artifact_rejected() {
        let dir = TempDir::new().unwrap();
        // hand-roll an artifact without a format version file
        let path = Utf8PathBuf::from_path_buf(dir.path().join("old.plugin")).unwrap();
        let out = File::create(&path).unwrap();
        let encoder = GzEncoder::new(out, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        append_bytes(&mut builder, LABEL_FILE, b"plugin_old@generic\n").unwrap();
        builder.into_inner().and_then(|e| e.finish()).unwrap();
        let err = PluginArchive::load(&path).unwrap_err();
        assert!(err.to_string().contains("too old"));
    }
}
