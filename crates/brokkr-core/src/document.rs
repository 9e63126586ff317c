//! Raw configuration documents: ordered INI parsing and layered merging
//!
//! A [`RawDocument`] is the merge of an ordered list of INI files. Later
//! files override earlier ones key by key, never section by section: a key
//! absent from an override file keeps the value a lower layer gave it.
//! Missing files are silently skipped; a present file that cannot be parsed
//! is a hard [`Error::ConfigUnreadable`].

use crate::error::{Error, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// One section of a raw document, keys in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSection {
    pub name: String,
    entries: Vec<(String, String)>,
}

impl RawSection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Set a key, overriding in place to keep first-seen ordering.
    pub fn set(&mut self, key: &str, value: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value.to_string();
        } else {
            self.entries.push((key.to_string(), value.to_string()));
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Merged key/value document, sections in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDocument {
    sections: Vec<RawSection>,
}

impl RawDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and merge every existing path, in precedence order (later
    /// paths override earlier ones per key).
    pub fn from_paths<P: AsRef<Utf8Path>>(paths: &[P]) -> Result<Self> {
        let mut doc = Self::new();
        for path in paths {
            let path = path.as_ref();
            if !path.is_file() {
                continue;
            }
            let content = fs::read_to_string(path)
                .map_err(|e| Error::config_unreadable(path.as_str(), e.to_string()))?;
            let parsed = Self::parse(&content)
                .map_err(|msg| Error::config_unreadable(path.as_str(), msg))?;
            doc.merge_from(parsed);
        }
        Ok(doc)
    }

    /// Parse one INI document. Returns a plain message on syntax errors so
    /// the caller can attach the offending path.
    fn parse(content: &str) -> std::result::Result<Self, String> {
        let mut doc = Self::new();
        let mut current: Option<usize> = None;
        for (lineno, raw_line) in content.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[') {
                let name = name
                    .strip_suffix(']')
                    .ok_or_else(|| format!("line {}: unterminated section header", lineno + 1))?
                    .trim();
                if name.is_empty() {
                    return Err(format!("line {}: empty section name", lineno + 1));
                }
                current = Some(doc.section_index_or_insert(name));
                continue;
            }
            let (key, value) = split_assignment(line)
                .ok_or_else(|| format!("line {}: expected 'key = value'", lineno + 1))?;
            let idx = current
                .ok_or_else(|| format!("line {}: key/value pair outside any section", lineno + 1))?;
            doc.sections[idx].set(&key.to_lowercase(), value);
        }
        Ok(doc)
    }

    fn section_index_or_insert(&mut self, name: &str) -> usize {
        if let Some(idx) = self.sections.iter().position(|s| s.name == name) {
            idx
        } else {
            self.sections.push(RawSection::new(name));
            self.sections.len() - 1
        }
    }

    /// Overlay another document onto this one, key by key.
    pub fn merge_from(&mut self, overlay: RawDocument) {
        for section in overlay.sections {
            let idx = self.section_index_or_insert(&section.name);
            for (key, value) in section.iter() {
                self.sections[idx].set(key, value);
            }
        }
    }

    pub fn section(&self, name: &str) -> Option<&RawSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn section_names(&self) -> Vec<String> {
        self.sections.iter().map(|s| s.name.clone()).collect()
    }

    pub fn sections(&self) -> impl Iterator<Item = &RawSection> {
        self.sections.iter()
    }

    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        let idx = self.section_index_or_insert(section);
        self.sections[idx].set(key, value);
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Candidate configuration paths for a plugin, lowest precedence first:
/// the plugin's own `config.ini`, the runtime-scoped override, the
/// system-wide override.
pub fn candidate_paths(
    config_filepath: &Utf8Path,
    module_env: &crate::module::ModuleEnv,
    plugin_name: &str,
) -> Vec<Utf8PathBuf> {
    vec![
        config_filepath.to_path_buf(),
        module_env.runtime_override_path(plugin_name),
        module_env.system_override_path(plugin_name),
    ]
}

fn split_assignment(line: &str) -> Option<(String, &str)> {
    // '=' wins over ':' so values may contain ':' freely
    let pos = line.find('=').or_else(|| line.find(':'))?;
    let key = line[..pos].trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), line[pos + 1..].trim()))
}
