//! Document validation: coercion, defaulting, constraint checks
//!
//! Validation is all-or-nothing per load: either every key of every section
//! satisfies its field schema and a [`ValidatedDocument`] is produced, or
//! the complete list of [`ValidationIssue`]s is returned — never a partial
//! document, never just the first problem.

use crate::document::RawDocument;
use crate::error::ValidationIssue;
use crate::module::ModuleEnv;
use crate::schema::{ConfigSchema, FieldSchema, GlobalDefault, ValueKind};
use regex::Regex;

/// A typed, coerced configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Render for environment export: booleans become `"1"`/`"0"`.
    pub fn to_env_string(&self) -> String {
        match self {
            ConfigValue::Str(s) => s.clone(),
            ConfigValue::Int(i) => i.to_string(),
            ConfigValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        }
    }
}

impl std::fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_env_string())
    }
}

/// One validated section, keys in document order (defaulted keys appended
/// in schema order).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSection {
    pub name: String,
    entries: Vec<(String, ConfigValue)>,
}

impl ValidatedSection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: ConfigValue) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key.to_string(), value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

/// A fully validated configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedDocument {
    sections: Vec<ValidatedSection>,
}

impl ValidatedDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section(&self, name: &str) -> Option<&ValidatedSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn section_mut(&mut self, name: &str) -> Option<&mut ValidatedSection> {
        self.sections.iter_mut().find(|s| s.name == name)
    }

    pub fn push_section(&mut self, section: ValidatedSection) {
        self.sections.push(section);
    }

    pub fn sections(&self) -> impl Iterator<Item = &ValidatedSection> {
        self.sections.iter()
    }

    pub fn section_names(&self) -> Vec<String> {
        self.sections.iter().map(|s| s.name.clone()).collect()
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&ConfigValue> {
        self.section(section).and_then(|s| s.get(key))
    }
}

/// Tri-state boolean configuration flag.
///
/// Parsed first, resolved second: the global lookup stays isolated in the
/// caller and [`TriState::resolve`] is a pure function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriState {
    True,
    False,
    Inherit,
}

impl TriState {
    /// Parse a raw flag value; `AUTO` means "follow the global default".
    pub fn parse(value: &str) -> Option<TriState> {
        if value == "AUTO" {
            return Some(TriState::Inherit);
        }
        parse_bool(value).map(|b| if b { TriState::True } else { TriState::False })
    }

    /// Resolve to a concrete boolean against the global default.
    pub fn resolve(self, global_default: bool) -> bool {
        match self {
            TriState::True => true,
            TriState::False => false,
            TriState::Inherit => global_default,
        }
    }
}

/// Parse a boolean configuration string.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Validate a raw document against an already-expanded schema.
///
/// Errors are collected across all sections and keys before failing.
pub fn validate(
    raw: &RawDocument,
    schema: &ConfigSchema,
    module_env: &ModuleEnv,
) -> std::result::Result<ValidatedDocument, Vec<ValidationIssue>> {
    let mut issues: Vec<ValidationIssue> = Vec::new();
    let mut doc = ValidatedDocument::new();

    // required sections must be present
    for (name, section_schema) in &schema.sections {
        if section_schema.required && raw.section(name).is_none() {
            issues.push(ValidationIssue {
                section: name.clone(),
                key: String::new(),
                message: "required section is missing".to_string(),
            });
        }
    }

    for raw_section in raw.sections() {
        let Some(section_schema) = schema.get_section(&raw_section.name) else {
            issues.push(ValidationIssue {
                section: raw_section.name.clone(),
                key: String::new(),
                message: "unknown section".to_string(),
            });
            continue;
        };
        let mut validated = ValidatedSection::new(&raw_section.name);

        for (key, raw_value) in raw_section.iter() {
            match section_schema.get_field(key) {
                Some(field) => {
                    match check_field(key, raw_value, field, module_env) {
                        Ok(value) => validated.set(key, value),
                        Err(message) => issues.push(ValidationIssue {
                            section: raw_section.name.clone(),
                            key: key.to_string(),
                            message,
                        }),
                    }
                }
                None if section_schema.allow_unknown => {
                    validated.set(key, ConfigValue::Str(raw_value.to_string()));
                }
                None => issues.push(ValidationIssue {
                    section: raw_section.name.clone(),
                    key: key.to_string(),
                    message: "unknown key".to_string(),
                }),
            }
        }

        // defaulting + required checks for declared fields absent from the document
        for (key, field) in &section_schema.fields {
            if validated.contains_key(key) {
                continue;
            }
            if raw_section.get(key).is_some() {
                // present but already reported as invalid
                continue;
            }
            if let Some(default) = &field.default {
                match check_field(key, default, field, module_env) {
                    Ok(value) => validated.set(key, value),
                    Err(message) => issues.push(ValidationIssue {
                        section: raw_section.name.clone(),
                        key: key.clone(),
                        message: format!("invalid default: {message}"),
                    }),
                }
            } else if field.required {
                issues.push(ValidationIssue {
                    section: raw_section.name.clone(),
                    key: key.clone(),
                    message: "required field is missing".to_string(),
                });
            }
        }

        doc.push_section(validated);
    }

    if issues.is_empty() {
        Ok(doc)
    } else {
        Err(issues)
    }
}

/// Check one raw value against its field schema and coerce it.
fn check_field(
    _key: &str,
    raw_value: &str,
    field: &FieldSchema,
    module_env: &ModuleEnv,
) -> std::result::Result<ConfigValue, String> {
    // allowed values constrain the raw string, before any coercion
    if let Some(allowed) = &field.allowed {
        if !allowed.iter().any(|a| a == raw_value) {
            return Err(format!(
                "value '{raw_value}' not in allowed set [{}]",
                allowed.join(", ")
            ));
        }
    }

    match field.kind {
        ValueKind::String => {
            if let Some(pattern) = &field.regex {
                let re = Regex::new(pattern).map_err(|e| format!("bad regex: {e}"))?;
                if !re.is_match(raw_value) {
                    return Err(format!("value '{raw_value}' does not match {pattern}"));
                }
            }
            if let Some(min) = field.min_length {
                if raw_value.len() < min {
                    return Err(format!("value shorter than {min} character(s)"));
                }
            }
            Ok(ConfigValue::Str(raw_value.to_string()))
        }
        ValueKind::Integer => raw_value
            .parse::<i64>()
            .map(ConfigValue::Int)
            .map_err(|_| format!("value '{raw_value}' is not an integer")),
        ValueKind::Boolean => {
            if let Some(global) = field.inherit {
                let tri = TriState::parse(raw_value)
                    .ok_or_else(|| format!("value '{raw_value}' is not a boolean or AUTO"))?;
                Ok(ConfigValue::Bool(tri.resolve(global_default_of(
                    global, module_env,
                ))))
            } else {
                parse_bool(raw_value)
                    .map(ConfigValue::Bool)
                    .ok_or_else(|| format!("value '{raw_value}' is not a boolean"))
            }
        }
    }
}

fn global_default_of(global: GlobalDefault, module_env: &ModuleEnv) -> bool {
    match global {
        GlobalDefault::LogSplitStdoutStderr => module_env.log_split_stdout_stderr,
        GlobalDefault::LogSplitMultipleWorkers => module_env.log_split_multiple_workers,
    }
}
