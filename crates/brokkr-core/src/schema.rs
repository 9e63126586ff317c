//! Typed configuration schema and wildcard expansion
//!
//! The schema is a plain data tree (no validation logic embedded): section
//! patterns (literal or glob, e.g. `app_*`) mapping to field schemas. Before
//! validation the tree is expanded against the section names actually
//! present in the document, turning each glob into concrete per-section
//! copies. A "public" variant strips internal fields (leading `_`) so that
//! override files cannot redefine them.

use globset::Glob;

/// Marker prefix for internal-only fields and sections. Internal fields are
/// stripped from the public schema and excluded from environment export.
pub const INTERNAL_MARKER: char = '_';

/// Value kind a field coerces to after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Integer,
    Boolean,
}

/// Module-wide default a tri-state `AUTO` value resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalDefault {
    LogSplitStdoutStderr,
    LogSplitMultipleWorkers,
}

/// Schema for one configuration key.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    pub kind: ValueKind,
    pub required: bool,
    /// Raw default, coerced exactly like user input. Meaningful only when
    /// `required` is false.
    pub default: Option<String>,
    /// `AUTO` resolution target for inheritable booleans.
    pub inherit: Option<GlobalDefault>,
    /// Allowed raw (pre-coercion) values.
    pub allowed: Option<Vec<String>>,
    /// Regex constraint on string values.
    pub regex: Option<String>,
    /// Minimum length constraint on string values.
    pub min_length: Option<usize>,
}

impl FieldSchema {
    pub fn string() -> Self {
        Self {
            kind: ValueKind::String,
            required: false,
            default: None,
            inherit: None,
            allowed: None,
            regex: None,
            min_length: None,
        }
    }

    pub fn integer() -> Self {
        Self {
            kind: ValueKind::Integer,
            ..Self::string()
        }
    }

    pub fn boolean() -> Self {
        Self {
            kind: ValueKind::Boolean,
            ..Self::string()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn inherit(mut self, global: GlobalDefault) -> Self {
        self.inherit = Some(global);
        self
    }

    pub fn allowed<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn regex(mut self, pattern: impl Into<String>) -> Self {
        self.regex = Some(pattern.into());
        self
    }

    pub fn min_length(mut self, len: usize) -> Self {
        self.min_length = Some(len);
        self
    }
}

/// Schema for one section.
#[derive(Debug, Clone)]
pub struct SectionSchema {
    pub required: bool,
    /// Accept keys not declared in `fields`?
    pub allow_unknown: bool,
    /// Declared fields, stable order.
    pub fields: Vec<(String, FieldSchema)>,
}

impl SectionSchema {
    pub fn new() -> Self {
        Self {
            required: false,
            allow_unknown: false,
            fields: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn allow_unknown(mut self) -> Self {
        self.allow_unknown = true;
        self
    }

    pub fn field(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.fields.push((name.into(), schema));
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }
}

impl Default for SectionSchema {
    fn default() -> Self {
        Self::new()
    }
}

/// Whole-document schema: section patterns to section schemas.
#[derive(Debug, Clone, Default)]
pub struct ConfigSchema {
    pub sections: Vec<(String, SectionSchema)>,
}

impl ConfigSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section(mut self, pattern: impl Into<String>, schema: SectionSchema) -> Self {
        self.sections.push((pattern.into(), schema));
        self
    }

    pub fn get_section(&self, name: &str) -> Option<&SectionSchema> {
        self.sections.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    /// Expand wildcard patterns against the section names actually present.
    ///
    /// Every pattern containing `*` or `?` is removed and re-inserted as a
    /// concrete copy for each matching actual section name; literal keys
    /// pass through unchanged. Matching section names are visited in sorted
    /// order so diagnostics stay reproducible.
    pub fn expand(&self, actual_sections: &[String]) -> ConfigSchema {
        let mut sorted: Vec<&String> = actual_sections.iter().collect();
        sorted.sort();
        let mut out = ConfigSchema::new();
        for (pattern, schema) in &self.sections {
            if !pattern.contains('*') && !pattern.contains('?') {
                out.sections.push((pattern.clone(), schema.clone()));
                continue;
            }
            let Ok(glob) = Glob::new(pattern) else {
                // unparseable pattern matches nothing
                continue;
            };
            let matcher = glob.compile_matcher();
            for name in &sorted {
                if matcher.is_match(name.as_str()) {
                    out.sections.push(((*name).clone(), schema.clone()));
                }
            }
        }
        out
    }

    /// Expand, then strip everything override files may not touch:
    /// internal (`_`-prefixed) sections and fields, and sections left with
    /// no public field at all.
    pub fn expand_public(&self, actual_sections: &[String]) -> ConfigSchema {
        let expanded = self.expand(actual_sections);
        let mut out = ConfigSchema::new();
        for (name, schema) in expanded.sections {
            if name.starts_with(INTERNAL_MARKER) {
                continue;
            }
            let public_fields: Vec<(String, FieldSchema)> = schema
                .fields
                .iter()
                .filter(|(field_name, _)| !field_name.starts_with(INTERNAL_MARKER))
                .cloned()
                .collect();
            if public_fields.is_empty() && !schema.allow_unknown {
                continue;
            }
            out.sections.push((
                name,
                SectionSchema {
                    required: false,
                    allow_unknown: schema.allow_unknown,
                    fields: public_fields,
                },
            ));
        }
        out
    }
}

/// Version strings: three dot-separated lowercase alphanumeric components.
pub const VERSION_REGEX: &str = r"^[a-z0-9-_]+\.[a-z0-9-_]+\.[a-z0-9-_]+$";

/// Schema shared by `app_*` and `extra_daemon_*` sections.
pub fn command_schema() -> SectionSchema {
    SectionSchema::new()
        .field("_cmd_and_args", FieldSchema::string().default_value(""))
        .field("numprocesses", FieldSchema::integer().default_value("1"))
        .field(
            "log_split_stdout_stderr",
            FieldSchema::boolean()
                .default_value("AUTO")
                .inherit(GlobalDefault::LogSplitStdoutStderr),
        )
        .field(
            "log_split_multiple_workers",
            FieldSchema::boolean()
                .default_value("AUTO")
                .inherit(GlobalDefault::LogSplitMultipleWorkers),
        )
        .field("graceful_timeout", FieldSchema::integer().default_value("10"))
        .field("max_age", FieldSchema::integer().default_value("0"))
        .field("rlimit_as", FieldSchema::integer().default_value("0"))
        .field("rlimit_nofile", FieldSchema::integer().default_value("0"))
        .field("rlimit_stack", FieldSchema::integer().default_value("0"))
        .field("rlimit_fsize", FieldSchema::integer().default_value("0"))
}

/// The base schema every plugin configuration validates against.
pub fn plugin_config_schema() -> ConfigSchema {
    ConfigSchema::new()
        .section(
            "general",
            SectionSchema::new()
                .required()
                .field(
                    "_version",
                    FieldSchema::string().required().regex(VERSION_REGEX),
                )
                .field("_summary", FieldSchema::string().required().min_length(1))
                .field("_license", FieldSchema::string().required().min_length(1))
                .field("_url", FieldSchema::string().required().min_length(1))
                .field(
                    "_maintainer",
                    FieldSchema::string().required().min_length(1),
                )
                .field("_vendor", FieldSchema::string().required().min_length(1))
                .field(
                    "_add_plugin_dir_to_python_path",
                    FieldSchema::boolean().default_value("1"),
                ),
        )
        .section("app_*", command_schema())
        .section("extra_daemon_*", command_schema())
        .section("custom", SectionSchema::new().allow_unknown())
}
