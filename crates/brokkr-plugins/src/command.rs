//! Runnable command specifications (apps and extra daemons)
//!
//! A [`CommandSpec`] is built once per validated `app_*`/`extra_daemon_*`
//! section and is immutable afterwards; [`CommandSpec::duplicate`] is the
//! only way to derive a variant (used when repackaging under a new name).
//! Its main product is [`CommandSpec::launch_invocation`]: the full
//! supervised-process command line, log-proxy wrapping included.

use brokkr_core::validator::{ValidatedDocument, ValidatedSection};
use brokkr_core::{Error, ModuleEnv, Result};
use camino::Utf8PathBuf;

/// Which section-name prefix a command came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    App,
    ExtraDaemon,
}

impl CommandKind {
    pub fn section_prefix(self) -> &'static str {
        match self {
            CommandKind::App => "app_",
            CommandKind::ExtraDaemon => "extra_daemon_",
        }
    }

    /// Placeholder name substituted in the command template.
    fn name_placeholder(self) -> &'static str {
        match self {
            CommandKind::App => "{app_name}",
            CommandKind::ExtraDaemon => "{extra_daemon_name}",
        }
    }

    fn log_prefix(self) -> &'static str {
        match self {
            CommandKind::App => "app",
            CommandKind::ExtraDaemon => "extra_daemon",
        }
    }
}

/// One runnable unit extracted from a validated configuration section.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    kind: CommandKind,
    plugin_name: String,
    plugin_home: Utf8PathBuf,
    name: String,
    cmd_and_args: String,
    numprocesses: i64,
    log_split_stdout_stderr: bool,
    log_split_multiple_workers: bool,
    graceful_timeout: i64,
    max_age: i64,
    rlimit_as: i64,
    rlimit_nofile: i64,
    rlimit_stack: i64,
    rlimit_fsize: i64,
}

impl CommandSpec {
    /// Build from one validated section.
    ///
    /// `section_name` must carry the kind's prefix; the remainder becomes
    /// the instance name.
    pub fn from_section(
        kind: CommandKind,
        plugin_name: &str,
        plugin_home: &Utf8PathBuf,
        section: &ValidatedSection,
    ) -> Result<Self> {
        let name = section
            .name
            .strip_prefix(kind.section_prefix())
            .ok_or_else(|| {
                Error::internal(format!(
                    "section {} does not carry prefix {}",
                    section.name,
                    kind.section_prefix()
                ))
            })?
            .to_string();
        let get_int = |key: &str| -> i64 {
            section.get(key).and_then(|v| v.as_int()).unwrap_or(0)
        };
        let get_bool = |key: &str| -> bool {
            section.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
        };
        Ok(Self {
            kind,
            plugin_name: plugin_name.to_string(),
            plugin_home: plugin_home.clone(),
            name,
            cmd_and_args: section
                .get("_cmd_and_args")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            numprocesses: section
                .get("numprocesses")
                .and_then(|v| v.as_int())
                .unwrap_or(1),
            log_split_stdout_stderr: get_bool("log_split_stdout_stderr"),
            log_split_multiple_workers: get_bool("log_split_multiple_workers"),
            graceful_timeout: section
                .get("graceful_timeout")
                .and_then(|v| v.as_int())
                .unwrap_or(10),
            max_age: get_int("max_age"),
            rlimit_as: get_int("rlimit_as"),
            rlimit_nofile: get_int("rlimit_nofile"),
            rlimit_stack: get_int("rlimit_stack"),
            rlimit_fsize: get_int("rlimit_fsize"),
        })
    }

    /// Extract every app and extra daemon of a validated document.
    pub fn extract_all(
        doc: &ValidatedDocument,
        plugin_name: &str,
        plugin_home: &Utf8PathBuf,
    ) -> Result<Vec<CommandSpec>> {
        let mut commands = Vec::new();
        for section in doc.sections() {
            let kind = if section.name.starts_with(CommandKind::App.section_prefix()) {
                CommandKind::App
            } else if section
                .name
                .starts_with(CommandKind::ExtraDaemon.section_prefix())
            {
                CommandKind::ExtraDaemon
            } else {
                continue;
            };
            commands.push(Self::from_section(kind, plugin_name, plugin_home, section)?);
        }
        Ok(commands)
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cmd_and_args(&self) -> &str {
        &self.cmd_and_args
    }

    pub fn numprocesses(&self) -> i64 {
        self.numprocesses
    }

    pub fn log_split_stdout_stderr(&self) -> bool {
        self.log_split_stdout_stderr
    }

    pub fn log_split_multiple_workers(&self) -> bool {
        self.log_split_multiple_workers
    }

    /// Graceful shutdown timeout in seconds.
    pub fn graceful_timeout(&self) -> i64 {
        self.graceful_timeout
    }

    /// Maximum worker age in seconds, 0 = unlimited.
    pub fn max_age(&self) -> i64 {
        self.max_age
    }

    pub fn rlimit_as(&self) -> i64 {
        self.rlimit_as
    }

    pub fn rlimit_nofile(&self) -> i64 {
        self.rlimit_nofile
    }

    pub fn rlimit_stack(&self) -> i64 {
        self.rlimit_stack
    }

    pub fn rlimit_fsize(&self) -> i64 {
        self.rlimit_fsize
    }

    /// Deep copy under a new instance name (same name when `None`).
    pub fn duplicate(&self, new_name: Option<&str>) -> CommandSpec {
        let mut copy = self.clone();
        if let Some(name) = new_name {
            copy.name = name.to_string();
        }
        copy
    }

    /// Substitute the command template placeholders.
    pub fn substituted_cmd(&self) -> String {
        self.cmd_and_args
            .replace("{plugin_name}", &self.plugin_name)
            .replace("{plugin_dir}", self.plugin_home.as_str())
            .replace(self.kind.name_placeholder(), &self.name)
    }

    /// Stem of every log file this command writes.
    fn log_stem(&self, module_env: &ModuleEnv) -> Utf8PathBuf {
        module_env.runtime_home.join("log").join(format!(
            "{}_{}_{}",
            self.kind.log_prefix(),
            self.plugin_name,
            self.name
        ))
    }

    /// Log-proxy argument string.
    ///
    /// Worker-split paths (a `_worker{worker}` suffix) apply only when the
    /// flag is set and more than one process runs; `--use-locks` whenever
    /// several workers may interleave writes.
    pub fn log_proxy_args(&self, module_env: &ModuleEnv) -> String {
        let mut args: Vec<String> = Vec::new();
        if self.numprocesses > 1 {
            args.push("--use-locks".to_string());
        }
        let suffix = if self.log_split_multiple_workers && self.numprocesses > 1 {
            "_worker{worker}"
        } else {
            ""
        };
        let stem = self.log_stem(module_env);
        if self.log_split_stdout_stderr {
            args.push(format!("--stdout {stem}{suffix}.stdout"));
            args.push(format!("--stderr {stem}{suffix}.stderr"));
        } else {
            args.push(format!("--stdout {stem}{suffix}.log"));
            args.push("--stderr STDOUT".to_string());
        }
        args.join(" ")
    }

    /// The full supervised-process invocation: log proxy wrapping a
    /// plugin-environment wrapper wrapping the command itself.
    pub fn launch_invocation(&self, module_env: &ModuleEnv) -> String {
        format!(
            "log_proxy {} -- plugin_wrapper --cwd {} -- {}",
            self.log_proxy_args(module_env),
            self.plugin_name,
            self.substituted_cmd()
        )
    }
}
