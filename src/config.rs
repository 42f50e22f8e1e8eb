//! Configuration loading and resolution of effective run settings.
//!
//! Precedence: CLI flags > config file > built-in defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use backfill_core::download::{
    DEFAULT_EXPORT_TIMEOUT, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, DEFAULT_ROW_LIMIT,
};

use crate::cli::Args;

/// Directory exports are saved to when nothing else is configured.
pub const DEFAULT_OUTPUT_DIR: &str = "data";

/// Export program looked up on `PATH` when nothing else is configured.
pub const DEFAULT_EXPORT_COMMAND: &str = "contracts-export";

const MAX_RETRIES_LIMIT: u64 = 10;
const MAX_DELAY_SECS: u64 = 86_400;
const MAX_RETRY_DELAY_SECS: u64 = 600;

/// Flat `key = value` file configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    pub output_dir: Option<PathBuf>,
    pub export_command: Option<PathBuf>,
    pub export_timeout_secs: Option<u64>,
    pub row_limit: Option<u64>,
    pub delay_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_delay_secs: Option<u64>,
    pub ledger_path: Option<PathBuf>,
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates config values against the same ranges the CLI enforces.
    pub fn validate(&self) -> Result<()> {
        if let Some(timeout) = self.export_timeout_secs
            && !(1..=3600).contains(&timeout)
        {
            bail!("Invalid config value for `export_timeout_secs`: {timeout}. Expected range: 1..=3600");
        }
        if self.row_limit == Some(0) {
            bail!("Invalid config value for `row_limit`: 0. Expected a positive integer");
        }
        if let Some(delay) = self.delay_secs
            && delay > MAX_DELAY_SECS
        {
            bail!("Invalid config value for `delay_secs`: {delay}. Expected range: 0..={MAX_DELAY_SECS}");
        }
        if let Some(retries) = self.max_retries
            && u64::from(retries) > MAX_RETRIES_LIMIT
        {
            bail!("Invalid config value for `max_retries`: {retries}. Expected range: 0..={MAX_RETRIES_LIMIT}");
        }
        if let Some(delay) = self.retry_delay_secs
            && delay > MAX_RETRY_DELAY_SECS
        {
            bail!(
                "Invalid config value for `retry_delay_secs`: {delay}. Expected range: 0..={MAX_RETRY_DELAY_SECS}"
            );
        }
        Ok(())
    }
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Log filter directive for this setting, matching `-v` and `-vv`.
    #[must_use]
    pub fn level(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose => "debug",
            Self::Debug => "trace",
            Self::Quiet => "error",
        }
    }
}

/// Effective settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub output_dir: PathBuf,
    pub export_command: PathBuf,
    pub export_args: Vec<String>,
    pub export_timeout: Duration,
    pub row_limit: u64,
    pub month_delay: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub ledger_path: Option<PathBuf>,
}

impl RunSettings {
    /// Merges CLI flags over file config over defaults.
    #[must_use]
    pub fn resolve(args: &Args, file: &FileConfig) -> Self {
        Self {
            output_dir: args
                .output_dir
                .clone()
                .or_else(|| file.output_dir.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            export_command: args
                .export_command
                .clone()
                .or_else(|| file.export_command.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_COMMAND)),
            export_args: args.export_args.clone(),
            export_timeout: args
                .export_timeout
                .or(file.export_timeout_secs)
                .map_or(DEFAULT_EXPORT_TIMEOUT, Duration::from_secs),
            row_limit: args
                .row_limit
                .or(file.row_limit)
                .unwrap_or(DEFAULT_ROW_LIMIT),
            month_delay: Duration::from_secs(args.delay.or(file.delay_secs).unwrap_or(0)),
            max_retries: args
                .retries
                .or(file.max_retries)
                .unwrap_or(DEFAULT_MAX_RETRIES),
            retry_delay: args
                .retry_delay
                .or(file.retry_delay_secs)
                .map_or(DEFAULT_RETRY_DELAY, Duration::from_secs),
            ledger_path: args.ledger.clone().or_else(|| file.ledger_path.clone()),
        }
    }
}

/// Default log level: `-q` > `-v` count > config verbosity > info.
#[must_use]
pub fn default_log_level(args: &Args, file: &FileConfig) -> &'static str {
    if args.quiet {
        return "error";
    }
    match args.verbose {
        0 => file.verbosity.map_or("info", VerbositySetting::level),
        1 => "debug",
        _ => "trace",
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/contracts-backfill/config.toml`
/// 2. `$HOME/.config/contracts-backfill/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("contracts-backfill")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("contracts-backfill")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file.
///
/// An explicit path must exist. The default path is optional: when it is
/// missing, an empty config is returned.
pub fn load_file_config(explicit: Option<&Path>) -> Result<FileConfig> {
    if let Some(path) = explicit {
        return read_file_config(path);
    }

    match resolve_default_config_path() {
        Some(path) if path.exists() => read_file_config(&path),
        _ => Ok(FileConfig::default()),
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let context = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "output_dir" => {
                cfg.output_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(context)?,
                ));
            }
            "export_command" => {
                cfg.export_command = Some(PathBuf::from(
                    parse_string_literal(value).with_context(context)?,
                ));
            }
            "ledger_path" => {
                cfg.ledger_path = Some(PathBuf::from(
                    parse_string_literal(value).with_context(context)?,
                ));
            }
            "export_timeout_secs" => {
                cfg.export_timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "row_limit" => {
                cfg.row_limit = Some(parse_integer_u64(value).with_context(context)?);
            }
            "delay_secs" => {
                cfg.delay_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "retry_delay_secs" => {
                cfg.retry_delay_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "max_retries" => {
                let parsed = parse_integer_u64(value).with_context(context)?;
                let n = u32::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("max_retries out of range for u32"))?;
                cfg.max_retries = Some(n);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(context)?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!("Invalid `verbosity` value '{parsed}' on line {line_no}")
                })?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Drops a trailing `# comment`; `#` inside a quoted value is kept.
fn strip_inline_comment(line: &str) -> &str {
    let mut quoted = false;
    let cut = line.char_indices().find(|&(_, ch)| {
        if ch == '"' {
            quoted = !quoted;
        }
        ch == '#' && !quoted
    });
    cut.map_or(line, |(index, _)| &line[..index])
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    raw_value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Expected a double-quoted string, got `{raw_value}`"))
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected an integer value");
    }
    if token.starts_with('-') {
        bail!("Expected a non-negative integer, got `{token}`");
    }
    token
        .parse::<u64>()
        .with_context(|| format!("`{token}` is not an integer in range for u64"))
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}
