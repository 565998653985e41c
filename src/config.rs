//! Driver configuration from environment variables or a TOML file.
//!
//! Environment values are read from `NN_DISPATCH_*` variables with sensible
//! defaults. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `NN_DISPATCH_WORKER_THREAD_NAME` | nn-dispatch-worker | Worker thread name |
//! | `NN_DISPATCH_WORKER_STACK_SIZE` | 0 | Worker stack bytes (0 = platform default) |
//! | `NN_DISPATCH_DUMP_DIR` | unset | Directory for per-request tensor dumps |
//! | `NN_DISPATCH_PROFILING` | false | Enable runtime profiling on new networks |
//! | `NN_DISPATCH_LOG_LEVEL` | nn_dispatch=info | Log filter directive |
//! | `NN_DISPATCH_LOG_FORMAT` | json | `json` or `pretty` |

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::execution::PreparedModelOptions;
use crate::scheduler::WorkerConfig;
use crate::telemetry::{LogConfig, LogFormat};

/// Smallest non-default worker stack accepted.
const MIN_STACK_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// All driver configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverConfig {
    pub worker: WorkerConfig,
    pub dump_dir: Option<PathBuf>,
    pub profiling_enabled: bool,
    pub log: LogConfig,
}

impl DriverConfig {
    /// Options applied to every prepared model created by the driver.
    pub fn model_options(&self) -> PreparedModelOptions {
        PreparedModelOptions {
            dump_dir: self.dump_dir.clone(),
            profiling_enabled: self.profiling_enabled,
        }
    }

    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            worker_thread_name: self.worker.thread_name.clone(),
            worker_stack_size: self.worker.stack_size,
            dump_dir: self.dump_dir.as_ref().map(|p| p.display().to_string()),
            profiling_enabled: self.profiling_enabled,
            log_level: self.log.level.clone(),
            log_format: match self.log.format {
                LogFormat::Json => "json".to_string(),
                LogFormat::Pretty => "pretty".to_string(),
            },
        }
    }
}

/// Effective configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub worker_thread_name: String,
    pub worker_stack_size: usize,
    pub dump_dir: Option<String>,
    pub profiling_enabled: bool,
    pub log_level: String,
    pub log_format: String,
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a boolean env var, returning `default` on missing or invalid.
fn parse_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn clamp_stack_size(stack_size: usize) -> usize {
    if stack_size == 0 {
        0
    } else {
        stack_size.max(MIN_STACK_SIZE)
    }
}

fn load_worker_config() -> WorkerConfig {
    let defaults = WorkerConfig::default();
    let thread_name =
        non_empty_var("NN_DISPATCH_WORKER_THREAD_NAME").unwrap_or(defaults.thread_name);
    let stack_size = clamp_stack_size(parse_usize("NN_DISPATCH_WORKER_STACK_SIZE", 0));
    WorkerConfig { thread_name, stack_size }
}

fn load_log_config() -> LogConfig {
    let defaults = LogConfig::default();
    let level = non_empty_var("NN_DISPATCH_LOG_LEVEL").unwrap_or(defaults.level);
    let format = non_empty_var("NN_DISPATCH_LOG_FORMAT")
        .and_then(|v| v.parse::<LogFormat>().ok())
        .unwrap_or(defaults.format);
    LogConfig { format, level, output_path: None }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> DriverConfig {
    DriverConfig {
        worker: load_worker_config(),
        dump_dir: non_empty_var("NN_DISPATCH_DUMP_DIR").map(PathBuf::from),
        profiling_enabled: parse_bool("NN_DISPATCH_PROFILING", false),
        log: load_log_config(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    #[serde(default)]
    worker: WorkerSection,
    #[serde(default)]
    execution: ExecutionSection,
    #[serde(default)]
    log: LogSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct WorkerSection {
    thread_name: Option<String>,
    stack_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExecutionSection {
    dump_dir: Option<PathBuf>,
    profiling: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LogSection {
    level: Option<String>,
    format: Option<String>,
    output_path: Option<PathBuf>,
}

/// Load configuration from a TOML file. Absent keys take their defaults.
///
/// ```toml
/// [worker]
/// thread_name = "nn-dispatch-worker"
/// stack_size = 0
///
/// [execution]
/// dump_dir = "/tmp/dumps"
/// profiling = false
///
/// [log]
/// level = "nn_dispatch=debug"
/// format = "pretty"
/// ```
pub fn load_file(path: &Path) -> Result<DriverConfig, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    parse_toml(&text)
}

fn parse_toml(text: &str) -> Result<DriverConfig, ConfigError> {
    let file: FileConfig = toml::from_str(text)?;
    let defaults = DriverConfig::default();

    let thread_name = match file.worker.thread_name {
        Some(name) if name.trim().is_empty() => {
            return Err(ConfigError::InvalidValue { key: "worker.thread_name", value: name })
        }
        Some(name) => name,
        None => defaults.worker.thread_name,
    };
    let format = match file.log.format {
        Some(f) => f
            .parse::<LogFormat>()
            .map_err(|_| ConfigError::InvalidValue { key: "log.format", value: f })?,
        None => defaults.log.format,
    };

    Ok(DriverConfig {
        worker: WorkerConfig {
            thread_name,
            stack_size: clamp_stack_size(file.worker.stack_size.unwrap_or(0)),
        },
        dump_dir: file.execution.dump_dir,
        profiling_enabled: file.execution.profiling.unwrap_or(false),
        log: LogConfig {
            format,
            level: file.log.level.unwrap_or(defaults.log.level),
            output_path: file.log.output_path,
        },
    })
}
