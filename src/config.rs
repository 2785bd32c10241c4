//! Server configuration for `uni-serve`.
//!
//! Values are layered, lowest priority first:
//!
//! 1. built-in defaults
//! 2. a JSON file (`--config <path>` or `UNI_CONFIG`)
//! 3. environment variables
//! 4. command-line flags
//!
//! | Variable | Flag | Default |
//! |---|---|---|
//! | `UNI_TASK` | `--task` | (required) |
//! | `UNI_MODELS_DIR` | `--models-dir` | `models` |
//! | `UNI_MODEL` | `--model` | (required) |
//! | `UNI_RPC_ADDRESS` | `--rpc-address` | `127.0.0.1:0` |
//! | `UNI_HTTP_ADDRESS` | `--http-address` | disabled |
//! | `UNI_LOG_LEVEL` | `--log-level` | `info` |
//! | `UNI_LOG_FORMAT` | `--log-format` | `json` |

use crate::api::{TaskDescriptor, TaskKind};
use crate::cache::{MODELS_ROOT_ENV, resolve_model_dir};
use crate::error::{Result, TaskError};
use crate::telemetry::{LogConfig, LogFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "UNI_CONFIG";
pub const DEFAULT_RPC_ADDRESS: &str = "127.0.0.1:0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    pub task: Option<TaskKind>,
    /// Root under which `model_name` is resolved.
    pub models_dir: Option<PathBuf>,
    /// A model id under `models_dir`, or a path to a model directory.
    pub model_name: String,
    pub rpc_address: String,
    /// The HTTP/JSON gateway is only started when an address is set.
    pub http_address: Option<String>,
    pub log: LogConfig,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            task: None,
            models_dir: None,
            model_name: String::new(),
            rpc_address: DEFAULT_RPC_ADDRESS.to_string(),
            http_address: None,
            log: LogConfig::default(),
        }
    }
}

/// Values given on the command line. `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub task: Option<String>,
    pub models_dir: Option<PathBuf>,
    pub model_name: Option<String>,
    pub rpc_address: Option<String>,
    pub http_address: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
    pub help: bool,
}

pub const USAGE: &str = "\
Usage: uni-serve [OPTIONS]

Options:
  --config <path>          JSON configuration file (env: UNI_CONFIG)
  --task <kind>            Task to serve, e.g. question_answering (env: UNI_TASK)
  --models-dir <path>      Models root directory (env: UNI_MODELS_DIR)
  --model <name>           Model id or directory (env: UNI_MODEL)
  --rpc-address <addr>     RPC listen address (env: UNI_RPC_ADDRESS)
  --http-address <addr>    HTTP/JSON listen address (env: UNI_HTTP_ADDRESS)
  --log-level <filter>     Log filter directive (env: UNI_LOG_LEVEL)
  --log-format <format>    json or pretty (env: UNI_LOG_FORMAT)
  --help                   Show this message";

impl CliArgs {
    /// Parse flags in `--name value` or `--name=value` form.
    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cli = Self::default();
        let mut args = args.into_iter().map(Into::into);
        while let Some(arg) = args.next() {
            if arg == "--help" || arg == "-h" {
                cli.help = true;
                continue;
            }
            let (name, inline) = match arg.split_once('=') {
                Some((name, value)) => (name.to_string(), Some(value.to_string())),
                None => (arg, None),
            };
            let value = match inline {
                Some(value) => value,
                None => args
                    .next()
                    .ok_or_else(|| TaskError::Config(format!("{} requires a value", name)))?,
            };
            cli.set(&name, value)?;
        }
        Ok(cli)
    }

    fn set(&mut self, name: &str, value: String) -> Result<()> {
        match name {
            "--config" => self.config = Some(PathBuf::from(value)),
            "--task" => self.task = Some(value),
            "--models-dir" => self.models_dir = Some(PathBuf::from(value)),
            "--model" => self.model_name = Some(value),
            "--rpc-address" => self.rpc_address = Some(value),
            "--http-address" => self.http_address = Some(value),
            "--log-level" => self.log_level = Some(value),
            "--log-format" => self.log_format = Some(value),
            other => return Err(TaskError::Config(format!("Unknown option: {}", other))),
        }
        Ok(())
    }
}

impl ServeConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s)
            .map_err(|e| TaskError::Config(format!("Invalid server configuration JSON: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TaskError::Config(format!(
                "Failed to read configuration file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&contents)
    }

    /// Build the effective configuration from all layers, reading the
    /// process environment.
    pub fn load(cli: &CliArgs) -> Result<Self> {
        Self::resolve(cli, |key| std::env::var(key).ok())
    }

    /// Like [`load`](Self::load) with an explicit environment lookup.
    pub fn resolve(cli: &CliArgs, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let file = cli
            .config
            .clone()
            .or_else(|| env(CONFIG_ENV).map(PathBuf::from));
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(&env)?;
        config.apply_cli(cli)?;
        Ok(config)
    }

    fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(task) = env("UNI_TASK") {
            self.task = Some(task.parse()?);
        }
        if let Some(dir) = env(MODELS_ROOT_ENV) {
            self.models_dir = Some(PathBuf::from(dir));
        }
        if let Some(model) = env("UNI_MODEL") {
            self.model_name = model;
        }
        if let Some(address) = env("UNI_RPC_ADDRESS") {
            self.rpc_address = address;
        }
        if let Some(address) = env("UNI_HTTP_ADDRESS") {
            self.http_address = Some(address).filter(|a| !a.is_empty());
        }
        if let Some(level) = env("UNI_LOG_LEVEL") {
            self.log.level = level;
        }
        if let Some(format) = env("UNI_LOG_FORMAT") {
            self.log.format = format.parse()?;
        }
        Ok(())
    }

    fn apply_cli(&mut self, cli: &CliArgs) -> Result<()> {
        if let Some(task) = &cli.task {
            self.task = Some(task.parse()?);
        }
        if let Some(dir) = &cli.models_dir {
            self.models_dir = Some(dir.clone());
        }
        if let Some(model) = &cli.model_name {
            self.model_name = model.clone();
        }
        if let Some(address) = &cli.rpc_address {
            self.rpc_address = address.clone();
        }
        if let Some(address) = &cli.http_address {
            self.http_address = Some(address.clone()).filter(|a| !a.is_empty());
        }
        if let Some(level) = &cli.log_level {
            self.log.level = level.clone();
        }
        if let Some(format) = &cli.log_format {
            self.log.format = format.parse::<LogFormat>()?;
        }
        Ok(())
    }

    /// Directory the model is loaded from.
    pub fn model_directory(&self) -> PathBuf {
        resolve_model_dir(self.models_dir.as_deref(), &self.model_name)
    }

    /// The load descriptor, failing when the task or model is missing.
    pub fn descriptor(&self) -> Result<TaskDescriptor> {
        let kind = self
            .task
            .ok_or_else(|| TaskError::Config("No task configured (--task / UNI_TASK)".to_string()))?;
        if self.model_name.trim().is_empty() {
            return Err(TaskError::Config(
                "No model configured (--model / UNI_MODEL)".to_string(),
            ));
        }
        Ok(TaskDescriptor::new(kind, self.model_directory()).with_model_name(&self.model_name))
    }
}
