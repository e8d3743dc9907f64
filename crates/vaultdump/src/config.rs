//! Configuration sourced from flags and the environment.
//!
//! Every setting arrives as an optional string so that empty environment
//! values can be treated as unset before defaults and validation apply.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Args;
use vaultdump_job::JobConfig;
use vaultdump_scheduler::DEFAULT_SCHEDULE;
use vaultdump_store::{RetryPolicy, S3Config};

/// Default working root for exports and archives.
pub const DEFAULT_DUMP_DIR: &str = "/tmp/vaultdump";

/// Default export tool.
pub const DEFAULT_EXPORT_TOOL: &str = "mongodump";

/// Default archive tool.
pub const DEFAULT_ARCHIVE_TOOL: &str = "tar";

/// Errors raised while validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is required")]
    Missing { var: &'static str },

    #[error("invalid value '{value}' for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to create working root {path}: {source}")]
    WorkRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Raw settings shared by every subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct Settings {
    /// Database connection string handed to the export tool
    #[arg(long, env = "MONGO_URL", hide_env_values = true)]
    pub mongo_url: Option<String>,

    /// Working root for exports and archives [default: /tmp/vaultdump]
    #[arg(long, env = "DUMP_DIR")]
    pub dump_dir: Option<String>,

    /// Cron expression with seconds [default: "0 */30 * * * *"]
    #[arg(long, env = "SCHEDULE")]
    pub schedule: Option<String>,

    /// AWS region of the destination bucket
    #[arg(long, env = "AWS_REGION")]
    pub aws_region: Option<String>,

    /// Destination bucket
    #[arg(long, env = "S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Custom endpoint for S3-compatible storage
    #[arg(long, env = "S3_ENDPOINT_URL")]
    pub s3_endpoint_url: Option<String>,

    /// Upload archives after creating them. Accepts 1/true/yes/on or
    /// 0/false/no/off [default: true]
    #[arg(long, env = "UPLOAD_ENABLED")]
    pub upload_enabled: Option<String>,

    /// Export tool [default: mongodump]
    #[arg(long, env = "EXPORT_TOOL")]
    pub export_tool: Option<String>,

    /// Archive tool [default: tar]
    #[arg(long, env = "ARCHIVE_TOOL")]
    pub archive_tool: Option<String>,

    /// First upload retry delay in milliseconds [default: 500]
    #[arg(long, env = "UPLOAD_RETRY_INITIAL_MS")]
    pub upload_retry_initial_ms: Option<String>,

    /// Total upload retry budget in seconds [default: 300]
    #[arg(long, env = "UPLOAD_RETRY_MAX_ELAPSED_SECS")]
    pub upload_retry_max_elapsed_secs: Option<String>,

    /// Log output: json or pretty [default: json]
    #[arg(long, env = "LOG_FORMAT")]
    pub log_format: Option<String>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            _ => Err("expected json or pretty".to_string()),
        }
    }
}

/// Upload settings, present when uploads are enabled.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadConfig {
    pub s3: S3Config,
    pub retry: RetryPolicy,
}

/// Validated configuration.
///
/// `Debug` output never contains the connection string.
#[derive(Debug, Clone)]
pub struct Config {
    pub job: JobConfig,
    pub schedule: String,
    pub upload: Option<UploadConfig>,
    pub log_format: LogFormat,
}

/// Parse boolean from environment variable, accepting common truthy values.
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true.
/// Accepts "0", "false", "no", "off" (case-insensitive) as false.
pub fn parse_bool_env(s: &str) -> Result<bool, String> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err("expected 1/true/yes/on or 0/false/no/off".to_string()),
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn required(value: &Option<String>, var: &'static str) -> Result<String, ConfigError> {
    present(value)
        .map(str::to_string)
        .ok_or(ConfigError::Missing { var })
}

fn parsed<T>(
    value: &Option<String>,
    var: &'static str,
    default: T,
    parse: impl FnOnce(&str) -> Result<T, String>,
) -> Result<T, ConfigError> {
    match present(value) {
        None => Ok(default),
        Some(raw) => parse(raw).map_err(|reason| ConfigError::Invalid {
            var,
            value: raw.to_string(),
            reason,
        }),
    }
}

fn positive_u64(raw: &str) -> Result<u64, String> {
    match raw.parse::<u64>() {
        Ok(0) => Err("must be greater than zero".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

impl Settings {
    /// The requested log format, falling back to JSON when unset or invalid.
    pub fn log_format(&self) -> LogFormat {
        present(&self.log_format)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }

    /// Apply defaults and validate.
    ///
    /// The schedule expression is only checked for presence here; parsing
    /// happens when the scheduler starts.
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let source_uri = required(&self.mongo_url, "MONGO_URL")?;
        let work_root = PathBuf::from(present(&self.dump_dir).unwrap_or(DEFAULT_DUMP_DIR));
        let schedule = present(&self.schedule)
            .unwrap_or(DEFAULT_SCHEDULE)
            .to_string();
        let export_tool = present(&self.export_tool)
            .unwrap_or(DEFAULT_EXPORT_TOOL)
            .to_string();
        let archive_tool = present(&self.archive_tool)
            .unwrap_or(DEFAULT_ARCHIVE_TOOL)
            .to_string();
        let log_format = parsed(&self.log_format, "LOG_FORMAT", LogFormat::Json, |raw| raw.parse())?;

        let upload_enabled = parsed(&self.upload_enabled, "UPLOAD_ENABLED", true, parse_bool_env)?;
        let upload = if upload_enabled {
            let defaults = RetryPolicy::default();
            let initial_ms = parsed(
                &self.upload_retry_initial_ms,
                "UPLOAD_RETRY_INITIAL_MS",
                defaults.initial_interval.as_millis() as u64,
                positive_u64,
            )?;
            let max_elapsed_secs = parsed(
                &self.upload_retry_max_elapsed_secs,
                "UPLOAD_RETRY_MAX_ELAPSED_SECS",
                defaults.max_elapsed_time.as_secs(),
                positive_u64,
            )?;

            Some(UploadConfig {
                s3: S3Config {
                    region: required(&self.aws_region, "AWS_REGION")?,
                    bucket: required(&self.s3_bucket, "S3_BUCKET")?,
                    endpoint_url: present(&self.s3_endpoint_url).map(str::to_string),
                },
                retry: RetryPolicy {
                    initial_interval: Duration::from_millis(initial_ms),
                    max_elapsed_time: Duration::from_secs(max_elapsed_secs),
                    ..defaults
                },
            })
        } else {
            None
        };

        Ok(Config {
            job: JobConfig {
                work_root,
                source_uri,
                export_tool,
                archive_tool,
            },
            schedule,
            upload,
            log_format,
        })
    }
}

impl Config {
    /// Create the working root if it does not exist.
    pub async fn prepare_work_root(&self) -> Result<(), ConfigError> {
        let path = &self.job.work_root;
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|source| ConfigError::WorkRoot {
                path: path.clone(),
                source,
            })
    }
}
