// Subtitle service configuration
//
// This module contains configuration structures and constants for the subtitle service.
// It centralizes all configuration parameters and provides defaults from environment variables.

use std::env;
use std::path::PathBuf;

use crate::config_validator::validators;
use crate::subtitles::OutputFormat;
use crate::transcriber::TranscriptionTask;

/// Default values for configuration
pub mod defaults {
    // Server binding
    pub const HOST: &str = "127.0.0.1";
    pub const PORT: u16 = 3000;

    // Client disconnect timeout and keep-alive, in seconds
    pub const TIMEOUT_SECONDS: u64 = 480;
    pub const KEEPALIVE_SECONDS: u64 = 480;

    // HTTP workers, 0 means one per CPU core
    pub const WORKERS: usize = 0;

    // Temporary directory for uploaded audio
    pub const TEMP_DIR: &str = "./tmp/uploads";

    // Upload size limit (512MB)
    pub const MAX_FILE_SIZE: usize = 536_870_912;

    // Default transcription parameters
    pub const MODEL: &str = "base";
    pub const LANGUAGE: &str = "zh";
    pub const TASK: &str = "transcribe";
    pub const OUTPUT_FORMAT: &str = "json";

    // Waiting list bound, 0 means unbounded
    pub const MAX_WAITING_JOBS: usize = 0;

    // Bearer authentication is opt-in
    pub const ENABLE_AUTHORIZATION: bool = false;
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Read a boolean flag with the same spellings the startup validator accepts
fn env_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|s| validators::validate_boolean(key, s.trim()).ok())
        .unwrap_or(default)
}

/// HTTP server settings
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Client disconnect timeout in seconds
    pub timeout: u64,
    /// Keep-alive in seconds
    pub keepalive: u64,
    /// Number of HTTP workers, 0 = CPU count
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: env::var("SUBTITLE_API_HOST").unwrap_or_else(|_| String::from(defaults::HOST)),
            port: env_parse("SUBTITLE_API_PORT", defaults::PORT),
            timeout: env_parse("SUBTITLE_API_TIMEOUT", defaults::TIMEOUT_SECONDS),
            keepalive: env_parse("SUBTITLE_API_KEEPALIVE", defaults::KEEPALIVE_SECONDS),
            workers: env_parse("HTTP_WORKER_NUMBER", defaults::WORKERS),
        }
    }
}

impl ServerConfig {
    /// Worker count with the CPU-count fallback applied
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Configuration for the HTTP handlers
#[derive(Clone, Debug)]
pub struct HandlerConfig {
    /// Directory to store uploaded files
    pub temp_dir: String,
    /// Maximum upload size in bytes
    pub max_file_size: usize,
    /// Model used when the request does not name one
    pub default_model: String,
    /// Language used when the request does not name one
    pub default_language: String,
    /// Task used when the request does not name one
    pub default_task: TranscriptionTask,
    /// Response format used when the request does not name one
    pub default_output_format: OutputFormat,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            temp_dir: env::var("SUBTITLE_TMP_FILES")
                .unwrap_or_else(|_| String::from(defaults::TEMP_DIR)),
            max_file_size: env_parse("MAX_FILE_SIZE", defaults::MAX_FILE_SIZE),
            default_model: env::var("DEFAULT_MODEL")
                .unwrap_or_else(|_| String::from(defaults::MODEL)),
            default_language: env::var("DEFAULT_LANGUAGE")
                .unwrap_or_else(|_| String::from(defaults::LANGUAGE)),
            default_task: env_parse("DEFAULT_TASK", TranscriptionTask::Transcribe),
            default_output_format: env_parse("DEFAULT_OUTPUT_FORMAT", OutputFormat::Json),
        }
    }
}

impl HandlerConfig {
    /// Ensures the temporary directory exists
    pub fn ensure_temp_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.temp_dir)
    }
}

/// Configuration for the admission queue
#[derive(Clone, Debug)]
pub struct QueueConfig {
    /// Waiting list bound, 0 = unbounded
    pub max_waiting_jobs: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_waiting_jobs: env_parse("MAX_WAITING_JOBS", defaults::MAX_WAITING_JOBS),
        }
    }
}

impl QueueConfig {
    pub fn max_waiting(&self) -> Option<usize> {
        Some(self.max_waiting_jobs).filter(|max| *max > 0)
    }
}

/// Bearer token authentication settings
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub enabled: bool,
    /// Expected token; when enabled without a token every request is rejected
    pub token: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: env_flag("ENABLE_AUTHORIZATION", defaults::ENABLE_AUTHORIZATION),
            token: env::var("API_TOKEN")
                .ok()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
        }
    }
}

/// Represents the path to a job's files
#[derive(Debug, Clone)]
pub struct JobPaths {
    /// Unique folder for this job
    pub folder: PathBuf,
    /// Audio file path
    pub audio_file: PathBuf,
    /// Job ID (UUID)
    pub id: String,
}
