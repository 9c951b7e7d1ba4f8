// Subtitle Studio Library
//
// This crate provides the backend of a subtitle editor: an HTTP API that turns uploaded audio
// into timed subtitle entries by running an external transcription tool.
// Transcriptions go through a queue that runs one job at a time.

pub mod config;
pub mod config_loader;
pub mod config_validator;
pub mod error;
pub mod file_utils;
pub mod handlers;
pub mod models;
pub mod queue_manager;
pub mod subtitles;
pub mod transcriber;

// Re-export common types for easier access
pub use config::{AuthConfig, HandlerConfig, QueueConfig, ServerConfig};
pub use error::HandlerError;
pub use handlers::{api_status, queue_status, transcribe, transcription_options, Authentication};
pub use models::{ErrorResponse, TranscriptionResponse};
pub use queue_manager::{JobContext, QueueError, QueueManager, QueueStatus};
pub use subtitles::{OutputFormat, SubtitleEntry, Transcript};
pub use transcriber::{Transcriber, TranscriberConfig, TranscriptionJob, TranscriptionTask};
