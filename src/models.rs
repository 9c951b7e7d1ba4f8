// Subtitle service data models
//
// This module contains the request and response types used across the HTTP API.

use serde::Serialize;

use crate::subtitles::{OutputFormat, SubtitleEntry};
use crate::transcriber::TranscriptionTask;

/// Request parameters for transcription
#[derive(Debug, Default)]
pub struct TranscriptionParams {
    /// Language for transcription (e.g., "en", "zh", "auto")
    pub language: String,
    /// Model to use (e.g., "base", "large-v3")
    pub model: String,
    /// Transcribe or translate
    pub task: TranscriptionTask,
    /// Response format
    pub response_format: OutputFormat,
    /// Original name of the uploaded file, when the client sent one
    pub original_name: Option<String>,
}

/// Response for a completed transcription in JSON format
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionResponse {
    /// Success flag
    pub success: bool,
    /// Queue label of the job (the uploaded file name)
    pub label: String,
    /// Language reported by the transcription tool
    pub language: String,
    /// Number of subtitle entries
    pub segments: usize,
    /// Suggested file name when saving the subtitles
    pub file_name: String,
    /// Subtitle entries, in the editor's import format
    pub data: Vec<SubtitleEntry>,
}

/// Error response for API
#[derive(Serialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Optional status information
    pub status: Option<String>,
}
