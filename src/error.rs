// Error handling for the subtitle service
//
// This module defines the HTTP-facing error type. Queue and transcription errors are
// converted into it so that every failure reaches the original caller as a JSON body.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use actix_web::{HttpResponse, ResponseError};

use crate::models::ErrorResponse;
use crate::queue_manager::QueueError;
use crate::subtitles::VALID_OUTPUT_FORMATS;
use crate::transcriber::TranscribeError;

/// Errors that can occur in the HTTP handlers
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Error when processing multipart form data
    #[error("Form error: {0}")]
    FormError(String),

    /// Error when saving or reading file data
    #[error("File error: {0}")]
    FileError(#[from] io::Error),

    /// Error when no audio file was provided
    #[error("No audio file provided in the request")]
    NoAudioFile,

    /// Error with an invalid output format
    #[error("Invalid output format: {0}. Valid formats are: {formats}", formats = VALID_OUTPUT_FORMATS.join(", "))]
    InvalidOutputFormat(String),

    /// Error with an invalid task
    #[error("Invalid task: {0}. Valid tasks are: transcribe, translate")]
    InvalidTask(String),

    /// Error when a file is too large
    #[error("File too large: {0} bytes exceeds limit of {1} bytes")]
    FileTooLarge(usize, usize),

    /// Error when the waiting list is full
    #[error("Queue is full: {0} jobs already waiting, try again later")]
    QueueFull(usize),

    /// Error when the queue lost the job before it started
    #[error("Queue error: {0}")]
    QueueError(String),

    /// Error reported by the transcription tool
    #[error("Transcription failed: {0}")]
    TranscriptionError(String),

    /// Error when rendering the transcript
    #[error("Failed to render transcript: {0}")]
    RenderError(#[from] serde_json::Error),
}

impl HandlerError {
    /// Create a new FormError
    pub fn form_error<S: Into<String>>(msg: S) -> Self {
        Self::FormError(msg.into())
    }

    /// Helper to clean up a folder when error occurs
    pub fn with_cleanup(self, folder: Option<&PathBuf>) -> Self {
        if let Some(folder) = folder {
            crate::file_utils::cleanup_folder(folder);
        }
        self
    }
}

impl ResponseError for HandlerError {
    fn error_response(&self) -> HttpResponse {
        let error_response = ErrorResponse {
            error: self.to_string(),
            status: None,
        };

        match self {
            HandlerError::NoAudioFile
            | HandlerError::InvalidOutputFormat(_)
            | HandlerError::InvalidTask(_)
            | HandlerError::FormError(_) => HttpResponse::BadRequest().json(error_response),
            HandlerError::FileTooLarge(_, _) => {
                HttpResponse::PayloadTooLarge().json(error_response)
            }
            HandlerError::QueueFull(_) => HttpResponse::ServiceUnavailable().json(error_response),
            _ => HttpResponse::InternalServerError().json(error_response),
        }
    }
}

/// Convert QueueError to HandlerError
impl From<QueueError> for HandlerError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::QueueFull(max) => HandlerError::QueueFull(max),
            QueueError::Abandoned => HandlerError::QueueError(err.to_string()),
        }
    }
}

/// Convert TranscribeError to HandlerError
impl From<TranscribeError> for HandlerError {
    fn from(err: TranscribeError) -> Self {
        HandlerError::TranscriptionError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn test_admission_errors_are_client_errors() {
        assert_eq!(
            HandlerError::NoAudioFile.error_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            HandlerError::InvalidTask("summarize".into())
                .error_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            HandlerError::FileTooLarge(10, 5).error_response().status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn test_queue_and_execution_errors() {
        let full = HandlerError::from(QueueError::QueueFull(4));
        assert_eq!(full.error_response().status(), StatusCode::SERVICE_UNAVAILABLE);

        let failed = HandlerError::from(TranscribeError::ProcessFailed {
            code: Some(1),
            stderr: "out of memory".to_string(),
        });
        assert_eq!(
            failed.error_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            failed.to_string(),
            "Transcription failed: Transcription process failed (exit code 1): out of memory"
        );
    }

    #[test]
    fn test_invalid_format_lists_valid_formats() {
        assert_eq!(
            HandlerError::InvalidOutputFormat("docx".into()).to_string(),
            "Invalid output format: docx. Valid formats are: json, srt, vtt, txt"
        );
    }
}
