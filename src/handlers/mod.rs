// Subtitle service HTTP handlers
//
// This module contains the HTTP handlers for the subtitle service.
// It provides the interface between HTTP requests and the transcription queue.

pub mod authentication;
pub mod form;
pub mod routes;

// Re-export handlers for easier access
pub use self::routes::{api_status, queue_status, transcribe, transcription_options};
// Re-export authentication middleware
pub use self::authentication::Authentication;
