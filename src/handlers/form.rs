// Form data processing for the subtitle service
//
// This module handles the extraction of multipart form data for transcription requests:
// the audio upload and the optional transcription parameters. Every check here runs before
// the job is admitted, so a malformed request never enters the queue.

use actix_multipart::Multipart;
use futures::{StreamExt, TryStreamExt};
use log::{error, info};
use std::path::PathBuf;

use crate::config::{HandlerConfig, JobPaths};
use crate::error::HandlerError;
use crate::file_utils::{
    generate_unique_job_paths, sanitize_file_name, save_file_data, upload_extension,
};
use crate::models::TranscriptionParams;

/// Form field names accepted for the audio upload
const AUDIO_FIELDS: [&str; 2] = ["audio", "file"];

/// Extract and process multipart form data for transcription requests
///
/// # Arguments
///
/// * `form` - The multipart form from the HTTP request
/// * `config` - Handler configuration
///
/// # Returns
///
/// * `Result<(TranscriptionParams, JobPaths), HandlerError>` - Extracted parameters and job paths, or an error
pub async fn extract_form_data(
    mut form: Multipart,
    config: &HandlerConfig,
) -> Result<(TranscriptionParams, JobPaths), HandlerError> {
    let mut params = TranscriptionParams {
        language: config.default_language.clone(),
        model: config.default_model.clone(),
        task: config.default_task,
        response_format: config.default_output_format,
        ..Default::default()
    };

    let mut job_paths: Option<JobPaths> = None;

    config.ensure_temp_dir().map_err(|e| {
        error!("Failed to create main tmp directory: {}", e);
        HandlerError::FileError(e)
    })?;

    loop {
        // Upload saved so far, removed again if a later field is rejected
        let saved_folder: Option<PathBuf> = job_paths.as_ref().map(|paths| paths.folder.clone());

        let mut field = match form.try_next().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return Err(
                    HandlerError::form_error(format!("Malformed multipart body: {}", e))
                        .with_cleanup(saved_folder.as_ref()),
                );
            }
        };

        let content_disposition = field.content_disposition();
        let field_name = content_disposition
            .and_then(|cd| cd.get_name().map(|name| name.to_string()))
            .unwrap_or_default();
        let file_name = content_disposition
            .and_then(|cd| cd.get_filename().map(|name| name.to_string()));

        match field_name.as_str() {
            "language" | "model" | "task" | "response_format" => {
                let mut value = String::new();
                while let Some(chunk) = field.next().await {
                    let chunk = chunk.map_err(|e| {
                        HandlerError::form_error(format!(
                            "Error reading field {}: {}",
                            field_name, e
                        ))
                        .with_cleanup(saved_folder.as_ref())
                    })?;
                    if let Ok(s) = std::str::from_utf8(&chunk) {
                        value.push_str(s);
                    }
                }

                let value = value.trim().to_string();
                if value.is_empty() {
                    continue;
                }
                match field_name.as_str() {
                    "language" => params.language = value,
                    "model" => params.model = value,
                    "task" => {
                        params.task = value.parse().map_err(|v| {
                            HandlerError::InvalidTask(v).with_cleanup(saved_folder.as_ref())
                        })?;
                    }
                    "response_format" => {
                        params.response_format = value.parse().map_err(|v| {
                            HandlerError::InvalidOutputFormat(v)
                                .with_cleanup(saved_folder.as_ref())
                        })?;
                    }
                    _ => {}
                }
            }
            name if AUDIO_FIELDS.contains(&name) && job_paths.is_none() => {
                let original_name = file_name
                    .as_deref()
                    .map(sanitize_file_name)
                    .filter(|name| !name.is_empty());

                let paths = generate_unique_job_paths(
                    &config.temp_dir,
                    "upload",
                    &upload_extension(original_name.as_deref().unwrap_or_default()),
                )
                .map_err(|e| {
                    error!("Failed to create unique directory: {}", e);
                    HandlerError::FileError(e)
                })?;

                let mut total_size = 0;
                let mut file_data = Vec::new();

                while let Some(chunk) = field.next().await {
                    let data = chunk.map_err(|e| {
                        HandlerError::form_error(format!("Error processing file upload: {}", e))
                            .with_cleanup(Some(&paths.folder))
                    })?;

                    total_size += data.len();
                    if total_size > config.max_file_size {
                        return Err(HandlerError::FileTooLarge(total_size, config.max_file_size)
                            .with_cleanup(Some(&paths.folder)));
                    }

                    file_data.extend_from_slice(&data);
                }

                if file_data.is_empty() {
                    return Err(HandlerError::NoAudioFile.with_cleanup(Some(&paths.folder)));
                }

                save_file_data(&file_data, &paths.audio_file)
                    .map_err(|e| HandlerError::FileError(e).with_cleanup(Some(&paths.folder)))?;

                info!(
                    "Saved audio file '{}' ({} bytes) to {}",
                    original_name.as_deref().unwrap_or("<unnamed>"),
                    total_size,
                    paths.audio_file.display()
                );

                params.original_name = original_name;
                job_paths = Some(paths);
            }
            _ => {
                // Skip unknown fields
                while field.next().await.is_some() {}
            }
        }
    }

    let job_paths = job_paths.ok_or(HandlerError::NoAudioFile)?;

    Ok((params, job_paths))
}
