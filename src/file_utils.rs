// File utilities for the subtitle service
//
// This module contains utility functions for file operations: unique upload folders,
// saving uploads, cleaning up temporary files and deriving export file names.

use log::{error, info};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::JobPaths;
use crate::subtitles::OutputFormat;

/// Fallback stem when an upload has no usable name
const DEFAULT_STEM: &str = "subtitles";

/// Generate a unique filename with UUID and create a subfolder for it
///
/// # Arguments
///
/// * `base_dir` - Base directory for temporary files
/// * `prefix` - Prefix for the filename
/// * `extension` - File extension
///
/// # Returns
///
/// * `JobPaths` containing folder path, file path, and UUID
///
/// # Errors
///
/// Returns an IO error if directory creation fails
pub fn generate_unique_job_paths(
    base_dir: &str,
    prefix: &str,
    extension: &str,
) -> io::Result<JobPaths> {
    let uuid = Uuid::new_v4();
    let id = uuid.to_string();
    let filename = format!("{}_{}.{}", prefix, uuid, extension);

    let folder = Path::new(base_dir).join(&id);
    fs::create_dir_all(&folder)?;

    let audio_file = folder.join(&filename);

    Ok(JobPaths {
        folder,
        audio_file,
        id,
    })
}

/// Save uploaded file data to the filesystem
pub fn save_file_data(data: &[u8], file_path: &Path) -> io::Result<()> {
    let mut file = File::create(file_path)?;
    file.write_all(data)?;
    Ok(())
}

/// Clean up a folder and its contents
///
/// This function logs errors but doesn't return them to the caller
pub fn cleanup_folder(folder_path: &Path) {
    if let Err(e) = fs::remove_dir_all(folder_path) {
        error!("Failed to clean up folder {}: {}", folder_path.display(), e);
    } else {
        info!("Successfully cleaned up folder: {}", folder_path.display());
    }
}

/// Removes a job folder when dropped
///
/// Holding one across a transcription guarantees the upload is deleted whether the job
/// succeeds, fails or its request goes away.
pub struct FolderCleanup {
    folder: PathBuf,
}

impl FolderCleanup {
    pub fn new(folder: PathBuf) -> Self {
        Self { folder }
    }
}

impl Drop for FolderCleanup {
    fn drop(&mut self) {
        if self.folder.exists() {
            cleanup_folder(&self.folder);
        }
    }
}

/// Extension of an uploaded file, lowercased and restricted to alphanumerics
///
/// Returns `"audio"` when the name has no usable extension.
pub fn upload_extension(original_name: &str) -> String {
    Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .unwrap_or_else(|| String::from("audio"))
}

/// Reduce a client-provided file name to its last path component
///
/// Browsers on some platforms send full paths; both separators are stripped.
pub fn sanitize_file_name(original_name: &str) -> String {
    original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Derive the export file name for a transcript of `original_name`
///
/// `"interview.final.mp3"` with [`OutputFormat::Srt`] gives `"interview.final.srt"`.
pub fn subtitle_file_name(original_name: &str, format: OutputFormat) -> String {
    let name = sanitize_file_name(original_name);
    let stem = Path::new(&name)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.replace('"', ""))
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| String::from(DEFAULT_STEM));
    format!("{}.{}", stem.trim(), format.extension())
}
