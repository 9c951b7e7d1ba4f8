//! Transcription invoker
//!
//! This module runs the external speech-recognition tool for one admitted job. The tool is a
//! black box driven through its command line: it reports progress on stdout as
//! `[PROGRESS] <percent>` lines, prints a one-line JSON summary when done, writes the transcript
//! JSON to the `--output` path and signals failure with a non-zero exit code and diagnostics on
//! stderr.

use log::{debug, error, info, warn};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::subtitles::Transcript;

const DEFAULT_TRANSCRIBE_CMD: &str = "python3";
const DEFAULT_TRANSCRIBE_SCRIPT: &str = "scripts/whisper_transcribe.py";
const DEFAULT_TRANSCRIBE_DEVICE: &str = "cpu";
const DEFAULT_TRANSCRIBE_THREADS: usize = 8;

// Environment variable names
const ENV_TRANSCRIBE_CMD: &str = "TRANSCRIBE_CMD";
const ENV_TRANSCRIBE_SCRIPT: &str = "TRANSCRIBE_SCRIPT";
const ENV_TRANSCRIBE_DEVICE: &str = "TRANSCRIBE_DEVICE";
const ENV_TRANSCRIBE_THREADS: &str = "TRANSCRIBE_THREADS";
const ENV_WHISPER_MODELS_DIR: &str = "WHISPER_MODELS_DIR";

/// File name of the transcript inside the job folder
pub const TRANSCRIPT_FILE_NAME: &str = "transcript.json";

const PROGRESS_MARKER: &str = "[PROGRESS]";

/// Configuration for the transcription tool
#[derive(Clone, Debug)]
pub struct TranscriberConfig {
    /// Executable to launch
    pub command_path: String,
    /// Script passed as first argument, if the executable is an interpreter
    pub script_path: Option<String>,
    /// Inference device, fixed for every job
    pub device: String,
    /// CPU threads, fixed for every job
    pub threads: usize,
    /// Models directory forwarded to the tool's environment
    pub models_dir: Option<String>,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        let script_path = std::env::var(ENV_TRANSCRIBE_SCRIPT)
            .unwrap_or_else(|_| String::from(DEFAULT_TRANSCRIBE_SCRIPT));

        Self {
            command_path: std::env::var(ENV_TRANSCRIBE_CMD)
                .unwrap_or_else(|_| String::from(DEFAULT_TRANSCRIBE_CMD)),
            script_path: Some(script_path).filter(|s| !s.trim().is_empty()),
            device: std::env::var(ENV_TRANSCRIBE_DEVICE)
                .unwrap_or_else(|_| String::from(DEFAULT_TRANSCRIBE_DEVICE)),
            threads: std::env::var(ENV_TRANSCRIBE_THREADS)
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|threads| *threads > 0)
                .unwrap_or(DEFAULT_TRANSCRIBE_THREADS),
            models_dir: std::env::var(ENV_WHISPER_MODELS_DIR)
                .ok()
                .filter(|s| !s.trim().is_empty()),
        }
    }
}

/// What the tool should do with the audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TranscriptionTask {
    /// Transcribe in the spoken language
    #[default]
    Transcribe,
    /// Translate the speech to English
    Translate,
}

impl TranscriptionTask {
    pub fn as_str(self) -> &'static str {
        match self {
            TranscriptionTask::Transcribe => "transcribe",
            TranscriptionTask::Translate => "translate",
        }
    }
}

impl FromStr for TranscriptionTask {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "transcribe" => Ok(TranscriptionTask::Transcribe),
            "translate" => Ok(TranscriptionTask::Translate),
            _ => Err(s.to_string()),
        }
    }
}

impl fmt::Display for TranscriptionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transcription job structure
#[derive(Debug, Clone)]
pub struct TranscriptionJob {
    /// Unique identifier for the job
    pub id: String,
    /// Original file name of the upload, used as the queue label
    pub label: String,
    /// Path to the audio file
    pub audio_file: PathBuf,
    /// Path to the folder containing the job files
    pub folder_path: PathBuf,
    /// Model name to use
    pub model: String,
    /// Language code, "auto" lets the tool detect it
    pub language: String,
    /// Transcribe or translate
    pub task: TranscriptionTask,
}

impl TranscriptionJob {
    /// Where the tool is asked to write the transcript
    pub fn output_path(&self) -> PathBuf {
        self.folder_path.join(TRANSCRIPT_FILE_NAME)
    }
}

/// Final stdout line printed by the tool
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ToolSummary {
    /// Number of entries the tool claims to have written
    pub segments: Option<usize>,
    /// Detected or requested language
    pub language: Option<String>,
}

/// Result of one successful run
#[derive(Debug, Clone)]
pub struct TranscriptionOutput {
    pub transcript: Transcript,
    /// Language reported by the tool, falls back to the requested one
    pub language: String,
}

/// Transcription error types
#[derive(Error, Debug)]
pub enum TranscribeError {
    /// The tool could not be started
    #[error("Failed to run command '{command}': {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },
    /// The tool ran and exited with a failure status
    #[error("Transcription process failed ({}): {stderr}", exit_label(.code))]
    ProcessFailed { code: Option<i32>, stderr: String },
    /// I/O error while talking to the tool or reading its output
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The transcript file is not valid
    #[error("Invalid transcript output: {0}")]
    InvalidOutput(#[from] serde_json::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => String::from("terminated by signal"),
    }
}

/// Parse a `[PROGRESS] <n>` marker line, values above 100 are clamped
pub fn parse_progress_line(line: &str) -> Option<u8> {
    let value = line.trim().strip_prefix(PROGRESS_MARKER)?.trim();
    let percent = value.parse::<u32>().ok()?.min(100);
    u8::try_from(percent).ok()
}

/// Parse the JSON summary line, ignoring anything else
pub fn parse_summary_line(line: &str) -> Option<ToolSummary> {
    let line = line.trim();
    if !line.starts_with('{') {
        return None;
    }
    serde_json::from_str(line).ok()
}

/// Runs the external transcription tool
#[derive(Clone, Debug)]
pub struct Transcriber {
    config: TranscriberConfig,
}

impl Transcriber {
    pub fn new(config: TranscriberConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TranscriberConfig {
        &self.config
    }

    /// Build the command line for a job
    fn command(&self, job: &TranscriptionJob) -> Command {
        let mut command = Command::new(&self.config.command_path);

        if let Some(script) = &self.config.script_path {
            command.arg(script);
        }

        command
            .arg("--audio")
            .arg(&job.audio_file)
            .arg("--output")
            .arg(job.output_path())
            .arg("--model")
            .arg(&job.model)
            .arg("--language")
            .arg(&job.language)
            .arg("--task")
            .arg(job.task.as_str())
            .arg("--device")
            .arg(&self.config.device)
            .arg("--threads")
            .arg(self.config.threads.to_string());

        if let Some(models_dir) = &self.config.models_dir {
            command.env(ENV_WHISPER_MODELS_DIR, models_dir);
        }

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        command
    }

    /// Run the tool for `job`, calling `on_progress` for every progress marker
    pub async fn run<P>(
        &self,
        job: &TranscriptionJob,
        mut on_progress: P,
    ) -> Result<TranscriptionOutput, TranscribeError>
    where
        P: FnMut(u8),
    {
        let start_time = std::time::Instant::now();
        info!(
            "Job {}: running {} (model {}, language {}, task {})",
            job.id, self.config.command_path, job.model, job.language, job.task
        );

        let mut child = self
            .command(job)
            .spawn()
            .map_err(|source| TranscribeError::Launch {
                command: self.config.command_path.clone(),
                source,
            })?;

        // Drain stderr on its own task so a chatty tool never blocks on a full pipe
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buffer = Vec::new();
                if let Err(e) = stderr.read_to_end(&mut buffer).await {
                    warn!("Failed to read tool stderr: {}", e);
                }
                String::from_utf8_lossy(&buffer).into_owned()
            })
        });

        let mut summary = None;
        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                if let Some(percent) = parse_progress_line(&line) {
                    debug!("Job {}: progress {}%", job.id, percent);
                    on_progress(percent);
                } else if let Some(parsed) = parse_summary_line(&line) {
                    summary = Some(parsed);
                } else if !line.trim().is_empty() {
                    debug!("Job {}: {}", job.id, line);
                }
            }
        }

        let status = child.wait().await?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            debug!("Job {} stderr: {}", job.id, line);
        }

        if !status.success() {
            error!(
                "Job {}: transcription tool failed with {} after {:.1}s",
                job.id,
                exit_label(&status.code()),
                start_time.elapsed().as_secs_f64()
            );
            return Err(TranscribeError::ProcessFailed {
                code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        let content = tokio::fs::read_to_string(job.output_path()).await?;
        let transcript: Transcript = serde_json::from_str(&content)?;

        let (reported_segments, reported_language) = match summary {
            Some(summary) => (summary.segments, summary.language),
            None => (None, None),
        };
        if let Some(segments) = reported_segments.filter(|n| *n != transcript.len()) {
            warn!(
                "Job {}: tool reported {} segments but the transcript holds {}",
                job.id,
                segments,
                transcript.len()
            );
        }
        let language = reported_language.unwrap_or_else(|| job.language.clone());

        info!(
            "Job {}: {} subtitle entries in {:.1}s",
            job.id,
            transcript.len(),
            start_time.elapsed().as_secs_f64()
        );

        Ok(TranscriptionOutput {
            transcript,
            language,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress_line() {
        assert_eq!(parse_progress_line("[PROGRESS] 10"), Some(10));
        assert_eq!(parse_progress_line("  [PROGRESS] 100  "), Some(100));
        assert_eq!(parse_progress_line("[PROGRESS] 250"), Some(100));
        assert_eq!(parse_progress_line("[PROGRESS] 300"), Some(100));
        assert_eq!(parse_progress_line("[PROGRESS] -5"), None);
        assert_eq!(parse_progress_line("[PROGRESS] abc"), None);
        assert_eq!(parse_progress_line("[INFO] loading model"), None);
    }

    #[test]
    fn test_parse_summary_line() {
        let summary = parse_summary_line(
            r#"{"success": true, "segments": 3, "language": "en", "output": "/tmp/x.json"}"#,
        )
        .unwrap();
        assert_eq!(summary.segments, Some(3));
        assert_eq!(summary.language.as_deref(), Some("en"));
        assert!(parse_summary_line("[PROGRESS] 5").is_none());
        assert!(parse_summary_line("{not json").is_none());
    }

    #[test]
    fn test_task_from_str() {
        assert_eq!(
            "Translate".parse::<TranscriptionTask>(),
            Ok(TranscriptionTask::Translate)
        );
        assert_eq!(
            "transcribe".parse::<TranscriptionTask>(),
            Ok(TranscriptionTask::Transcribe)
        );
        assert!("summarize".parse::<TranscriptionTask>().is_err());
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::path::Path;

        const OK_SCRIPT: &str = r#"
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output) out="$2"; shift ;;
  esac
  shift
done
echo "[INFO] loading" >&2
echo "[PROGRESS] 10"
echo "[PROGRESS] 50"
printf '{"data": [{"time": 0.0, "text": "hello"}, {"time": 1.5, "text": "world"}]}' > "$out"
echo "[PROGRESS] 100"
echo '{"success": true, "segments": 2, "language": "en", "output": "x"}'
"#;

        const ARGS_SCRIPT: &str = r#"
echo "$@" > "$(dirname "$4")/args.txt"
printf '{"data": []}' > "$4"
"#;

        const FAILING_SCRIPT: &str = r#"
echo "[PROGRESS] 10"
echo "model not found" >&2
exit 3
"#;

        const BINARY_STDERR_SCRIPT: &str = r#"
printf 'CUDA error \377 device\n' >&2
exit 1
"#;

        fn job_folder() -> PathBuf {
            let folder = std::env::temp_dir().join(format!(
                "subtitle_studio_test_{}",
                uuid::Uuid::new_v4()
            ));
            std::fs::create_dir_all(&folder).unwrap();
            folder
        }

        fn transcriber_for(script: &str, folder: &Path) -> Transcriber {
            let script_path = folder.join("tool.sh");
            std::fs::write(&script_path, script).unwrap();
            Transcriber::new(TranscriberConfig {
                command_path: "sh".to_string(),
                script_path: Some(script_path.to_string_lossy().into_owned()),
                device: "cpu".to_string(),
                threads: 2,
                models_dir: None,
            })
        }

        fn job_in(folder: &Path) -> TranscriptionJob {
            let audio_file = folder.join("audio.wav");
            std::fs::write(&audio_file, b"RIFF").unwrap();
            TranscriptionJob {
                id: "job-1".to_string(),
                label: "talk.wav".to_string(),
                audio_file,
                folder_path: folder.to_path_buf(),
                model: "base".to_string(),
                language: "auto".to_string(),
                task: TranscriptionTask::Translate,
            }
        }

        #[tokio::test]
        async fn test_successful_run_reads_transcript_and_progress() {
            let folder = job_folder();
            let transcriber = transcriber_for(OK_SCRIPT, &folder);
            let mut progress = Vec::new();

            let output = transcriber
                .run(&job_in(&folder), |percent| progress.push(percent))
                .await
                .unwrap();

            assert_eq!(progress, vec![10, 50, 100]);
            assert_eq!(output.language, "en");
            assert_eq!(output.transcript.len(), 2);
            assert_eq!(output.transcript.data[1].text, "world");
            std::fs::remove_dir_all(&folder).unwrap();
        }

        #[tokio::test]
        async fn test_command_line_arguments() {
            let folder = job_folder();
            let transcriber = transcriber_for(ARGS_SCRIPT, &folder);
            let job = job_in(&folder);

            let output = transcriber.run(&job, |_| {}).await.unwrap();
            assert!(output.transcript.is_empty());
            assert_eq!(output.language, "auto");

            let args = std::fs::read_to_string(folder.join("args.txt")).unwrap();
            let expected = format!(
                "--audio {} --output {} --model base --language auto --task translate --device cpu --threads 2",
                job.audio_file.display(),
                job.output_path().display()
            );
            assert_eq!(args.trim(), expected);
            std::fs::remove_dir_all(&folder).unwrap();
        }

        #[tokio::test]
        async fn test_non_zero_exit_is_reported_with_stderr() {
            let folder = job_folder();
            let transcriber = transcriber_for(FAILING_SCRIPT, &folder);

            let err = transcriber
                .run(&job_in(&folder), |_| {})
                .await
                .unwrap_err();
            match err {
                TranscribeError::ProcessFailed { code, stderr } => {
                    assert_eq!(code, Some(3));
                    assert_eq!(stderr, "model not found");
                }
                other => panic!("unexpected error: {}", other),
            }
            std::fs::remove_dir_all(&folder).unwrap();
        }

        #[tokio::test]
        async fn test_stderr_with_invalid_utf8_keeps_diagnostics() {
            let folder = job_folder();
            let transcriber = transcriber_for(BINARY_STDERR_SCRIPT, &folder);

            let err = transcriber
                .run(&job_in(&folder), |_| {})
                .await
                .unwrap_err();
            match err {
                TranscribeError::ProcessFailed { code, stderr } => {
                    assert_eq!(code, Some(1));
                    assert!(stderr.starts_with("CUDA error "));
                    assert!(stderr.ends_with(" device"));
                }
                other => panic!("unexpected error: {}", other),
            }
            std::fs::remove_dir_all(&folder).unwrap();
        }

        #[tokio::test]
        async fn test_missing_tool_is_a_launch_error() {
            let folder = job_folder();
            let transcriber = Transcriber::new(TranscriberConfig {
                command_path: folder.join("missing-tool").to_string_lossy().into_owned(),
                script_path: None,
                device: "cpu".to_string(),
                threads: 1,
                models_dir: None,
            });

            let err = transcriber
                .run(&job_in(&folder), |_| {})
                .await
                .unwrap_err();
            assert!(matches!(err, TranscribeError::Launch { .. }));
            assert!(err.to_string().contains("missing-tool"));
            std::fs::remove_dir_all(&folder).unwrap();
        }
    }
}
