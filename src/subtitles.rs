// Subtitle data model for the subtitle service
//
// This module contains the transcript structure shared by the transcription tool, the HTTP
// API and the browser editor, plus the export formats the API can render it to.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How long the last cue stays on screen when rendering timed formats
pub const DEFAULT_CUE_SECONDS: f64 = 3.0;

/// Valid output formats
pub const VALID_OUTPUT_FORMATS: [&str; 4] = ["json", "srt", "vtt", "txt"];

/// One subtitle line, displayed from `time` until the next entry starts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubtitleEntry {
    /// Start time in seconds
    pub time: f64,
    /// Subtitle text
    pub text: String,
}

/// Transcript as written by the transcription tool and imported by the editor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Transcript {
    #[serde(default)]
    pub data: Vec<SubtitleEntry>,
}

/// Output format for transcription results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Srt,
    Vtt,
    Txt,
}

impl OutputFormat {
    /// File extension, also the name accepted in requests
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Srt => "srt",
            OutputFormat::Vtt => "vtt",
            OutputFormat::Txt => "txt",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Json => "application/json",
            OutputFormat::Srt => "application/x-subrip; charset=utf-8",
            OutputFormat::Vtt => "text/vtt; charset=utf-8",
            OutputFormat::Txt => "text/plain; charset=utf-8",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "srt" => Ok(OutputFormat::Srt),
            "vtt" => Ok(OutputFormat::Vtt),
            "txt" => Ok(OutputFormat::Txt),
            _ => Err(s.to_string()),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl Transcript {
    /// Number of subtitle entries
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Entries ordered by start time, paired with their end time
    fn cues(&self) -> Vec<(f64, f64, &str)> {
        let mut entries: Vec<&SubtitleEntry> = self.data.iter().collect();
        entries.sort_by(|a, b| a.time.total_cmp(&b.time));

        entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let end = entries
                    .get(i + 1)
                    .map(|next| next.time)
                    .unwrap_or(entry.time + DEFAULT_CUE_SECONDS);
                (entry.time, end.max(entry.time), entry.text.trim())
            })
            .collect()
    }

    /// Render the transcript in the requested format
    pub fn render(&self, format: OutputFormat) -> Result<String, serde_json::Error> {
        let rendered = match format {
            OutputFormat::Json => serde_json::to_string_pretty(self)?,
            OutputFormat::Srt => self
                .cues()
                .iter()
                .enumerate()
                .map(|(i, (start, end, text))| {
                    format!(
                        "{}\n{} --> {}\n{}\n",
                        i + 1,
                        format_timestamp(*start, ','),
                        format_timestamp(*end, ','),
                        text
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
            OutputFormat::Vtt => {
                let mut out = String::from("WEBVTT\n");
                for (start, end, text) in self.cues() {
                    out.push_str(&format!(
                        "\n{} --> {}\n{}\n",
                        format_timestamp(start, '.'),
                        format_timestamp(end, '.'),
                        text
                    ));
                }
                out
            }
            OutputFormat::Txt => self
                .cues()
                .iter()
                .map(|(_, _, text)| format!("{}\n", text))
                .collect(),
        };
        Ok(rendered)
    }
}

/// Format seconds as `HH:MM:SS<sep>mmm`
pub fn format_timestamp(seconds: f64, millis_separator: char) -> String {
    let total_millis = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_millis / 3_600_000;
    let minutes = (total_millis / 60_000) % 60;
    let secs = (total_millis / 1000) % 60;
    let millis = total_millis % 1000;
    format!(
        "{:02}:{:02}:{:02}{}{:03}",
        hours, minutes, secs, millis_separator, millis
    )
}
