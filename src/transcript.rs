//! Transcript sources
//!
//! A [`TranscriptFetcher`] turns a content identifier into plain text that can
//! be chunked and indexed. [`FileTranscriptFetcher`] reads local files and
//! strips subtitle markup from SubRip (`.srt`), WebVTT (`.vtt`) and YouTube
//! `json3` captions; anything else is treated as plain text.

use crate::error::{RagPersonaError, Result};
use crate::text_utils::clean_text;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::path::Path;

/// Text fetched from a transcript source
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    /// Suggested source label
    pub label: String,
    /// Identifier the text was fetched from
    pub origin: String,
    pub text: String,
}

/// Produces transcript text for a content identifier
#[async_trait]
pub trait TranscriptFetcher: Send + Sync {
    /// Fetch the transcript behind `identifier`
    ///
    /// # Errors
    ///
    /// Returns `NoTranscriptAvailable` if the source holds no usable text.
    async fn fetch(&self, identifier: &str) -> Result<Transcript>;
}

/// Subtitle and caption formats recognised by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptFormat {
    Srt,
    Vtt,
    Json3,
    PlainText,
}

impl TranscriptFormat {
    /// Detect the format from a file path's extension
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("srt") => Self::Srt,
            Some("vtt") => Self::Vtt,
            Some("json3") | Some("json") => Self::Json3,
            _ => Self::PlainText,
        }
    }
}

/// Reads transcripts from the local filesystem
pub struct FileTranscriptFetcher {
    timestamp: Regex,
    inline_tag: Regex,
}

impl FileTranscriptFetcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            timestamp: Regex::new(r"^(\d{1,2}:)?\d{1,2}:\d{2}[.,]\d{3}\s*-->")?,
            inline_tag: Regex::new(r"<[^>]*>")?,
        })
    }

    /// Convert raw file content to plain transcript text
    pub fn normalize(&self, content: &str, format: TranscriptFormat) -> Result<String> {
        match format {
            TranscriptFormat::Srt | TranscriptFormat::Vtt => Ok(self.parse_cues(content)),
            TranscriptFormat::Json3 => parse_json3(content),
            TranscriptFormat::PlainText => Ok(content.trim().to_string()),
        }
    }

    /// Cue text of SubRip or WebVTT content, one space between cues
    ///
    /// Cue numbers, timing lines, the WebVTT header block and NOTE, STYLE and
    /// REGION blocks are dropped. Consecutive repeated lines (common in
    /// auto-generated captions) are kept once.
    fn parse_cues(&self, content: &str) -> String {
        let content = content.replace("\r\n", "\n");
        let mut lines: Vec<String> = Vec::new();

        for block in content.split("\n\n") {
            let block = block.trim();
            let first = block.lines().next().unwrap_or_default().trim();
            if block.is_empty()
                || first.starts_with("WEBVTT")
                || first.starts_with("NOTE")
                || first == "STYLE"
                || first == "REGION"
            {
                continue;
            }

            for (i, line) in block.lines().enumerate() {
                let line = line.trim();
                if line.is_empty()
                    || (i == 0 && line.chars().all(|c| c.is_ascii_digit()))
                    || self.timestamp.is_match(line)
                {
                    continue;
                }

                let text = clean_text(&self.inline_tag.replace_all(line, ""));
                if text.is_empty() || lines.last() == Some(&text) {
                    continue;
                }
                lines.push(text);
            }
        }

        lines.join(" ")
    }
}

/// Segment text of YouTube `json3` captions
///
/// Accepts the `{"events": [{"segs": [{"utf8": ".."}]}]}` layout as well as a
/// bare list of events; segment text may be under `utf8` or `text`.
fn parse_json3(content: &str) -> Result<String> {
    let data: Value = serde_json::from_str(content)?;
    let events = match &data {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => map
            .get("events")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };

    let pieces: Vec<String> = events
        .iter()
        .filter_map(|event| event.get("segs").and_then(Value::as_array))
        .flatten()
        .filter_map(|seg| {
            seg.get("utf8")
                .or_else(|| seg.get("text"))
                .and_then(Value::as_str)
        })
        .map(clean_text)
        .filter(|t| !t.is_empty())
        .collect();

    Ok(pieces.join(" "))
}

#[async_trait]
impl TranscriptFetcher for FileTranscriptFetcher {
    async fn fetch(&self, identifier: &str) -> Result<Transcript> {
        let path = Path::new(identifier);
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            RagPersonaError::InvalidInput(format!(
                "cannot read transcript '{}': {}",
                identifier, e
            ))
        })?;

        let format = TranscriptFormat::from_path(path);
        let text = self.normalize(&content, format).map_err(|e| {
            RagPersonaError::IngestionFailure {
                source_label: identifier.to_string(),
                message: format!("malformed captions: {}", e),
            }
        })?;

        if text.trim().is_empty() {
            return Err(RagPersonaError::NoTranscriptAvailable(identifier.to_string()).into());
        }

        let label = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(identifier)
            .to_string();

        tracing::debug!(origin = identifier, ?format, chars = text.len(), "Read transcript");
        Ok(Transcript {
            label,
            origin: identifier.to_string(),
            text,
        })
    }
}
