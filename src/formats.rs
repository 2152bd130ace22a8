//! Transcript export formats.

use std::fmt;

use crate::error::AppError;
use crate::model::Job;
use crate::timestamps::Segment;

/// Output format accepted by `format` on the export endpoint.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ExportFormat {
    /// Plain text with a summary header.
    Txt,
    /// SubRip subtitle format.
    Srt,
    /// WebVTT subtitle format.
    Vtt,
    /// The full job record.
    Json,
}

impl ExportFormat {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "txt" | "text" => Ok(Self::Txt),
            "srt" => Ok(Self::Srt),
            "vtt" => Ok(Self::Vtt),
            "json" => Ok(Self::Json),
            other => Err(AppError::invalid_request(
                format!("invalid format={other:?}; expected one of txt,srt,vtt,json"),
                Some("format"),
                Some("invalid_format"),
            )),
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Txt => "text/plain; charset=utf-8",
            Self::Srt => "application/x-subrip; charset=utf-8",
            Self::Vtt => "text/vtt; charset=utf-8",
            Self::Json => "application/json",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Txt => "txt",
            Self::Srt => "srt",
            Self::Vtt => "vtt",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Renders a completed job as plain text.
pub fn job_to_text(job: &Job) -> String {
    let mut out = String::new();
    out.push_str(&job.file_name);
    out.push('\n');

    if let Some(summary) = job.summary.as_deref() {
        out.push_str("\nSummary\n");
        out.push_str(summary.trim());
        out.push('\n');
    }
    if !job.topics.is_empty() {
        out.push_str("\nTopics: ");
        out.push_str(&job.topics.join(", "));
        out.push('\n');
    }
    if let Some(insights) = job.insights.as_deref() {
        out.push_str("\nInsights\n");
        out.push_str(insights.trim());
        out.push('\n');
    }

    out.push_str("\nTranscript\n");
    if job.timestamps.is_empty() {
        out.push_str(job.transcript.as_deref().unwrap_or_default().trim());
        out.push('\n');
    } else {
        for seg in &job.timestamps {
            out.push_str(&format!(
                "[{}] {}: {}\n",
                clock_timestamp(seg.start),
                seg.speaker,
                seg.text.trim()
            ));
        }
    }
    out
}

/// Converts transcript segments to SRT subtitle text.
pub fn segments_to_srt(segments: &[Segment]) -> String {
    let mut lines = Vec::new();
    let mut index = 0;
    for seg in segments {
        if seg.text.trim().is_empty() {
            continue;
        }
        index += 1;
        lines.push(index.to_string());
        lines.push(format!(
            "{} --> {}",
            srt_timestamp(seg.start),
            srt_timestamp(seg.end)
        ));
        lines.push(seg.text.trim().to_string());
        lines.push(String::new());
    }

    let out = lines.join("\n");
    if out.is_empty() {
        "\n".to_string()
    } else {
        format!("{}\n", out.trim_end())
    }
}

/// Converts transcript segments to WebVTT subtitle text, with speaker voice tags.
pub fn segments_to_vtt(segments: &[Segment]) -> String {
    let mut lines = vec!["WEBVTT".to_string(), String::new()];
    for seg in segments {
        if seg.text.trim().is_empty() {
            continue;
        }
        lines.push(format!(
            "{} --> {}",
            vtt_timestamp(seg.start),
            vtt_timestamp(seg.end)
        ));
        lines.push(format!("<v {}>{}", seg.speaker, seg.text.trim()));
        lines.push(String::new());
    }

    format!("{}\n", lines.join("\n").trim_end())
}

fn split_millis(ms: u64) -> (u64, u64, u64, u64) {
    (
        ms / 3_600_000,
        (ms % 3_600_000) / 60_000,
        (ms % 60_000) / 1_000,
        ms % 1_000,
    )
}

fn srt_timestamp(ms: u64) -> String {
    let (h, m, s, frac) = split_millis(ms);
    format!("{h:02}:{m:02}:{s:02},{frac:03}")
}

fn vtt_timestamp(ms: u64) -> String {
    let (h, m, s, frac) = split_millis(ms);
    format!("{h:02}:{m:02}:{s:02}.{frac:03}")
}

fn clock_timestamp(ms: u64) -> String {
    let (h, m, s, _) = split_millis(ms);
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}
