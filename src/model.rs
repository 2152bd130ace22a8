//! Job and user records persisted by the record store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::timestamps::Segment;

/// Lifecycle state of a transcription job.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    /// Returns `true` once the pipeline can no longer move the job.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

/// Recognition model tier requested by the user.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    #[default]
    Standard,
    Best,
}

impl Quality {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "standard" | "fast" | "nano" => Some(Self::Standard),
            "best" | "high" => Some(Self::Best),
            _ => None,
        }
    }
}

/// Settings captured when the job is submitted. Never changed afterwards.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSettings {
    /// Requested output language tag, for example `"es"`.
    pub language: String,
    pub quality: Quality,
    pub speaker_identification: bool,
    pub include_timestamps: bool,
    pub filter_profanity: bool,
    pub punctuation: bool,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            quality: Quality::Standard,
            speaker_identification: false,
            include_timestamps: false,
            filter_profanity: false,
            punctuation: true,
        }
    }
}

/// One uploaded media file and everything derived from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub user_id: String,
    pub file_name: String,
    pub status: JobStatus,
    pub source_url: String,
    pub settings: JobSettings,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub topic: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub insights: Option<String>,
    #[serde(default)]
    pub timestamps: Vec<Segment>,
    #[serde(default)]
    pub speakers: Vec<String>,
    /// Audio duration in seconds.
    pub duration: Option<f64>,
    pub word_count: Option<u64>,
    /// Language tag of the persisted transcript.
    pub language: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Creates a fresh job in the `processing` state.
    pub fn new(
        user_id: impl Into<String>,
        file_name: impl Into<String>,
        source_url: impl Into<String>,
        settings: JobSettings,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            file_name: file_name.into(),
            status: JobStatus::Processing,
            source_url: source_url.into(),
            settings,
            transcript: None,
            summary: None,
            topic: None,
            topics: Vec::new(),
            insights: None,
            timestamps: Vec::new(),
            speakers: Vec::new(),
            duration: None,
            word_count: None,
            language: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a partial update and refreshes `updated_at`.
    pub fn apply(&mut self, update: JobUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(transcript) = update.transcript {
            self.transcript = Some(transcript);
        }
        if let Some(summary) = update.summary {
            self.summary = Some(summary);
        }
        if let Some(topic) = update.topic {
            self.topic = Some(topic);
        }
        if let Some(topics) = update.topics {
            self.topics = topics;
        }
        if let Some(insights) = update.insights {
            self.insights = Some(insights);
        }
        if let Some(timestamps) = update.timestamps {
            self.timestamps = timestamps;
        }
        if let Some(speakers) = update.speakers {
            self.speakers = speakers;
        }
        if let Some(duration) = update.duration {
            self.duration = Some(duration);
        }
        if let Some(word_count) = update.word_count {
            self.word_count = Some(word_count);
        }
        if let Some(language) = update.language {
            self.language = Some(language);
        }
        if let Some(error) = update.error {
            self.error = Some(error);
        }
        self.updated_at = Utc::now();
    }
}

/// Partial job update. `None` leaves the stored field untouched.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub topic: Option<String>,
    pub topics: Option<Vec<String>>,
    pub insights: Option<String>,
    pub timestamps: Option<Vec<Segment>>,
    pub speakers: Option<Vec<String>>,
    pub duration: Option<f64>,
    pub word_count: Option<u64>,
    pub language: Option<String>,
    pub error: Option<String>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Error),
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Account owning jobs, with the usage counters billed per completed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub transcriptions_count: u64,
    pub minutes_used: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.into(),
            name: name.into(),
            transcriptions_count: 0,
            minutes_used: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Increment applied to a user's counters when a job completes.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct UsageDelta {
    pub count: u64,
    pub minutes: u64,
}

impl UsageDelta {
    /// Usage for one completed job: whole minutes, rounded up.
    pub fn for_duration(duration_secs: f64) -> Self {
        let minutes = if duration_secs.is_finite() && duration_secs > 0.0 {
            (duration_secs / 60.0).ceil() as u64
        } else {
            0
        };
        Self { count: 1, minutes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_rounds_partial_minutes_up() {
        assert_eq!(UsageDelta::for_duration(61.0).minutes, 2);
        assert_eq!(UsageDelta::for_duration(60.0).minutes, 1);
        assert_eq!(UsageDelta::for_duration(0.5).minutes, 1);
        assert_eq!(UsageDelta::for_duration(0.0).minutes, 0);
        assert_eq!(UsageDelta::for_duration(f64::NAN).minutes, 0);
    }

    #[test]
    fn apply_leaves_unset_fields_alone() {
        let mut job = Job::new("u1", "a.mp3", "http://x/a.mp3", JobSettings::default());
        job.apply(JobUpdate {
            transcript: Some("hello".to_string()),
            ..JobUpdate::default()
        });
        job.apply(JobUpdate::status(JobStatus::Completed));

        assert_eq!(job.transcript.as_deref(), Some("hello"));
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error.is_none());
        assert!(job.updated_at >= job.created_at);
    }

    #[test]
    fn quality_parse_accepts_aliases() {
        assert_eq!(Quality::parse("BEST"), Some(Quality::Best));
        assert_eq!(Quality::parse("standard"), Some(Quality::Standard));
        assert_eq!(Quality::parse("ultra"), None);
    }
}
