//! Speech recognition abstraction.
//!
//! The pipeline depends on the [`SpeechRecognizer`] trait instead of a
//! concrete service. Implementations perform exactly one HTTP round trip per
//! call and never retry; the pipeline owns the polling loop.

use async_trait::async_trait;

use crate::language::{Feature, LanguagePolicy};
use crate::model::{JobSettings, Quality};

pub mod assemblyai;

#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    /// The service accepted the request but returned no job identifier.
    #[error("transcription submission failed: {0}")]
    Submission(String),
    #[error("speech service request failed: {0}")]
    Transport(String),
    #[error("speech service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed speech service response: {0}")]
    Malformed(String),
}

/// Opaque identifier of a remote transcription job.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct JobHandle(pub String);

impl JobHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Remote job status, reported verbatim.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RecognitionStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

impl RecognitionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

/// Optional recognition features requested for one job.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct FeatureFlags {
    pub speaker_labels: bool,
    pub auto_chapters: bool,
    pub filter_profanity: bool,
    pub punctuate: bool,
    pub format_text: bool,
    pub quality: Quality,
}

impl FeatureFlags {
    /// Combines what the user asked for with what the language supports.
    pub fn for_job(settings: &JobSettings, policy: &LanguagePolicy) -> Self {
        Self {
            speaker_labels: settings.speaker_identification
                && policy.supports(Feature::SpeakerLabels),
            auto_chapters: settings.include_timestamps && policy.supports(Feature::AutoChapters),
            filter_profanity: settings.filter_profanity
                && policy.supports(Feature::FilterProfanity),
            punctuate: settings.punctuation && policy.supports(Feature::Punctuate),
            format_text: settings.punctuation && policy.supports(Feature::FormatText),
            quality: settings.quality,
        }
    }
}

/// Speaker-attributed segment returned by the recognizer. Times in ms.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub start: u64,
    pub end: u64,
    pub speaker: Option<String>,
}

/// Single time-tagged token. Times in ms.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub text: String,
    pub start: u64,
    pub end: u64,
    pub speaker: Option<String>,
}

/// Payload of a completed recognition job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecognitionResult {
    pub text: String,
    pub utterances: Vec<Utterance>,
    pub words: Vec<Word>,
    /// Audio duration in seconds.
    pub audio_duration: Option<f64>,
    /// Language the recognizer produced, when reported.
    pub language_code: Option<String>,
    pub speaker_labels: bool,
}

/// Result of a single status poll.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub status: RecognitionStatus,
    /// Present when `status` is `Completed`.
    pub result: Option<RecognitionResult>,
    /// Remote error message when `status` is `Error`.
    pub error: Option<String>,
}

impl PollOutcome {
    pub fn pending(status: RecognitionStatus) -> Self {
        Self {
            status,
            result: None,
            error: None,
        }
    }

    pub fn completed(result: RecognitionResult) -> Self {
        Self {
            status: RecognitionStatus::Completed,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: RecognitionStatus::Error,
            result: None,
            error: Some(message.into()),
        }
    }
}

/// Contract implemented by asynchronous speech-to-text services.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Submits `audio_url` for transcription and returns the remote job handle.
    async fn submit(
        &self,
        audio_url: &str,
        language_code: &str,
        features: &FeatureFlags,
    ) -> Result<JobHandle, RecognitionError>;

    /// Fetches the current status of a submitted job.
    async fn poll(&self, handle: &JobHandle) -> Result<PollOutcome, RecognitionError>;
}
