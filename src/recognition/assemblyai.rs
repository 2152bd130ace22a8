//! AssemblyAI v2 REST client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::Quality;
use crate::recognition::{
    FeatureFlags, JobHandle, PollOutcome, RecognitionError, RecognitionResult, RecognitionStatus,
    SpeechRecognizer, Utterance, Word,
};

/// Recognizer backed by `POST /v2/transcript` and `GET /v2/transcript/{id}`.
pub struct AssemblyAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AssemblyAiClient {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    audio_url: &'a str,
    language_code: &'a str,
    speech_model: &'static str,
    speaker_labels: bool,
    auto_chapters: bool,
    filter_profanity: bool,
    punctuate: bool,
    format_text: bool,
}

impl<'a> SubmitRequest<'a> {
    fn new(audio_url: &'a str, language_code: &'a str, features: &FeatureFlags) -> Self {
        Self {
            audio_url,
            language_code,
            speech_model: match features.quality {
                Quality::Best => "best",
                Quality::Standard => "nano",
            },
            speaker_labels: features.speaker_labels,
            auto_chapters: features.auto_chapters,
            filter_profanity: features.filter_profanity,
            punctuate: features.punctuate,
            format_text: features.format_text,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum WireStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

#[derive(Debug, Deserialize)]
struct TranscriptResponse {
    status: WireStatus,
    text: Option<String>,
    utterances: Option<Vec<WireUtterance>>,
    words: Option<Vec<WireWord>>,
    audio_duration: Option<f64>,
    language_code: Option<String>,
    #[serde(default)]
    speaker_labels: Option<bool>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUtterance {
    #[serde(default)]
    text: String,
    start: u64,
    end: u64,
    speaker: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireWord {
    #[serde(default)]
    text: String,
    start: u64,
    end: u64,
    speaker: Option<String>,
}

impl TranscriptResponse {
    fn into_outcome(self) -> PollOutcome {
        match self.status {
            WireStatus::Queued => PollOutcome::pending(RecognitionStatus::Queued),
            WireStatus::Processing => PollOutcome::pending(RecognitionStatus::Processing),
            WireStatus::Error => PollOutcome::failed(
                self.error
                    .unwrap_or_else(|| "transcription failed".to_string()),
            ),
            WireStatus::Completed => PollOutcome::completed(RecognitionResult {
                text: self.text.unwrap_or_default(),
                utterances: self
                    .utterances
                    .unwrap_or_default()
                    .into_iter()
                    .map(|u| Utterance {
                        text: u.text,
                        start: u.start,
                        end: u.end,
                        speaker: u.speaker,
                    })
                    .collect(),
                words: self
                    .words
                    .unwrap_or_default()
                    .into_iter()
                    .map(|w| Word {
                        text: w.text,
                        start: w.start,
                        end: w.end,
                        speaker: w.speaker,
                    })
                    .collect(),
                audio_duration: self.audio_duration,
                language_code: self.language_code,
                speaker_labels: self.speaker_labels.unwrap_or(false),
            }),
        }
    }
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, RecognitionError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(RecognitionError::Status { status, body })
}

#[async_trait]
impl SpeechRecognizer for AssemblyAiClient {
    async fn submit(
        &self,
        audio_url: &str,
        language_code: &str,
        features: &FeatureFlags,
    ) -> Result<JobHandle, RecognitionError> {
        let url = format!("{}/v2/transcript", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("authorization", self.api_key.as_str())
            .json(&SubmitRequest::new(audio_url, language_code, features))
            .send()
            .await
            .map_err(|err| RecognitionError::Transport(err.to_string()))?;
        let response = error_for_status(response).await?;

        let payload: SubmitResponse = response
            .json()
            .await
            .map_err(|err| RecognitionError::Malformed(err.to_string()))?;

        match payload.id.filter(|id| !id.trim().is_empty()) {
            Some(id) => {
                debug!(remote_id = %id, language_code, "submitted transcription");
                Ok(JobHandle(id))
            }
            None => Err(RecognitionError::Submission(
                payload
                    .error
                    .unwrap_or_else(|| "no transcript id returned".to_string()),
            )),
        }
    }

    async fn poll(&self, handle: &JobHandle) -> Result<PollOutcome, RecognitionError> {
        let url = format!("{}/v2/transcript/{}", self.base_url, handle.as_str());
        let response = self
            .http
            .get(&url)
            .header("authorization", self.api_key.as_str())
            .send()
            .await
            .map_err(|err| RecognitionError::Transport(err.to_string()))?;
        let response = error_for_status(response).await?;

        let payload: TranscriptResponse = response
            .json()
            .await
            .map_err(|err| RecognitionError::Malformed(err.to_string()))?;
        Ok(payload.into_outcome())
    }
}
