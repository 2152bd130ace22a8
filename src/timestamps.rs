//! Reconstruction of timed text segments from a recognition result.
//!
//! Speaker utterances are used as-is when the recognizer provides them.
//! Otherwise segments are synthesized from word timings, closing a segment on
//! sentence-final punctuation or once it would span more than
//! [`MAX_SEGMENT_MS`].

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::recognition::{RecognitionResult, Word};

/// Longest span a synthesized segment may cover, in milliseconds.
pub const MAX_SEGMENT_MS: u64 = 10_000;

/// Label used when the recognizer did not attribute a speaker.
pub const DEFAULT_SPEAKER: &str = "Speaker A";

/// Timed transcript chunk. Times in milliseconds.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub start: u64,
    pub end: u64,
    pub speaker: String,
}

/// Builds the ordered segment list for a recognition result.
pub fn reconstruct(result: &RecognitionResult) -> Vec<Segment> {
    if !result.utterances.is_empty() {
        return result
            .utterances
            .iter()
            .map(|u| Segment {
                text: u.text.clone(),
                start: u.start,
                end: u.end,
                speaker: speaker_or_default(u.speaker.as_deref()),
            })
            .collect();
    }

    if !result.words.is_empty() {
        return segments_from_words(&result.words);
    }

    info!("recognition result has no utterance or word timing data");
    Vec::new()
}

/// Groups consecutive words into sentence-like segments.
pub fn segments_from_words(words: &[Word]) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut open: Option<OpenSegment> = None;

    for (idx, word) in words.iter().enumerate() {
        let too_long = open
            .as_ref()
            .is_some_and(|current| word.end.saturating_sub(current.start) > MAX_SEGMENT_MS);
        if too_long {
            if let Some(current) = open.take() {
                segments.push(current.close());
            }
        }

        match open.as_mut() {
            Some(current) => current.push(word),
            None => open = Some(OpenSegment::begin(word)),
        }

        let is_last = idx + 1 == words.len();
        if is_last || ends_sentence(&word.text) {
            if let Some(current) = open.take() {
                segments.push(current.close());
            }
        }
    }

    segments
}

struct OpenSegment {
    words: Vec<String>,
    start: u64,
    end: u64,
    speaker: String,
}

impl OpenSegment {
    fn begin(word: &Word) -> Self {
        Self {
            words: vec![word.text.clone()],
            start: word.start,
            end: word.end,
            speaker: speaker_or_default(word.speaker.as_deref()),
        }
    }

    fn push(&mut self, word: &Word) {
        self.words.push(word.text.clone());
        self.end = word.end;
    }

    fn close(self) -> Segment {
        Segment {
            text: self.words.join(" "),
            start: self.start,
            end: self.end,
            speaker: self.speaker,
        }
    }
}

fn ends_sentence(text: &str) -> bool {
    text.trim_end().ends_with(['.', '!', '?'])
}

fn speaker_or_default(speaker: Option<&str>) -> String {
    match speaker.map(str::trim) {
        Some(label) if !label.is_empty() => label.to_string(),
        _ => DEFAULT_SPEAKER.to_string(),
    }
}

/// Distinct speaker labels in order of first appearance.
pub fn distinct_speakers(segments: &[Segment]) -> Vec<String> {
    let mut speakers: Vec<String> = Vec::new();
    for segment in segments {
        if !speakers.iter().any(|s| s == &segment.speaker) {
            speakers.push(segment.speaker.clone());
        }
    }
    speakers
}
