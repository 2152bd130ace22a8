//! AI summaries of finished transcripts.
//!
//! The model is asked to answer in three labeled sections (`SUMMARY:`,
//! `TOPICS:`, `INSIGHTS:`); each section runs until the next label or the end
//! of the response. [`Summarizer::summarize`] never fails: any problem yields
//! placeholder fields in the requested language.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::language::{base_tag, display_name, BASE_LANGUAGE};
use crate::translate::Translator;

pub mod gemini;

pub const DEFAULT_MAX_CHARS: usize = 30_000;

const SUMMARY_LABEL: &str = "SUMMARY:";
const TOPICS_LABEL: &str = "TOPICS:";
const INSIGHTS_LABEL: &str = "INSIGHTS:";
const LABELS: [&str; 3] = [SUMMARY_LABEL, TOPICS_LABEL, INSIGHTS_LABEL];

const PLACEHOLDER_SUMMARY: &str = "Summary generation failed";
const PLACEHOLDER_TOPIC: &str = "General";
const PLACEHOLDER_INSIGHTS: &str = "No insights available";

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("text generation request failed: {0}")]
    Transport(String),
    #[error("text generation service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed text generation response: {0}")]
    Malformed(String),
}

/// Single-shot prompt/response language model.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Summary fields stored on a completed job.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SummaryFields {
    pub summary: String,
    pub topic: String,
    pub topics: Vec<String>,
    pub insights: String,
}

/// Sections recovered from a model response. `None` means the label was absent.
#[derive(Debug, Clone, Eq, PartialEq)]
struct ParsedSections {
    summary: String,
    topics: Option<Vec<String>>,
    insights: Option<String>,
}

pub struct Summarizer {
    generator: Arc<dyn TextGenerator>,
    translator: Arc<dyn Translator>,
    max_chars: usize,
}

impl Summarizer {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        translator: Arc<dyn Translator>,
        max_chars: usize,
    ) -> Self {
        Self {
            generator,
            translator,
            max_chars,
        }
    }

    /// Summarizes `text` in the language named by `target_tag`.
    pub async fn summarize(&self, text: &str, target_tag: &str) -> SummaryFields {
        let input = truncate_chars(text, self.max_chars);
        if input.trim().is_empty() {
            warn!("skipping summary for empty transcript");
            return self.placeholders(target_tag).await;
        }

        let prompt = build_prompt(input, display_name(target_tag));
        let response = match self.generator.generate(&prompt).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "summary generation failed");
                return self.placeholders(target_tag).await;
            }
        };

        let Some(sections) = parse_sections(&response) else {
            warn!(
                response_chars = response.len(),
                "summary response had no usable SUMMARY section"
            );
            return self.placeholders(target_tag).await;
        };

        let (topic, topics) = match sections.topics.filter(|t| !t.is_empty()) {
            Some(topics) => (topics[0].clone(), topics),
            None => {
                let topic = self.localized(PLACEHOLDER_TOPIC, target_tag).await;
                (topic.clone(), vec![topic])
            }
        };
        let insights = match sections.insights {
            Some(insights) => insights,
            None => self.localized(PLACEHOLDER_INSIGHTS, target_tag).await,
        };

        debug!(topics = topics.len(), "parsed summary response");
        SummaryFields {
            summary: sections.summary,
            topic,
            topics,
            insights,
        }
    }

    async fn placeholders(&self, target_tag: &str) -> SummaryFields {
        let topic = self.localized(PLACEHOLDER_TOPIC, target_tag).await;
        SummaryFields {
            summary: self.localized(PLACEHOLDER_SUMMARY, target_tag).await,
            topics: vec![topic.clone()],
            topic,
            insights: self.localized(PLACEHOLDER_INSIGHTS, target_tag).await,
        }
    }

    /// Translates an English placeholder, keeping the English text on failure.
    async fn localized(&self, english: &str, target_tag: &str) -> String {
        let target = base_tag(target_tag);
        if target.is_empty() || target == BASE_LANGUAGE {
            return english.to_string();
        }
        match self.translator.translate(english, &target, BASE_LANGUAGE).await {
            Ok(translated) => translated,
            Err(err) => {
                warn!(error = %err, target = %target, "placeholder translation failed");
                english.to_string()
            }
        }
    }
}

/// Returns at most `max_chars` characters of `text`, cut on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn build_prompt(transcript: &str, language_name: &str) -> String {
    format!(
        "You are analyzing the transcript of an audio recording. \
         Write your entire answer in {language_name}.\n\n\
         Answer using exactly these three labeled sections:\n\
         {SUMMARY_LABEL} a concise summary of the recording in 3 to 5 sentences\n\
         {TOPICS_LABEL} a comma-separated list of the 3 to 6 main topics, most important first\n\
         {INSIGHTS_LABEL} the key insights, decisions and action items\n\n\
         Keep the labels in English and do not add any other sections.\n\n\
         Transcript:\n{transcript}"
    )
}

fn parse_sections(response: &str) -> Option<ParsedSections> {
    // ASCII uppercasing keeps byte offsets aligned with `response`.
    let upper = response.to_ascii_uppercase();
    let positions = label_positions(&upper);

    let section = |which: usize| -> Option<String> {
        let start = positions[which]? + LABELS[which].len();
        let end = positions
            .iter()
            .flatten()
            .copied()
            .filter(|&pos| pos >= start)
            .min()
            .unwrap_or(response.len());
        let text = clean_section(&response[start..end]);
        Some(text)
    };

    let summary = section(0).filter(|s| !s.is_empty())?;
    let topics = section(1).map(|raw| split_topics(&raw));
    let insights = section(2).filter(|s| !s.is_empty());

    Some(ParsedSections {
        summary,
        topics,
        insights,
    })
}

/// Byte offset of the first occurrence of each label that opens a line.
///
/// Leading markdown emphasis or heading markers before a label are allowed.
fn label_positions(upper: &str) -> [Option<usize>; 3] {
    let mut positions = [None; 3];
    let mut offset = 0;
    for line in upper.split_inclusive('\n') {
        let body = line.trim_start_matches(|c: char| c.is_whitespace() || c == '*' || c == '#');
        let at = offset + (line.len() - body.len());
        for (slot, label) in positions.iter_mut().zip(LABELS) {
            if slot.is_none() && body.starts_with(label) {
                *slot = Some(at);
            }
        }
        offset += line.len();
    }
    positions
}

fn clean_section(raw: &str) -> String {
    raw.trim_matches(|c: char| c.is_whitespace() || c == '*' || c == '#')
        .to_string()
}

fn split_topics(raw: &str) -> Vec<String> {
    raw.split([',', '\n'])
        .map(|topic| {
            topic
                .trim()
                .trim_start_matches(['-', '*', '•'])
                .trim()
                .trim_end_matches('.')
                .to_string()
        })
        .filter(|topic| !topic.is_empty())
        .collect()
}
