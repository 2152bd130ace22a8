//! Language policy: how a requested output language maps onto the recognizer.
//!
//! The recognizer only transcribes a subset of languages natively. Anything
//! else is transcribed as English and translated afterwards.

use std::collections::BTreeMap;

/// Language used for unknown tags and for non-native recognition.
pub const BASE_LANGUAGE: &str = "en";

/// Optional recognition features whose availability depends on the language.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub enum Feature {
    SpeakerLabels,
    AutoChapters,
    FilterProfanity,
    Punctuate,
    FormatText,
}

impl Feature {
    pub const ALL: [Feature; 5] = [
        Feature::SpeakerLabels,
        Feature::AutoChapters,
        Feature::FilterProfanity,
        Feature::Punctuate,
        Feature::FormatText,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SpeakerLabels => "speaker_labels",
            Self::AutoChapters => "auto_chapters",
            Self::FilterProfanity => "filter_profanity",
            Self::Punctuate => "punctuate",
            Self::FormatText => "format_text",
        }
    }
}

/// Resolved handling for one requested language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguagePolicy {
    /// Normalized requested tag, for example `"pt"`.
    pub tag: String,
    /// Language code sent to the recognizer.
    pub recognition_code: &'static str,
    /// `true` when the recognizer cannot produce this language itself.
    pub needs_translation: bool,
    pub features: BTreeMap<Feature, bool>,
    /// English name used when prompting the language model.
    pub name: &'static str,
}

impl LanguagePolicy {
    pub fn supports(&self, feature: Feature) -> bool {
        self.features.get(&feature).copied().unwrap_or(false)
    }
}

struct LanguageEntry {
    tag: &'static str,
    name: &'static str,
    native: bool,
    speaker_labels: bool,
    auto_chapters: bool,
    filter_profanity: bool,
}

const fn native(tag: &'static str, name: &'static str, speaker_labels: bool) -> LanguageEntry {
    LanguageEntry {
        tag,
        name,
        native: true,
        speaker_labels,
        auto_chapters: false,
        filter_profanity: speaker_labels,
    }
}

const fn translated(tag: &'static str, name: &'static str) -> LanguageEntry {
    LanguageEntry {
        tag,
        name,
        native: false,
        speaker_labels: true,
        auto_chapters: true,
        filter_profanity: true,
    }
}

const LANGUAGES: &[LanguageEntry] = &[
    LanguageEntry {
        tag: "en",
        name: "English",
        native: true,
        speaker_labels: true,
        auto_chapters: true,
        filter_profanity: true,
    },
    native("es", "Spanish", true),
    native("fr", "French", true),
    native("de", "German", true),
    native("it", "Italian", true),
    native("pt", "Portuguese", true),
    native("nl", "Dutch", true),
    native("hi", "Hindi", true),
    native("ja", "Japanese", true),
    native("zh", "Chinese", true),
    native("fi", "Finnish", true),
    native("ko", "Korean", true),
    native("pl", "Polish", true),
    native("ru", "Russian", true),
    native("tr", "Turkish", true),
    native("uk", "Ukrainian", true),
    native("vi", "Vietnamese", true),
    native("id", "Indonesian", false),
    native("ms", "Malay", false),
    translated("ar", "Arabic"),
    translated("sv", "Swedish"),
    translated("no", "Norwegian"),
    translated("da", "Danish"),
    translated("he", "Hebrew"),
    translated("el", "Greek"),
    translated("cs", "Czech"),
    translated("ro", "Romanian"),
    translated("hu", "Hungarian"),
    translated("th", "Thai"),
    translated("bn", "Bengali"),
    translated("fa", "Persian"),
];

/// Normalizes a user tag to its base language: `" pt-BR "` becomes `"pt"`.
pub fn base_tag(raw: &str) -> String {
    let trimmed = raw.trim().to_ascii_lowercase();
    let base = trimmed
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_string();
    match base.as_str() {
        "nb" | "nn" => "no".to_string(),
        "iw" => "he".to_string(),
        _ => base,
    }
}

/// Resolves the recognition policy for a requested language tag.
///
/// Unknown or empty tags resolve to English.
pub fn resolve(tag: &str) -> LanguagePolicy {
    let base = base_tag(tag);
    let entry = LANGUAGES
        .iter()
        .find(|entry| entry.tag == base)
        .unwrap_or(&LANGUAGES[0]);

    let features = Feature::ALL
        .into_iter()
        .map(|feature| {
            let available = match feature {
                Feature::SpeakerLabels => entry.speaker_labels,
                Feature::AutoChapters => entry.auto_chapters,
                Feature::FilterProfanity => entry.filter_profanity,
                Feature::Punctuate | Feature::FormatText => true,
            };
            (feature, available)
        })
        .collect();

    LanguagePolicy {
        tag: entry.tag.to_string(),
        recognition_code: if entry.native { entry.tag } else { BASE_LANGUAGE },
        needs_translation: !entry.native,
        features,
        name: entry.name,
    }
}

/// Human-readable name for a tag, falling back to English.
pub fn display_name(tag: &str) -> &'static str {
    resolve(tag).name
}
