//! Text translation abstraction.
//!
//! The pipeline depends on the [`Translator`] trait; [`google::GoogleTranslator`]
//! is the production implementation.

use async_trait::async_trait;

pub mod google;

/// Failure of a single translation call.
///
/// Callers decide the fallback; the adapter never returns the original text
/// in place of a translation.
#[derive(Debug, thiserror::Error)]
pub enum TranslationError {
    #[error("translation request failed: {0}")]
    Transport(String),
    #[error("translation service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed translation response: {0}")]
    Malformed(String),
}

/// Contract implemented by text translation services.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translates `text` into `target_tag`. `source_code` is the language the
    /// text is currently in.
    async fn translate(
        &self,
        text: &str,
        target_tag: &str,
        source_code: &str,
    ) -> Result<String, TranslationError>;
}
