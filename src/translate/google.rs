//! Google Cloud Translation (v2 REST) client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::translate::{TranslationError, Translator};

/// Translator backed by `POST /language/translate/v2`.
pub struct GoogleTranslator {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GoogleTranslator {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    target: &'a str,
    source: &'a str,
    format: &'static str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    data: Option<TranslateData>,
}

#[derive(Debug, Deserialize)]
struct TranslateData {
    #[serde(default)]
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Translation {
    translated_text: Option<String>,
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(
        &self,
        text: &str,
        target_tag: &str,
        source_code: &str,
    ) -> Result<String, TranslationError> {
        let url = format!("{}/language/translate/v2", self.base_url);
        let body = TranslateRequest {
            q: text,
            target: target_tag,
            source: source_code,
            format: "text",
        };

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|err| TranslationError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TranslationError::Status { status, body });
        }

        let payload: TranslateResponse = response
            .json()
            .await
            .map_err(|err| TranslationError::Malformed(err.to_string()))?;

        let translated = extract_translation(payload)?;
        debug!(
            source = source_code,
            target = target_tag,
            chars = text.len(),
            "translated text"
        );
        Ok(translated)
    }
}

fn extract_translation(payload: TranslateResponse) -> Result<String, TranslationError> {
    payload
        .data
        .and_then(|data| data.translations.into_iter().next())
        .and_then(|t| t.translated_text)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| TranslationError::Malformed("response contained no translation".to_string()))
}
