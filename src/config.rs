//! Configuration loading from environment variables.
//!
//! Values are validated early so startup fails fast with actionable errors.

use std::env;
use std::time::Duration;

use crate::error::AppError;
use crate::pipeline::{PipelineConfig, DEFAULT_MAX_POLL_ATTEMPTS, DEFAULT_TRANSLATE_MAX_CHARS};
use crate::summarize::DEFAULT_MAX_CHARS;

/// Runtime configuration for the HTTP server, external services and pipeline.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host interface to bind, for example `127.0.0.1`.
    pub host: String,
    /// TCP port to bind.
    pub port: u16,
    /// Optional bearer token required by all endpoints.
    pub api_key: Option<String>,
    pub assemblyai_api_key: String,
    pub assemblyai_base_url: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub translate_api_key: String,
    pub translate_base_url: String,
    pub poll_interval_secs: u64,
    pub max_poll_attempts: u32,
    /// Transcript prefix length sent to the language model.
    pub summary_max_chars: usize,
    pub translate_max_chars: usize,
    /// Directory uploaded media is written to.
    pub media_dir: String,
    /// Externally reachable base URL; media URLs handed to the recognizer start with it.
    pub public_base_url: String,
    /// Optional JSON snapshot file for the record store.
    pub data_file: Option<String>,
    pub max_upload_bytes: usize,
    pub http_timeout_secs: u64,
}

impl AppConfig {
    /// Builds configuration from environment variables.
    ///
    /// Variables:
    /// - `HOST` (default `127.0.0.1`)
    /// - `PORT` (default `8000`)
    /// - `API_KEY` (optional)
    /// - `ASSEMBLYAI_API_KEY` (required)
    /// - `ASSEMBLYAI_BASE_URL` (default `https://api.assemblyai.com`)
    /// - `GEMINI_API_KEY` (required)
    /// - `GEMINI_MODEL` (default `gemini-1.5-flash`)
    /// - `GEMINI_BASE_URL` (default `https://generativelanguage.googleapis.com`)
    /// - `TRANSLATE_API_KEY` (default: `GEMINI_API_KEY`)
    /// - `TRANSLATE_BASE_URL` (default `https://translation.googleapis.com`)
    /// - `POLL_INTERVAL_SECS` (default `5`, min `1`, max `60`)
    /// - `MAX_POLL_ATTEMPTS` (default `120`, min `1`, max `10000`)
    /// - `SUMMARY_MAX_CHARS` (default `30000`, min `1000`, max `1000000`)
    /// - `TRANSLATE_MAX_CHARS` (default `5000`, min `100`, max `30000`)
    /// - `MEDIA_DIR` (default `./uploads`)
    /// - `PUBLIC_BASE_URL` (default `http://{HOST}:{PORT}`)
    /// - `DATA_FILE` (optional)
    /// - `MAX_UPLOAD_MB` (default `500`, min `1`, max `4096`)
    /// - `HTTP_TIMEOUT_SECS` (default `60`, min `1`, max `600`)
    pub fn from_env() -> Result<Self, AppError> {
        let host = env_str("HOST", "127.0.0.1");
        let port = env_u16("PORT", 8000)?;
        let gemini_api_key = env_required("GEMINI_API_KEY")?;
        let translate_api_key = env_opt("TRANSLATE_API_KEY").unwrap_or_else(|| gemini_api_key.clone());
        let public_base_url = env_opt("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://{host}:{port}"))
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            api_key: env_opt("API_KEY"),
            assemblyai_api_key: env_required("ASSEMBLYAI_API_KEY")?,
            assemblyai_base_url: env_str("ASSEMBLYAI_BASE_URL", "https://api.assemblyai.com"),
            gemini_api_key,
            gemini_model: env_str("GEMINI_MODEL", "gemini-1.5-flash"),
            gemini_base_url: env_str(
                "GEMINI_BASE_URL",
                "https://generativelanguage.googleapis.com",
            ),
            translate_api_key,
            translate_base_url: env_str(
                "TRANSLATE_BASE_URL",
                "https://translation.googleapis.com",
            ),
            poll_interval_secs: env_usize_bounded("POLL_INTERVAL_SECS", 5, 1, 60)? as u64,
            max_poll_attempts: env_usize_bounded(
                "MAX_POLL_ATTEMPTS",
                DEFAULT_MAX_POLL_ATTEMPTS as usize,
                1,
                10_000,
            )? as u32,
            summary_max_chars: env_usize_bounded(
                "SUMMARY_MAX_CHARS",
                DEFAULT_MAX_CHARS,
                1_000,
                1_000_000,
            )?,
            translate_max_chars: env_usize_bounded(
                "TRANSLATE_MAX_CHARS",
                DEFAULT_TRANSLATE_MAX_CHARS,
                100,
                30_000,
            )?,
            media_dir: env_str("MEDIA_DIR", "./uploads"),
            public_base_url,
            data_file: env_opt("DATA_FILE"),
            max_upload_bytes: env_usize_bounded("MAX_UPLOAD_MB", 500, 1, 4096)? * 1024 * 1024,
            http_timeout_secs: env_usize_bounded("HTTP_TIMEOUT_SECS", 60, 1, 600)? as u64,
            host,
            port,
        })
    }

    /// Pipeline tuning derived from this configuration.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            max_poll_attempts: self.max_poll_attempts,
            translate_max_chars: self.translate_max_chars,
        }
    }
}

fn env_str(name: &str, default: &str) -> String {
    env_opt(name).unwrap_or_else(|| default.to_string())
}

fn env_opt(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Err(_) => None,
    }
}

fn env_required(name: &str) -> Result<String, AppError> {
    env_opt(name).ok_or_else(|| AppError::internal(format!("missing required {name}")))
}

fn env_u16(name: &str, default: u16) -> Result<u16, AppError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let parsed = raw.trim().parse::<u16>().map_err(|_| {
        AppError::internal(format!("invalid {name}={raw:?}; expected integer 1-65535"))
    })?;
    if parsed == 0 {
        return Err(AppError::internal(format!(
            "invalid {name}={raw:?}; expected > 0"
        )));
    }
    Ok(parsed)
}

fn env_usize_bounded(
    name: &str,
    default: usize,
    min: usize,
    max: usize,
) -> Result<usize, AppError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    parse_usize_bounded(name, &raw, min, max)
}

fn parse_usize_bounded(name: &str, raw: &str, min: usize, max: usize) -> Result<usize, AppError> {
    let trimmed = raw.trim();
    let parsed = trimmed.parse::<usize>().map_err(|_| {
        AppError::internal(format!(
            "invalid {name}={raw:?}; expected integer in range [{min}, {max}]"
        ))
    })?;
    if parsed < min || parsed > max {
        return Err(AppError::internal(format!(
            "invalid {name}={raw:?}; expected integer in range [{min}, {max}]"
        )));
    }
    Ok(parsed)
}
