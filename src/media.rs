//! Upload validation and local media storage.
//!
//! Uploaded files are written under a local directory and served back at
//! `/media/{name}` so the speech service can fetch them by URL.

use std::path::PathBuf;

use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;

/// File extensions accepted by upload validation.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "m4a", "aac", "flac", "ogg", "opus", "webm", "wma", "amr", "mp4", "mov", "mkv",
    "avi",
];

fn accepted_list() -> String {
    SUPPORTED_EXTENSIONS
        .iter()
        .map(|ext| format!(".{ext}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Validates and normalizes the file extension from an uploaded filename.
///
/// Returns the lowercased extension without the leading dot.
pub fn validate_extension(filename: &str) -> Result<String, AppError> {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.trim().to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .ok_or_else(|| {
            AppError::unsupported_media_type(format!(
                "file must include an extension; accepted extensions: {}",
                accepted_list()
            ))
        })?;

    if !SUPPORTED_EXTENSIONS.iter().any(|ext| *ext == extension) {
        return Err(AppError::unsupported_media_type(format!(
            "unsupported file extension .{extension}; accepted extensions: {}",
            accepted_list()
        )));
    }

    Ok(extension)
}

/// MIME type used when serving a stored file back.
pub fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "flac" => "audio/flac",
        "ogg" | "opus" => "audio/ogg",
        "webm" => "audio/webm",
        "wma" => "audio/x-ms-wma",
        "amr" => "audio/amr",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}

/// A file written by [`MediaStore::save`].
#[derive(Debug, Clone)]
pub struct StoredMedia {
    pub name: String,
    pub url: String,
}

pub struct MediaStore {
    dir: PathBuf,
    public_base_url: String,
}

impl MediaStore {
    pub fn new(dir: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            dir: dir.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Writes `bytes` under a fresh name and returns its public URL.
    pub async fn save(&self, extension: &str, bytes: &[u8]) -> Result<StoredMedia, AppError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|err| {
            AppError::internal(format!(
                "failed to create media directory {:?}: {err}",
                self.dir
            ))
        })?;

        let name = format!("{}.{extension}", Uuid::new_v4());
        let path = self.dir.join(&name);
        tokio::fs::write(&path, bytes).await.map_err(|err| {
            AppError::internal(format!("failed to write media file {:?}: {err}", path))
        })?;

        debug!(name = %name, bytes = bytes.len(), "stored uploaded media");
        Ok(StoredMedia {
            url: format!("{}/media/{name}", self.public_base_url),
            name,
        })
    }

    /// Reads a stored file. Names that could escape the media directory are rejected.
    pub async fn read(&self, name: &str) -> Result<Vec<u8>, AppError> {
        if !is_safe_name(name) {
            return Err(AppError::not_found(format!("media {name:?} not found")));
        }
        match tokio::fs::read(self.dir.join(name)).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::not_found(format!("media {name:?} not found")))
            }
            Err(err) => Err(AppError::internal(format!(
                "failed to read media {name:?}: {err}"
            ))),
        }
    }
}

fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_audio_and_video_extensions() {
        assert_eq!(validate_extension("Talk.MP3").unwrap(), "mp3");
        assert_eq!(validate_extension("clip.final.mov").unwrap(), "mov");
    }

    #[test]
    fn rejects_missing_or_unknown_extensions() {
        assert!(matches!(
            validate_extension("notes"),
            Err(AppError::UnsupportedMediaType(_))
        ));
        assert!(matches!(
            validate_extension("notes.txt"),
            Err(AppError::UnsupportedMediaType(_))
        ));
        assert!(validate_extension("trailing.").is_err());
    }

    #[test]
    fn unsafe_names_are_rejected() {
        assert!(is_safe_name("0b6c.mp3"));
        assert!(!is_safe_name("../secret"));
        assert!(!is_safe_name("a/b.mp3"));
        assert!(!is_safe_name(".hidden"));
    }

    #[tokio::test]
    async fn save_then_read_round_trips_through_public_url() {
        let dir = std::env::temp_dir().join(format!("transcribe-media-{}", Uuid::new_v4()));
        let store = MediaStore::new(&dir, "http://localhost:8000/");

        let stored = store.save("wav", b"RIFF").await.unwrap();
        assert!(stored.url.starts_with("http://localhost:8000/media/"));
        assert!(stored.url.ends_with(".wav"));
        assert_eq!(store.read(&stored.name).await.unwrap(), b"RIFF");
        assert!(matches!(
            store.read("missing.wav").await,
            Err(AppError::NotFound(_))
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
