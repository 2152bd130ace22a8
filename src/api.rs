//! HTTP API surface.
//!
//! Handlers validate input, create records and hand accepted uploads to the
//! background pipeline. Job progress is observed by polling the job resource.

use std::sync::Arc;

use axum::extract::multipart::Field;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::error::AppError;
use crate::formats::{job_to_text, segments_to_srt, segments_to_vtt, ExportFormat};
use crate::media::{content_type_for, validate_extension, MediaStore};
use crate::model::{Job, JobSettings, JobStatus, Quality, User};
use crate::pipeline::{spawn_job, Pipeline};
use crate::store::RecordStore;

/// Human-readable service name returned by health endpoints.
pub const APP_NAME: &str = "transcribe-pipeline";
/// Service version string returned by health endpoints.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared state injected into all route handlers.
pub struct AppState {
    /// Runtime configuration loaded at startup.
    pub cfg: AppConfig,
    pub store: Arc<dyn RecordStore>,
    pub media: MediaStore,
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(cfg: AppConfig, media: MediaStore, pipeline: Arc<Pipeline>) -> Self {
        Self {
            cfg,
            store: Arc::clone(pipeline.store()),
            media,
            pipeline,
        }
    }
}

/// Builds the Axum router for all public endpoints.
pub fn build_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.cfg.max_upload_bytes;
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/v1/users", post(create_user))
        .route("/v1/users/:id", get(get_user))
        .route(
            "/v1/transcriptions",
            post(create_transcription).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/v1/transcriptions/:id", get(get_transcription))
        .route("/v1/transcriptions/:id/export", get(export_transcription))
        .route("/media/:name", get(get_media))
        .with_state(state)
}

/// Root status endpoint (`GET /`).
pub async fn root(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    require_auth(&state.cfg, &headers)?;
    Ok(Json(json!({
        "status": "ok",
        "name": APP_NAME,
        "version": APP_VERSION,
    })))
}

/// Alias status endpoint (`GET /health`).
pub async fn health(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    root(State(state), headers).await
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    email: String,
    name: String,
}

/// Registers a user account (`POST /v1/users`).
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateUserRequest>,
) -> Result<Response, AppError> {
    require_auth(&state.cfg, &headers)?;

    let email = body.email.trim();
    if !email.contains('@') {
        return Err(AppError::invalid_request(
            format!("invalid email={email:?}"),
            Some("email"),
            Some("invalid_email"),
        ));
    }
    let name = body.name.trim();
    if name.is_empty() {
        return Err(AppError::invalid_request(
            "name must not be empty",
            Some("name"),
            Some("invalid_name"),
        ));
    }

    let user = User::new(email, name);
    state.store.insert_user(user.clone()).await?;
    Ok((StatusCode::CREATED, Json(user)).into_response())
}

/// Returns a user with usage counters (`GET /v1/users/{id}`).
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<User>, AppError> {
    require_auth(&state.cfg, &headers)?;
    state
        .store
        .find_user(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("user {id} not found")))
}

struct UploadForm {
    user_id: String,
    upload: Option<(String, Vec<u8>)>,
    source_url: Option<String>,
    settings: JobSettings,
}

/// Accepts media for transcription (`POST /v1/transcriptions`).
///
/// Responds `202 Accepted` with the new job; processing continues in the background.
pub async fn create_transcription(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    require_auth(&state.cfg, &headers)?;

    let form = parse_upload_form(&mut multipart).await?;
    if state.store.find_user(&form.user_id).await?.is_none() {
        return Err(AppError::invalid_request(
            format!("unknown user_id={:?}", form.user_id),
            Some("user_id"),
            Some("unknown_user"),
        ));
    }

    let (file_name, source_url) = match (form.upload, form.source_url) {
        (Some((file_name, bytes)), None) => {
            let extension = validate_extension(&file_name)?;
            let stored = state.media.save(&extension, &bytes).await?;
            debug!(media = %stored.name, file_name = %file_name, "upload stored");
            (file_name, stored.url)
        }
        (None, Some(url)) => (file_name_from_url(&url), url),
        (Some(_), Some(_)) => {
            return Err(AppError::invalid_request(
                "provide either file or source_url, not both",
                Some("source_url"),
                None,
            ));
        }
        (None, None) => {
            return Err(AppError::invalid_request(
                "missing required multipart field: file",
                Some("file"),
                None,
            ));
        }
    };

    let job = Job::new(&form.user_id, file_name, source_url, form.settings);
    state.store.insert_job(job.clone()).await?;
    info!(
        job_id = %job.id,
        user_id = %job.user_id,
        language = %job.settings.language,
        "accepted transcription job"
    );

    spawn_job(
        Arc::clone(&state.pipeline),
        job.id.clone(),
        job.source_url.clone(),
        job.settings.clone(),
    );

    Ok((StatusCode::ACCEPTED, Json(job)).into_response())
}

/// Returns a job record (`GET /v1/transcriptions/{id}`).
pub async fn get_transcription(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Job>, AppError> {
    require_auth(&state.cfg, &headers)?;
    find_job(&state, &id).await.map(Json)
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    format: Option<String>,
}

/// Downloads a completed transcript (`GET /v1/transcriptions/{id}/export`).
pub async fn export_transcription(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, AppError> {
    require_auth(&state.cfg, &headers)?;
    let format = ExportFormat::parse(query.format.as_deref().unwrap_or("txt"))?;

    let job = find_job(&state, &id).await?;
    if job.status != JobStatus::Completed {
        return Err(AppError::conflict(format!(
            "job {id} is {}; only completed jobs can be exported",
            job.status.as_str()
        )));
    }

    let body = match format {
        ExportFormat::Txt => job_to_text(&job),
        ExportFormat::Srt => segments_to_srt(&job.timestamps),
        ExportFormat::Vtt => segments_to_vtt(&job.timestamps),
        ExportFormat::Json => serde_json::to_string_pretty(&job)
            .map_err(|err| AppError::internal(format!("failed to encode job: {err}")))?,
    };
    let stem = job
        .file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(job.file_name.as_str())
        .replace('"', "");
    let disposition = format!("attachment; filename=\"{stem}.{}\"", format.extension());

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// Serves stored media (`GET /media/{name}`).
///
/// Unauthenticated so the speech service can fetch uploads; names are random UUIDs.
pub async fn get_media(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let bytes = state.media.read(&name).await?;
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .unwrap_or_default();
    Ok(([(header::CONTENT_TYPE, content_type_for(extension))], bytes).into_response())
}

async fn find_job(state: &AppState, id: &str) -> Result<Job, AppError> {
    state
        .store
        .find_job(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("transcription {id} not found")))
}

/// Parses and validates multipart form fields for uploads.
async fn parse_upload_form(multipart: &mut Multipart) -> Result<UploadForm, AppError> {
    let mut user_id: Option<String> = None;
    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut source_url: Option<String> = None;
    let mut settings = JobSettings::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_multipart(format!("invalid multipart body: {err}")))?
    {
        let Some(name) = field.name().map(ToOwned::to_owned) else {
            continue;
        };

        match name.as_str() {
            "file" => {
                let filename = field
                    .file_name()
                    .map(ToOwned::to_owned)
                    .ok_or_else(|| AppError::bad_multipart("file field is missing filename"))?;
                let bytes = field.bytes().await.map_err(|err| {
                    AppError::bad_multipart(format!("failed to read file bytes: {err}"))
                })?;
                if bytes.is_empty() {
                    return Err(AppError::invalid_request(
                        "uploaded file is empty",
                        Some("file"),
                        Some("empty_file"),
                    ));
                }
                upload = Some((filename, bytes.to_vec()));
            }
            "user_id" => user_id = Some(text_field(field, &name).await?).filter(|v| !v.is_empty()),
            "source_url" => {
                let url = text_field(field, &name).await?;
                if !url.is_empty() {
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        return Err(AppError::invalid_request(
                            format!("invalid source_url={url:?}; expected an http(s) URL"),
                            Some("source_url"),
                            Some("invalid_source_url"),
                        ));
                    }
                    source_url = Some(url);
                }
            }
            "language" => {
                let language = text_field(field, &name).await?;
                if !language.is_empty() {
                    settings.language = language;
                }
            }
            "quality" => {
                let raw = text_field(field, &name).await?;
                if !raw.is_empty() {
                    settings.quality = Quality::parse(&raw).ok_or_else(|| {
                        AppError::invalid_request(
                            format!("invalid quality={raw:?}; expected standard or best"),
                            Some("quality"),
                            Some("invalid_quality"),
                        )
                    })?;
                }
            }
            "speaker_identification" => {
                settings.speaker_identification = bool_field(field, &name).await?;
            }
            "include_timestamps" => {
                settings.include_timestamps = bool_field(field, &name).await?;
            }
            "filter_profanity" => settings.filter_profanity = bool_field(field, &name).await?,
            "punctuation" => settings.punctuation = bool_field(field, &name).await?,
            _ => {}
        }
    }

    let user_id = user_id.ok_or_else(|| {
        AppError::invalid_request(
            "missing required multipart field: user_id",
            Some("user_id"),
            None,
        )
    })?;

    Ok(UploadForm {
        user_id,
        upload,
        source_url,
        settings,
    })
}

async fn text_field(field: Field<'_>, name: &str) -> Result<String, AppError> {
    Ok(field
        .text()
        .await
        .map_err(|err| AppError::bad_multipart(format!("invalid {name} field: {err}")))?
        .trim()
        .to_string())
}

async fn bool_field(field: Field<'_>, name: &str) -> Result<bool, AppError> {
    let raw = text_field(field, name).await?;
    parse_bool(&raw).ok_or_else(|| {
        AppError::invalid_request(
            format!("invalid {name}={raw:?}; expected true/false"),
            Some(name),
            Some("invalid_boolean"),
        )
    })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn file_name_from_url(url: &str) -> String {
    url.split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|name| !name.is_empty() && !name.contains(':'))
        .unwrap_or("remote-media")
        .to_string()
}

/// Enforces optional bearer-token authentication.
fn require_auth(cfg: &AppConfig, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(expected_api_key) = cfg.api_key.as_deref() else {
        return Ok(());
    };

    let Some(raw) = headers.get(header::AUTHORIZATION) else {
        return Err(AppError::unauthorized("missing bearer token"));
    };

    let value = raw
        .to_str()
        .map_err(|_| AppError::unauthorized("invalid authorization header"))?;

    let mut parts = value.split_whitespace();
    let scheme = parts
        .next()
        .ok_or_else(|| AppError::unauthorized("missing bearer token"))?;
    let token = parts
        .next()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::unauthorized("missing bearer token"))?;
    if parts.next().is_some() || !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::unauthorized("missing bearer token"));
    }

    if token != expected_api_key {
        return Err(AppError::unauthorized("invalid token"));
    }

    Ok(())
}
