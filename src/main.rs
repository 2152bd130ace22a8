mod api;
mod config;
mod error;
mod formats;
mod language;
mod media;
mod model;
mod pipeline;
mod recognition;
mod store;
mod summarize;
mod timestamps;
mod translate;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::api::{build_router, AppState};
use crate::config::AppConfig;
use crate::media::MediaStore;
use crate::pipeline::Pipeline;
use crate::recognition::assemblyai::AssemblyAiClient;
use crate::store::{MemoryStore, RecordStore};
use crate::summarize::gemini::GeminiClient;
use crate::summarize::Summarizer;
use crate::translate::google::GoogleTranslator;
use crate::translate::Translator;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "transcribe_pipeline=info,axum=info".into()),
        )
        .compact()
        .init();

    let cfg = AppConfig::from_env()?;
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.http_timeout_secs))
        .build()?;

    let store: Arc<dyn RecordStore> = match cfg.data_file.as_deref() {
        Some(path) => Arc::new(MemoryStore::open(path).await?),
        None => Arc::new(MemoryStore::new()),
    };

    let translator: Arc<dyn Translator> = Arc::new(GoogleTranslator::new(
        http.clone(),
        &cfg.translate_base_url,
        cfg.translate_api_key.clone(),
    ));
    let recognizer = Arc::new(AssemblyAiClient::new(
        http.clone(),
        &cfg.assemblyai_base_url,
        cfg.assemblyai_api_key.clone(),
    ));
    let generator = Arc::new(GeminiClient::new(
        http,
        &cfg.gemini_base_url,
        cfg.gemini_model.clone(),
        cfg.gemini_api_key.clone(),
    ));
    let summarizer = Summarizer::new(generator, Arc::clone(&translator), cfg.summary_max_chars);
    let pipeline = Arc::new(Pipeline::new(
        store,
        recognizer,
        translator,
        summarizer,
        cfg.pipeline_config(),
    ));

    let media = MediaStore::new(&cfg.media_dir, &cfg.public_base_url);
    let state = Arc::new(AppState::new(cfg.clone(), media, pipeline));

    let app = build_router(state);

    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        host = %cfg.host,
        port = cfg.port,
        public_base_url = %cfg.public_base_url,
        persistent = cfg.data_file.is_some(),
        "starting transcribe-pipeline"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            let _ = sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
