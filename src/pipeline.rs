//! Transcription job orchestration.
//!
//! A job moves `processing → completed` or `processing → error` exactly once.
//! Submission and polling failures are fatal and recorded on the job.
//! Translation, summary and per-segment failures are logged and replaced by a
//! fallback so an otherwise successful transcription is never discarded.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::language::{self, base_tag, LanguagePolicy};
use crate::model::{JobSettings, JobStatus, JobUpdate, UsageDelta};
use crate::recognition::{
    FeatureFlags, JobHandle, RecognitionError, RecognitionResult, RecognitionStatus,
    SpeechRecognizer,
};
use crate::store::{RecordStore, StoreError};
use crate::summarize::Summarizer;
use crate::timestamps::{self, Segment};
use crate::translate::{TranslationError, Translator};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 120;
pub const DEFAULT_TRANSLATE_MAX_CHARS: usize = 5_000;

/// Fatal failures that end a job in the `error` state.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Recognition(#[from] RecognitionError),
    /// Error status reported by the speech service; the message is stored verbatim.
    #[error("{0}")]
    Remote(String),
    #[error("transcription timed out after {attempts} polling attempts")]
    Timeout { attempts: u32 },
    #[error("speech service reported completion without a result")]
    MissingResult,
    #[error("no speech was detected in the audio")]
    EmptyTranscript,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Delay before each status poll.
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    /// Largest piece of text sent in one translation call.
    pub translate_max_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            translate_max_chars: DEFAULT_TRANSLATE_MAX_CHARS,
        }
    }
}

/// Everything a job needs to run, shared by all concurrently running jobs.
pub struct Pipeline {
    store: Arc<dyn RecordStore>,
    recognizer: Arc<dyn SpeechRecognizer>,
    translator: Arc<dyn Translator>,
    summarizer: Summarizer,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn RecordStore>,
        recognizer: Arc<dyn SpeechRecognizer>,
        translator: Arc<dyn Translator>,
        summarizer: Summarizer,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            recognizer,
            translator,
            summarizer,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Runs one job to a terminal state.
    ///
    /// The outcome is observed through the record store. `Err` is returned
    /// only when the store itself could not record the outcome.
    pub async fn process_job(
        &self,
        job_id: &str,
        source_url: &str,
        settings: &JobSettings,
    ) -> Result<(), PipelineError> {
        if !self.mark_processing(job_id).await? {
            return Ok(());
        }

        let policy = language::resolve(&settings.language);
        info!(
            job_id,
            language = %policy.tag,
            recognition_code = policy.recognition_code,
            needs_translation = policy.needs_translation,
            "starting transcription"
        );

        let result = match self.recognize(source_url, settings, &policy).await {
            Ok(result) => result,
            Err(err) => {
                warn!(job_id, error = %err, "transcription failed");
                self.store
                    .update_job(job_id, JobUpdate::failed(err.to_string()))
                    .await?;
                return Ok(());
            }
        };

        self.complete(job_id, settings, &policy, result).await
    }

    /// Returns `false` when the job already reached a terminal state.
    async fn mark_processing(&self, job_id: &str) -> Result<bool, PipelineError> {
        let job = self
            .store
            .find_job(job_id)
            .await?
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;

        if job.status.is_terminal() {
            info!(job_id, status = job.status.as_str(), "job already finished; skipping");
            return Ok(false);
        }
        Ok(true)
    }

    async fn recognize(
        &self,
        source_url: &str,
        settings: &JobSettings,
        policy: &LanguagePolicy,
    ) -> Result<RecognitionResult, PipelineError> {
        let features = FeatureFlags::for_job(settings, policy);
        let unsupported: Vec<&str> = policy
            .features
            .iter()
            .filter(|(_, supported)| !**supported)
            .map(|(feature, _)| feature.as_str())
            .collect();
        debug!(
            language = %policy.tag,
            features = ?features,
            unsupported = ?unsupported,
            "submitting audio for transcription"
        );
        let handle = self
            .recognizer
            .submit(source_url, policy.recognition_code, &features)
            .await?;
        let result = self.wait_for_result(&handle).await?;
        if result.text.trim().is_empty() {
            return Err(PipelineError::EmptyTranscript);
        }
        Ok(result)
    }

    async fn wait_for_result(&self, handle: &JobHandle) -> Result<RecognitionResult, PipelineError> {
        let max_attempts = self.config.max_poll_attempts;
        for attempt in 1..=max_attempts {
            tokio::time::sleep(self.config.poll_interval).await;

            let outcome = self.recognizer.poll(handle).await?;
            match outcome.status {
                RecognitionStatus::Queued | RecognitionStatus::Processing => {
                    debug!(
                        remote_id = handle.as_str(),
                        attempt,
                        status = outcome.status.as_str(),
                        "transcription still running"
                    );
                }
                RecognitionStatus::Completed => {
                    debug!(remote_id = handle.as_str(), attempt, "transcription completed");
                    return outcome.result.ok_or(PipelineError::MissingResult);
                }
                RecognitionStatus::Error => {
                    return Err(PipelineError::Remote(
                        outcome
                            .error
                            .unwrap_or_else(|| "transcription failed".to_string()),
                    ));
                }
            }
        }

        Err(PipelineError::Timeout {
            attempts: max_attempts,
        })
    }

    async fn complete(
        &self,
        job_id: &str,
        settings: &JobSettings,
        policy: &LanguagePolicy,
        result: RecognitionResult,
    ) -> Result<(), PipelineError> {
        let source_language = result
            .language_code
            .as_deref()
            .map(base_tag)
            .filter(|tag| !tag.is_empty())
            .unwrap_or_else(|| policy.recognition_code.to_string());
        let target = policy.tag.as_str();
        let translate = should_translate(&source_language, target);

        let mut transcript = result.text.clone();
        let mut language = source_language.clone();
        if translate {
            match self.translate_text(&transcript, target, &source_language).await {
                Ok(translated) => {
                    transcript = translated;
                    language = target.to_string();
                }
                Err(err) => {
                    warn!(job_id, error = %err, "transcript translation failed; keeping original");
                }
            }
        }

        let summary = self.summarizer.summarize(&transcript, target).await;

        let segments = if settings.include_timestamps || settings.speaker_identification {
            timestamps::reconstruct(&result)
        } else {
            Vec::new()
        };
        if settings.speaker_identification && !result.speaker_labels {
            info!(job_id, "recognizer returned no speaker labels; using a single speaker");
        }
        let speakers = if settings.speaker_identification {
            timestamps::distinct_speakers(&segments)
        } else {
            Vec::new()
        };
        let segments = if !settings.include_timestamps {
            Vec::new()
        } else if translate {
            self.translate_segments(job_id, segments, target, &source_language)
                .await
        } else {
            segments
        };

        let duration = result.audio_duration.unwrap_or(0.0);
        let word_count = if result.words.is_empty() {
            result.text.split_whitespace().count() as u64
        } else {
            result.words.len() as u64
        };

        self.store
            .update_job(
                job_id,
                JobUpdate {
                    status: Some(JobStatus::Completed),
                    transcript: Some(transcript),
                    summary: Some(summary.summary),
                    topic: Some(summary.topic),
                    topics: Some(summary.topics),
                    insights: Some(summary.insights),
                    timestamps: Some(segments),
                    speakers: Some(speakers),
                    duration: Some(duration),
                    word_count: Some(word_count),
                    language: Some(language),
                    error: None,
                },
            )
            .await?;
        info!(job_id, duration, word_count, "transcription completed");

        self.record_usage(job_id, duration).await;
        Ok(())
    }

    async fn record_usage(&self, job_id: &str, duration: f64) {
        let user_id = match self.store.find_job(job_id).await {
            Ok(Some(job)) => job.user_id,
            Ok(None) => {
                warn!(job_id, "job vanished before usage could be recorded");
                return;
            }
            Err(err) => {
                warn!(job_id, error = %err, "failed to load job for usage update");
                return;
            }
        };

        let delta = UsageDelta::for_duration(duration);
        if let Err(err) = self.store.increment_user_usage(&user_id, delta).await {
            warn!(job_id, user_id = %user_id, error = %err, "failed to update user usage");
        }
    }

    /// Translates text of any length by splitting it into bounded pieces.
    async fn translate_text(
        &self,
        text: &str,
        target: &str,
        source: &str,
    ) -> Result<String, TranslationError> {
        let mut translated = Vec::new();
        for chunk in translation_chunks(text, self.config.translate_max_chars) {
            translated.push(self.translator.translate(&chunk, target, source).await?);
        }
        Ok(translated.join(" "))
    }

    /// Translates segments one at a time; a failed segment keeps its text.
    async fn translate_segments(
        &self,
        job_id: &str,
        mut segments: Vec<Segment>,
        target: &str,
        source: &str,
    ) -> Vec<Segment> {
        for (idx, segment) in segments.iter_mut().enumerate() {
            if segment.text.trim().is_empty() {
                continue;
            }
            match self.translate_text(&segment.text, target, source).await {
                Ok(translated) => segment.text = translated,
                Err(err) => {
                    warn!(job_id, segment = idx, error = %err, "segment translation failed");
                }
            }
        }
        segments
    }
}

/// Translation is needed whenever the transcript is not already in the target language.
pub fn should_translate(transcript_language: &str, target: &str) -> bool {
    base_tag(transcript_language) != base_tag(target)
}

/// Splits `text` on whitespace into pieces of at most `max_chars` characters.
///
/// Text that already fits is returned untouched. A single word longer than
/// the limit becomes its own piece.
fn translation_chunks(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if current_len > 0 && current_len + 1 + word_len > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Starts a job in the background and returns immediately.
///
/// Nobody awaits the job: failures are logged and dropped. A job that panics
/// while still `processing` is marked `error`; a finished job keeps its status.
pub fn spawn_job(
    pipeline: Arc<Pipeline>,
    job_id: String,
    source_url: String,
    settings: JobSettings,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let worker = {
            let pipeline = Arc::clone(&pipeline);
            let job_id = job_id.clone();
            tokio::spawn(async move {
                pipeline
                    .process_job(&job_id, &source_url, &settings)
                    .await
            })
        };

        match worker.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(job_id = %job_id, error = %err, "transcription pipeline aborted");
            }
            Err(join_err) => {
                error!(job_id = %job_id, error = %join_err, "transcription pipeline panicked");
                let update = JobUpdate::failed("internal error while processing transcription");
                match pipeline.store.update_job(&job_id, update).await {
                    Ok(()) => {}
                    Err(StoreError::JobFinished(_)) => {
                        info!(job_id = %job_id, "job finished before the panic; status kept");
                    }
                    Err(err) => {
                        error!(job_id = %job_id, error = %err, "failed to record pipeline panic");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::*;
    use crate::model::{Job, User};
    use crate::recognition::{PollOutcome, Utterance, Word};
    use crate::store::MemoryStore;
    use crate::summarize::{GenerationError, TextGenerator};

    /// Replays scripted poll outcomes, then repeats `fallback` forever.
    struct ScriptedRecognizer {
        job_id: Option<String>,
        script: Mutex<VecDeque<PollOutcome>>,
        fallback: PollOutcome,
        polls: AtomicUsize,
        submitted_language: Mutex<Option<String>>,
    }

    impl ScriptedRecognizer {
        fn new(script: Vec<PollOutcome>) -> Self {
            Self {
                job_id: Some("remote-1".to_string()),
                script: Mutex::new(script.into()),
                fallback: PollOutcome::pending(RecognitionStatus::Processing),
                polls: AtomicUsize::new(0),
                submitted_language: Mutex::new(None),
            }
        }

        fn completing_with(result: RecognitionResult) -> Self {
            Self::new(vec![
                PollOutcome::pending(RecognitionStatus::Queued),
                PollOutcome::completed(result),
            ])
        }

        fn without_job_id() -> Self {
            Self {
                job_id: None,
                ..Self::new(Vec::new())
            }
        }

        fn poll_count(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SpeechRecognizer for ScriptedRecognizer {
        async fn submit(
            &self,
            _audio_url: &str,
            language_code: &str,
            _features: &FeatureFlags,
        ) -> Result<JobHandle, RecognitionError> {
            *self.submitted_language.lock().unwrap() = Some(language_code.to_string());
            self.job_id
                .clone()
                .map(JobHandle)
                .ok_or_else(|| RecognitionError::Submission("no transcript id returned".to_string()))
        }

        async fn poll(&self, _handle: &JobHandle) -> Result<PollOutcome, RecognitionError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            Ok(next.unwrap_or_else(|| self.fallback.clone()))
        }
    }

    /// Prefixes the target tag; fails for any text listed in `failing`.
    struct FakeTranslator {
        failing: Vec<String>,
        calls: AtomicUsize,
    }

    impl FakeTranslator {
        fn new(failing: &[&str]) -> Self {
            Self {
                failing: failing.iter().map(|s| s.to_string()).collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Translator for FakeTranslator {
        async fn translate(
            &self,
            text: &str,
            target_tag: &str,
            _source_code: &str,
        ) -> Result<String, TranslationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.iter().any(|f| f == text) {
                return Err(TranslationError::Transport("rate limited".to_string()));
            }
            Ok(format!("[{target_tag}] {text}"))
        }
    }

    struct CannedGenerator;

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            Ok("SUMMARY: A greeting.\nTOPICS: Greetings, Small talk\nINSIGHTS: Be polite.".to_string())
        }
    }

    struct Harness {
        pipeline: Arc<Pipeline>,
        store: Arc<MemoryStore>,
        recognizer: Arc<ScriptedRecognizer>,
        translator: Arc<FakeTranslator>,
        user_id: String,
    }

    async fn harness(recognizer: ScriptedRecognizer, translator: FakeTranslator) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let recognizer = Arc::new(recognizer);
        let translator = Arc::new(translator);
        let summarizer = Summarizer::new(
            Arc::new(CannedGenerator),
            translator.clone(),
            crate::summarize::DEFAULT_MAX_CHARS,
        );
        let pipeline = Arc::new(Pipeline::new(
            store.clone(),
            recognizer.clone(),
            translator.clone(),
            summarizer,
            PipelineConfig::default(),
        ));
        let user_id = store
            .insert_user(User::new("ana@example.com", "Ana"))
            .await
            .unwrap();
        Harness {
            pipeline,
            store,
            recognizer,
            translator,
            user_id,
        }
    }

    /// Delegates to [`MemoryStore`] but panics when usage is billed.
    struct PanickingUsageStore(MemoryStore);

    #[async_trait]
    impl RecordStore for PanickingUsageStore {
        async fn insert_job(&self, job: Job) -> Result<String, StoreError> {
            self.0.insert_job(job).await
        }

        async fn find_job(&self, id: &str) -> Result<Option<Job>, StoreError> {
            self.0.find_job(id).await
        }

        async fn update_job(&self, id: &str, update: JobUpdate) -> Result<(), StoreError> {
            self.0.update_job(id, update).await
        }

        async fn insert_user(&self, user: User) -> Result<String, StoreError> {
            self.0.insert_user(user).await
        }

        async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
            self.0.find_user(id).await
        }

        async fn increment_user_usage(
            &self,
            _id: &str,
            _delta: UsageDelta,
        ) -> Result<(), StoreError> {
            panic!("usage ledger unavailable");
        }
    }

    fn pipeline_over(store: Arc<dyn RecordStore>, recognizer: ScriptedRecognizer) -> Arc<Pipeline> {
        let translator = Arc::new(FakeTranslator::new(&[]));
        let summarizer = Summarizer::new(
            Arc::new(CannedGenerator),
            translator.clone(),
            crate::summarize::DEFAULT_MAX_CHARS,
        );
        Arc::new(Pipeline::new(
            store,
            Arc::new(recognizer),
            translator,
            summarizer,
            PipelineConfig::default(),
        ))
    }

    impl Harness {
        async fn run(&self, settings: JobSettings) -> Job {
            let job = Job::new(&self.user_id, "talk.mp3", "http://media/talk.mp3", settings.clone());
            let job_id = self.store.insert_job(job).await.unwrap();
            self.pipeline
                .process_job(&job_id, "http://media/talk.mp3", &settings)
                .await
                .unwrap();
            self.store.find_job(&job_id).await.unwrap().expect("job")
        }
    }

    fn settings(language: &str) -> JobSettings {
        JobSettings {
            language: language.to_string(),
            ..JobSettings::default()
        }
    }

    fn utterance(text: &str, start: u64, end: u64) -> Utterance {
        Utterance {
            text: text.to_string(),
            start,
            end,
            speaker: Some(if start % 2 == 0 { "A" } else { "B" }.to_string()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn plain_english_job_completes_without_timestamps() {
        let result = RecognitionResult {
            text: "Hello world.".to_string(),
            audio_duration: Some(61.0),
            ..RecognitionResult::default()
        };
        let h = harness(ScriptedRecognizer::completing_with(result), FakeTranslator::new(&[])).await;

        let job = h
            .run(JobSettings {
                include_timestamps: true,
                ..settings("en")
            })
            .await;

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.transcript.as_deref(), Some("Hello world."));
        assert!(job.timestamps.is_empty());
        assert_eq!(job.summary.as_deref(), Some("A greeting."));
        assert_eq!(job.topic.as_deref(), Some("Greetings"));
        assert_eq!(job.topics, vec!["Greetings", "Small talk"]);
        assert_eq!(job.word_count, Some(2));
        assert_eq!(job.language.as_deref(), Some("en"));
        assert!(job.error.is_none());
        assert_eq!(h.translator.calls.load(Ordering::SeqCst), 0);

        let user = h.store.find_user(&h.user_id).await.unwrap().expect("user");
        assert_eq!(user.transcriptions_count, 1);
        assert_eq!(user.minutes_used, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn words_become_a_single_punctuated_segment() {
        let result = RecognitionResult {
            text: "Hi there.".to_string(),
            words: vec![
                Word {
                    text: "Hi".to_string(),
                    start: 0,
                    end: 200,
                    speaker: None,
                },
                Word {
                    text: "there.".to_string(),
                    start: 200,
                    end: 500,
                    speaker: None,
                },
            ],
            ..RecognitionResult::default()
        };
        let h = harness(ScriptedRecognizer::completing_with(result), FakeTranslator::new(&[])).await;

        let job = h
            .run(JobSettings {
                include_timestamps: true,
                ..settings("en")
            })
            .await;

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.timestamps.len(), 1);
        assert_eq!(job.timestamps[0].text, "Hi there.");
        assert_eq!(job.timestamps[0].start, 0);
        assert_eq!(job.timestamps[0].end, 500);
        assert!(job.speakers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_job_id_fails_without_polling() {
        let h = harness(ScriptedRecognizer::without_job_id(), FakeTranslator::new(&[])).await;

        let job = h.run(settings("en")).await;

        assert_eq!(job.status, JobStatus::Error);
        assert!(job
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("no transcript id returned"));
        assert!(job.transcript.is_none());
        assert_eq!(h.recognizer.poll_count(), 0);

        let user = h.store.find_user(&h.user_id).await.unwrap().expect("user");
        assert_eq!(user.transcriptions_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_loop_times_out_after_max_attempts() {
        let h = harness(ScriptedRecognizer::new(Vec::new()), FakeTranslator::new(&[])).await;
        let started = Instant::now();

        let job = h.run(settings("en")).await;

        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(
            job.error.as_deref(),
            Some("transcription timed out after 120 polling attempts")
        );
        assert_eq!(h.recognizer.poll_count(), 120);
        let elapsed = started.elapsed();
        assert!(elapsed >= DEFAULT_POLL_INTERVAL * 120);
        assert!(elapsed < DEFAULT_POLL_INTERVAL * 121);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_error_on_last_attempt_is_recorded_verbatim() {
        let mut script = vec![PollOutcome::pending(RecognitionStatus::Processing); 119];
        script.push(PollOutcome::failed("audio corrupt"));
        let h = harness(ScriptedRecognizer::new(script), FakeTranslator::new(&[])).await;

        let job = h.run(settings("en")).await;

        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error.as_deref(), Some("audio corrupt"));
        assert_eq!(h.recognizer.poll_count(), 120);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_segment_translation_keeps_original_text_only_for_that_segment() {
        let result = RecognitionResult {
            text: "one two three four five".to_string(),
            utterances: vec![
                utterance("one", 0, 1_000),
                utterance("two", 1_001, 2_000),
                utterance("three", 2_000, 3_000),
                utterance("four", 3_001, 4_000),
                utterance("five", 4_000, 5_000),
            ],
            audio_duration: Some(5.0),
            ..RecognitionResult::default()
        };
        let h = harness(
            ScriptedRecognizer::completing_with(result),
            FakeTranslator::new(&["three"]),
        )
        .await;

        let job = h
            .run(JobSettings {
                include_timestamps: true,
                speaker_identification: true,
                ..settings("ar")
            })
            .await;

        assert_eq!(job.status, JobStatus::Completed);
        let texts = job
            .timestamps
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            texts,
            vec!["[ar] one", "[ar] two", "three", "[ar] four", "[ar] five"]
        );
        assert_eq!(job.transcript.as_deref(), Some("[ar] one two three four five"));
        assert_eq!(job.language.as_deref(), Some("ar"));
        assert_eq!(job.speakers, vec!["A", "B"]);
        assert_eq!(
            h.recognizer.submitted_language.lock().unwrap().as_deref(),
            Some("en")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transcript_translation_failure_keeps_original_and_completes() {
        let result = RecognitionResult {
            text: "Good morning.".to_string(),
            ..RecognitionResult::default()
        };
        let h = harness(
            ScriptedRecognizer::completing_with(result),
            FakeTranslator::new(&["Good morning."]),
        )
        .await;

        let job = h.run(settings("sv")).await;

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.transcript.as_deref(), Some("Good morning."));
        assert_eq!(job.language.as_deref(), Some("en"));
    }

    #[tokio::test(start_paused = true)]
    async fn natively_recognized_target_is_not_translated() {
        let result = RecognitionResult {
            text: "Hola a todos.".to_string(),
            language_code: Some("es".to_string()),
            ..RecognitionResult::default()
        };
        let h = harness(ScriptedRecognizer::completing_with(result), FakeTranslator::new(&[])).await;

        let job = h.run(settings("es")).await;

        assert_eq!(job.transcript.as_deref(), Some("Hola a todos."));
        assert_eq!(job.language.as_deref(), Some("es"));
        assert_eq!(h.translator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_recognition_text_is_an_error() {
        let h = harness(
            ScriptedRecognizer::completing_with(RecognitionResult::default()),
            FakeTranslator::new(&[]),
        )
        .await;

        let job = h.run(settings("en")).await;

        assert_eq!(job.status, JobStatus::Error);
        assert!(job.transcript.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn finished_jobs_are_left_untouched() {
        let result = RecognitionResult {
            text: "Hello.".to_string(),
            ..RecognitionResult::default()
        };
        let h = harness(ScriptedRecognizer::completing_with(result), FakeTranslator::new(&[])).await;
        let job = h.run(settings("en")).await;
        assert_eq!(job.status, JobStatus::Completed);

        h.pipeline
            .process_job(&job.id, &job.source_url, &job.settings)
            .await
            .unwrap();

        let again = h.store.find_job(&job.id).await.unwrap().expect("job");
        assert_eq!(again.updated_at, job.updated_at);
        assert_eq!(h.recognizer.poll_count(), 2);
        let user = h.store.find_user(&h.user_id).await.unwrap().expect("user");
        assert_eq!(user.transcriptions_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_user_does_not_fail_the_job() {
        let result = RecognitionResult {
            text: "Hello.".to_string(),
            ..RecognitionResult::default()
        };
        let h = harness(ScriptedRecognizer::completing_with(result), FakeTranslator::new(&[])).await;
        let job = Job::new("ghost", "a.mp3", "http://media/a.mp3", settings("en"));
        let job_id = h.store.insert_job(job).await.unwrap();

        h.pipeline
            .process_job(&job_id, "http://media/a.mp3", &settings("en"))
            .await
            .unwrap();

        let job = h.store.find_job(&job_id).await.unwrap().expect("job");
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn panic_after_completion_keeps_job_completed() {
        let store = Arc::new(PanickingUsageStore(MemoryStore::new()));
        let user_id = store
            .insert_user(User::new("ana@example.com", "Ana"))
            .await
            .unwrap();
        let job_id = store
            .insert_job(Job::new(&user_id, "a.mp3", "http://media/a.mp3", settings("en")))
            .await
            .unwrap();
        let result = RecognitionResult {
            text: "Hello.".to_string(),
            ..RecognitionResult::default()
        };
        let pipeline = pipeline_over(store.clone(), ScriptedRecognizer::completing_with(result));

        spawn_job(
            pipeline,
            job_id.clone(),
            "http://media/a.mp3".to_string(),
            settings("en"),
        )
        .await
        .unwrap();

        let job = store.find_job(&job_id).await.unwrap().expect("job");
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.transcript.as_deref(), Some("Hello."));
        assert_eq!(job.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn unpersisted_completion_is_neither_visible_nor_billed() {
        let dir = std::env::temp_dir().join(format!(
            "transcribe-pipeline-readonly-{}",
            uuid::Uuid::new_v4()
        ));
        let store = Arc::new(MemoryStore::open(dir.join("snap.json")).await.unwrap());
        let user_id = store
            .insert_user(User::new("ana@example.com", "Ana"))
            .await
            .unwrap();
        let job_id = store
            .insert_job(Job::new(&user_id, "a.mp3", "http://media/a.mp3", settings("en")))
            .await
            .unwrap();
        std::fs::create_dir_all(dir.join("snap.part")).unwrap();

        let result = RecognitionResult {
            text: "Hello.".to_string(),
            audio_duration: Some(90.0),
            ..RecognitionResult::default()
        };
        let pipeline = pipeline_over(store.clone(), ScriptedRecognizer::completing_with(result));
        let outcome = pipeline
            .process_job(&job_id, "http://media/a.mp3", &settings("en"))
            .await;
        assert!(matches!(
            outcome,
            Err(PipelineError::Store(StoreError::Persist { .. }))
        ));

        let job = store.find_job(&job_id).await.unwrap().expect("job");
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.transcript, None);
        let user = store.find_user(&user_id).await.unwrap().expect("user");
        assert_eq!(user.transcriptions_count, 0);
        assert_eq!(user.minutes_used, 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_job_runs_to_completion_in_background() {
        let result = RecognitionResult {
            text: "Background.".to_string(),
            ..RecognitionResult::default()
        };
        let h = harness(ScriptedRecognizer::completing_with(result), FakeTranslator::new(&[])).await;
        let job = Job::new(&h.user_id, "a.mp3", "http://media/a.mp3", settings("en"));
        let job_id = h.store.insert_job(job).await.unwrap();

        spawn_job(
            h.pipeline.clone(),
            job_id.clone(),
            "http://media/a.mp3".to_string(),
            settings("en"),
        )
        .await
        .unwrap();

        let job = h.store.find_job(&job_id).await.unwrap().expect("job");
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[test]
    fn translation_chunks_respect_limit_and_order() {
        let text = "alpha beta gamma delta epsilon";
        let chunks = translation_chunks(text, 11);
        assert_eq!(chunks, vec!["alpha beta", "gamma delta", "epsilon"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 11));
        assert_eq!(translation_chunks("short\ntext", 100), vec!["short\ntext"]);
    }

    #[test]
    fn translation_predicate_compares_base_languages() {
        assert!(!should_translate("en_us", "en"));
        assert!(should_translate("en", "ar"));
        assert!(!should_translate("pt", "pt-BR"));
        assert!(should_translate("es", "en"));
    }
}
