//! Record store for jobs and users.
//!
//! The pipeline only needs point lookups and partial updates keyed by id, so
//! the contract is kept to the [`RecordStore`] trait. [`MemoryStore`] keeps
//! everything in memory and can snapshot to a JSON file after each mutation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::model::{Job, JobUpdate, UsageDelta, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    JobNotFound(String),
    #[error("user {0} not found")]
    UserNotFound(String),
    #[error("job {0} already finished")]
    JobFinished(String),
    #[error("failed to persist snapshot to {path:?}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to load snapshot from {path:?}: {message}")]
    Load { path: PathBuf, message: String },
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Storage contract consumed by the pipeline and the HTTP layer.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_job(&self, job: Job) -> Result<String, StoreError>;
    async fn find_job(&self, id: &str) -> Result<Option<Job>, StoreError>;
    /// Applies a partial update. Last writer wins per field.
    ///
    /// Jobs that reached `completed` or `error` are frozen and reject updates
    /// with [`StoreError::JobFinished`].
    async fn update_job(&self, id: &str, update: JobUpdate) -> Result<(), StoreError>;
    async fn insert_user(&self, user: User) -> Result<String, StoreError>;
    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError>;
    async fn increment_user_usage(&self, id: &str, delta: UsageDelta) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    jobs: HashMap<String, Job>,
    #[serde(default)]
    users: HashMap<String, User>,
}

/// In-memory store with optional JSON file persistence.
pub struct MemoryStore {
    state: Mutex<Snapshot>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    /// Creates an empty, purely in-memory store.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Snapshot::default()),
            snapshot_path: None,
        }
    }

    /// Opens a store backed by `path`, loading existing records if the file exists.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Snapshot::default(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| StoreError::Load {
                path: path.clone(),
                message: err.to_string(),
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(err) => {
                return Err(StoreError::Load {
                    path,
                    message: err.to_string(),
                })
            }
        };

        debug!(
            path = %path.display(),
            jobs = snapshot.jobs.len(),
            users = snapshot.users.len(),
            "loaded record snapshot"
        );

        Ok(Self {
            state: Mutex::new(snapshot),
            snapshot_path: Some(path),
        })
    }

    /// Applies `change` to a copy of the records and swaps it in once the
    /// snapshot is on disk, so a failed write leaves memory untouched.
    async fn mutate<T>(
        &self,
        change: impl FnOnce(&mut Snapshot) -> Result<T, StoreError> + Send,
    ) -> Result<T, StoreError> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let out = change(&mut next)?;
        self.persist(&next).await?;
        *state = next;
        Ok(out)
    }

    async fn persist(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let Some(path) = self.snapshot_path.as_deref() else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        write_atomically(path, &bytes).await
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let persist_err = |source| StoreError::Persist {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(persist_err)?;
    }
    let tmp_path = path.with_extension("part");
    tokio::fs::write(&tmp_path, bytes).await.map_err(persist_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(persist_err)?;
    Ok(())
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_job(&self, job: Job) -> Result<String, StoreError> {
        self.mutate(|state| {
            let id = job.id.clone();
            state.jobs.insert(id.clone(), job);
            Ok(id)
        })
        .await
    }

    async fn find_job(&self, id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self.state.lock().await.jobs.get(id).cloned())
    }

    async fn update_job(&self, id: &str, update: JobUpdate) -> Result<(), StoreError> {
        self.mutate(|state| {
            let job = state
                .jobs
                .get_mut(id)
                .ok_or_else(|| StoreError::JobNotFound(id.to_string()))?;
            if job.status.is_terminal() {
                return Err(StoreError::JobFinished(id.to_string()));
            }
            job.apply(update);
            Ok(())
        })
        .await
    }

    async fn insert_user(&self, user: User) -> Result<String, StoreError> {
        self.mutate(|state| {
            let id = user.id.clone();
            state.users.insert(id.clone(), user);
            Ok(id)
        })
        .await
    }

    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.state.lock().await.users.get(id).cloned())
    }

    async fn increment_user_usage(&self, id: &str, delta: UsageDelta) -> Result<(), StoreError> {
        self.mutate(|state| {
            let user = state
                .users
                .get_mut(id)
                .ok_or_else(|| StoreError::UserNotFound(id.to_string()))?;
            user.transcriptions_count += delta.count;
            user.minutes_used += delta.minutes;
            user.updated_at = Utc::now();
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JobSettings, JobStatus};

    fn temp_snapshot_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "transcribe-pipeline-{name}-{}.json",
            uuid::Uuid::new_v4()
        ))
    }

    #[tokio::test]
    async fn update_job_merges_fields() {
        let store = MemoryStore::new();
        let job = Job::new("u1", "a.mp3", "http://media/a.mp3", JobSettings::default());
        let id = store.insert_job(job).await.unwrap();

        store
            .update_job(
                &id,
                JobUpdate {
                    transcript: Some("hi".to_string()),
                    status: Some(JobStatus::Completed),
                    ..JobUpdate::default()
                },
            )
            .await
            .unwrap();

        let job = store.find_job(&id).await.unwrap().expect("job");
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.transcript.as_deref(), Some("hi"));
        assert_eq!(job.source_url, "http://media/a.mp3");
    }

    #[tokio::test]
    async fn update_unknown_job_is_an_error() {
        let store = MemoryStore::new();
        let err = store
            .update_job("missing", JobUpdate::status(JobStatus::Error))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn usage_accumulates_and_unknown_user_errors() {
        let store = MemoryStore::new();
        let id = store.insert_user(User::new("a@b.c", "A")).await.unwrap();

        let delta = UsageDelta { count: 1, minutes: 3 };
        store.increment_user_usage(&id, delta).await.unwrap();
        store.increment_user_usage(&id, delta).await.unwrap();

        let user = store.find_user(&id).await.unwrap().expect("user");
        assert_eq!(user.transcriptions_count, 2);
        assert_eq!(user.minutes_used, 6);

        assert!(matches!(
            store.increment_user_usage("nobody", delta).await,
            Err(StoreError::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn finished_jobs_reject_updates() {
        let store = MemoryStore::new();
        let job = Job::new("u1", "a.mp3", "http://media/a.mp3", JobSettings::default());
        let id = store.insert_job(job).await.unwrap();
        store
            .update_job(&id, JobUpdate::status(JobStatus::Completed))
            .await
            .unwrap();

        let err = store
            .update_job(&id, JobUpdate::failed("late failure"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::JobFinished(_)));

        let job = store.find_job(&id).await.unwrap().expect("job");
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.error, None);
    }

    #[tokio::test]
    async fn failed_snapshot_write_leaves_records_unchanged() {
        let dir = std::env::temp_dir().join(format!(
            "transcribe-pipeline-unwritable-{}",
            uuid::Uuid::new_v4()
        ));
        let store = MemoryStore::open(dir.join("snap.json")).await.unwrap();
        let user_id = store.insert_user(User::new("a@b.c", "A")).await.unwrap();
        let job_id = store
            .insert_job(Job::new(&user_id, "a.wav", "http://m/a.wav", JobSettings::default()))
            .await
            .unwrap();

        // A directory where the temp file should go makes every write fail.
        std::fs::create_dir_all(dir.join("snap.part")).unwrap();

        let err = store
            .update_job(&job_id, JobUpdate::status(JobStatus::Completed))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Persist { .. }));
        assert!(matches!(
            store
                .increment_user_usage(&user_id, UsageDelta { count: 1, minutes: 2 })
                .await,
            Err(StoreError::Persist { .. })
        ));
        assert!(store.insert_user(User::new("b@c.d", "B")).await.is_err());

        let job = store.find_job(&job_id).await.unwrap().expect("job");
        assert_eq!(job.status, JobStatus::Processing);
        let user = store.find_user(&user_id).await.unwrap().expect("user");
        assert_eq!(user.transcriptions_count, 0);
        assert_eq!(user.minutes_used, 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let path = temp_snapshot_path("reopen");
        let store = MemoryStore::open(&path).await.unwrap();
        let user_id = store.insert_user(User::new("a@b.c", "A")).await.unwrap();
        let job_id = store
            .insert_job(Job::new(&user_id, "a.wav", "http://m/a.wav", JobSettings::default()))
            .await
            .unwrap();
        drop(store);

        let reopened = MemoryStore::open(&path).await.unwrap();
        assert!(reopened.find_user(&user_id).await.unwrap().is_some());
        assert_eq!(
            reopened.find_job(&job_id).await.unwrap().expect("job").status,
            JobStatus::Processing
        );

        let _ = std::fs::remove_file(&path);
    }
}
