mod error;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;

use lode_core::{AppConfig, FileId, JobId, JobType};
use lode_indexer::{JobRunner, JobSnapshot, ProgressHub, Subscription};
use lode_parser::{ContentParser, DocumentExtractor, MediaDecoder, ParserOptions};
use lode_predict::{
    Embedder, EmbeddingPredictor, HashEmbedding, HttpEmbedding, HttpSpeech, HttpVision,
    SpeechPredictor, VisionPredictor,
};
use lode_retrieval::{MultimodalRequest, SearchEngine, SearchRequest, SearchResponse};
use lode_storage::{JobCreation, SearchRecord, StorageManager};

pub use error::EngineError;
pub use lode_retrieval::SearchResultItem;

/// External capabilities handed to [`Services::start`]: the embedding
/// predictor (required), the optional speech/vision predictors, and the
/// format reader/decoder seams.
pub struct Predictors {
    pub embedding: Arc<dyn EmbeddingPredictor>,
    pub speech: Option<Arc<dyn SpeechPredictor>>,
    pub vision: Option<Arc<dyn VisionPredictor>>,
    pub extractors: Vec<Box<dyn DocumentExtractor>>,
    pub decoder: Option<Arc<dyn MediaDecoder>>,
}

impl Predictors {
    /// HTTP-backed predictors against the configured local model host.
    pub fn http(config: &AppConfig) -> Self {
        Self {
            embedding: Arc::new(HttpEmbedding::new(
                &config.ai.endpoint,
                &config.ai.embed_model,
                config.embedding.dim,
                config.ai.embedding_timeout_secs,
            )),
            speech: Some(Arc::new(HttpSpeech::new(
                &config.ai.endpoint,
                config.ai.speech.timeout_secs,
            ))),
            vision: Some(Arc::new(HttpVision::new(
                &config.ai.endpoint,
                config.ai.image.timeout_secs,
            ))),
            extractors: Vec::new(),
            decoder: None,
        }
    }

    /// Deterministic local embedding, no speech/vision. Suitable for
    /// offline operation and tests.
    pub fn offline(dim: usize) -> Self {
        Self {
            embedding: Arc::new(HashEmbedding::new(dim)),
            speech: None,
            vision: None,
            extractors: Vec::new(),
            decoder: None,
        }
    }
}

/// Aggregate counts over the stores, for the stats endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IndexStats {
    pub files_total: usize,
    pub files_by_status: HashMap<String, usize>,
    pub files_by_kind: HashMap<String, usize>,
    pub chunks_total: usize,
    pub vectors_total: usize,
    pub fulltext_docs_total: usize,
    pub jobs_by_status: HashMap<String, usize>,
}

struct JobHandle {
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

/// The service aggregate: storage, predictors, search, and the job
/// runner, constructed once at startup and shut down explicitly.
///
/// This is the whole consumer API of the core; the transport layer (HTTP,
/// WebSocket, whatever) calls these methods and maps snapshots to wire
/// messages 1:1.
pub struct Services {
    config: Arc<AppConfig>,
    storage: Arc<RwLock<StorageManager>>,
    runner: Arc<JobRunner>,
    search: SearchEngine,
    hub: Arc<ProgressHub>,
    jobs: Mutex<HashMap<i64, JobHandle>>,
}

impl Services {
    /// Open storage under `config.data_root` and wire every subsystem.
    pub fn start(config: AppConfig, predictors: Predictors) -> Result<Self, EngineError> {
        let config = Arc::new(config);
        let storage = StorageManager::open(&config).map_err(|e| EngineError::Fatal {
            reason: format!("storage open failed: {e}"),
        })?;
        let storage = Arc::new(RwLock::new(storage));

        let embedder = Arc::new(Embedder::new(
            Arc::clone(&predictors.embedding),
            config.embedding.batch_size,
        ));
        let parser = Arc::new(ContentParser::new(ParserOptions {
            config: config.parser.clone(),
            extractors: predictors.extractors,
            decoder: predictors.decoder,
            speech: predictors.speech.clone(),
            vision: predictors.vision.clone(),
            speech_max_duration_secs: config.ai.speech.max_duration_secs,
            ocr_min_confidence: config.ai.image.ocr_min_confidence,
        }));
        let hub = Arc::new(ProgressHub::new());
        let runner = Arc::new(JobRunner::new(
            Arc::clone(&storage),
            parser,
            Arc::clone(&embedder),
            Arc::clone(&hub),
            Arc::clone(&config),
        ));
        let search = SearchEngine::new(
            Arc::clone(&storage),
            embedder,
            predictors.speech,
            predictors.vision,
            config.ai.image.ocr_min_confidence,
        );

        tracing::info!(data_root = %config.data_root.display(), "services started");
        Ok(Self {
            config,
            storage,
            runner,
            search,
            hub,
            jobs: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    // -- Index jobs --

    /// Start a full index build over the given roots. If a live job
    /// already covers the same roots, its id is returned instead of
    /// starting a second runner.
    pub fn build_full_index(
        &self,
        roots: &[PathBuf],
        file_types: Option<Vec<String>>,
    ) -> Result<JobId, EngineError> {
        self.start_job(roots, file_types, JobType::Create)
    }

    /// Start an incremental build (scanner diff against the store).
    pub fn build_incremental_index(
        &self,
        roots: &[PathBuf],
        file_types: Option<Vec<String>>,
    ) -> Result<JobId, EngineError> {
        self.start_job(roots, file_types, JobType::Update)
    }

    fn start_job(
        &self,
        roots: &[PathBuf],
        file_types: Option<Vec<String>>,
        job_type: JobType,
    ) -> Result<JobId, EngineError> {
        if roots.is_empty() {
            return Err(EngineError::Validation {
                reason: "no root paths given".to_string(),
            });
        }
        for root in roots {
            if !root.is_dir() {
                return Err(EngineError::Validation {
                    reason: format!("root is not a directory: {}", root.display()),
                });
            }
        }

        let folder_path = job_folder_key(roots);
        let creation = {
            let mut mgr = self.write_lock();
            mgr.relational_mut().create_job(&folder_path, job_type)?
        };
        let job = match creation {
            JobCreation::Created(job) => job,
            JobCreation::Conflict(existing) => {
                tracing::debug!(job_id = %existing.id, "live job exists for roots, returning it");
                return Ok(existing.id);
            }
        };

        let cancel = Arc::new(AtomicBool::new(false));
        let runner = Arc::clone(&self.runner);
        let roots = roots.to_vec();
        let cancel_for_thread = Arc::clone(&cancel);
        let job_id = job.id;
        let thread = std::thread::Builder::new()
            .name(format!("lode-job-{job_id}"))
            .spawn(move || {
                let result = match job_type {
                    JobType::Create => {
                        runner.run_full(job_id, &roots, file_types.as_deref(), &cancel_for_thread)
                    }
                    JobType::Update => runner.run_incremental(
                        job_id,
                        &roots,
                        file_types.as_deref(),
                        &cancel_for_thread,
                    ),
                };
                if let Err(e) = result {
                    tracing::warn!(job_id = %job_id, error = %e, "index job failed");
                }
            })
            .map_err(|e| EngineError::Fatal {
                reason: format!("job thread spawn failed: {e}"),
            })?;

        self.lock_jobs().insert(
            job_id.0,
            JobHandle {
                cancel,
                thread: Some(thread),
            },
        );
        Ok(job_id)
    }

    fn lock_jobs(&self) -> std::sync::MutexGuard<'_, HashMap<i64, JobHandle>> {
        match self.jobs.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }

    /// Current snapshot of a job.
    pub fn get_job(&self, job_id: JobId) -> Result<JobSnapshot, EngineError> {
        let mgr = self.read_lock();
        let record = mgr
            .relational()
            .get_job(job_id)?
            .ok_or(EngineError::NotFound {
                entity: "job",
                key: job_id.to_string(),
            })?;
        Ok(JobSnapshot::from_record(&record))
    }

    /// Request a stop. The runner observes the flag at the next file
    /// boundary and finishes as `failed("stopped")`. A terminal job is a
    /// no-op.
    pub fn stop_job(&self, job_id: JobId) -> Result<(), EngineError> {
        // Existence check first: stopping an unknown job is an error.
        let _ = self.get_job(job_id)?;
        if let Some(handle) = self.lock_jobs().get(&job_id.0) {
            handle.cancel.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Live stream of snapshots for a job. Subscribing to a job that
    /// already finished delivers its final snapshot and closes.
    pub fn subscribe_job(&self, job_id: JobId) -> Result<Subscription, EngineError> {
        let snapshot = self.get_job(job_id)?;
        let sub = self.hub.subscribe(job_id);
        if snapshot.status.is_terminal() {
            self.hub.publish(&snapshot);
        }
        Ok(sub)
    }

    // -- Search --

    pub fn search(&self, request: &SearchRequest) -> Result<SearchResponse, EngineError> {
        Ok(self.search.search(request)?)
    }

    pub fn multimodal_search(
        &self,
        request: &MultimodalRequest,
    ) -> Result<SearchResponse, EngineError> {
        Ok(self.search.multimodal_search(request)?)
    }

    pub fn suggest(&self, prefix: &str, limit: usize) -> Result<Vec<String>, EngineError> {
        Ok(self.search.suggest(prefix, limit)?)
    }

    pub fn recent_searches(&self, limit: usize) -> Result<Vec<SearchRecord>, EngineError> {
        let mgr = self.read_lock();
        Ok(mgr.relational().recent_searches(limit)?)
    }

    // -- Files --

    /// Remove a file row and its entries in both indexes.
    pub fn delete_file(&self, file_id: FileId) -> Result<(), EngineError> {
        let mut mgr = self.write_lock();
        let file = mgr
            .relational()
            .get_file(file_id)?
            .ok_or(EngineError::NotFound {
                entity: "file",
                key: file_id.to_string(),
            })?;
        let chunk_ids = mgr.relational().chunk_ids_by_file(file.id)?;
        mgr.vector_mut().delete_by_chunk_ids(&chunk_ids);
        mgr.fulltext_mut().delete_by_file(file.id)?;
        mgr.relational_mut().delete_file(file.id)?;
        mgr.flush()?;
        Ok(())
    }

    /// Mark a file for rebuild and enqueue an incremental job over its
    /// folder. Calling it again while that job is live is a no-op (the
    /// job conflict returns the running job).
    pub fn reindex(&self, file_id: FileId) -> Result<(), EngineError> {
        let folder = {
            let mut mgr = self.write_lock();
            let file = mgr
                .relational()
                .get_file(file_id)?
                .ok_or(EngineError::NotFound {
                    entity: "file",
                    key: file_id.to_string(),
                })?;
            mgr.relational_mut().mark_needs_reindex(file_id)?;
            PathBuf::from(&file.path)
                .parent()
                .map(|p| p.to_path_buf())
        };
        if let Some(folder) = folder {
            if folder.is_dir() {
                let _ = self.build_incremental_index(&[folder], None)?;
            }
        }
        Ok(())
    }

    // -- Stats --

    pub fn index_stats(&self) -> Result<IndexStats, EngineError> {
        let mgr = self.read_lock();
        let files_by_status: HashMap<String, usize> = mgr
            .relational()
            .file_counts_by_status()?
            .into_iter()
            .map(|(k, v)| (k.as_str().to_string(), v))
            .collect();
        let files_by_kind: HashMap<String, usize> = mgr
            .relational()
            .file_counts_by_kind()?
            .into_iter()
            .map(|(k, v)| (k.as_str().to_string(), v))
            .collect();
        let jobs_by_status: HashMap<String, usize> = mgr
            .relational()
            .job_counts_by_status()?
            .into_iter()
            .map(|(k, v)| (k.as_str().to_string(), v))
            .collect();
        Ok(IndexStats {
            files_total: mgr.relational().count_files()?,
            files_by_status,
            files_by_kind,
            chunks_total: mgr.relational().count_chunks()?,
            vectors_total: mgr.vector().count(),
            fulltext_docs_total: mgr.fulltext().doc_count(),
            jobs_by_status,
        })
    }

    /// Stop every running job, wait for the runners, and flush all
    /// storage backends. Reverse order of construction.
    pub fn shutdown(self) -> Result<(), EngineError> {
        let handles: Vec<JobHandle> = {
            let mut jobs = self.lock_jobs();
            jobs.drain().map(|(_, h)| h).collect()
        };
        for handle in &handles {
            handle.cancel.store(true, Ordering::SeqCst);
        }
        for mut handle in handles {
            if let Some(thread) = handle.thread.take() {
                let _ = thread.join();
            }
        }
        let mut mgr = self.write_lock();
        mgr.flush()?;
        tracing::info!("services shut down");
        Ok(())
    }

    fn read_lock(&self) -> std::sync::RwLockReadGuard<'_, StorageManager> {
        match self.storage.read() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }

    fn write_lock(&self) -> std::sync::RwLockWriteGuard<'_, StorageManager> {
        match self.storage.write() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }

    /// Wait for a job to reach a terminal state (test/CLI helper).
    pub fn wait_for_job(&self, job_id: JobId, timeout: std::time::Duration) -> Result<JobSnapshot, EngineError> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let snapshot = self.get_job(job_id)?;
            if snapshot.status.is_terminal() {
                // Let the runner thread finish its teardown too.
                if let Some(handle) = self.lock_jobs().get_mut(&job_id.0) {
                    if let Some(thread) = handle.thread.take() {
                        let _ = thread.join();
                    }
                }
                return Ok(snapshot);
            }
            if std::time::Instant::now() >= deadline {
                return Err(EngineError::Validation {
                    reason: format!("timeout waiting for job {job_id}"),
                });
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
    }
}

/// Stable job key for a set of roots: sorted, joined. The uniqueness
/// check on live jobs keys off this string.
fn job_folder_key(roots: &[PathBuf]) -> String {
    let mut keys: Vec<String> = roots
        .iter()
        .map(|r| r.to_string_lossy().to_string())
        .collect();
    keys.sort();
    keys.join(";")
}

/// Re-exports so transport layers depend on one crate.
pub mod prelude {
    pub use crate::{EngineError, IndexStats, Predictors, Services};
    pub use lode_core::{
        AppConfig, FileId, FileKind, IndexStatus, InputType, JobId, JobStatus, SearchType,
    };
    pub use lode_indexer::{JobSnapshot, Subscription};
    pub use lode_retrieval::{
        MultimodalRequest, SearchRequest, SearchResponse, SearchResultItem,
    };
}
