use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use std::time::Instant;

use crossbeam_channel::bounded;
use lode_core::{AppConfig, FileDescriptor, JobId, JobStatus, Metadata, ScannerConfig};
use lode_parser::ContentParser;
use lode_predict::Embedder;
use lode_storage::{
    ChunkDoc, FileUpsert, StorageError, StorageManager, VectorEntry,
};

use crate::build::{build_file, BuildOutcome, FileBuild};
use crate::error::IndexerError;
use crate::progress::{JobSnapshot, ProgressHub};
use crate::report::IndexReport;
use crate::scanner::{self, diff, scan};

/// Failed files are skipped by incremental runs once they have burned
/// this many retries; an explicit reindex resets the counter.
const MAX_FILE_RETRIES: u32 = 3;

/// Error message recorded when a job is stopped externally.
const STOPPED_MESSAGE: &str = "stopped";

/// Executes full and incremental index jobs.
///
/// Topology per job: a feeder thread streams descriptors into a bounded
/// queue, `job.max_concurrent_files` workers run the parse → chunk →
/// embed stage, and the calling thread is the single writer committing
/// one file at a time against all three stores. Cancellation is observed
/// at file boundaries: in-flight files finish, nothing new starts.
pub struct JobRunner {
    storage: Arc<RwLock<StorageManager>>,
    parser: Arc<ContentParser>,
    embedder: Arc<Embedder>,
    hub: Arc<ProgressHub>,
    config: Arc<AppConfig>,
}

impl JobRunner {
    pub fn new(
        storage: Arc<RwLock<StorageManager>>,
        parser: Arc<ContentParser>,
        embedder: Arc<Embedder>,
        hub: Arc<ProgressHub>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            storage,
            parser,
            embedder,
            hub,
            config,
        }
    }

    /// Full build: scan every root, rebuild every allow-listed file.
    #[tracing::instrument(skip(self, roots, file_types, cancel))]
    pub fn run_full(
        &self,
        job_id: JobId,
        roots: &[PathBuf],
        file_types: Option<&[String]>,
        cancel: &AtomicBool,
    ) -> Result<IndexReport, IndexerError> {
        self.guarded(job_id, || self.run_full_inner(job_id, roots, file_types, cancel))
    }

    /// Incremental build: apply the scanner diff against the store's view.
    #[tracing::instrument(skip(self, roots, file_types, cancel))]
    pub fn run_incremental(
        &self,
        job_id: JobId,
        roots: &[PathBuf],
        file_types: Option<&[String]>,
        cancel: &AtomicBool,
    ) -> Result<IndexReport, IndexerError> {
        self.guarded(job_id, || {
            self.run_incremental_inner(job_id, roots, file_types, cancel)
        })
    }

    /// Run the body; on error, push the job to `failed` with the message.
    fn guarded(
        &self,
        job_id: JobId,
        body: impl FnOnce() -> Result<IndexReport, IndexerError>,
    ) -> Result<IndexReport, IndexerError> {
        match body() {
            Ok(report) => Ok(report),
            Err(e) => {
                let message = e.to_string();
                let _ = self.transition(job_id, JobStatus::Failed, Some(&message));
                self.publish(job_id);
                Err(e)
            }
        }
    }

    fn run_full_inner(
        &self,
        job_id: JobId,
        roots: &[PathBuf],
        file_types: Option<&[String]>,
        cancel: &AtomicBool,
    ) -> Result<IndexReport, IndexerError> {
        let start = Instant::now();
        self.transition(job_id, JobStatus::Processing, None)?;
        self.publish(job_id);

        let scan_cfg = self.scanner_config(file_types);
        let mut descriptors: Vec<FileDescriptor> = Vec::new();
        for root in roots {
            let outcome = scan(root, true, &scan_cfg)?;
            descriptors.extend(outcome.descriptors);
        }
        descriptors.sort_by(|a, b| a.path.cmp(&b.path));
        descriptors.dedup_by(|a, b| a.path == b.path);

        let total = descriptors.len() as u32;
        self.write_lock().relational_mut().set_job_total(job_id, total)?;
        self.publish(job_id);
        tracing::info!(files = total, "full index started");

        let (processed, errors, chunks) =
            self.process_descriptors(job_id, descriptors, cancel, 0, 0)?;

        self.write_lock().flush()?;
        let stopped = cancel.load(Ordering::SeqCst);
        self.finish_job(job_id, stopped)?;

        tracing::info!(
            processed,
            errors,
            chunks,
            stopped,
            duration_secs = %format!("{:.2}", start.elapsed().as_secs_f64()),
            "full index finished"
        );

        Ok(IndexReport {
            total_files: total as usize,
            processed_files: processed as usize,
            error_count: errors as usize,
            deleted_files: 0,
            total_chunks: chunks,
            duration: start.elapsed(),
            stopped,
        })
    }

    fn run_incremental_inner(
        &self,
        job_id: JobId,
        roots: &[PathBuf],
        file_types: Option<&[String]>,
        cancel: &AtomicBool,
    ) -> Result<IndexReport, IndexerError> {
        let start = Instant::now();
        self.transition(job_id, JobStatus::Processing, None)?;
        self.publish(job_id);

        let known = self.read_lock_known()?;
        let scan_cfg = self.scanner_config(file_types);

        let mut changed: Vec<FileDescriptor> = Vec::new();
        let mut deleted: Vec<String> = Vec::new();
        for root in roots {
            let d = diff(root, true, &scan_cfg, &known)?;
            changed.extend(d.changed);
            deleted.extend(d.deleted);
        }
        changed.sort_by(|a, b| a.path.cmp(&b.path));
        changed.dedup_by(|a, b| a.path == b.path);
        deleted.sort();
        deleted.dedup();

        // Explicitly reindex-marked files count as changed even when
        // their stat fields did not move.
        for (path, kf) in &known {
            if !kf.needs_reindex {
                continue;
            }
            // Same component-wise scoping as the scanner diff: string
            // prefixes would leak sibling-directory files into this job.
            if !roots.iter().any(|r| Path::new(path).starts_with(r)) {
                continue;
            }
            if changed
                .iter()
                .any(|d| d.path.to_string_lossy().as_ref() == path.as_str())
            {
                continue;
            }
            if let Ok(Some(d)) = scanner::describe_file(Path::new(path), &scan_cfg) {
                changed.push(d);
            }
        }

        // Skip files that keep failing, unless explicitly reindex-marked.
        changed.retain(|d| {
            let key = d.path.to_string_lossy().to_string();
            match known.get(&key) {
                Some(kf) => kf.retry_count < MAX_FILE_RETRIES || kf.needs_reindex,
                None => true,
            }
        });

        let total = (changed.len() + deleted.len()) as u32;
        self.write_lock().relational_mut().set_job_total(job_id, total)?;
        self.publish(job_id);
        tracing::info!(changed = changed.len(), deleted = deleted.len(), "incremental index started");

        // Deletions first: cheap, and they free ids the rebuilds below
        // would otherwise shadow.
        let mut processed = 0u32;
        let mut errors = 0u32;
        let mut deleted_count = 0usize;
        for path in &deleted {
            if cancel.load(Ordering::SeqCst) {
                break;
            }
            match self.remove_file_by_path(path) {
                Ok(removed) => {
                    if removed {
                        deleted_count += 1;
                    }
                }
                Err(e) => {
                    errors += 1;
                    tracing::warn!(path = %path, error = %e, "deletion failed");
                }
            }
            processed += 1;
            self.write_lock()
                .relational_mut()
                .update_job_progress(job_id, processed, errors)?;
            self.publish(job_id);
        }

        let (processed, errors, chunks) =
            self.process_descriptors(job_id, changed, cancel, processed, errors)?;

        self.write_lock().flush()?;
        let stopped = cancel.load(Ordering::SeqCst);
        self.finish_job(job_id, stopped)?;

        tracing::info!(
            processed,
            errors,
            deleted = deleted_count,
            stopped,
            duration_secs = %format!("{:.2}", start.elapsed().as_secs_f64()),
            "incremental index finished"
        );

        Ok(IndexReport {
            total_files: total as usize,
            processed_files: processed as usize,
            error_count: errors as usize,
            deleted_files: deleted_count,
            total_chunks: chunks,
            duration: start.elapsed(),
            stopped,
        })
    }

    /// Feed descriptors through the worker pool; commit results on this
    /// thread. Returns final (processed, errors, chunks written).
    fn process_descriptors(
        &self,
        job_id: JobId,
        descriptors: Vec<FileDescriptor>,
        cancel: &AtomicBool,
        base_processed: u32,
        base_errors: u32,
    ) -> Result<(u32, u32, usize), IndexerError> {
        let workers = self.config.job.max_concurrent_files.max(1);
        let (work_tx, work_rx) = bounded::<FileDescriptor>(2 * workers);
        let (done_tx, done_rx) = bounded::<BuildOutcome>(2 * workers);

        std::thread::scope(|scope| -> Result<(u32, u32, usize), IndexerError> {
            scope.spawn(move || {
                for descriptor in descriptors {
                    if cancel.load(Ordering::SeqCst) {
                        break;
                    }
                    if work_tx.send(descriptor).is_err() {
                        break;
                    }
                }
            });

            for _ in 0..workers {
                let work_rx = work_rx.clone();
                let done_tx = done_tx.clone();
                let parser = Arc::clone(&self.parser);
                let embedder = Arc::clone(&self.embedder);
                let config = Arc::clone(&self.config);
                scope.spawn(move || {
                    for descriptor in work_rx {
                        let outcome = build_file(descriptor, &parser, &embedder, &config);
                        if done_tx.send(outcome).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(done_tx);
            drop(work_rx);

            let mut processed = base_processed;
            let mut errors = base_errors;
            let mut chunks_written = 0usize;
            for outcome in done_rx {
                match self.commit_outcome(outcome) {
                    Ok(n) => chunks_written += n,
                    Err(()) => errors += 1,
                }
                processed += 1;
                self.write_lock()
                    .relational_mut()
                    .update_job_progress(job_id, processed, errors)?;
                self.publish(job_id);
            }
            Ok((processed, errors, chunks_written))
        })
    }

    /// Commit one build outcome. `Err(())` means the file is charged to
    /// the job's error counter; details are already recorded on its row.
    fn commit_outcome(&self, outcome: BuildOutcome) -> Result<usize, ()> {
        match outcome {
            BuildOutcome::Failed { descriptor, reason } => {
                let mut mgr = self.write_lock();
                match mgr
                    .relational_mut()
                    .upsert_file(&file_upsert(&descriptor, None))
                {
                    Ok(file_id) => {
                        if let Err(e) = mgr.relational_mut().fail_file(file_id, &reason) {
                            tracing::warn!(error = %e, "failed to record file failure");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(path = %descriptor.path.display(), error = %e, "file row upsert failed");
                    }
                }
                tracing::debug!(path = %descriptor.path.display(), reason = %reason, "file build failed");
                Err(())
            }
            BuildOutcome::Built(build) => {
                let mut mgr = self.write_lock();
                match commit_build(&mut mgr, &build) {
                    Ok(n) => Ok(n),
                    Err(e) => {
                        tracing::warn!(
                            path = %build.descriptor.path.display(),
                            error = %e,
                            "index write failed, file left pending"
                        );
                        Err(())
                    }
                }
            }
        }
    }

    /// Remove a file and all its index entries. Ok(false) if unknown.
    fn remove_file_by_path(&self, path: &str) -> Result<bool, IndexerError> {
        let mut mgr = self.write_lock();
        let file = match mgr.relational().get_file_by_path(path)? {
            Some(f) => f,
            None => return Ok(false),
        };
        let chunk_ids = mgr.relational().chunk_ids_by_file(file.id)?;
        mgr.vector_mut().delete_by_chunk_ids(&chunk_ids);
        mgr.fulltext_mut().delete_by_file(file.id)?;
        mgr.relational_mut().delete_file(file.id)?;
        Ok(true)
    }

    fn finish_job(&self, job_id: JobId, stopped: bool) -> Result<(), IndexerError> {
        if stopped {
            self.transition(job_id, JobStatus::Failed, Some(STOPPED_MESSAGE))?;
        } else {
            self.transition(job_id, JobStatus::Completed, None)?;
        }
        self.publish(job_id);
        Ok(())
    }

    fn transition(
        &self,
        job_id: JobId,
        status: JobStatus,
        message: Option<&str>,
    ) -> Result<(), IndexerError> {
        self.write_lock()
            .relational_mut()
            .transition_job(job_id, status, message)?;
        Ok(())
    }

    fn publish(&self, job_id: JobId) {
        let record = {
            let mgr = match self.storage.read() {
                Ok(g) => g,
                Err(p) => p.into_inner(),
            };
            mgr.relational().get_job(job_id).ok().flatten()
        };
        if let Some(record) = record {
            self.hub.publish(&JobSnapshot::from_record(&record));
        }
    }

    fn scanner_config(&self, file_types: Option<&[String]>) -> ScannerConfig {
        let mut cfg = self.config.scanner.clone();
        if let Some(types) = file_types {
            let wanted: Vec<String> = types
                .iter()
                .map(|t| t.trim_start_matches('.').to_lowercase())
                .collect();
            cfg.supported_extensions.retain(|e| wanted.contains(e));
        }
        cfg
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, StorageManager> {
        match self.storage.write() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }

    fn read_lock_known(
        &self,
    ) -> Result<std::collections::HashMap<String, lode_storage::KnownFile>, IndexerError> {
        let mgr = match self.storage.read() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        Ok(mgr.relational().known_files()?)
    }
}

/// Write one successful build against all three stores. On a secondary
/// index failure the partial entries are removed and the file row goes
/// back to pending so a later run retries it.
fn commit_build(mgr: &mut StorageManager, build: &FileBuild) -> Result<usize, StorageError> {
    let up = file_upsert(&build.descriptor, Some(&build.metadata));
    let file_id = mgr.relational_mut().upsert_file(&up)?;
    mgr.relational_mut().mark_file_processing(file_id)?;
    let chunk_ids = mgr.relational_mut().replace_chunks(file_id, &build.chunks)?;

    let index_result = (|| -> Result<(), StorageError> {
        mgr.vector_mut().delete_by_file(file_id);
        mgr.fulltext_mut().delete_by_file(file_id)?;

        if !chunk_ids.is_empty() {
            let title = build
                .parsed
                .title
                .clone()
                .or_else(|| build.metadata.title.clone());
            let metas: Vec<VectorEntry> = chunk_ids
                .iter()
                .map(|&chunk_id| VectorEntry {
                    vector_id: 0,
                    chunk_id,
                    file_id,
                    file_name: build.descriptor.name.clone(),
                    file_path: build.descriptor.path.to_string_lossy().to_string(),
                    file_kind: build.descriptor.kind,
                    file_size: build.descriptor.size,
                    modified_time: build.descriptor.mtime,
                    created_at: build.descriptor.ctime,
                })
                .collect();
            mgr.vector_mut().add(&build.vectors, metas)?;

            for (&chunk_id, chunk) in chunk_ids.iter().zip(&build.chunks) {
                mgr.fulltext_mut().add_document(&ChunkDoc {
                    chunk_id,
                    file_id,
                    file_name: build.descriptor.name.clone(),
                    file_path: build.descriptor.path.to_string_lossy().to_string(),
                    file_kind: build.descriptor.kind,
                    title: title.clone(),
                    content: chunk.text.clone(),
                    chunk_index: chunk.index,
                    start_position: chunk.start as u64,
                    end_position: chunk.end as u64,
                    content_length: chunk.content_length() as u32,
                    modified_time: build.descriptor.mtime,
                    created_at: build.descriptor.ctime,
                })?;
            }
        }
        Ok(())
    })();

    match index_result {
        Ok(()) => {
            mgr.relational_mut().finish_file(
                file_id,
                &lode_storage::relational::FileCompletion {
                    content_length: build.parsed.content_length() as u64,
                    word_count: build.parsed.word_count() as u64,
                    parse_confidence: build.confidence,
                    is_chunked: build.is_chunked,
                    total_chunks: build.chunks.len() as u32,
                    chunk_strategy: build.is_chunked.then(|| build.strategy.to_string()),
                    avg_chunk_size: build.avg_chunk_size(),
                    title: build.parsed.title.clone(),
                },
            )?;
            Ok(chunk_ids.len())
        }
        Err(e) => {
            mgr.vector_mut().delete_by_file(file_id);
            let _ = mgr.fulltext_mut().delete_by_file(file_id);
            let _ = mgr.relational_mut().mark_needs_reindex(file_id);
            Err(e)
        }
    }
}

fn file_upsert(descriptor: &FileDescriptor, metadata: Option<&Metadata>) -> FileUpsert {
    FileUpsert {
        path: descriptor.path.to_string_lossy().to_string(),
        name: descriptor.name.clone(),
        ext: descriptor.ext.clone(),
        kind: descriptor.kind,
        size: descriptor.size,
        mtime: descriptor.mtime,
        ctime: descriptor.ctime,
        content_hash: descriptor.content_hash.clone(),
        mime: descriptor
            .mime
            .clone()
            .or_else(|| metadata.and_then(|m| m.mime.clone())),
        title: metadata.and_then(|m| m.title.clone()),
        author: metadata.and_then(|m| m.author.clone()),
        keywords: metadata.and_then(|m| m.keywords.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lode_core::JobType;
    use lode_parser::ParserOptions;
    use lode_predict::HashEmbedding;
    use lode_storage::JobCreation;
    use tempfile::TempDir;

    fn runner_for(tmp: &TempDir) -> (JobRunner, Arc<RwLock<StorageManager>>, Arc<ProgressHub>) {
        let mut config = AppConfig::default();
        config.data_root = tmp.path().join("data");
        config.embedding.dim = 64;
        let config = Arc::new(config);
        let storage = Arc::new(RwLock::new(StorageManager::open(&config).unwrap()));
        let parser = Arc::new(ContentParser::new(ParserOptions::default()));
        let embedder = Arc::new(Embedder::new(
            Arc::new(HashEmbedding::new(config.embedding.dim)),
            config.embedding.batch_size,
        ));
        let hub = Arc::new(ProgressHub::new());
        (
            JobRunner::new(
                storage.clone(),
                parser,
                embedder,
                hub.clone(),
                config,
            ),
            storage,
            hub,
        )
    }

    fn create_job(
        storage: &Arc<RwLock<StorageManager>>,
        folder: &str,
        job_type: JobType,
    ) -> JobId {
        let mut mgr = storage.write().unwrap();
        match mgr.relational_mut().create_job(folder, job_type).unwrap() {
            JobCreation::Created(j) => j.id,
            JobCreation::Conflict(_) => panic!("unexpected conflict"),
        }
    }

    fn docs_dir(tmp: &TempDir) -> PathBuf {
        let dir = tmp.path().join("docs");
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn full_job_indexes_files_and_completes() {
        let tmp = TempDir::new().unwrap();
        let docs = docs_dir(&tmp);
        std::fs::write(docs.join("a.txt"), "machine learning is a branch of ai.").unwrap();
        std::fs::write(docs.join("b.txt"), "cooking recipes for pasta.").unwrap();

        let (runner, storage, _hub) = runner_for(&tmp);
        let job_id = create_job(&storage, docs.to_str().unwrap(), JobType::Create);

        let cancel = AtomicBool::new(false);
        let report = runner
            .run_full(job_id, &[docs.clone()], None, &cancel)
            .unwrap();

        assert_eq!(report.total_files, 2);
        assert_eq!(report.processed_files, 2);
        assert_eq!(report.error_count, 0);
        assert_eq!(report.total_chunks, 2);
        assert!(!report.stopped);

        let mgr = storage.read().unwrap();
        let job = mgr.relational().get_job(job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.processed_files, 2);
        assert!(job.completed_at.is_some());

        // all three stores agree
        assert_eq!(mgr.relational().count_files().unwrap(), 2);
        assert_eq!(mgr.relational().count_chunks().unwrap(), 2);
        assert_eq!(mgr.vector().count(), 2);
        assert_eq!(mgr.fulltext().doc_count(), 2);

        let file = mgr
            .relational()
            .get_file_by_path(docs.join("a.txt").to_str().unwrap())
            .unwrap()
            .unwrap();
        assert!(file.is_indexed);
        assert_eq!(file.index_status, lode_core::IndexStatus::Completed);
        assert_eq!(file.total_chunks, 1);
    }

    #[test]
    fn per_file_failure_does_not_fail_job() {
        let tmp = TempDir::new().unwrap();
        let docs = docs_dir(&tmp);
        std::fs::write(docs.join("good.txt"), "fine text content.").unwrap();
        // an audio file with no speech capability configured fails to parse
        std::fs::write(docs.join("bad.wav"), b"RIFF....").unwrap();

        let (runner, storage, _hub) = runner_for(&tmp);
        let job_id = create_job(&storage, docs.to_str().unwrap(), JobType::Create);

        let cancel = AtomicBool::new(false);
        let report = runner
            .run_full(job_id, &[docs.clone()], None, &cancel)
            .unwrap();

        assert_eq!(report.total_files, 2);
        assert_eq!(report.processed_files, 2);
        assert_eq!(report.error_count, 1);

        let mgr = storage.read().unwrap();
        let job = mgr.relational().get_job(job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.error_count, 1);

        let bad = mgr
            .relational()
            .get_file_by_path(docs.join("bad.wav").to_str().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(bad.index_status, lode_core::IndexStatus::Failed);
        assert!(bad.last_error.is_some());
        assert_eq!(bad.retry_count, 1);
    }

    #[test]
    fn file_types_filter_narrows_scan() {
        let tmp = TempDir::new().unwrap();
        let docs = docs_dir(&tmp);
        std::fs::write(docs.join("a.txt"), "text file.").unwrap();
        std::fs::write(docs.join("b.md"), "# markdown file.").unwrap();

        let (runner, storage, _hub) = runner_for(&tmp);
        let job_id = create_job(&storage, docs.to_str().unwrap(), JobType::Create);

        let cancel = AtomicBool::new(false);
        let types = vec!["md".to_string()];
        let report = runner
            .run_full(job_id, &[docs.clone()], Some(&types), &cancel)
            .unwrap();
        assert_eq!(report.total_files, 1);

        let mgr = storage.read().unwrap();
        assert!(mgr
            .relational()
            .get_file_by_path(docs.join("a.txt").to_str().unwrap())
            .unwrap()
            .is_none());
    }

    #[test]
    fn incremental_noop_after_full() {
        let tmp = TempDir::new().unwrap();
        let docs = docs_dir(&tmp);
        std::fs::write(docs.join("a.txt"), "stable content here.").unwrap();

        let (runner, storage, _hub) = runner_for(&tmp);
        let full_id = create_job(&storage, docs.to_str().unwrap(), JobType::Create);
        let cancel = AtomicBool::new(false);
        runner.run_full(full_id, &[docs.clone()], None, &cancel).unwrap();

        let inc_id = create_job(&storage, docs.to_str().unwrap(), JobType::Update);
        let report = runner
            .run_incremental(inc_id, &[docs.clone()], None, &cancel)
            .unwrap();
        assert_eq!(report.total_files, 0);
        assert_eq!(report.processed_files, 0);
        assert_eq!(report.deleted_files, 0);

        let mgr = storage.read().unwrap();
        assert_eq!(
            mgr.relational().get_job(inc_id).unwrap().unwrap().status,
            JobStatus::Completed
        );
    }

    #[test]
    fn incremental_removes_deleted_files_everywhere() {
        let tmp = TempDir::new().unwrap();
        let docs = docs_dir(&tmp);
        let doomed = docs.join("doomed.txt");
        std::fs::write(docs.join("keeper.txt"), "this one stays.").unwrap();
        std::fs::write(&doomed, "this one goes away.").unwrap();

        let (runner, storage, _hub) = runner_for(&tmp);
        let cancel = AtomicBool::new(false);
        let full_id = create_job(&storage, docs.to_str().unwrap(), JobType::Create);
        runner.run_full(full_id, &[docs.clone()], None, &cancel).unwrap();

        let doomed_id = {
            let mgr = storage.read().unwrap();
            mgr.relational()
                .get_file_by_path(doomed.to_str().unwrap())
                .unwrap()
                .unwrap()
                .id
        };

        std::fs::remove_file(&doomed).unwrap();
        let inc_id = create_job(&storage, docs.to_str().unwrap(), JobType::Update);
        let report = runner
            .run_incremental(inc_id, &[docs.clone()], None, &cancel)
            .unwrap();

        assert_eq!(report.total_files, 1);
        assert_eq!(report.processed_files, 1);
        assert_eq!(report.deleted_files, 1);

        let mgr = storage.read().unwrap();
        assert!(mgr.relational().get_file(doomed_id).unwrap().is_none());
        assert_eq!(mgr.relational().count_files().unwrap(), 1);
        assert_eq!(mgr.vector().count(), 1);
        let hits = mgr.fulltext().search("goes", 10, 0, &[]).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn incremental_rebuilds_changed_files() {
        let tmp = TempDir::new().unwrap();
        let docs = docs_dir(&tmp);
        let target = docs.join("a.txt");
        std::fs::write(&target, "original words about sailing.").unwrap();

        let (runner, storage, _hub) = runner_for(&tmp);
        let cancel = AtomicBool::new(false);
        let full_id = create_job(&storage, docs.to_str().unwrap(), JobType::Create);
        runner.run_full(full_id, &[docs.clone()], None, &cancel).unwrap();

        // change size so the (mtime, size) diff sees it regardless of
        // timestamp resolution
        std::fs::write(&target, "rewritten words about gardening, much longer now.").unwrap();

        let inc_id = create_job(&storage, docs.to_str().unwrap(), JobType::Update);
        let report = runner
            .run_incremental(inc_id, &[docs.clone()], None, &cancel)
            .unwrap();
        assert_eq!(report.total_files, 1);

        let mgr = storage.read().unwrap();
        assert!(mgr.fulltext().search("sailing", 10, 0, &[]).unwrap().is_empty());
        assert_eq!(mgr.fulltext().search("gardening", 10, 0, &[]).unwrap().len(), 1);
        // still exactly one chunk/vector for the file
        assert_eq!(mgr.vector().count(), 1);
        assert_eq!(mgr.relational().count_chunks().unwrap(), 1);
    }

    #[test]
    fn reindex_marked_file_rebuilds_without_stat_change() {
        let tmp = TempDir::new().unwrap();
        let docs = docs_dir(&tmp);
        let target = docs.join("a.txt");
        std::fs::write(&target, "content that stays identical.").unwrap();

        let (runner, storage, _hub) = runner_for(&tmp);
        let cancel = AtomicBool::new(false);
        let full_id = create_job(&storage, docs.to_str().unwrap(), JobType::Create);
        runner.run_full(full_id, &[docs.clone()], None, &cancel).unwrap();

        let file_id = {
            let mut mgr = storage.write().unwrap();
            let id = mgr
                .relational()
                .get_file_by_path(target.to_str().unwrap())
                .unwrap()
                .unwrap()
                .id;
            mgr.relational_mut().mark_needs_reindex(id).unwrap();
            id
        };

        let inc_id = create_job(&storage, docs.to_str().unwrap(), JobType::Update);
        let report = runner
            .run_incremental(inc_id, &[docs.clone()], None, &cancel)
            .unwrap();
        assert_eq!(report.total_files, 1);
        assert_eq!(report.processed_files, 1);

        let mgr = storage.read().unwrap();
        let rec = mgr.relational().get_file(file_id).unwrap().unwrap();
        assert!(!rec.needs_reindex);
        assert!(rec.is_indexed);
    }

    #[test]
    fn cancellation_stops_between_files() {
        let tmp = TempDir::new().unwrap();
        let docs = docs_dir(&tmp);
        for i in 0..200 {
            std::fs::write(
                docs.join(format!("f{i:03}.txt")),
                format!("file number {i} with some words."),
            )
            .unwrap();
        }

        let (runner, storage, _hub) = runner_for(&tmp);
        let job_id = create_job(&storage, docs.to_str().unwrap(), JobType::Create);

        // pre-set: the feeder observes the flag before sending anything
        // beyond the queue capacity
        let cancel = AtomicBool::new(true);
        let report = runner
            .run_full(job_id, &[docs.clone()], None, &cancel)
            .unwrap();

        assert!(report.stopped);
        assert!(report.processed_files < 200);

        let mgr = storage.read().unwrap();
        let job = mgr.relational().get_job(job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some(STOPPED_MESSAGE));
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn job_error_marks_job_failed() {
        let tmp = TempDir::new().unwrap();
        let (runner, storage, _hub) = runner_for(&tmp);
        let missing = tmp.path().join("not-there");
        let job_id = create_job(&storage, missing.to_str().unwrap(), JobType::Create);

        let cancel = AtomicBool::new(false);
        let result = runner.run_full(job_id, &[missing], None, &cancel);
        assert!(result.is_err());

        let mgr = storage.read().unwrap();
        let job = mgr.relational().get_job(job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.unwrap().contains("unreadable"));
    }

    #[test]
    fn progress_snapshots_are_published() {
        let tmp = TempDir::new().unwrap();
        let docs = docs_dir(&tmp);
        std::fs::write(docs.join("a.txt"), "some words here.").unwrap();

        let (runner, storage, hub) = runner_for(&tmp);
        let job_id = create_job(&storage, docs.to_str().unwrap(), JobType::Create);
        let sub = hub.subscribe(job_id);

        let cancel = AtomicBool::new(false);
        runner.run_full(job_id, &[docs.clone()], None, &cancel).unwrap();

        // keep-latest: the buffered snapshot is the terminal one
        let last = sub.events.try_recv().unwrap();
        assert_eq!(last.status, JobStatus::Completed);
        assert_eq!(last.processed_files, 1);
        assert!((last.progress - 1.0).abs() < 1e-6);
    }
}
