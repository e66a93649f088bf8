use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use lode_core::{
    ChunkId, FileId, FileKind, IndexStatus, InputType, JobId, JobStatus, JobType, SearchType,
    TextChunk,
};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StorageError;
use crate::now_epoch;

/// Current schema version. Increment when schema changes.
const SCHEMA_VERSION: u32 = 1;

/// A row of the `files` table.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: FileId,
    pub path: String,
    pub name: String,
    pub ext: String,
    pub kind: FileKind,
    pub size: u64,
    pub mtime: i64,
    pub ctime: i64,
    pub indexed_at: Option<i64>,
    pub content_hash: String,
    pub mime: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub keywords: Option<String>,
    pub content_length: u64,
    pub word_count: u64,
    pub parse_confidence: f32,
    pub index_status: IndexStatus,
    pub is_indexed: bool,
    pub needs_reindex: bool,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub is_chunked: bool,
    pub total_chunks: u32,
    pub chunk_strategy: Option<String>,
    pub avg_chunk_size: Option<f64>,
}

/// Scan-time identity and stat fields written when a file is first seen or
/// re-seen. Parse results land later via [`RelationalStore::finish_file`].
#[derive(Debug, Clone)]
pub struct FileUpsert {
    pub path: String,
    pub name: String,
    pub ext: String,
    pub kind: FileKind,
    pub size: u64,
    pub mtime: i64,
    pub ctime: i64,
    pub content_hash: String,
    pub mime: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub keywords: Option<String>,
}

/// Parse outcome recorded on successful completion of a file build.
#[derive(Debug, Clone)]
pub struct FileCompletion {
    pub content_length: u64,
    pub word_count: u64,
    pub parse_confidence: f32,
    pub is_chunked: bool,
    pub total_chunks: u32,
    pub chunk_strategy: Option<String>,
    pub avg_chunk_size: Option<f64>,
    pub title: Option<String>,
}

/// A row of the `file_chunks` table.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: ChunkId,
    pub file_id: FileId,
    pub chunk_index: u32,
    pub content: String,
    pub content_length: u32,
    pub start_position: u64,
    pub end_position: u64,
    pub is_indexed: bool,
    pub index_status: IndexStatus,
    pub indexed_at: Option<i64>,
}

/// A row of the `index_jobs` table.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: JobId,
    pub folder_path: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub total_files: u32,
    pub processed_files: u32,
    pub error_count: u32,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: i64,
}

/// Outcome of attempting to create a job: at most one runner per folder
/// may be pending or processing at a time.
#[derive(Debug)]
pub enum JobCreation {
    Created(JobRecord),
    /// A live job already exists for this folder; its snapshot is returned
    /// instead of starting a new one.
    Conflict(JobRecord),
}

/// The store's view of an already-indexed path, used by the scanner diff.
#[derive(Debug, Clone)]
pub struct KnownFile {
    pub file_id: FileId,
    pub size: u64,
    pub mtime: i64,
    pub content_hash: String,
    pub retry_count: u32,
    pub index_status: IndexStatus,
    pub needs_reindex: bool,
}

/// One append to the search history.
#[derive(Debug, Clone)]
pub struct SearchRecord {
    pub query: String,
    pub input_type: InputType,
    pub search_type: SearchType,
    pub models_used: Option<String>,
    pub result_count: u32,
    pub response_time_ms: u64,
}

/// SQLite-backed record store: files, chunks, jobs, search history.
///
/// Owns all identity in the system; the vector and full-text indexes hold
/// denormalized copies keyed by ids minted here. The connection sits
/// behind a mutex so the store can be shared across worker and search
/// threads; SQLite access serializes here while the secondary indexes
/// keep their own concurrency story.
pub struct RelationalStore {
    conn: Mutex<Connection>,
}

impl RelationalStore {
    /// Open or create the store at the given SQLite database path.
    pub fn open(db_path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        configure_pragmas(&conn)?;

        let stored_version = get_user_version(&conn)?;
        if stored_version != 0 && stored_version != SCHEMA_VERSION {
            return Err(StorageError::SchemaMismatch {
                expected: SCHEMA_VERSION,
                actual: stored_version,
            });
        }

        create_schema(&conn)?;
        set_user_version(&conn, SCHEMA_VERSION)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        configure_pragmas(&conn)?;
        create_schema(&conn)?;
        set_user_version(&conn, SCHEMA_VERSION)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }

    // -- Files --

    /// Insert or refresh a file row by path. Re-seeing a path updates the
    /// stat fields and resets it to `pending` if the content hash changed.
    pub fn upsert_file(&mut self, up: &FileUpsert) -> Result<FileId, StorageError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let existing: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, content_hash FROM files WHERE path = ?1",
                params![up.path],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let id = match existing {
            Some((id, old_hash)) => {
                let changed = old_hash != up.content_hash;
                tx.execute(
                    "UPDATE files SET name = ?2, ext = ?3, type = ?4, size = ?5, \
                     mtime = ?6, ctime = ?7, content_hash = ?8, mime = ?9, \
                     title = COALESCE(?10, title), author = COALESCE(?11, author), \
                     keywords = COALESCE(?12, keywords), \
                     index_status = CASE WHEN ?13 THEN 'pending' ELSE index_status END, \
                     is_indexed = CASE WHEN ?13 THEN 0 ELSE is_indexed END \
                     WHERE id = ?1",
                    params![
                        id,
                        up.name,
                        up.ext,
                        up.kind.as_str(),
                        up.size as i64,
                        up.mtime,
                        up.ctime,
                        up.content_hash,
                        up.mime,
                        up.title,
                        up.author,
                        up.keywords,
                        changed,
                    ],
                )?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO files \
                     (path, name, ext, type, size, mtime, ctime, content_hash, \
                      mime, title, author, keywords, index_status) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 'pending')",
                    params![
                        up.path,
                        up.name,
                        up.ext,
                        up.kind.as_str(),
                        up.size as i64,
                        up.mtime,
                        up.ctime,
                        up.content_hash,
                        up.mime,
                        up.title,
                        up.author,
                        up.keywords,
                    ],
                )?;
                tx.last_insert_rowid()
            }
        };
        tx.commit()?;
        Ok(FileId(id))
    }

    pub fn get_file(&self, id: FileId) -> Result<Option<FileRecord>, StorageError> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE id = ?1"
        ))?;
        let mut rows = stmt.query(params![id.0])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_file(row)?)),
            None => Ok(None),
        }
    }

    pub fn get_file_by_path(&self, path: &str) -> Result<Option<FileRecord>, StorageError> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE path = ?1"
        ))?;
        let mut rows = stmt.query(params![path])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_file(row)?)),
            None => Ok(None),
        }
    }

    /// All file rows, ordered by id (deterministic iteration).
    pub fn list_files(&self) -> Result<Vec<FileRecord>, StorageError> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare_cached(&format!("SELECT {FILE_COLUMNS} FROM files ORDER BY id"))?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(row_to_file(row)?);
        }
        Ok(out)
    }

    /// The path → stat map the scanner diffs against.
    pub fn known_files(&self) -> Result<HashMap<String, KnownFile>, StorageError> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT path, id, size, mtime, content_hash, retry_count, index_status, \
             needs_reindex FROM files",
        )?;
        let mut rows = stmt.query([])?;
        let mut out = HashMap::new();
        while let Some(row) = rows.next()? {
            let path: String = row.get(0)?;
            let status: String = row.get(6)?;
            out.insert(
                path,
                KnownFile {
                    file_id: FileId(row.get(1)?),
                    size: row.get::<_, i64>(2)? as u64,
                    mtime: row.get(3)?,
                    content_hash: row.get(4)?,
                    retry_count: row.get::<_, i64>(5)? as u32,
                    index_status: parse_index_status(&status)?,
                    needs_reindex: row.get(7)?,
                },
            );
        }
        Ok(out)
    }

    pub fn mark_file_processing(&mut self, id: FileId) -> Result<(), StorageError> {
        self.lock().execute(
            "UPDATE files SET index_status = 'processing' WHERE id = ?1",
            params![id.0],
        )?;
        Ok(())
    }

    /// Record a successful build: parse stats, chunk bookkeeping, and the
    /// `completed` status in one update.
    pub fn finish_file(
        &mut self,
        id: FileId,
        done: &FileCompletion,
    ) -> Result<(), StorageError> {
        let affected = self.lock().execute(
            "UPDATE files SET content_length = ?2, word_count = ?3, parse_confidence = ?4, \
             is_chunked = ?5, total_chunks = ?6, chunk_strategy = ?7, avg_chunk_size = ?8, \
             title = COALESCE(?9, title), \
             index_status = 'completed', is_indexed = 1, needs_reindex = 0, \
             retry_count = 0, last_error = NULL, indexed_at = ?10 \
             WHERE id = ?1",
            params![
                id.0,
                done.content_length as i64,
                done.word_count as i64,
                done.parse_confidence as f64,
                done.is_chunked,
                done.total_chunks as i64,
                done.chunk_strategy,
                done.avg_chunk_size,
                done.title,
                now_epoch(),
            ],
        )?;
        if affected == 0 {
            return Err(StorageError::NotFound {
                entity: "file",
                key: id.to_string(),
            });
        }
        Ok(())
    }

    /// Record a per-file failure: status, message, retry counter.
    pub fn fail_file(&mut self, id: FileId, error: &str) -> Result<(), StorageError> {
        self.lock().execute(
            "UPDATE files SET index_status = 'failed', is_indexed = 0, \
             last_error = ?2, retry_count = retry_count + 1 WHERE id = ?1",
            params![id.0, error],
        )?;
        Ok(())
    }

    /// Reset a file to `pending` for an explicit rebuild.
    pub fn mark_needs_reindex(&mut self, id: FileId) -> Result<(), StorageError> {
        let affected = self.lock().execute(
            "UPDATE files SET needs_reindex = 1, index_status = 'pending', \
             is_indexed = 0, retry_count = 0, last_error = NULL WHERE id = ?1",
            params![id.0],
        )?;
        if affected == 0 {
            return Err(StorageError::NotFound {
                entity: "file",
                key: id.to_string(),
            });
        }
        Ok(())
    }

    /// Delete a file row. Chunks cascade.
    pub fn delete_file(&mut self, id: FileId) -> Result<bool, StorageError> {
        let affected = self
            .lock()
            .execute("DELETE FROM files WHERE id = ?1", params![id.0])?;
        Ok(affected > 0)
    }

    // -- Chunks --

    /// Replace all chunks of a file in one transaction: previous rows go,
    /// new rows come in marked completed. Returns the new chunk ids in
    /// chunk order.
    pub fn replace_chunks(
        &mut self,
        file_id: FileId,
        chunks: &[TextChunk],
    ) -> Result<Vec<ChunkId>, StorageError> {
        let now = now_epoch();
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM file_chunks WHERE file_id = ?1",
            params![file_id.0],
        )?;
        let mut ids = Vec::with_capacity(chunks.len());
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO file_chunks \
                 (file_id, chunk_index, content, content_length, \
                  start_position, end_position, is_indexed, index_status, indexed_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, 'completed', ?7)",
            )?;
            for chunk in chunks {
                stmt.execute(params![
                    file_id.0,
                    chunk.index as i64,
                    chunk.text,
                    chunk.content_length() as i64,
                    chunk.start as i64,
                    chunk.end as i64,
                    now,
                ])?;
                ids.push(ChunkId(tx.last_insert_rowid()));
            }
        }
        tx.commit()?;
        Ok(ids)
    }

    pub fn get_chunk(&self, id: ChunkId) -> Result<Option<ChunkRecord>, StorageError> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {CHUNK_COLUMNS} FROM file_chunks WHERE id = ?1"
        ))?;
        let mut rows = stmt.query(params![id.0])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_chunk(row)?)),
            None => Ok(None),
        }
    }

    pub fn get_chunks_by_file(&self, file_id: FileId) -> Result<Vec<ChunkRecord>, StorageError> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {CHUNK_COLUMNS} FROM file_chunks WHERE file_id = ?1 ORDER BY chunk_index"
        ))?;
        let mut rows = stmt.query(params![file_id.0])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(row_to_chunk(row)?);
        }
        Ok(out)
    }

    pub fn chunk_ids_by_file(&self, file_id: FileId) -> Result<Vec<ChunkId>, StorageError> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id FROM file_chunks WHERE file_id = ?1 ORDER BY chunk_index",
        )?;
        let mut rows = stmt.query(params![file_id.0])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(ChunkId(row.get(0)?));
        }
        Ok(out)
    }

    // -- Jobs --

    /// Create a job unless a live one already exists for the same folder.
    pub fn create_job(
        &mut self,
        folder_path: &str,
        job_type: JobType,
    ) -> Result<JobCreation, StorageError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let existing = {
            let mut stmt = tx.prepare_cached(&format!(
                "SELECT {JOB_COLUMNS} FROM index_jobs \
                 WHERE folder_path = ?1 AND status IN ('pending', 'processing') \
                 ORDER BY id DESC LIMIT 1"
            ))?;
            let mut rows = stmt.query(params![folder_path])?;
            match rows.next()? {
                Some(row) => Some(row_to_job(row)?),
                None => None,
            }
        };
        if let Some(job) = existing {
            tx.commit()?;
            return Ok(JobCreation::Conflict(job));
        }

        tx.execute(
            "INSERT INTO index_jobs (folder_path, job_type, status, created_at) \
             VALUES (?1, ?2, 'pending', ?3)",
            params![folder_path, job_type.as_str(), now_epoch()],
        )?;
        let id = JobId(tx.last_insert_rowid());
        tx.commit()?;
        let job = get_job_locked(&conn, id)?.ok_or(StorageError::NotFound {
            entity: "job",
            key: id.to_string(),
        })?;
        Ok(JobCreation::Created(job))
    }

    pub fn get_job(&self, id: JobId) -> Result<Option<JobRecord>, StorageError> {
        get_job_locked(&self.lock(), id)
    }

    /// Move a job along its lifecycle, enforcing monotone transitions.
    /// Sets `started_at` on entering `processing` and `completed_at` on
    /// reaching a terminal state.
    pub fn transition_job(
        &mut self,
        id: JobId,
        next: JobStatus,
        error_message: Option<&str>,
    ) -> Result<JobRecord, StorageError> {
        let conn = self.lock();
        let current = get_job_locked(&conn, id)?.ok_or(StorageError::NotFound {
            entity: "job",
            key: id.to_string(),
        })?;
        if !current.status.can_transition_to(next) {
            return Err(StorageError::IllegalTransition {
                from: current.status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        let now = now_epoch();
        let started_at = if next == JobStatus::Processing {
            Some(now)
        } else {
            current.started_at
        };
        let completed_at = if next.is_terminal() { Some(now) } else { None };
        conn.execute(
            "UPDATE index_jobs SET status = ?2, started_at = ?3, completed_at = ?4, \
             error_message = COALESCE(?5, error_message) WHERE id = ?1",
            params![id.0, next.as_str(), started_at, completed_at, error_message],
        )?;
        get_job_locked(&conn, id)?.ok_or(StorageError::NotFound {
            entity: "job",
            key: id.to_string(),
        })
    }

    pub fn set_job_total(&mut self, id: JobId, total_files: u32) -> Result<(), StorageError> {
        self.lock().execute(
            "UPDATE index_jobs SET total_files = ?2 WHERE id = ?1",
            params![id.0, total_files as i64],
        )?;
        Ok(())
    }

    /// Progress counters only move forward.
    pub fn update_job_progress(
        &mut self,
        id: JobId,
        processed_files: u32,
        error_count: u32,
    ) -> Result<(), StorageError> {
        self.lock().execute(
            "UPDATE index_jobs SET \
             processed_files = MAX(processed_files, ?2), \
             error_count = MAX(error_count, ?3) WHERE id = ?1",
            params![id.0, processed_files as i64, error_count as i64],
        )?;
        Ok(())
    }

    // -- Search history --

    pub fn record_search(&mut self, rec: &SearchRecord) -> Result<(), StorageError> {
        self.lock().execute(
            "INSERT INTO search_history \
             (query, input_type, search_type, models_used, result_count, \
              response_time_ms, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                rec.query,
                rec.input_type.as_str(),
                rec.search_type.as_str(),
                rec.models_used,
                rec.result_count as i64,
                rec.response_time_ms as i64,
                now_epoch(),
            ],
        )?;
        Ok(())
    }

    /// Newest history rows first.
    pub fn recent_searches(&self, limit: usize) -> Result<Vec<SearchRecord>, StorageError> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT query, input_type, search_type, models_used, result_count, \
             response_time_ms FROM search_history ORDER BY id DESC LIMIT ?1",
        )?;
        let mut rows = stmt.query(params![limit as i64])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let input: String = row.get(1)?;
            let search: String = row.get(2)?;
            out.push(SearchRecord {
                query: row.get(0)?,
                input_type: match input.as_str() {
                    "voice" => InputType::Voice,
                    "image" => InputType::Image,
                    _ => InputType::Text,
                },
                search_type: SearchType::parse(&search).unwrap_or(SearchType::Hybrid),
                models_used: row.get(3)?,
                result_count: row.get::<_, i64>(4)? as u32,
                response_time_ms: row.get::<_, i64>(5)? as u64,
            });
        }
        Ok(out)
    }

    // -- Statistics --

    pub fn count_files(&self) -> Result<usize, StorageError> {
        let n: i64 = self
            .lock()
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn count_chunks(&self) -> Result<usize, StorageError> {
        let n: i64 = self
            .lock()
            .query_row("SELECT COUNT(*) FROM file_chunks", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn file_counts_by_status(&self) -> Result<HashMap<IndexStatus, usize>, StorageError> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare_cached("SELECT index_status, COUNT(*) FROM files GROUP BY index_status")?;
        let mut rows = stmt.query([])?;
        let mut out = HashMap::new();
        while let Some(row) = rows.next()? {
            let status: String = row.get(0)?;
            let n: i64 = row.get(1)?;
            out.insert(parse_index_status(&status)?, n as usize);
        }
        Ok(out)
    }

    pub fn file_counts_by_kind(&self) -> Result<HashMap<FileKind, usize>, StorageError> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached("SELECT type, COUNT(*) FROM files GROUP BY type")?;
        let mut rows = stmt.query([])?;
        let mut out = HashMap::new();
        while let Some(row) = rows.next()? {
            let kind: String = row.get(0)?;
            let n: i64 = row.get(1)?;
            out.insert(FileKind::from_filter_value(&kind), n as usize);
        }
        Ok(out)
    }

    pub fn job_counts_by_status(&self) -> Result<HashMap<JobStatus, usize>, StorageError> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare_cached("SELECT status, COUNT(*) FROM index_jobs GROUP BY status")?;
        let mut rows = stmt.query([])?;
        let mut out = HashMap::new();
        while let Some(row) = rows.next()? {
            let status: String = row.get(0)?;
            let n: i64 = row.get(1)?;
            out.insert(
                JobStatus::parse(&status).map_err(|_| StorageError::TransactionFailed {
                    reason: format!("invalid job status '{status}'"),
                })?,
                n as usize,
            );
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

const FILE_COLUMNS: &str = "id, path, name, ext, type, size, mtime, ctime, indexed_at, \
     content_hash, mime, title, author, keywords, content_length, word_count, \
     parse_confidence, index_status, is_indexed, needs_reindex, retry_count, \
     last_error, is_chunked, total_chunks, chunk_strategy, avg_chunk_size";

const CHUNK_COLUMNS: &str = "id, file_id, chunk_index, content, content_length, \
     start_position, end_position, is_indexed, index_status, indexed_at";

const JOB_COLUMNS: &str = "id, folder_path, job_type, status, total_files, \
     processed_files, error_count, started_at, completed_at, error_message, created_at";

fn configure_pragmas(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;\
         PRAGMA busy_timeout = 5000;\
         PRAGMA synchronous = NORMAL;\
         PRAGMA foreign_keys = ON;",
    )?;
    Ok(())
}

fn get_user_version(conn: &Connection) -> Result<u32, StorageError> {
    let v: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(v)
}

fn set_user_version(conn: &Connection, version: u32) -> Result<(), StorageError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

fn create_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS files (
            id              INTEGER PRIMARY KEY,
            path            TEXT NOT NULL UNIQUE,
            name            TEXT NOT NULL,
            ext             TEXT NOT NULL,
            type            TEXT NOT NULL,
            size            INTEGER NOT NULL,
            mtime           INTEGER NOT NULL,
            ctime           INTEGER NOT NULL,
            indexed_at      INTEGER,
            content_hash    TEXT NOT NULL,
            mime            TEXT,
            title           TEXT,
            author          TEXT,
            keywords        TEXT,
            content_length  INTEGER NOT NULL DEFAULT 0,
            word_count      INTEGER NOT NULL DEFAULT 0,
            parse_confidence REAL NOT NULL DEFAULT 0,
            index_status    TEXT NOT NULL DEFAULT 'pending',
            is_indexed      INTEGER NOT NULL DEFAULT 0,
            needs_reindex   INTEGER NOT NULL DEFAULT 0,
            retry_count     INTEGER NOT NULL DEFAULT 0,
            last_error      TEXT,
            is_chunked      INTEGER NOT NULL DEFAULT 0,
            total_chunks    INTEGER NOT NULL DEFAULT 0,
            chunk_strategy  TEXT,
            avg_chunk_size  REAL
        );

        CREATE INDEX IF NOT EXISTS idx_files_status ON files(index_status);
        CREATE INDEX IF NOT EXISTS idx_files_type ON files(type);

        CREATE TABLE IF NOT EXISTS file_chunks (
            id              INTEGER PRIMARY KEY,
            file_id         INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
            chunk_index     INTEGER NOT NULL,
            content         TEXT NOT NULL,
            content_length  INTEGER NOT NULL,
            start_position  INTEGER NOT NULL,
            end_position    INTEGER NOT NULL,
            is_indexed      INTEGER NOT NULL DEFAULT 0,
            index_status    TEXT NOT NULL DEFAULT 'pending',
            indexed_at      INTEGER,
            UNIQUE(file_id, chunk_index)
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_file ON file_chunks(file_id);

        CREATE TABLE IF NOT EXISTS index_jobs (
            id              INTEGER PRIMARY KEY,
            folder_path     TEXT NOT NULL,
            job_type        TEXT NOT NULL,
            status          TEXT NOT NULL DEFAULT 'pending',
            total_files     INTEGER NOT NULL DEFAULT 0,
            processed_files INTEGER NOT NULL DEFAULT 0,
            error_count     INTEGER NOT NULL DEFAULT 0,
            started_at      INTEGER,
            completed_at    INTEGER,
            error_message   TEXT,
            created_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_jobs_folder ON index_jobs(folder_path, status);

        CREATE TABLE IF NOT EXISTS search_history (
            id              INTEGER PRIMARY KEY,
            query           TEXT NOT NULL,
            input_type      TEXT NOT NULL,
            search_type     TEXT NOT NULL,
            models_used     TEXT,
            result_count    INTEGER NOT NULL,
            response_time_ms INTEGER NOT NULL,
            created_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_history_created ON search_history(created_at);",
    )?;
    Ok(())
}

fn get_job_locked(conn: &Connection, id: JobId) -> Result<Option<JobRecord>, StorageError> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {JOB_COLUMNS} FROM index_jobs WHERE id = ?1"
    ))?;
    let mut rows = stmt.query(params![id.0])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_job(row)?)),
        None => Ok(None),
    }
}

fn parse_index_status(s: &str) -> Result<IndexStatus, StorageError> {
    IndexStatus::parse(s).map_err(|_| StorageError::TransactionFailed {
        reason: format!("invalid index status '{s}'"),
    })
}

fn row_to_file(row: &rusqlite::Row<'_>) -> Result<FileRecord, StorageError> {
    let kind: String = row.get(4)?;
    let status: String = row.get(17)?;
    Ok(FileRecord {
        id: FileId(row.get(0)?),
        path: row.get(1)?,
        name: row.get(2)?,
        ext: row.get(3)?,
        kind: FileKind::parse(&kind).unwrap_or(FileKind::Other),
        size: row.get::<_, i64>(5)? as u64,
        mtime: row.get(6)?,
        ctime: row.get(7)?,
        indexed_at: row.get(8)?,
        content_hash: row.get(9)?,
        mime: row.get(10)?,
        title: row.get(11)?,
        author: row.get(12)?,
        keywords: row.get(13)?,
        content_length: row.get::<_, i64>(14)? as u64,
        word_count: row.get::<_, i64>(15)? as u64,
        parse_confidence: row.get::<_, f64>(16)? as f32,
        index_status: parse_index_status(&status)?,
        is_indexed: row.get(18)?,
        needs_reindex: row.get(19)?,
        retry_count: row.get::<_, i64>(20)? as u32,
        last_error: row.get(21)?,
        is_chunked: row.get(22)?,
        total_chunks: row.get::<_, i64>(23)? as u32,
        chunk_strategy: row.get(24)?,
        avg_chunk_size: row.get(25)?,
    })
}

fn row_to_chunk(row: &rusqlite::Row<'_>) -> Result<ChunkRecord, StorageError> {
    let status: String = row.get(8)?;
    Ok(ChunkRecord {
        id: ChunkId(row.get(0)?),
        file_id: FileId(row.get(1)?),
        chunk_index: row.get::<_, i64>(2)? as u32,
        content: row.get(3)?,
        content_length: row.get::<_, i64>(4)? as u32,
        start_position: row.get::<_, i64>(5)? as u64,
        end_position: row.get::<_, i64>(6)? as u64,
        is_indexed: row.get(7)?,
        index_status: parse_index_status(&status)?,
        indexed_at: row.get(9)?,
    })
}

fn row_to_job(row: &rusqlite::Row<'_>) -> Result<JobRecord, StorageError> {
    let job_type: String = row.get(2)?;
    let status: String = row.get(3)?;
    Ok(JobRecord {
        id: JobId(row.get(0)?),
        folder_path: row.get(1)?,
        job_type: JobType::parse(&job_type).map_err(|_| StorageError::TransactionFailed {
            reason: format!("invalid job type '{job_type}'"),
        })?,
        status: JobStatus::parse(&status).map_err(|_| StorageError::TransactionFailed {
            reason: format!("invalid job status '{status}'"),
        })?,
        total_files: row.get::<_, i64>(4)? as u32,
        processed_files: row.get::<_, i64>(5)? as u32,
        error_count: row.get::<_, i64>(6)? as u32,
        started_at: row.get(7)?,
        completed_at: row.get(8)?,
        error_message: row.get(9)?,
        created_at: row.get(10)?,
    })
}
