use std::path::{Path, PathBuf};

use lode_core::AppConfig;

use crate::error::StorageError;
use crate::fulltext::FullTextStore;
use crate::relational::RelationalStore;
use crate::vector::VectorStore;

/// Unified facade over the relational store, vector index, and full-text
/// index under one `data_root`.
///
/// The relational store is the source of truth: if it cannot open, that is
/// fatal. The two secondary indexes are rebuildable, so an unusable index
/// file is purged and recreated empty (a subsequent full index run
/// repopulates it) rather than taking the service down.
pub struct StorageManager {
    relational: RelationalStore,
    vector: VectorStore,
    fulltext: FullTextStore,
    data_root: PathBuf,
    vector_path: PathBuf,
}

impl StorageManager {
    pub fn open(config: &AppConfig) -> Result<Self, StorageError> {
        let data_root = config.data_root.clone();
        std::fs::create_dir_all(&data_root)?;

        // Source of truth: schema mismatch or corruption here is fatal.
        let relational = RelationalStore::open(&config.db_path())?;

        let vector_path = config.vector_index_path();
        let dim = config.embedding.dim;
        let vector = match VectorStore::open(&vector_path, dim, &config.vector) {
            Ok(v) => v,
            Err(e) if should_rebuild(&e) => {
                tracing::warn!(error = %e, "vector index unusable, starting empty");
                purge_vector_files(&vector_path)?;
                VectorStore::new(dim, &config.vector)?
            }
            Err(e) => return Err(e),
        };

        let fulltext_dir = config.fulltext_dir();
        let cjk = config.fulltext.use_cjk_analyzer;
        let fulltext = match FullTextStore::open(&fulltext_dir, cjk) {
            Ok(f) => f,
            Err(e) if should_rebuild(&e) => {
                tracing::warn!(error = %e, "full-text index unusable, starting empty");
                if fulltext_dir.exists() {
                    std::fs::remove_dir_all(&fulltext_dir)?;
                }
                FullTextStore::open(&fulltext_dir, cjk)?
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            relational,
            vector,
            fulltext,
            data_root,
            vector_path,
        })
    }

    pub fn relational(&self) -> &RelationalStore {
        &self.relational
    }

    pub fn relational_mut(&mut self) -> &mut RelationalStore {
        &mut self.relational
    }

    pub fn vector(&self) -> &VectorStore {
        &self.vector
    }

    pub fn vector_mut(&mut self) -> &mut VectorStore {
        &mut self.vector
    }

    pub fn fulltext(&self) -> &FullTextStore {
        &self.fulltext
    }

    pub fn fulltext_mut(&mut self) -> &mut FullTextStore {
        &mut self.fulltext
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Persist all backends that require explicit flushing: commits
    /// pending full-text operations and saves the vector pair atomically.
    pub fn flush(&mut self) -> Result<(), StorageError> {
        self.fulltext.commit()?;
        self.vector.save(&self.vector_path)?;
        Ok(())
    }
}

/// Secondary-index failures that a purge-and-reindex fixes. A dimension
/// mismatch lands here too: changing the embedding model invalidates every
/// stored vector anyway.
fn should_rebuild(err: &StorageError) -> bool {
    matches!(err, StorageError::DimensionMismatch { .. }) || err.is_corruption()
}

fn purge_vector_files(vector_path: &Path) -> Result<(), StorageError> {
    for p in [
        vector_path.to_path_buf(),
        vector_path.with_extension("meta"),
    ] {
        if p.exists() {
            std::fs::remove_file(&p)?;
        }
    }
    Ok(())
}
