use std::collections::HashMap;
use std::path::{Path, PathBuf};

use lode_core::{ChunkId, FileId, FileKind, VectorConfig};
use serde::{Deserialize, Serialize};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::error::StorageError;
use crate::now_epoch;

/// Sidecar format version. Bump on layout changes.
const SIDECAR_VERSION: u32 = 1;

/// A single search hit from k-NN search.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub vector_id: u64,
    pub chunk_id: ChunkId,
    pub file_id: FileId,
    /// Cosine similarity in [-1, 1], descending across the result list.
    pub similarity: f32,
}

/// Side metadata for one stored vector: which chunk and file it belongs
/// to, plus the denormalized file fields search results need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorEntry {
    pub vector_id: u64,
    pub chunk_id: ChunkId,
    pub file_id: FileId,
    pub file_name: String,
    pub file_path: String,
    pub file_kind: FileKind,
    pub file_size: u64,
    pub modified_time: i64,
    pub created_at: i64,
}

/// On-disk sidecar document: versioned, rebuildable from the relational
/// store if lost.
#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    version: u32,
    dim: usize,
    count: usize,
    strategy: String,
    next_id: u64,
    last_updated: i64,
    entries: Vec<VectorEntry>,
}

/// HNSW vector index over unit vectors with inner-product (cosine)
/// similarity, backed by usearch.
///
/// Vector ids are minted here, monotonically increasing, and never reused;
/// the sidecar persists the id → chunk/file mapping next to the index
/// file. Save is atomic: both files are written to temporaries and
/// renamed, so a crash leaves the previous pair intact.
pub struct VectorStore {
    index: Index,
    dim: usize,
    config: VectorConfig,
    next_id: u64,
    entries: HashMap<u64, VectorEntry>,
    chunk_to_vector: HashMap<ChunkId, u64>,
}

impl VectorStore {
    /// Create a new in-memory vector index with the given dimension.
    pub fn new(dim: usize, config: &VectorConfig) -> Result<Self, StorageError> {
        let index = create_index(dim, config)?;
        Ok(Self {
            index,
            dim,
            config: config.clone(),
            next_id: 1,
            entries: HashMap::new(),
            chunk_to_vector: HashMap::new(),
        })
    }

    /// Open an existing index + sidecar pair, or create a fresh one if the
    /// files don't exist.
    pub fn open(path: &Path, dim: usize, config: &VectorConfig) -> Result<Self, StorageError> {
        if !path.exists() {
            return Self::new(dim, config);
        }
        let index = create_index(dim, config)?;
        index
            .load(path.to_str().unwrap_or(""))
            .map_err(|e| StorageError::VectorIndexUnavailable {
                reason: format!("failed to load vector index: {e}"),
            })?;
        let loaded_dim = index.dimensions();
        if loaded_dim != dim {
            return Err(StorageError::DimensionMismatch {
                expected: dim,
                actual: loaded_dim,
            });
        }

        let sidecar = load_sidecar(&sidecar_path(path))?;
        if sidecar.dim != dim {
            return Err(StorageError::DimensionMismatch {
                expected: dim,
                actual: sidecar.dim,
            });
        }
        if sidecar.entries.len() != index.size() {
            return Err(StorageError::VectorIndexUnavailable {
                reason: format!(
                    "sidecar/index disagree: {} entries vs {} vectors",
                    sidecar.entries.len(),
                    index.size()
                ),
            });
        }

        let mut entries = HashMap::with_capacity(sidecar.entries.len());
        let mut chunk_to_vector = HashMap::with_capacity(sidecar.entries.len());
        for entry in sidecar.entries {
            chunk_to_vector.insert(entry.chunk_id, entry.vector_id);
            entries.insert(entry.vector_id, entry);
        }

        Ok(Self {
            index,
            dim,
            config: config.clone(),
            next_id: sidecar.next_id,
            entries,
            chunk_to_vector,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add one vector per entry, assigning fresh monotone vector ids.
    /// Re-adding a chunk replaces its previous vector.
    pub fn add(
        &mut self,
        vectors: &[Vec<f32>],
        mut metas: Vec<VectorEntry>,
    ) -> Result<Vec<u64>, StorageError> {
        if vectors.len() != metas.len() {
            return Err(StorageError::TransactionFailed {
                reason: format!(
                    "vector/meta count mismatch: {} vs {}",
                    vectors.len(),
                    metas.len()
                ),
            });
        }
        for v in vectors {
            if v.len() != self.dim {
                return Err(StorageError::DimensionMismatch {
                    expected: self.dim,
                    actual: v.len(),
                });
            }
        }

        let mut assigned = Vec::with_capacity(vectors.len());
        for (vector, meta) in vectors.iter().zip(metas.drain(..)) {
            // Idempotent per chunk: drop any previous vector first.
            if let Some(old_id) = self.chunk_to_vector.remove(&meta.chunk_id) {
                if self.index.contains(old_id) {
                    let _ = self.index.remove(old_id);
                }
                self.entries.remove(&old_id);
            }

            let id = self.next_id;
            self.next_id += 1;

            if self.index.size() >= self.index.capacity() {
                let new_cap = (self.index.capacity() + 1).max(64) * 2;
                self.index.reserve(new_cap).map_err(|e| {
                    StorageError::VectorIndexUnavailable {
                        reason: format!("reserve failed: {e}"),
                    }
                })?;
            }
            self.index
                .add(id, vector)
                .map_err(|e| StorageError::VectorIndexUnavailable {
                    reason: format!("add failed: {e}"),
                })?;

            let mut meta = meta;
            meta.vector_id = id;
            self.chunk_to_vector.insert(meta.chunk_id, id);
            self.entries.insert(id, meta);
            assigned.push(id);
        }
        Ok(assigned)
    }

    /// Nearest neighbors of the query, similarity descending.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>, StorageError> {
        if query.len() != self.dim {
            return Err(StorageError::DimensionMismatch {
                expected: self.dim,
                actual: query.len(),
            });
        }
        if self.index.size() == 0 || k == 0 {
            return Ok(Vec::new());
        }
        let matches = self
            .index
            .search(query, k)
            .map_err(|e| StorageError::VectorIndexUnavailable {
                reason: format!("search failed: {e}"),
            })?;
        let hits = matches
            .keys
            .iter()
            .zip(matches.distances.iter())
            .filter_map(|(&key, &distance)| {
                self.entries.get(&key).map(|entry| VectorHit {
                    vector_id: key,
                    chunk_id: entry.chunk_id,
                    file_id: entry.file_id,
                    // usearch cosine metric reports distance = 1 - cos.
                    similarity: (1.0 - distance).clamp(-1.0, 1.0),
                })
            })
            .collect();
        Ok(hits)
    }

    /// Side metadata for a vector id.
    pub fn entry(&self, vector_id: u64) -> Option<&VectorEntry> {
        self.entries.get(&vector_id)
    }

    /// Remove vectors for the given chunk ids. Returns how many existed.
    pub fn delete_by_chunk_ids(&mut self, chunk_ids: &[ChunkId]) -> usize {
        let mut removed = 0;
        for chunk_id in chunk_ids {
            if let Some(id) = self.chunk_to_vector.remove(chunk_id) {
                if self.index.contains(id) {
                    let _ = self.index.remove(id);
                }
                self.entries.remove(&id);
                removed += 1;
            }
        }
        removed
    }

    /// Remove every vector belonging to a file. Returns how many existed.
    pub fn delete_by_file(&mut self, file_id: FileId) -> usize {
        let chunk_ids: Vec<ChunkId> = self
            .entries
            .values()
            .filter(|e| e.file_id == file_id)
            .map(|e| e.chunk_id)
            .collect();
        self.delete_by_chunk_ids(&chunk_ids)
    }

    /// Persist the index and sidecar atomically (temp files + rename).
    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let index_tmp = path.with_extension("bin.tmp");
        self.index
            .save(index_tmp.to_str().unwrap_or(""))
            .map_err(|e| StorageError::VectorIndexUnavailable {
                reason: format!("save failed: {e}"),
            })?;

        let mut entries: Vec<VectorEntry> = self.entries.values().cloned().collect();
        entries.sort_by_key(|e| e.vector_id);
        let sidecar = Sidecar {
            version: SIDECAR_VERSION,
            dim: self.dim,
            count: entries.len(),
            strategy: format!(
                "hnsw-cos-m{}-ef{}",
                self.config.connectivity, self.config.expansion_search
            ),
            next_id: self.next_id,
            last_updated: now_epoch(),
            entries,
        };
        let meta_path = sidecar_path(path);
        let meta_tmp = meta_path.with_extension("meta.tmp");
        let json = serde_json::to_vec(&sidecar).map_err(|e| {
            StorageError::VectorIndexUnavailable {
                reason: format!("sidecar encode failed: {e}"),
            }
        })?;
        std::fs::write(&meta_tmp, json)?;

        // Both temporaries exist; publish index first, then sidecar. The
        // open path detects a torn pair via the count check and falls back
        // to a rebuild.
        std::fs::rename(&index_tmp, path)?;
        std::fs::rename(&meta_tmp, meta_path)?;
        Ok(())
    }
}

/// `file_index.bin` → `file_index.meta`.
fn sidecar_path(index_path: &Path) -> PathBuf {
    index_path.with_extension("meta")
}

fn load_sidecar(path: &Path) -> Result<Sidecar, StorageError> {
    let data = std::fs::read(path).map_err(|e| StorageError::VectorIndexUnavailable {
        reason: format!("sidecar missing: {e}"),
    })?;
    let sidecar: Sidecar =
        serde_json::from_slice(&data).map_err(|e| StorageError::VectorIndexUnavailable {
            reason: format!("sidecar decode failed: {e}"),
        })?;
    if sidecar.version != SIDECAR_VERSION {
        return Err(StorageError::VectorIndexUnavailable {
            reason: format!("unsupported sidecar version {}", sidecar.version),
        });
    }
    Ok(sidecar)
}

fn create_index(dim: usize, config: &VectorConfig) -> Result<Index, StorageError> {
    let mut options = IndexOptions::default();
    options.dimensions = dim;
    options.metric = MetricKind::Cos;
    options.quantization = ScalarKind::F32;
    options.connectivity = config.connectivity;
    options.expansion_add = config.expansion_add;
    options.expansion_search = config.expansion_search;

    Index::new(&options).map_err(|e| StorageError::VectorIndexUnavailable {
        reason: format!("failed to create index: {e}"),
    })
}
