pub mod error;
pub mod fulltext;
pub mod manager;
pub mod relational;
pub mod vector;

pub use error::StorageError;
pub use fulltext::{ChunkDoc, FullTextStore, FulltextHit};
pub use manager::StorageManager;
pub use relational::{
    ChunkRecord, FileRecord, FileUpsert, JobCreation, JobRecord, KnownFile, RelationalStore,
    SearchRecord,
};
pub use vector::{VectorEntry, VectorHit, VectorStore};

/// Current wall-clock time as Unix seconds. All persisted timestamps in
/// Lodestone use this representation.
pub fn now_epoch() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
