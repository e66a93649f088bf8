use std::time::Duration;

/// Statistics from one index job run.
#[derive(Debug, Clone)]
pub struct IndexReport {
    /// Files the job set out to process (changed + deleted for
    /// incremental runs).
    pub total_files: usize,
    pub processed_files: usize,
    pub error_count: usize,
    pub deleted_files: usize,
    /// Chunks written across all successfully built files.
    pub total_chunks: usize,
    pub duration: Duration,
    /// The run ended because of an external stop request.
    pub stopped: bool,
}
