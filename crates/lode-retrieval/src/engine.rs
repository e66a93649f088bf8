use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use lode_core::{ChunkId, FileId, FileKind, InputType, MatchType, SearchType};
use lode_predict::{Embedder, SpeechPredictor, VisionPredictor};
use lode_storage::{SearchRecord, StorageManager};
use serde::Serialize;

use crate::error::RetrievalError;

/// Multiplier applied when a chunk is found by both retrieval paths.
const HYBRID_BOOST: f32 = 1.2;

/// Candidate pool size factor relative to the requested limit.
const POOL_FACTOR: usize = 3;

/// Character budget of the preview snippet.
const PREVIEW_CHARS: usize = 200;

/// Character budget of the highlight window around the first match.
const HIGHLIGHT_CHARS: usize = 100;

/// A parsed search request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub search_type: SearchType,
    pub limit: usize,
    pub offset: usize,
    /// Minimum cosine similarity for semantic hits.
    pub threshold: f32,
    /// Kind names or bare extensions; canonicalized before filtering.
    pub file_types: Vec<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, search_type: SearchType) -> Self {
        Self {
            query: query.into(),
            search_type,
            limit: 10,
            offset: 0,
            threshold: 0.0,
            file_types: Vec::new(),
        }
    }
}

/// One file-level search result (the best chunk of the file).
#[derive(Debug, Clone, Serialize)]
pub struct SearchResultItem {
    pub file_id: FileId,
    pub file_name: String,
    pub file_path: String,
    pub file_kind: FileKind,
    pub relevance_score: f32,
    pub preview_text: String,
    pub highlight: Option<String>,
    pub match_type: MatchType,
    pub file_size: u64,
    pub created_at: i64,
    pub modified_at: i64,
    pub chunk_id: ChunkId,
    pub chunk_index: u32,
}

/// The full response: results plus bookkeeping the caller surfaces.
#[derive(Debug, Clone, Serialize, Default)]
pub struct SearchResponse {
    pub results: Vec<SearchResultItem>,
    /// File-level candidates before pagination.
    pub total_candidates: usize,
    /// Set when a retrieval path failed and the response degraded.
    pub degraded: Option<String>,
    /// Multimodal only: the text the payload converted to.
    pub converted_text: Option<String>,
    /// Multimodal only: conversion confidence.
    pub confidence: Option<f32>,
}

/// Per-chunk fusion accumulator.
struct Candidate {
    chunk_id: ChunkId,
    file_id: FileId,
    semantic: Option<f32>,
    lexical: Option<f32>,
}

/// Unified query entry point over the per-chunk indexes.
///
/// Retrieval is per chunk; results are grouped back to files, keeping the
/// best-scoring chunk per file. Failures of one path degrade a hybrid
/// search to the surviving path instead of erroring.
pub struct SearchEngine {
    storage: Arc<RwLock<StorageManager>>,
    embedder: Arc<Embedder>,
    pub(crate) speech: Option<Arc<dyn SpeechPredictor>>,
    pub(crate) vision: Option<Arc<dyn VisionPredictor>>,
    pub(crate) ocr_min_confidence: f32,
}

impl SearchEngine {
    pub fn new(
        storage: Arc<RwLock<StorageManager>>,
        embedder: Arc<Embedder>,
        speech: Option<Arc<dyn SpeechPredictor>>,
        vision: Option<Arc<dyn VisionPredictor>>,
        ocr_min_confidence: f32,
    ) -> Self {
        Self {
            storage,
            embedder,
            speech,
            vision,
            ocr_min_confidence,
        }
    }

    /// Text search. Records a history row on the way out.
    #[tracing::instrument(skip(self, request), fields(query = %request.query, search_type = request.search_type.as_str(), result_count))]
    pub fn search(&self, request: &SearchRequest) -> Result<SearchResponse, RetrievalError> {
        self.search_as(request, InputType::Text)
    }

    pub(crate) fn search_as(
        &self,
        request: &SearchRequest,
        input_type: InputType,
    ) -> Result<SearchResponse, RetrievalError> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(RetrievalError::InvalidQuery {
                reason: "empty query".to_string(),
            });
        }
        if request.limit == 0 {
            return Err(RetrievalError::InvalidQuery {
                reason: "limit must be positive".to_string(),
            });
        }
        let started = Instant::now();
        let kinds: Vec<FileKind> = request
            .file_types
            .iter()
            .map(|t| FileKind::from_filter_value(t))
            .collect();

        let pool = POOL_FACTOR * (request.limit + request.offset);
        let mut candidates: HashMap<ChunkId, Candidate> = HashMap::new();
        let mut degraded: Vec<String> = Vec::new();

        if request.search_type.wants_semantic() {
            match self.collect_semantic(query, request.threshold, pool, &mut candidates) {
                Ok(()) => {}
                Err(note) => degraded.push(note),
            }
        }
        if request.search_type.wants_fulltext() {
            match self.collect_lexical(query, pool, &kinds, &mut candidates) {
                Ok(()) => {}
                Err(note) => degraded.push(note),
            }
        }

        let results = self.finalize(query, &kinds, candidates)?;
        let total_candidates = results.len();
        let page: Vec<SearchResultItem> = results
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .collect();

        self.record_history(
            query,
            input_type,
            request.search_type,
            page.len(),
            started.elapsed().as_millis() as u64,
        );

        tracing::Span::current().record("result_count", page.len());
        Ok(SearchResponse {
            results: page,
            total_candidates,
            degraded: if degraded.is_empty() {
                None
            } else {
                Some(degraded.join("; "))
            },
            converted_text: None,
            confidence: None,
        })
    }

    /// Term-prefix suggestions from the full-text index.
    pub fn suggest(&self, prefix: &str, limit: usize) -> Result<Vec<String>, RetrievalError> {
        let mgr = self.read_lock();
        Ok(mgr.fulltext().suggest(prefix, limit)?)
    }

    // -- retrieval paths --

    /// Semantic path: embed the query, k-NN over chunk vectors, filter by
    /// the similarity threshold. Failures come back as a degradation note.
    fn collect_semantic(
        &self,
        query: &str,
        threshold: f32,
        pool: usize,
        candidates: &mut HashMap<ChunkId, Candidate>,
    ) -> Result<(), String> {
        let qvec = match self.embedder.embed_query(query) {
            Some(v) => v,
            None => return Err("semantic path unavailable: embedding failed".to_string()),
        };
        let hits = {
            let mgr = self.read_lock();
            mgr.vector()
                .search(&qvec, pool)
                .map_err(|e| format!("semantic path failed: {e}"))?
        };
        tracing::debug!(count = hits.len(), "semantic candidates");
        for hit in hits {
            if hit.similarity < threshold {
                continue;
            }
            let entry = candidates
                .entry(hit.chunk_id)
                .or_insert_with(|| Candidate {
                    chunk_id: hit.chunk_id,
                    file_id: hit.file_id,
                    semantic: None,
                    lexical: None,
                });
            let score = hit.similarity.max(0.0);
            entry.semantic = Some(entry.semantic.map_or(score, |s| s.max(score)));
        }
        Ok(())
    }

    /// Lexical path: boosted multi-field BM25 query. Raw scores are
    /// min-max normalized into [0, 1] within the candidate pool so they
    /// are commensurable with cosine similarities during fusion.
    fn collect_lexical(
        &self,
        query: &str,
        pool: usize,
        kinds: &[FileKind],
        candidates: &mut HashMap<ChunkId, Candidate>,
    ) -> Result<(), String> {
        let hits = {
            let mgr = self.read_lock();
            mgr.fulltext()
                .search(query, pool, 0, kinds)
                .map_err(|e| format!("lexical path failed: {e}"))?
        };
        tracing::debug!(count = hits.len(), "lexical candidates");
        if hits.is_empty() {
            return Ok(());
        }

        let max = hits.iter().map(|h| h.score).fold(f32::MIN, f32::max);
        let min = hits.iter().map(|h| h.score).fold(f32::MAX, f32::min);
        let range = (max - min).max(f32::EPSILON);

        for hit in hits {
            let norm = if max > min {
                (hit.score - min) / range
            } else {
                1.0
            };
            let entry = candidates
                .entry(hit.chunk_id)
                .or_insert_with(|| Candidate {
                    chunk_id: hit.chunk_id,
                    file_id: hit.file_id,
                    semantic: None,
                    lexical: None,
                });
            entry.lexical = Some(entry.lexical.map_or(norm, |s| s.max(norm)));
        }
        Ok(())
    }

    // -- fusion, grouping, hydration --

    fn finalize(
        &self,
        query: &str,
        kinds: &[FileKind],
        candidates: HashMap<ChunkId, Candidate>,
    ) -> Result<Vec<SearchResultItem>, RetrievalError> {
        let mgr = self.read_lock();

        // Group by file keeping the best chunk. Chunk ids within a file
        // ascend with chunk_index, so the id tie-break implements
        // "lower chunk_index wins".
        let mut best_per_file: HashMap<FileId, (f32, MatchType, ChunkId)> = HashMap::new();
        for candidate in candidates.into_values() {
            let (score, match_type) = fuse(&candidate);
            let slot = best_per_file
                .entry(candidate.file_id)
                .or_insert((f32::MIN, match_type, candidate.chunk_id));
            if score > slot.0 || (score == slot.0 && candidate.chunk_id < slot.2) {
                *slot = (score, match_type, candidate.chunk_id);
            }
        }

        let mut results = Vec::with_capacity(best_per_file.len());
        for (file_id, (score, match_type, chunk_id)) in best_per_file {
            let file = match mgr.relational().get_file(file_id)? {
                Some(f) => f,
                None => continue, // stale index entry
            };
            if !kinds.is_empty() && !kinds.contains(&file.kind) {
                continue;
            }
            let chunk = match mgr.relational().get_chunk(chunk_id)? {
                Some(c) => c,
                None => continue,
            };
            results.push(SearchResultItem {
                file_id,
                file_name: file.name,
                file_path: file.path,
                file_kind: file.kind,
                relevance_score: score,
                preview_text: make_preview(&chunk.content),
                highlight: make_highlight(&chunk.content, query),
                match_type,
                file_size: file.size,
                created_at: file.ctime,
                modified_at: file.mtime,
                chunk_id,
                chunk_index: chunk.chunk_index,
            });
        }
        drop(mgr);

        results.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.file_id.cmp(&b.file_id))
        });
        Ok(results)
    }

    pub(crate) fn record_history(
        &self,
        query: &str,
        input_type: InputType,
        search_type: SearchType,
        result_count: usize,
        elapsed_ms: u64,
    ) {
        let mut mgr = self.write_lock();
        let record = SearchRecord {
            query: query.to_string(),
            input_type,
            search_type,
            models_used: None,
            result_count: result_count as u32,
            response_time_ms: elapsed_ms,
        };
        if let Err(e) = mgr.relational_mut().record_search(&record) {
            tracing::debug!(error = %e, "search history append failed");
        }
    }

    pub(crate) fn read_lock(&self) -> RwLockReadGuard<'_, StorageManager> {
        match self.storage.read() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, StorageManager> {
        match self.storage.write() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }
}

/// Fuse one chunk's path scores: both paths present marks the chunk
/// hybrid and boosts the better score by 1.2, clamped to 1.0 since both
/// inputs are normalized.
fn fuse(candidate: &Candidate) -> (f32, MatchType) {
    match (candidate.semantic, candidate.lexical) {
        (Some(s), Some(l)) => ((s.max(l) * HYBRID_BOOST).min(1.0), MatchType::Hybrid),
        (Some(s), None) => (s, MatchType::Semantic),
        (None, Some(l)) => (l, MatchType::Fulltext),
        (None, None) => (0.0, MatchType::Semantic),
    }
}

/// Leading slice of the chunk, whitespace-normalized, ≤200 chars.
fn make_preview(text: &str) -> String {
    let collapsed: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut preview = lode_core::truncate_chars(&collapsed, PREVIEW_CHARS).to_string();
    if collapsed.chars().count() > PREVIEW_CHARS {
        preview.push('…');
    }
    preview
}

/// ~100-char window centered on the first case-insensitive occurrence of
/// the query (or its first token). None when nothing matches.
fn make_highlight(text: &str, query: &str) -> Option<String> {
    let haystack = text.to_lowercase();
    let needle_full = query.to_lowercase();
    let needle = if haystack.contains(&needle_full) {
        needle_full
    } else {
        needle_full
            .split_whitespace()
            .find(|t| haystack.contains(*t))?
            .to_string()
    };

    let byte_pos = haystack.find(&needle)?;
    let char_pos = text[..byte_pos].chars().count();
    let needle_chars = needle.chars().count();

    let chars: Vec<char> = text.chars().collect();
    let half = HIGHLIGHT_CHARS.saturating_sub(needle_chars) / 2;
    let start = char_pos.saturating_sub(half);
    let end = (char_pos + needle_chars + half).min(chars.len());

    let mut window: String = chars[start..end].iter().collect();
    window = window.split_whitespace().collect::<Vec<_>>().join(" ");
    if start > 0 {
        window = format!("…{window}");
    }
    if end < chars.len() {
        window.push('…');
    }
    Some(window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lode_core::AppConfig;
    use lode_predict::HashEmbedding;
    use lode_storage::{ChunkDoc, FileUpsert, VectorEntry};
    use lode_core::TextChunk;
    use tempfile::TempDir;

    const DIM: usize = 128;

    struct Fixture {
        storage: Arc<RwLock<StorageManager>>,
        embedder: Arc<Embedder>,
        _tmp: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let mut config = AppConfig::default();
            config.data_root = tmp.path().join("data");
            config.embedding.dim = DIM;
            let storage = Arc::new(RwLock::new(StorageManager::open(&config).unwrap()));
            let embedder = Arc::new(Embedder::new(Arc::new(HashEmbedding::new(DIM)), 32));
            Self {
                storage,
                embedder,
                _tmp: tmp,
            }
        }

        fn engine(&self) -> SearchEngine {
            SearchEngine::new(self.storage.clone(), self.embedder.clone(), None, None, 0.3)
        }

        /// Index a single-chunk file across all three stores.
        fn index_file(&self, path: &str, content: &str) -> FileId {
            let mut mgr = self.storage.write().unwrap();
            let name = path.rsplit('/').next().unwrap_or(path).to_string();
            let file_id = mgr
                .relational_mut()
                .upsert_file(&FileUpsert {
                    path: path.to_string(),
                    name: name.clone(),
                    ext: "txt".to_string(),
                    kind: FileKind::Document,
                    size: content.len() as u64,
                    mtime: 1_700_000_000,
                    ctime: 1_600_000_000,
                    content_hash: format!("{:064}", content.len()),
                    mime: Some("text/plain".to_string()),
                    title: None,
                    author: None,
                    keywords: None,
                })
                .unwrap();
            let chunk_ids = mgr
                .relational_mut()
                .replace_chunks(
                    file_id,
                    &[TextChunk {
                        index: 0,
                        start: 0,
                        end: content.chars().count(),
                        text: content.to_string(),
                    }],
                )
                .unwrap();
            let vec = self
                .embedder
                .embed(&[content.to_string()], true)
                .vectors
                .remove(0);
            mgr.vector_mut()
                .add(
                    &[vec],
                    vec![VectorEntry {
                        vector_id: 0,
                        chunk_id: chunk_ids[0],
                        file_id,
                        file_name: name.clone(),
                        file_path: path.to_string(),
                        file_kind: FileKind::Document,
                        file_size: content.len() as u64,
                        modified_time: 1_700_000_000,
                        created_at: 1_600_000_000,
                    }],
                )
                .unwrap();
            mgr.fulltext_mut()
                .add_document(&ChunkDoc {
                    chunk_id: chunk_ids[0],
                    file_id,
                    file_name: name,
                    file_path: path.to_string(),
                    file_kind: FileKind::Document,
                    title: None,
                    content: content.to_string(),
                    chunk_index: 0,
                    start_position: 0,
                    end_position: content.chars().count() as u64,
                    content_length: content.chars().count() as u32,
                    modified_time: 1_700_000_000,
                    created_at: 1_600_000_000,
                })
                .unwrap();
            mgr.fulltext_mut().commit().unwrap();
            file_id
        }
    }

    #[test]
    fn empty_corpus_returns_no_results() {
        let fx = Fixture::new();
        let engine = fx.engine();
        for st in [SearchType::Semantic, SearchType::Fulltext, SearchType::Hybrid] {
            let resp = engine
                .search(&SearchRequest::new("anything at all", st))
                .unwrap();
            assert!(resp.results.is_empty(), "{st:?} should be empty");
        }
    }

    #[test]
    fn empty_query_is_invalid() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let err = engine
            .search(&SearchRequest::new("   ", SearchType::Hybrid))
            .unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidQuery { .. }));
    }

    #[test]
    fn semantic_search_finds_matching_document() {
        let fx = Fixture::new();
        fx.index_file(
            "docs/a.txt",
            "machine learning is a branch of artificial intelligence. deep learning is a branch of machine learning.",
        );
        let engine = fx.engine();

        let mut req = SearchRequest::new("machine learning", SearchType::Semantic);
        req.threshold = 0.0;
        let resp = engine.search(&req).unwrap();
        assert_eq!(resp.results.len(), 1);
        let top = &resp.results[0];
        assert_eq!(top.file_name, "a.txt");
        assert_eq!(top.match_type, MatchType::Semantic);
        assert_eq!(top.file_kind, FileKind::Document);
        assert!(top.preview_text.contains("machine learning"));
        assert!(top.highlight.as_deref().unwrap().contains("machine learning"));
        assert!(top.relevance_score > 0.0);
    }

    #[test]
    fn fulltext_search_marks_match_type() {
        let fx = Fixture::new();
        fx.index_file("docs/a.txt", "an essay about sailing boats and knots.");
        let engine = fx.engine();

        let resp = engine
            .search(&SearchRequest::new("sailing", SearchType::Fulltext))
            .unwrap();
        assert_eq!(resp.results.len(), 1);
        assert_eq!(resp.results[0].match_type, MatchType::Fulltext);
    }

    #[test]
    fn hybrid_marks_dual_hits_and_boosts() {
        let fx = Fixture::new();
        fx.index_file("docs/a.txt", "machine learning models and training data.");
        let engine = fx.engine();

        let resp = engine
            .search(&SearchRequest::new("machine learning", SearchType::Hybrid))
            .unwrap();
        assert_eq!(resp.results.len(), 1);
        let top = &resp.results[0];
        assert_eq!(top.match_type, MatchType::Hybrid);
        assert!(top.relevance_score <= 1.0);

        // the hybrid score dominates the pure semantic score of the same
        // document
        let sem = engine
            .search(&SearchRequest::new("machine learning", SearchType::Semantic))
            .unwrap();
        assert!(top.relevance_score >= sem.results[0].relevance_score);
    }

    #[test]
    fn hybrid_fusion_ranks_lexical_dominant_first() {
        let fx = Fixture::new();
        let exact = "python tutorial ".repeat(50);
        fx.index_file("docs/c.txt", &exact);
        fx.index_file("docs/d.txt", "guide to snake scripting language for novices.");
        let engine = fx.engine();

        let mut req = SearchRequest::new("python tutorial", SearchType::Hybrid);
        req.limit = 5;
        req.threshold = -1.0;
        let resp = engine.search(&req).unwrap();

        assert_eq!(resp.results.len(), 2, "both files should be present");
        let first = &resp.results[0];
        assert_eq!(first.file_name, "c.txt");
        assert!(matches!(
            first.match_type,
            MatchType::Hybrid | MatchType::Fulltext
        ));
        let second = &resp.results[1];
        assert_eq!(second.file_name, "d.txt");
        assert_eq!(second.match_type, MatchType::Semantic);
    }

    #[test]
    fn grouping_keeps_best_chunk_per_file() {
        let fx = Fixture::new();
        // two chunks of one file, one far more relevant
        let mut mgr = fx.storage.write().unwrap();
        let file_id = mgr
            .relational_mut()
            .upsert_file(&FileUpsert {
                path: "docs/multi.txt".to_string(),
                name: "multi.txt".to_string(),
                ext: "txt".to_string(),
                kind: FileKind::Document,
                size: 100,
                mtime: 0,
                ctime: 0,
                content_hash: "0".repeat(64),
                mime: None,
                title: None,
                author: None,
                keywords: None,
            })
            .unwrap();
        let chunks = vec![
            TextChunk {
                index: 0,
                start: 0,
                end: 40,
                text: "completely unrelated cooking paragraph.".to_string(),
            },
            TextChunk {
                index: 1,
                start: 40,
                end: 90,
                text: "machine learning machine learning machine learning".to_string(),
            },
        ];
        let chunk_ids = mgr.relational_mut().replace_chunks(file_id, &chunks).unwrap();
        let vecs = fx
            .embedder
            .embed(
                &chunks.iter().map(|c| c.text.clone()).collect::<Vec<_>>(),
                true,
            )
            .vectors;
        let metas: Vec<VectorEntry> = chunk_ids
            .iter()
            .map(|&chunk_id| VectorEntry {
                vector_id: 0,
                chunk_id,
                file_id,
                file_name: "multi.txt".to_string(),
                file_path: "docs/multi.txt".to_string(),
                file_kind: FileKind::Document,
                file_size: 100,
                modified_time: 0,
                created_at: 0,
            })
            .collect();
        mgr.vector_mut().add(&vecs, metas).unwrap();
        for (&chunk_id, chunk) in chunk_ids.iter().zip(&chunks) {
            mgr.fulltext_mut()
                .add_document(&ChunkDoc {
                    chunk_id,
                    file_id,
                    file_name: "multi.txt".to_string(),
                    file_path: "docs/multi.txt".to_string(),
                    file_kind: FileKind::Document,
                    title: None,
                    content: chunk.text.clone(),
                    chunk_index: chunk.index,
                    start_position: chunk.start as u64,
                    end_position: chunk.end as u64,
                    content_length: chunk.content_length() as u32,
                    modified_time: 0,
                    created_at: 0,
                })
                .unwrap();
        }
        mgr.fulltext_mut().commit().unwrap();
        drop(mgr);

        let engine = fx.engine();
        let resp = engine
            .search(&SearchRequest::new("machine learning", SearchType::Hybrid))
            .unwrap();
        // one result for the file, carried by the relevant chunk
        assert_eq!(resp.results.len(), 1);
        assert_eq!(resp.results[0].chunk_index, 1);
        assert!(resp.results[0]
            .preview_text
            .contains("machine learning"));
    }

    #[test]
    fn file_type_filter_applies_to_mapped_kind() {
        let fx = Fixture::new();
        fx.index_file("docs/a.txt", "shared token alpha beta.");
        let engine = fx.engine();

        let mut req = SearchRequest::new("alpha", SearchType::Fulltext);
        req.file_types = vec!["pdf".to_string()];
        assert!(engine.search(&req).unwrap().results.is_empty());

        req.file_types = vec!["document".to_string()];
        assert_eq!(engine.search(&req).unwrap().results.len(), 1);

        // a bare extension canonicalizes to its kind
        req.file_types = vec!["txt".to_string()];
        assert_eq!(engine.search(&req).unwrap().results.len(), 1);
    }

    #[test]
    fn threshold_one_returns_no_semantic_hits() {
        let fx = Fixture::new();
        fx.index_file("docs/a.txt", "some document about many topics.");
        let engine = fx.engine();

        let mut req = SearchRequest::new("entirely different query text", SearchType::Semantic);
        req.threshold = 1.0;
        let resp = engine.search(&req).unwrap();
        assert!(resp.results.is_empty());
    }

    #[test]
    fn semantic_determinism() {
        let fx = Fixture::new();
        fx.index_file("docs/a.txt", "reproducible retrieval results matter.");
        fx.index_file("docs/b.txt", "another document about retrieval systems.");
        let engine = fx.engine();

        let req = SearchRequest::new("retrieval", SearchType::Semantic);
        let r1 = engine.search(&req).unwrap();
        let r2 = engine.search(&req).unwrap();
        assert_eq!(r1.results.len(), r2.results.len());
        for (a, b) in r1.results.iter().zip(r2.results.iter()) {
            assert_eq!(a.file_id, b.file_id);
            assert!((a.relevance_score - b.relevance_score).abs() < 1e-6);
        }
    }

    #[test]
    fn pagination_offsets_file_results() {
        let fx = Fixture::new();
        for i in 0..5 {
            fx.index_file(
                &format!("docs/f{i}.txt"),
                &format!("common subject matter, file number {i}."),
            );
        }
        let engine = fx.engine();

        let mut req = SearchRequest::new("common subject", SearchType::Fulltext);
        req.limit = 2;
        let page1 = engine.search(&req).unwrap();
        req.offset = 2;
        let page2 = engine.search(&req).unwrap();

        assert_eq!(page1.results.len(), 2);
        assert_eq!(page2.results.len(), 2);
        assert_eq!(page1.total_candidates, 5);
        let ids1: Vec<FileId> = page1.results.iter().map(|r| r.file_id).collect();
        for r in &page2.results {
            assert!(!ids1.contains(&r.file_id));
        }
    }

    #[test]
    fn search_records_history() {
        let fx = Fixture::new();
        fx.index_file("docs/a.txt", "history recording check.");
        let engine = fx.engine();
        engine
            .search(&SearchRequest::new("history", SearchType::Hybrid))
            .unwrap();

        let mgr = fx.storage.read().unwrap();
        let recent = mgr.relational().recent_searches(5).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].query, "history");
        assert_eq!(recent[0].search_type, SearchType::Hybrid);
        assert_eq!(recent[0].result_count, 1);
    }

    // -- preview / highlight helpers --

    #[test]
    fn preview_caps_at_200_chars() {
        let text = "word ".repeat(100);
        let p = make_preview(&text);
        assert!(p.chars().count() <= PREVIEW_CHARS + 1);
        assert!(p.ends_with('…'));
    }

    #[test]
    fn highlight_centers_on_match() {
        let mut text = "padding ".repeat(30);
        text.push_str("the needle phrase sits here");
        text.push_str(&" trailing".repeat(30));
        let h = make_highlight(&text, "needle phrase").unwrap();
        assert!(h.contains("needle phrase"));
        assert!(h.chars().count() <= HIGHLIGHT_CHARS + 10);
        assert!(h.starts_with('…'));
    }

    #[test]
    fn highlight_falls_back_to_first_token() {
        let text = "only the word needle appears without the rest";
        let h = make_highlight(text, "needle missingtoken").unwrap();
        assert!(h.contains("needle"));
        assert!(make_highlight(text, "absent entirely").is_none());
    }
}
