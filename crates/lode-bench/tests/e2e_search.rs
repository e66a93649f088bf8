use std::time::Duration;

use lode_bench::fixture;
use lode_core::{FileKind, InputType, JobStatus, MatchType, SearchType};
use lode_retrieval::{MultimodalRequest, SearchRequest};
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(60);

#[test]
fn e2e_text_document_happy_path() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    std::fs::write(
        docs.join("a.txt"),
        "machine learning is a branch of artificial intelligence. \
         deep learning is a branch of machine learning.",
    )
    .unwrap();

    let svc = fixture::offline_services(&tmp.path().join("data"));
    let job_id = svc.build_full_index(&[docs], None).unwrap();
    let done = svc.wait_for_job(job_id, WAIT).unwrap();
    assert_eq!(done.status, JobStatus::Completed);

    let mut request = SearchRequest::new("machine learning", SearchType::Semantic);
    request.limit = 5;
    request.threshold = 0.0;
    let resp = svc.search(&request).unwrap();

    assert_eq!(resp.results.len(), 1);
    let top = &resp.results[0];
    assert_eq!(top.file_name, "a.txt");
    assert!(matches!(
        top.match_type,
        MatchType::Semantic | MatchType::Hybrid
    ));
    assert_eq!(top.file_kind, FileKind::Document);
    assert!(top.preview_text.contains("machine learning"));
    assert!(top
        .highlight
        .as_deref()
        .unwrap()
        .contains("machine learning"));
}

#[test]
fn e2e_long_document_chunking() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    let text = fixture::sentence_document(2400);
    assert_eq!(text.chars().count(), 2400);
    std::fs::write(docs.join("b.md"), &text).unwrap();

    let svc = fixture::offline_services(&tmp.path().join("data"));
    // defaults: chunk 500+50, threshold 600
    assert_eq!(svc.config().chunk.default_size, 500);
    assert_eq!(svc.config().chunk.overlap, 50);
    assert_eq!(svc.config().chunk.threshold, 600);

    let job_id = svc.build_full_index(&[docs.clone()], None).unwrap();
    let done = svc.wait_for_job(job_id, WAIT).unwrap();
    assert_eq!(done.status, JobStatus::Completed);

    let stats = svc.index_stats().unwrap();
    assert!(
        (5..=7).contains(&stats.chunks_total),
        "expected 5-7 chunks, got {}",
        stats.chunks_total
    );

    // Inspect the chunk rows through a second connection to the store.
    let db_path = svc.config().db_path();
    let store = lode_storage::RelationalStore::open(&db_path).unwrap();
    let file = store
        .get_file_by_path(docs.join("b.md").to_str().unwrap())
        .unwrap()
        .unwrap();
    assert!(file.is_chunked);
    assert_eq!(file.total_chunks as usize, stats.chunks_total);
    assert_eq!(file.chunk_strategy.as_deref(), Some("500+50"));

    let chunks = store.get_chunks_by_file(file.id).unwrap();
    assert_eq!(chunks.len(), stats.chunks_total);
    for chunk in &chunks {
        assert!(
            chunk.content_length >= 200,
            "chunk {} too short: {}",
            chunk.chunk_index,
            chunk.content_length
        );
    }
    for pair in chunks.windows(2) {
        assert!(pair[0].start_position < pair[1].start_position);
    }
    assert!(chunks.last().unwrap().end_position >= 2380);
}

#[test]
fn e2e_hybrid_fusion() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    // lexically dominant exact-phrase file
    std::fs::write(docs.join("c.txt"), "python tutorial ".repeat(1000)).unwrap();
    // semantic paraphrase with no shared tokens
    std::fs::write(
        docs.join("d.txt"),
        "guide to snake scripting language for absolute novices.",
    )
    .unwrap();

    let svc = fixture::offline_services(&tmp.path().join("data"));
    let job_id = svc.build_full_index(&[docs], None).unwrap();
    svc.wait_for_job(job_id, WAIT).unwrap();

    let mut request = SearchRequest::new("python tutorial", SearchType::Hybrid);
    request.limit = 5;
    request.threshold = -1.0;
    let resp = svc.search(&request).unwrap();

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
fn e2e_empty_corpus_all_search_types() {
    let tmp = TempDir::new().unwrap();
    let svc = fixture::offline_services(&tmp.path().join("data"));
    for search_type in [SearchType::Semantic, SearchType::Fulltext, SearchType::Hybrid] {
        let resp = svc
            .search(&SearchRequest::new("no such corpus", search_type))
            .unwrap();
        assert!(resp.results.is_empty());
    }
}

#[test]
fn e2e_threshold_one_filters_all_semantic_hits() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    std::fs::write(docs.join("a.txt"), "documents about various topics.").unwrap();

    let svc = fixture::offline_services(&tmp.path().join("data"));
    let job_id = svc.build_full_index(&[docs], None).unwrap();
    svc.wait_for_job(job_id, WAIT).unwrap();

    let mut request = SearchRequest::new("completely different wording", SearchType::Semantic);
    request.threshold = 1.0;
    let resp = svc.search(&request).unwrap();
    assert!(resp.results.is_empty());
}

#[test]
fn e2e_multimodal_voice_search() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    std::fs::write(
        docs.join("a.txt"),
        "machine learning is a branch of artificial intelligence. \
         deep learning is a branch of machine learning.",
    )
    .unwrap();

    let svc = fixture::services_with_speech(&tmp.path().join("data"), "machine learning", 0.9);
    let job_id = svc.build_full_index(&[docs], None).unwrap();
    svc.wait_for_job(job_id, WAIT).unwrap();

    // a tiny stand-in for the 2-second WAV; the canned predictor answers
    let wav = vec![0u8; 64];
    let resp = svc
        .multimodal_search(&MultimodalRequest {
            input_type: InputType::Voice,
            payload: wav,
            search_type: SearchType::Hybrid,
            limit: 5,
            threshold: 0.0,
        })
        .unwrap();

    let converted = resp.converted_text.as_deref().unwrap();
    assert!(converted.to_lowercase().contains("machine learning"));
    assert!(resp.confidence.unwrap() > 0.3);
    assert!(resp.results.iter().any(|r| r.file_name == "a.txt"));
}

#[test]
fn e2e_search_history_and_suggestions() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    std::fs::write(docs.join("a.txt"), "machine learning and machinery maintenance.").unwrap();

    let svc = fixture::offline_services(&tmp.path().join("data"));
    let job_id = svc.build_full_index(&[docs], None).unwrap();
    svc.wait_for_job(job_id, WAIT).unwrap();

    svc.search(&SearchRequest::new("machinery", SearchType::Hybrid))
        .unwrap();
    let recent = svc.recent_searches(10).unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].query, "machinery");

    let suggestions = svc.suggest("machi", 10).unwrap();
    assert!(suggestions.contains(&"machine".to_string()));
    assert!(suggestions.contains(&"machinery".to_string()));
}
