use std::collections::BTreeSet;
use std::path::Path;
use std::time::{Duration, Instant};

use lode_core::{ChunkId, FileId, FileKind};
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, Occur, PhraseQuery, Query, RegexQuery, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, OwnedValue, Schema, TextFieldIndexing, TextOptions, INDEXED, STORED,
    STRING,
};
use tantivy::tokenizer::{LowerCaser, TextAnalyzer, Token, TokenStream, Tokenizer};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use crate::error::StorageError;

const MIXED_TOKENIZER: &str = "mixed";
const CONTENT_MAX_BYTES: usize = 10_240;
const BATCH_COUNT_THRESHOLD: usize = 500;
const BATCH_TIME_THRESHOLD: Duration = Duration::from_millis(500);

/// Query-time field boosts.
const BOOST_TITLE: f32 = 1.5;
const BOOST_FILENAME: f32 = 1.3;
const BOOST_CONTENT: f32 = 1.0;
const BOOST_WILDCARD: f32 = 0.5;

/// Most tokens considered when building the boosted OR query.
const MAX_QUERY_TOKENS: usize = 8;

// ---------------------------------------------------------------------------
// Mixed Latin/CJK tokenizer
// ---------------------------------------------------------------------------

/// Check if a character is a CJK Unified Ideograph.
fn is_cjk(ch: char) -> bool {
    matches!(ch,
        '\u{4E00}'..='\u{9FFF}'   // CJK Unified Ideographs
        | '\u{3400}'..='\u{4DBF}' // CJK Extension A
        | '\u{F900}'..='\u{FAFF}' // CJK Compatibility Ideographs
    )
}

/// Tokenizes Latin/Unicode word runs plus CJK bigrams.
///
/// Alphanumeric runs become one token each; CJK runs are emitted as
/// overlapping bigrams (a lone CJK character becomes a unigram), so a
/// two-character Chinese query matches documents containing it without a
/// dictionary. With `cjk_bigrams` off, a CJK run stays one token.
#[derive(Clone)]
struct MixedTokenizer {
    cjk_bigrams: bool,
}

impl MixedTokenizer {
    fn new(cjk_bigrams: bool) -> Self {
        Self { cjk_bigrams }
    }
}

/// Split text into tokens eagerly; the stream just replays them.
fn tokenize_mixed(text: &str, cjk_bigrams: bool) -> Vec<Token> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let n = chars.len();
    let byte_end = |idx: usize| {
        if idx < n {
            chars[idx].0
        } else {
            text.len()
        }
    };

    let mut tokens = Vec::new();
    let mut position = 0usize;
    let mut push = |from: usize, to: usize, text: String, tokens: &mut Vec<Token>| {
        tokens.push(Token {
            offset_from: from,
            offset_to: to,
            position,
            text,
            position_length: 1,
        });
        position += 1;
    };

    let mut i = 0;
    while i < n {
        let c = chars[i].1;
        if is_cjk(c) {
            let mut j = i;
            while j < n && is_cjk(chars[j].1) {
                j += 1;
            }
            if !cjk_bigrams || j - i == 1 {
                if cjk_bigrams {
                    push(
                        chars[i].0,
                        byte_end(i + 1),
                        c.to_string(),
                        &mut tokens,
                    );
                } else {
                    let run: String = chars[i..j].iter().map(|(_, ch)| *ch).collect();
                    push(chars[i].0, byte_end(j), run, &mut tokens);
                }
            } else {
                for k in i..j - 1 {
                    let bigram: String = [chars[k].1, chars[k + 1].1].iter().collect();
                    push(chars[k].0, byte_end(k + 2), bigram, &mut tokens);
                }
            }
            i = j;
        } else if c.is_alphanumeric() {
            let mut j = i;
            while j < n && chars[j].1.is_alphanumeric() && !is_cjk(chars[j].1) {
                j += 1;
            }
            let run: String = chars[i..j].iter().map(|(_, ch)| *ch).collect();
            push(chars[i].0, byte_end(j), run, &mut tokens);
            i = j;
        } else {
            i += 1;
        }
    }
    tokens
}

struct MixedTokenStream {
    tokens: Vec<Token>,
    cursor: usize,
}

impl Tokenizer for MixedTokenizer {
    type TokenStream<'a> = MixedTokenStream;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
        MixedTokenStream {
            tokens: tokenize_mixed(text, self.cjk_bigrams),
            cursor: 0,
        }
    }
}

impl TokenStream for MixedTokenStream {
    fn advance(&mut self) -> bool {
        if self.cursor < self.tokens.len() {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn token(&self) -> &Token {
        &self.tokens[self.cursor - 1]
    }

    fn token_mut(&mut self) -> &mut Token {
        &mut self.tokens[self.cursor - 1]
    }
}

// ---------------------------------------------------------------------------
// Per-chunk document
// ---------------------------------------------------------------------------

/// One full-text document per chunk, denormalized with the file fields
/// search results need.
#[derive(Debug, Clone)]
pub struct ChunkDoc {
    pub chunk_id: ChunkId,
    pub file_id: FileId,
    pub file_name: String,
    pub file_path: String,
    pub file_kind: FileKind,
    pub title: Option<String>,
    pub content: String,
    pub chunk_index: u32,
    pub start_position: u64,
    pub end_position: u64,
    pub content_length: u32,
    pub modified_time: i64,
    pub created_at: i64,
}

impl ChunkDoc {
    /// Stable document key: `"{file_id}_chunk_{chunk_index}"`.
    pub fn doc_id(&self) -> String {
        format!("{}_chunk_{}", self.file_id, self.chunk_index)
    }
}

/// A single BM25 search hit with its stored fields.
#[derive(Debug, Clone)]
pub struct FulltextHit {
    pub score: f32,
    /// 1-based rank within this result list.
    pub rank: usize,
    pub chunk_id: ChunkId,
    pub file_id: FileId,
    pub file_name: String,
    pub file_path: String,
    pub file_kind: FileKind,
    pub chunk_index: u32,
}

// ---------------------------------------------------------------------------
// Full-text store
// ---------------------------------------------------------------------------

struct Fields {
    id: Field,
    chunk_id: Field,
    file_id: Field,
    file_name: Field,
    file_path: Field,
    file_type: Field,
    title: Field,
    content: Field,
    chunk_index: Field,
    start_position: Field,
    end_position: Field,
    content_length: Field,
    modified_time: Field,
    created_at: Field,
}

/// Per-chunk inverted index backed by tantivy with BM25 ranking
/// (k1 = 1.2, b = 0.75).
///
/// Batched commit strategy: commits on 500 documents or 500 ms elapsed,
/// whichever comes first. Forced commit on drop.
pub struct FullTextStore {
    index: Index,
    reader: IndexReader,
    writer: IndexWriter,
    fields: Fields,
    cjk_bigrams: bool,
    pending_count: usize,
    last_commit: Instant,
}

fn build_schema() -> (Schema, Fields) {
    let mut builder = Schema::builder();

    let tokenized = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(MIXED_TOKENIZER)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored();

    let tokenized_unstored = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(MIXED_TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );

    let fields = Fields {
        id: builder.add_text_field("id", STRING | STORED),
        chunk_id: builder.add_i64_field("chunk_id", INDEXED | STORED),
        file_id: builder.add_i64_field("file_id", INDEXED | STORED),
        file_name: builder.add_text_field("file_name", tokenized.clone()),
        file_path: builder.add_text_field("file_path", STRING | STORED),
        file_type: builder.add_text_field("file_type", STRING | STORED),
        title: builder.add_text_field("title", tokenized),
        content: builder.add_text_field("content", tokenized_unstored),
        chunk_index: builder.add_i64_field("chunk_index", STORED),
        start_position: builder.add_i64_field("start_position", STORED),
        end_position: builder.add_i64_field("end_position", STORED),
        content_length: builder.add_i64_field("content_length", STORED),
        modified_time: builder.add_i64_field("modified_time", STORED),
        created_at: builder.add_i64_field("created_at", STORED),
    };

    (builder.build(), fields)
}

fn register_tokenizer(index: &Index, cjk_bigrams: bool) {
    let analyzer = TextAnalyzer::builder(MixedTokenizer::new(cjk_bigrams))
        .filter(LowerCaser)
        .build();
    index.tokenizers().register(MIXED_TOKENIZER, analyzer);
}

impl FullTextStore {
    /// Open or create a full-text index at the given directory path.
    pub fn open(path: &Path, cjk_bigrams: bool) -> Result<Self, StorageError> {
        std::fs::create_dir_all(path)?;
        let (schema, fields) = build_schema();
        let index =
            Index::open_in_dir(path).or_else(|_| Index::create_in_dir(path, schema.clone()))?;
        Self::finish_open(index, fields, cjk_bigrams, 50_000_000)
    }

    /// Create an in-memory full-text index (for testing).
    pub fn create_in_ram(cjk_bigrams: bool) -> Result<Self, StorageError> {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);
        Self::finish_open(index, fields, cjk_bigrams, 15_000_000)
    }

    fn finish_open(
        index: Index,
        fields: Fields,
        cjk_bigrams: bool,
        writer_heap: usize,
    ) -> Result<Self, StorageError> {
        register_tokenizer(&index, cjk_bigrams);
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let writer = index.writer(writer_heap)?;
        Ok(Self {
            index,
            reader,
            writer,
            fields,
            cjk_bigrams,
            pending_count: 0,
            last_commit: Instant::now(),
        })
    }

    /// Add a chunk document.
    pub fn add_document(&mut self, chunk: &ChunkDoc) -> Result<(), StorageError> {
        let content = lode_core::truncate_utf8_bytes(&chunk.content, CONTENT_MAX_BYTES);
        self.writer.add_document(doc!(
            self.fields.id => chunk.doc_id(),
            self.fields.chunk_id => chunk.chunk_id.0,
            self.fields.file_id => chunk.file_id.0,
            self.fields.file_name => chunk.file_name.as_str(),
            self.fields.file_path => chunk.file_path.as_str(),
            self.fields.file_type => chunk.file_kind.as_str(),
            self.fields.title => chunk.title.as_deref().unwrap_or(""),
            self.fields.content => content,
            self.fields.chunk_index => chunk.chunk_index as i64,
            self.fields.start_position => chunk.start_position as i64,
            self.fields.end_position => chunk.end_position as i64,
            self.fields.content_length => chunk.content_length as i64,
            self.fields.modified_time => chunk.modified_time,
            self.fields.created_at => chunk.created_at,
        ))?;
        self.pending_count += 1;
        self.maybe_commit()?;
        Ok(())
    }

    /// Replace the document with the same id.
    pub fn update_document(&mut self, chunk: &ChunkDoc) -> Result<(), StorageError> {
        self.delete_by_id(&chunk.doc_id())?;
        self.add_document(chunk)
    }

    /// Delete one document by its `"{file_id}_chunk_{index}"` id.
    pub fn delete_by_id(&mut self, doc_id: &str) -> Result<(), StorageError> {
        self.writer
            .delete_term(Term::from_field_text(self.fields.id, doc_id));
        self.pending_count += 1;
        self.maybe_commit()?;
        Ok(())
    }

    /// Delete every document belonging to a file.
    pub fn delete_by_file(&mut self, file_id: FileId) -> Result<(), StorageError> {
        self.writer
            .delete_term(Term::from_field_i64(self.fields.file_id, file_id.0));
        self.pending_count += 1;
        self.maybe_commit()?;
        Ok(())
    }

    /// Drop every document. Commits immediately.
    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.writer.delete_all_documents()?;
        self.writer.commit()?;
        self.reader.reload()?;
        self.pending_count = 0;
        self.last_commit = Instant::now();
        Ok(())
    }

    /// Replace the entire index contents in one commit: readers see the
    /// old state until the swap completes.
    pub fn rebuild(&mut self, docs: &[ChunkDoc]) -> Result<(), StorageError> {
        self.writer.delete_all_documents()?;
        for d in docs {
            let content = lode_core::truncate_utf8_bytes(&d.content, CONTENT_MAX_BYTES);
            self.writer.add_document(doc!(
                self.fields.id => d.doc_id(),
                self.fields.chunk_id => d.chunk_id.0,
                self.fields.file_id => d.file_id.0,
                self.fields.file_name => d.file_name.as_str(),
                self.fields.file_path => d.file_path.as_str(),
                self.fields.file_type => d.file_kind.as_str(),
                self.fields.title => d.title.as_deref().unwrap_or(""),
                self.fields.content => content,
                self.fields.chunk_index => d.chunk_index as i64,
                self.fields.start_position => d.start_position as i64,
                self.fields.end_position => d.end_position as i64,
                self.fields.content_length => d.content_length as i64,
                self.fields.modified_time => d.modified_time,
                self.fields.created_at => d.created_at,
            ))?;
        }
        self.writer.commit()?;
        self.reader.reload()?;
        self.pending_count = 0;
        self.last_commit = Instant::now();
        Ok(())
    }

    /// Merge segments down to one. Best-effort maintenance.
    pub fn optimize(&mut self) -> Result<(), StorageError> {
        self.commit()?;
        let segment_ids = self.index.searchable_segment_ids()?;
        if segment_ids.len() > 1 {
            self.writer
                .merge(&segment_ids)
                .wait()
                .map_err(|e| StorageError::FullTextIndexUnavailable {
                    reason: format!("merge failed: {e}"),
                })?;
            self.reader.reload()?;
        }
        Ok(())
    }

    /// BM25 search over the boosted multi-field query.
    ///
    /// The query is rewritten as an OR of: exact phrase on content (when
    /// multi-token), per-field terms with boosts (title 1.5, file name
    /// 1.3, content 1.0), and wildcard contains-forms; a single-character
    /// query falls back to a bare `*q*` wildcard on content.
    #[tracing::instrument(skip(self), fields(result_count))]
    pub fn search(
        &self,
        query_str: &str,
        limit: usize,
        offset: usize,
        file_kinds: &[FileKind],
    ) -> Result<Vec<FulltextHit>, StorageError> {
        let query = match self.build_query(query_str, file_kinds) {
            Some(q) => q,
            None => return Ok(Vec::new()),
        };

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(
            &*query,
            &TopDocs::with_limit(limit.max(1)).and_offset(offset),
        )?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (i, (score, doc_address)) in top_docs.into_iter().enumerate() {
            let retrieved: TantivyDocument = searcher.doc(doc_address)?;
            if let Some(hit) = self.hit_from_doc(score, offset + i + 1, &retrieved) {
                hits.push(hit);
            }
        }
        tracing::Span::current().record("result_count", hits.len());
        Ok(hits)
    }

    /// Distinct indexed terms starting with `prefix`, lexicographic order.
    pub fn suggest(&self, prefix: &str, limit: usize) -> Result<Vec<String>, StorageError> {
        let prefix = prefix.to_lowercase();
        if prefix.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let searcher = self.reader.searcher();
        let mut terms: BTreeSet<String> = BTreeSet::new();
        for segment_reader in searcher.segment_readers() {
            let inverted = segment_reader.inverted_index(self.fields.content)?;
            let term_dict = inverted.terms();
            let mut stream = term_dict
                .range()
                .ge(prefix.as_bytes())
                .into_stream()?;
            while stream.advance() {
                let term = match std::str::from_utf8(stream.key()) {
                    Ok(t) => t,
                    Err(_) => continue,
                };
                if !term.starts_with(&prefix) {
                    break;
                }
                terms.insert(term.to_string());
                if terms.len() >= limit * 4 {
                    break;
                }
            }
        }
        Ok(terms.into_iter().take(limit).collect())
    }

    /// Force a commit of all pending operations and refresh the reader.
    pub fn commit(&mut self) -> Result<(), StorageError> {
        if self.pending_count > 0 {
            self.writer.commit()?;
            self.reader.reload()?;
            self.pending_count = 0;
            self.last_commit = Instant::now();
        }
        Ok(())
    }

    /// Number of operations pending commit.
    pub fn pending_count(&self) -> usize {
        self.pending_count
    }

    /// Number of live documents.
    pub fn doc_count(&self) -> usize {
        self.reader.searcher().num_docs() as usize
    }

    fn maybe_commit(&mut self) -> Result<(), StorageError> {
        if self.pending_count >= BATCH_COUNT_THRESHOLD
            || self.last_commit.elapsed() >= BATCH_TIME_THRESHOLD
        {
            self.commit()?;
        }
        Ok(())
    }

    fn build_query(&self, query_str: &str, file_kinds: &[FileKind]) -> Option<Box<dyn Query>> {
        let tokens: Vec<String> = tokenize_mixed(query_str, self.cjk_bigrams)
            .into_iter()
            .map(|t| t.text.to_lowercase())
            .take(MAX_QUERY_TOKENS)
            .collect();

        let text_query: Box<dyn Query> = if tokens.is_empty() {
            // No tokenizable content: single-character fallback.
            let trimmed = query_str.trim();
            if trimmed.chars().count() == 1 {
                let ch = trimmed.chars().next()?;
                if !ch.is_alphanumeric() {
                    return None;
                }
                let pattern = format!(".*{}.*", ch.to_lowercase());
                Box::new(RegexQuery::from_pattern(&pattern, self.fields.content).ok()?)
            } else {
                return None;
            }
        } else if tokens.len() == 1 && tokens[0].chars().count() == 1 {
            let pattern = format!(".*{}.*", tokens[0]);
            Box::new(RegexQuery::from_pattern(&pattern, self.fields.content).ok()?)
        } else {
            let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();

            if tokens.len() >= 2 {
                let phrase_terms: Vec<Term> = tokens
                    .iter()
                    .map(|t| Term::from_field_text(self.fields.content, t))
                    .collect();
                clauses.push((Occur::Should, Box::new(PhraseQuery::new(phrase_terms))));
            }

            for token in &tokens {
                let boosted = [
                    (self.fields.title, BOOST_TITLE),
                    (self.fields.file_name, BOOST_FILENAME),
                    (self.fields.content, BOOST_CONTENT),
                ];
                for (field, boost) in boosted {
                    let term = TermQuery::new(
                        Term::from_field_text(field, token),
                        IndexRecordOption::WithFreqs,
                    );
                    clauses.push((
                        Occur::Should,
                        Box::new(BoostQuery::new(Box::new(term), boost)),
                    ));
                }
                // Contains-form, only for plain ASCII tokens where the
                // pattern needs no escaping.
                if token.len() >= 2 && token.chars().all(|c| c.is_ascii_alphanumeric()) {
                    if let Ok(re) =
                        RegexQuery::from_pattern(&format!(".*{token}.*"), self.fields.content)
                    {
                        clauses.push((
                            Occur::Should,
                            Box::new(BoostQuery::new(Box::new(re), BOOST_WILDCARD)),
                        ));
                    }
                }
            }
            Box::new(BooleanQuery::new(clauses))
        };

        if file_kinds.is_empty() {
            return Some(text_query);
        }

        let kind_clauses: Vec<(Occur, Box<dyn Query>)> = file_kinds
            .iter()
            .map(|k| {
                (
                    Occur::Should,
                    Box::new(TermQuery::new(
                        Term::from_field_text(self.fields.file_type, k.as_str()),
                        IndexRecordOption::Basic,
                    )) as Box<dyn Query>,
                )
            })
            .collect();

        Some(Box::new(BooleanQuery::new(vec![
            (Occur::Must, text_query),
            (Occur::Must, Box::new(BooleanQuery::new(kind_clauses))),
        ])))
    }

    fn hit_from_doc(
        &self,
        score: f32,
        rank: usize,
        retrieved: &TantivyDocument,
    ) -> Option<FulltextHit> {
        let get_i64 = |field: Field| match retrieved.get_first(field) {
            Some(OwnedValue::I64(v)) => Some(*v),
            _ => None,
        };
        let get_str = |field: Field| match retrieved.get_first(field) {
            Some(OwnedValue::Str(s)) => Some(s.clone()),
            _ => None,
        };
        Some(FulltextHit {
            score,
            rank,
            chunk_id: ChunkId(get_i64(self.fields.chunk_id)?),
            file_id: FileId(get_i64(self.fields.file_id)?),
            file_name: get_str(self.fields.file_name).unwrap_or_default(),
            file_path: get_str(self.fields.file_path).unwrap_or_default(),
            file_kind: get_str(self.fields.file_type)
                .map(|s| FileKind::from_filter_value(&s))
                .unwrap_or(FileKind::Other),
            chunk_index: get_i64(self.fields.chunk_index).unwrap_or(0) as u32,
        })
    }
}

impl Drop for FullTextStore {
    fn drop(&mut self) {
        let _ = self.commit();
    }
}
