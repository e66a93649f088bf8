use std::time::Instant;

use lode_core::{InputType, SearchType};

use crate::engine::{SearchEngine, SearchRequest, SearchResponse};
use crate::error::RetrievalError;

/// A search whose query arrives as bytes: a voice clip or an image.
#[derive(Debug, Clone)]
pub struct MultimodalRequest {
    /// `Voice` or `Image`; `Text` payloads belong on [`SearchEngine::search`].
    pub input_type: InputType,
    pub payload: Vec<u8>,
    pub search_type: SearchType,
    pub limit: usize,
    pub threshold: f32,
}

impl SearchEngine {
    /// Convert the payload to text via the matching capability, then run
    /// the text search. A missing or failing capability surfaces as
    /// `Unavailable` — never a silent empty result.
    #[tracing::instrument(skip(self, request), fields(input = request.input_type.as_str()))]
    pub fn multimodal_search(
        &self,
        request: &MultimodalRequest,
    ) -> Result<SearchResponse, RetrievalError> {
        let started = Instant::now();
        let (converted_text, confidence) = match request.input_type {
            InputType::Voice => {
                let speech = self
                    .speech
                    .as_ref()
                    .ok_or(RetrievalError::Unavailable {
                        capability: "speech",
                    })?;
                let transcript =
                    speech
                        .transcribe(&request.payload)
                        .map_err(|e| {
                            tracing::warn!(error = %e, "speech predictor failed");
                            RetrievalError::Unavailable {
                                capability: "speech",
                            }
                        })?;
                (transcript.text, transcript.confidence)
            }
            InputType::Image => {
                let vision = self
                    .vision
                    .as_ref()
                    .ok_or(RetrievalError::Unavailable {
                        capability: "vision",
                    })?;
                let lines = vision.read_text(&request.payload).map_err(|e| {
                    tracing::warn!(error = %e, "vision predictor failed");
                    RetrievalError::Unavailable {
                        capability: "vision",
                    }
                })?;
                let kept: Vec<_> = lines
                    .into_iter()
                    .filter(|l| {
                        l.confidence >= self.ocr_min_confidence && !l.text.trim().is_empty()
                    })
                    .collect();
                let confidence = if kept.is_empty() {
                    0.0
                } else {
                    kept.iter().map(|l| l.confidence).sum::<f32>() / kept.len() as f32
                };
                let text = kept
                    .iter()
                    .map(|l| l.text.trim())
                    .collect::<Vec<_>>()
                    .join(" ");
                (text, confidence)
            }
            InputType::Text => {
                return Err(RetrievalError::InvalidQuery {
                    reason: "text payloads use the text search entry".to_string(),
                })
            }
        };

        if converted_text.trim().is_empty() {
            // Nothing recognizable in the payload: an empty result with
            // the conversion attached, so the caller can tell why.
            self.record_history(
                "",
                request.input_type,
                request.search_type,
                0,
                started.elapsed().as_millis() as u64,
            );
            return Ok(SearchResponse {
                converted_text: Some(converted_text),
                confidence: Some(confidence),
                ..Default::default()
            });
        }

        let mut search_request = SearchRequest::new(converted_text.clone(), request.search_type);
        search_request.limit = request.limit;
        search_request.threshold = request.threshold;

        let mut response = self.search_as(&search_request, request.input_type)?;
        response.converted_text = Some(converted_text);
        response.confidence = Some(confidence);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lode_core::AppConfig;
    use lode_predict::{
        Embedder, HashEmbedding, OcrLine, PredictError, SpeechPredictor, Transcript,
        VisionPredictor,
    };
    use lode_storage::StorageManager;
    use std::sync::{Arc, RwLock};
    use tempfile::TempDir;

    struct CannedSpeech(Option<Transcript>);

    impl SpeechPredictor for CannedSpeech {
        fn transcribe(&self, _audio: &[u8]) -> Result<Transcript, PredictError> {
            self.0.clone().ok_or(PredictError::Unavailable {
                reason: "offline".to_string(),
            })
        }
    }

    struct CannedVision(Vec<OcrLine>);

    impl VisionPredictor for CannedVision {
        fn read_text(&self, _image: &[u8]) -> Result<Vec<OcrLine>, PredictError> {
            Ok(self.0.clone())
        }
    }

    fn engine_with(
        speech: Option<Arc<dyn SpeechPredictor>>,
        vision: Option<Arc<dyn VisionPredictor>>,
    ) -> (SearchEngine, TempDir) {
        let tmp = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.data_root = tmp.path().join("data");
        config.embedding.dim = 64;
        let storage = Arc::new(RwLock::new(StorageManager::open(&config).unwrap()));
        let embedder = Arc::new(Embedder::new(Arc::new(HashEmbedding::new(64)), 32));
        (
            SearchEngine::new(storage, embedder, speech, vision, 0.3),
            tmp,
        )
    }

    fn voice_request() -> MultimodalRequest {
        MultimodalRequest {
            input_type: InputType::Voice,
            payload: vec![0u8; 32],
            search_type: SearchType::Hybrid,
            limit: 5,
            threshold: 0.0,
        }
    }

    #[test]
    fn voice_without_capability_is_unavailable() {
        let (engine, _tmp) = engine_with(None, None);
        let err = engine.multimodal_search(&voice_request()).unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::Unavailable {
                capability: "speech"
            }
        ));
    }

    #[test]
    fn voice_predictor_failure_is_unavailable_not_empty() {
        let (engine, _tmp) = engine_with(Some(Arc::new(CannedSpeech(None))), None);
        let err = engine.multimodal_search(&voice_request()).unwrap_err();
        assert!(matches!(err, RetrievalError::Unavailable { .. }));
    }

    #[test]
    fn voice_transcript_drives_search() {
        let (engine, _tmp) = engine_with(
            Some(Arc::new(CannedSpeech(Some(Transcript {
                text: "machine learning".to_string(),
                confidence: 0.92,
            })))),
            None,
        );
        let resp = engine.multimodal_search(&voice_request()).unwrap();
        assert_eq!(resp.converted_text.as_deref(), Some("machine learning"));
        assert!((resp.confidence.unwrap() - 0.92).abs() < 1e-6);
        // empty corpus: no results, but the conversion is reported
        assert!(resp.results.is_empty());
    }

    #[test]
    fn image_lines_filtered_and_joined() {
        let vision: Arc<dyn VisionPredictor> = Arc::new(CannedVision(vec![
            OcrLine {
                text: "grocery list".to_string(),
                confidence: 0.9,
            },
            OcrLine {
                text: "noise".to_string(),
                confidence: 0.1,
            },
        ]));
        let (engine, _tmp) = engine_with(None, Some(vision));
        let req = MultimodalRequest {
            input_type: InputType::Image,
            payload: vec![1, 2, 3],
            search_type: SearchType::Fulltext,
            limit: 5,
            threshold: 0.0,
        };
        let resp = engine.multimodal_search(&req).unwrap();
        assert_eq!(resp.converted_text.as_deref(), Some("grocery list"));
        assert!((resp.confidence.unwrap() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn unrecognizable_image_returns_empty_with_conversion() {
        let vision: Arc<dyn VisionPredictor> = Arc::new(CannedVision(vec![OcrLine {
            text: "???".to_string(),
            confidence: 0.05,
        }]));
        let (engine, _tmp) = engine_with(None, Some(vision));
        let req = MultimodalRequest {
            input_type: InputType::Image,
            payload: vec![1],
            search_type: SearchType::Hybrid,
            limit: 5,
            threshold: 0.0,
        };
        let resp = engine.multimodal_search(&req).unwrap();
        assert_eq!(resp.converted_text.as_deref(), Some(""));
        assert_eq!(resp.confidence, Some(0.0));
        assert!(resp.results.is_empty());
    }

    #[test]
    fn text_input_type_rejected() {
        let (engine, _tmp) = engine_with(None, None);
        let req = MultimodalRequest {
            input_type: InputType::Text,
            payload: vec![],
            search_type: SearchType::Hybrid,
            limit: 5,
            threshold: 0.0,
        };
        assert!(matches!(
            engine.multimodal_search(&req),
            Err(RetrievalError::InvalidQuery { .. })
        ));
    }
}
