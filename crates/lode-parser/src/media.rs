use std::path::Path;
use std::sync::Arc;

use lode_core::ParsedContent;
use lode_predict::{SpeechPredictor, VisionPredictor};

use crate::error::ParserError;

/// Seam for the external audio/video decoder.
///
/// Video files (and non-WAV audio) must be rendered to mono 16 kHz WAV
/// before transcription; the decoder binary doing that lives outside this
/// crate.
pub trait MediaDecoder: Send + Sync {
    /// Decode up to `max_duration_secs` of audio into mono 16 kHz WAV.
    fn decode_wav(&self, path: &Path, max_duration_secs: u64) -> Result<Vec<u8>, ParserError>;
}

/// Transcribe an audio/video file: decode a capped WAV, hand it to the
/// speech capability, report the model's confidence.
pub fn parse_av(
    path: &Path,
    decoder: &dyn MediaDecoder,
    speech: &Arc<dyn SpeechPredictor>,
    max_duration_secs: u64,
) -> ParsedContent {
    let wav = match decoder.decode_wav(path, max_duration_secs) {
        Ok(w) => w,
        Err(e) => return ParsedContent::failed(format!("decode failed: {e}")),
    };
    match speech.transcribe(&wav) {
        Ok(t) => ParsedContent {
            text: t.text,
            confidence: t.confidence.clamp(0.0, 1.0),
            ..Default::default()
        },
        Err(e) => ParsedContent::failed(format!("speech predictor: {e}")),
    }
}

/// Read text out of an image via OCR, keeping lines at or above the
/// confidence floor. The content confidence is the mean of kept lines.
pub fn parse_image(
    path: &Path,
    vision: &Arc<dyn VisionPredictor>,
    min_confidence: f32,
) -> ParsedContent {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => return ParsedContent::failed(format!("read failed: {e}")),
    };
    match vision.read_text(&bytes) {
        Ok(lines) => {
            let kept: Vec<_> = lines
                .into_iter()
                .filter(|l| l.confidence >= min_confidence && !l.text.trim().is_empty())
                .collect();
            if kept.is_empty() {
                return ParsedContent {
                    confidence: 0.0,
                    ..Default::default()
                };
            }
            let mean_conf =
                kept.iter().map(|l| l.confidence).sum::<f32>() / kept.len() as f32;
            let text = kept
                .iter()
                .map(|l| l.text.trim())
                .collect::<Vec<_>>()
                .join("\n");
            ParsedContent {
                text,
                confidence: mean_conf.clamp(0.0, 1.0),
                ..Default::default()
            }
        }
        Err(e) => ParsedContent::failed(format!("vision predictor: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lode_predict::{OcrLine, PredictError, Transcript};

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

    struct NoopDecoder;

    impl MediaDecoder for NoopDecoder {
        fn decode_wav(&self, _path: &Path, _max: u64) -> Result<Vec<u8>, ParserError> {
            Ok(vec![0u8; 16])
        }
    }

    #[test]
    fn av_transcription_carries_confidence() {
        let speech: Arc<dyn SpeechPredictor> = Arc::new(CannedSpeech(Some(Transcript {
            text: "machine learning".to_string(),
            confidence: 0.85,
        })));
        let out = parse_av(Path::new("a.wav"), &NoopDecoder, &speech, 900);
        assert_eq!(out.text, "machine learning");
        assert!((out.confidence - 0.85).abs() < 1e-6);
        assert!(out.error.is_none());
    }

    #[test]
    fn av_predictor_failure_is_soft() {
        let speech: Arc<dyn SpeechPredictor> = Arc::new(CannedSpeech(None));
        let out = parse_av(Path::new("a.wav"), &NoopDecoder, &speech, 900);
        assert!(out.is_failure());
        assert_eq!(out.confidence, 0.0);
    }

    #[test]
    fn ocr_filters_below_confidence_floor() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("x.png");
        std::fs::write(&img, b"fake-image").unwrap();

        let vision: Arc<dyn VisionPredictor> = Arc::new(CannedVision(vec![
            OcrLine {
                text: "clear heading".to_string(),
                confidence: 0.9,
            },
            OcrLine {
                text: "smudge".to_string(),
                confidence: 0.1,
            },
        ]));
        let out = parse_image(&img, &vision, 0.3);
        assert!(out.text.contains("clear heading"));
        assert!(!out.text.contains("smudge"));
        assert!((out.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn ocr_with_nothing_kept_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("x.png");
        std::fs::write(&img, b"fake-image").unwrap();

        let vision: Arc<dyn VisionPredictor> = Arc::new(CannedVision(vec![OcrLine {
            text: "???".to_string(),
            confidence: 0.05,
        }]));
        let out = parse_image(&img, &vision, 0.3);
        assert_eq!(out.text, "");
        assert_eq!(out.confidence, 0.0);
        assert!(out.error.is_none());
    }
}
