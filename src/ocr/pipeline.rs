//! Per-region OCR pipeline: pre-process → recognize.

use image::{GrayImage, RgbImage};
use std::sync::Arc;

use super::engine::{Recognizer, DIGIT_WHITELIST};
use super::preprocess::{preprocess, PreProcessConfig};

/// A pre-processing configuration bound to a recognizer.
///
/// Cloning is cheap (the recognizer is shared), which is how dispatch takes a
/// consistent snapshot of a region before running it on a worker thread.
#[derive(Clone)]
pub struct OcrPipeline {
    config: PreProcessConfig,
    recognizer: Arc<dyn Recognizer>,
}

impl OcrPipeline {
    pub fn new(recognizer: Arc<dyn Recognizer>) -> Self {
        Self {
            config: PreProcessConfig::default(),
            recognizer,
        }
    }

    /// Stores `config` after normalization (see `PreProcessConfig::normalized`).
    pub fn set_config(&mut self, config: &PreProcessConfig) {
        self.config = config.normalized(&self.config);
    }

    pub fn config(&self) -> &PreProcessConfig {
        &self.config
    }

    /// Swaps the backend, keeping the pre-processing configuration.
    pub fn set_recognizer(&mut self, recognizer: Arc<dyn Recognizer>) {
        self.recognizer = recognizer;
    }

    /// Pre-processes `img` and runs OCR on it.
    ///
    /// Returns the trimmed text and the binary image that was recognized.
    /// A failing backend yields an empty string.
    pub fn process(&self, img: &RgbImage) -> (String, GrayImage) {
        let processed = preprocess(img, &self.config);

        let text = match self.recognizer.recognize(&processed, DIGIT_WHITELIST) {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                log::debug!("OCR backend error: {:#}", e);
                String::new()
            }
        };

        (text, processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::engine::tests::{FailingRecognizer, StaticRecognizer};

    #[test]
    fn test_process_trims_output() {
        let pipeline = OcrPipeline::new(Arc::new(StaticRecognizer(" 42.5\n".to_string())));
        let img = RgbImage::new(5, 5);

        let (text, processed) = pipeline.process(&img);
        assert_eq!(text, "42.5");
        assert_eq!(processed.dimensions(), (5, 5));
    }

    #[test]
    fn test_backend_error_becomes_empty_text() {
        let pipeline = OcrPipeline::new(Arc::new(FailingRecognizer));
        let (text, _) = pipeline.process(&RgbImage::new(3, 3));

        assert_eq!(text, "");
    }

    #[test]
    fn test_set_config_keeps_previous_ratio() {
        let mut pipeline = OcrPipeline::new(Arc::new(StaticRecognizer(String::new())));
        pipeline.set_config(&PreProcessConfig { upscale_ratio: 3.0, ..Default::default() });
        pipeline.set_config(&PreProcessConfig { upscale_ratio: 0.0, ..Default::default() });

        assert_eq!(pipeline.config().upscale_ratio, 3.0);
    }

    #[test]
    fn test_set_recognizer_keeps_config() {
        let mut pipeline = OcrPipeline::new(Arc::new(StaticRecognizer("1".to_string())));
        pipeline.set_config(&PreProcessConfig { invert: true, ..Default::default() });
        pipeline.set_recognizer(Arc::new(StaticRecognizer("2".to_string())));

        assert!(pipeline.config().invert);
        assert_eq!(pipeline.process(&RgbImage::new(2, 2)).0, "2");
    }
}
