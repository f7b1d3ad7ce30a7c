use image::DynamicImage;
use thiserror::Error;

use crate::Fragment;

/// Configuration handed to the recognizer initializer. Mirrors the knobs the
/// extraction layer cares about; everything else (models, caches) belongs to
/// the engine.
#[derive(Debug, Clone)]
pub struct RecognizerConfig {
    /// Language codes the engine should load, in priority order.
    pub languages: Vec<String>,
    /// Extraction runs CPU-only by default.
    pub use_gpu: bool,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            languages: vec!["vi".to_string(), "en".to_string()],
            use_gpu: false,
        }
    }
}

/// Opaque engine-side failure. The extraction pipeline never inspects it
/// beyond reporting.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct RecognizeError(#[from] Box<dyn std::error::Error + Send + Sync>);

impl RecognizeError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self(message.into().into())
    }
}

/// The external recognition capability. Implementations wrap an actual OCR
/// engine; the pipeline treats them as a black box returning text fragments
/// with bounding regions and confidences in `[0, 1]`.
///
/// The handle is shared read-only after initialization. `Send + Sync` lets
/// the facade be shared across threads, but reentrancy of concurrent
/// `recognize` calls is the engine's contract, not this crate's.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &DynamicImage) -> Result<Vec<Fragment>, RecognizeError>;
}
