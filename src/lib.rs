//! Best-effort text extraction from photographs of pharmaceutical packaging.
//!
//! The pipeline compensates for uncontrolled photo conditions (skew, low
//! resolution, reflective foil) with classical image processing only: an
//! enhancement pass normalizes the photo, recognition runs against the
//! enhanced image, the untouched original and a four-angle rotation sweep,
//! and the three passes are fused into one deduplicated transcription with
//! an aggregate confidence. Character recognition itself is an external
//! capability injected through [`TextRecognizer`].

mod enhance;
mod fuse;
mod recognize;
mod result;
pub mod rotate;
pub mod util;

use tracing::instrument;

pub use enhance::ImageSource;
pub use recognize::{RecognizeError, RecognizerConfig, TextRecognizer};
pub use result::*;
pub use rotate::Rotation;

/// Fragments below this confidence are dropped from the detail-level
/// extraction.
const DETAIL_CONFIDENCE_FLOOR: f32 = 0.3;

pub struct TextExtractorBuilder {
    config: RecognizerConfig,
    reader: Option<Box<dyn TextRecognizer>>,
}

impl TextExtractorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Language codes the recognizer should be initialized with.
    pub fn languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.languages = languages.into_iter().map(Into::into).collect();
        self
    }

    pub fn use_gpu(mut self, use_gpu: bool) -> Self {
        self.config.use_gpu = use_gpu;
        self
    }

    /// Injects an already-built recognition capability.
    pub fn recognizer(mut self, reader: impl TextRecognizer + 'static) -> Self {
        self.reader = Some(Box::new(reader));
        self
    }

    /// Runs a fallible recognizer initializer once. On failure the handle is
    /// left unset and every later extraction call deterministically fails
    /// with [`ExtractError::ReaderNotInitialized`]; initialization is never
    /// retried.
    #[instrument(level = "debug", skip(self, init))]
    pub fn init_recognizer<F>(mut self, init: F) -> Self
    where
        F: FnOnce(&RecognizerConfig) -> Result<Box<dyn TextRecognizer>, RecognizeError>,
    {
        match init(&self.config) {
            Ok(reader) => {
                log::info!("OCR reader initialized ({:?}).", self.config.languages);
                self.reader = Some(reader);
            }
            Err(err) => {
                log::error!("Failed to initialize OCR reader: {err}");
            }
        }
        self
    }

    pub fn build(self) -> TextExtractor {
        TextExtractor {
            reader: self.reader,
        }
    }
}

impl Default for TextExtractorBuilder {
    fn default() -> Self {
        Self {
            config: RecognizerConfig::default(),
            reader: None,
        }
    }
}

/// Owns the long-lived recognition handle and exposes the two public
/// operations. The handle is read-only after construction; the extractor
/// itself holds no other state, so it can be shared for the process lifetime.
pub struct TextExtractor {
    reader: Option<Box<dyn TextRecognizer>>,
}

impl TextExtractor {
    pub fn builder() -> TextExtractorBuilder {
        TextExtractorBuilder::new()
    }

    /// Whether the recognition handle was initialized.
    pub fn is_ready(&self) -> bool {
        self.reader.is_some()
    }

    /// Full multi-strategy extraction: enhanced pass, original pass and
    /// rotation sweep, fused into one deduplicated text with an aggregate
    /// confidence. See [`Extraction`] for the invariants of the output.
    #[instrument(level = "debug", skip(self, source))]
    pub fn extract_text(
        &self,
        source: impl Into<ImageSource>,
    ) -> Result<Extraction, ExtractError> {
        let reader = self
            .reader
            .as_deref()
            .ok_or(ExtractError::ReaderNotInitialized)?;
        let original = source.into().load()?;
        fuse::fuse(reader, &original)
    }

    /// Detail-level extraction: a single recognition pass over the enhanced
    /// image, keeping fragments above a 0.3 confidence floor with their
    /// bounding regions. Returns an empty vec on any error, never panics.
    #[instrument(level = "debug", skip(self, source))]
    pub fn extract_text_with_details(&self, source: impl Into<ImageSource>) -> Vec<Fragment> {
        let Some(reader) = self.reader.as_deref() else {
            log::error!("Cannot extract details: OCR reader not initialized.");
            return vec![];
        };
        let original = match source.into().load() {
            Ok(image) => image,
            Err(err) => {
                log::error!("Cannot extract details: {err}");
                return vec![];
            }
        };
        let enhanced = enhance::enhance(&original);
        match reader.recognize(&enhanced) {
            Ok(fragments) => fragments
                .into_iter()
                .filter(|f| f.confidence > DETAIL_CONFIDENCE_FLOOR)
                .map(|f| Fragment {
                    text: f.text.trim().to_string(),
                    ..f
                })
                .collect(),
            Err(err) => {
                log::error!("Cannot extract details: {err}");
                vec![]
            }
        }
    }
}
