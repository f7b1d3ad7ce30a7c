use std::path::PathBuf;

use imageproc::point::Point;
use thiserror::Error;

use crate::rotate::Rotation;
use crate::RecognizeError;

/// Quadrilateral bounding region of a recognized fragment, corners in
/// clockwise order starting top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region(pub [Point<f32>; 4]);

impl Region {
    pub fn axis_aligned(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self([
            Point::new(x, y),
            Point::new(x + width, y),
            Point::new(x + width, y + height),
            Point::new(x, y + height),
        ])
    }

    /// Axis-aligned bounds as `(x, y, width, height)`.
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        let min_x = self.0.iter().map(|p| p.x).fold(f32::INFINITY, f32::min);
        let min_y = self.0.iter().map(|p| p.y).fold(f32::INFINITY, f32::min);
        let max_x = self.0.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max);
        let max_y = self.0.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max);
        (min_x, min_y, max_x - min_x, max_y - min_y)
    }
}

/// One recognized text span, as returned by the recognition capability.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub region: Region,
    pub text: String,
    pub confidence: f32,
}

/// Best orientation found by the rotation sweep. The zero value (`Deg0`,
/// empty text, zero confidence) means no angle produced any fragment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RotationCandidate {
    pub angle: Rotation,
    pub text: String,
    pub confidence: f32,
}

/// Merged output of a full extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// Deduplicated fragments joined by single spaces, in acceptance order.
    pub text: String,
    /// Mean confidence over accepted fragments, rounded to two decimals.
    pub confidence: f32,
    /// Number of deduplicated fragments contributing to `text`.
    pub word_count: usize,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("OCR reader not initialized")]
    ReaderNotInitialized,
    #[error("cannot read image: {path}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("recognition failed")]
    Recognition(#[source] RecognizeError),
}
