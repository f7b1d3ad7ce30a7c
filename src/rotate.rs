use std::fmt;

use float_ord::FloatOrd;
use image::DynamicImage;
use tracing::instrument;

use crate::{RecognizeError, RotationCandidate, TextRecognizer};

/// Fragments below this confidence are left out of a candidate's joined text
/// (they still count towards the angle's mean).
const TEXT_CONFIDENCE_FLOOR: f32 = 0.3;

/// The four orientations attempted by the sweep, in scan order.
pub(crate) const SWEEP_ANGLES: [Rotation; 4] = [
    Rotation::Deg0,
    Rotation::Deg90,
    Rotation::Deg180,
    Rotation::Deg270,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    fn apply(self, image: &DynamicImage) -> DynamicImage {
        match self {
            Rotation::Deg0 => image.clone(),
            Rotation::Deg90 => image.rotate90(),
            Rotation::Deg180 => image.rotate180(),
            Rotation::Deg270 => image.rotate270(),
        }
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Recognizes at all four right-angle orientations and keeps the one with the
/// strictly highest mean confidence (ties keep the earlier angle). Always a
/// full scan; recovers text printed sideways or upside down on folded or
/// cylindrical packaging. Returns the zero-value candidate if no orientation
/// produced a single fragment.
#[instrument(level = "debug", skip(reader, image))]
pub(crate) fn best_rotation(
    reader: &dyn TextRecognizer,
    image: &DynamicImage,
) -> Result<RotationCandidate, RecognizeError> {
    let mut best = RotationCandidate::default();
    for angle in SWEEP_ANGLES {
        let rotated = angle.apply(image);
        let fragments = reader.recognize(&rotated)?;
        if fragments.is_empty() {
            continue;
        }
        let mean = fragments.iter().map(|f| f.confidence).sum::<f32>() / fragments.len() as f32;
        let text = fragments
            .iter()
            .filter(|f| f.confidence > TEXT_CONFIDENCE_FLOOR)
            .map(|f| f.text.trim())
            .collect::<Vec<_>>()
            .join(" ");
        log::debug!("Angle {angle}: {} fragments, mean confidence {mean:.2}.", fragments.len());
        if FloatOrd(mean) > FloatOrd(best.confidence) {
            best = RotationCandidate {
                angle,
                text,
                confidence: mean,
            };
        }
    }
    log::debug!("Best angle: {} with confidence {:.2}.", best.angle, best.confidence);
    Ok(best)
}
