use std::collections::HashSet;

use image::DynamicImage;
use tracing::instrument;

use crate::enhance::enhance;
use crate::rotate::best_rotation;
use crate::util::{clean, round2};
use crate::{ExtractError, Extraction, TextRecognizer};

/// Acceptance threshold for the two axis-aligned passes. Deliberately lower
/// than the rotation sweep's text floor; the dedup stage absorbs the extra
/// recall.
const PASS_CONFIDENCE_FLOOR: f32 = 0.25;

/// Runs the recognition capability against the enhanced image, the untouched
/// original, and the best rotation of the enhanced image, then merges the
/// three passes into one deduplicated text.
///
/// Enhancement helps low-contrast packaging but can destroy thin strokes;
/// the original sometimes reads better; the sweep recovers sideways print.
/// All three always run, no short-circuit. Any engine error aborts the whole
/// operation with no partial result.
#[instrument(level = "debug", skip(reader, original))]
pub(crate) fn fuse(
    reader: &dyn TextRecognizer,
    original: &DynamicImage,
) -> Result<Extraction, ExtractError> {
    let enhanced = enhance(original);

    let processed_pass = reader
        .recognize(&enhanced)
        .map_err(ExtractError::Recognition)?;
    let original_pass = reader
        .recognize(original)
        .map_err(ExtractError::Recognition)?;
    let swept = best_rotation(reader, &enhanced).map_err(ExtractError::Recognition)?;

    // First stage: fixed pass priority, exact-match dedup on the cleaned text.
    let mut texts: Vec<String> = Vec::new();
    let mut confidences: Vec<f32> = Vec::new();

    for (label, pass) in [("processed", &processed_pass), ("original", &original_pass)] {
        for fragment in pass.iter().filter(|f| f.confidence > PASS_CONFIDENCE_FLOOR) {
            let cleaned = clean(&fragment.text);
            if cleaned.is_empty() || texts.contains(&cleaned) {
                continue;
            }
            log::debug!("[{label}] '{cleaned}' (conf: {:.2})", fragment.confidence);
            texts.push(cleaned);
            confidences.push(fragment.confidence);
        }
    }

    if !swept.text.is_empty() {
        for token in swept.text.split_whitespace() {
            let cleaned = clean(token);
            if cleaned.is_empty() || texts.contains(&cleaned) {
                continue;
            }
            log::debug!("[angle {}] '{cleaned}' (conf: {:.2})", swept.angle, swept.confidence);
            texts.push(cleaned);
            confidences.push(swept.confidence);
        }
    }

    // Second stage: case-insensitive dedup retaining the first-seen casing
    // and acceptance order. The confidence mean stays over the first-stage
    // list, so a case-variant duplicate still weighs in.
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for text in &texts {
        if seen.insert(text.to_lowercase()) {
            merged.push(text.as_str());
        }
    }

    let confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f32>() / confidences.len() as f32
    };
    let extraction = Extraction {
        text: merged.join(" "),
        confidence: round2(confidence),
        word_count: merged.len(),
    };
    log::info!(
        "Extracted '{}' (confidence {:.2}, {} fragments).",
        extraction.text,
        extraction.confidence,
        extraction.word_count
    );
    Ok(extraction)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{Fragment, RecognizeError, Region};

    struct Scripted {
        batches: Mutex<Vec<Result<Vec<Fragment>, RecognizeError>>>,
    }

    impl Scripted {
        fn new(batches: Vec<Result<Vec<Fragment>, RecognizeError>>) -> Self {
            Self {
                batches: Mutex::new(batches),
            }
        }
    }

    impl TextRecognizer for Scripted {
        fn recognize(&self, _image: &DynamicImage) -> Result<Vec<Fragment>, RecognizeError> {
            let mut batches = self.batches.lock().unwrap();
            if batches.is_empty() {
                Ok(vec![])
            } else {
                batches.remove(0)
            }
        }
    }

    fn fragment(text: &str, confidence: f32) -> Fragment {
        Fragment {
            region: Region::axis_aligned(0.0, 0.0, 10.0, 10.0),
            text: text.to_string(),
            confidence,
        }
    }

    fn blank() -> DynamicImage {
        DynamicImage::ImageLuma8(image::GrayImage::new(0, 0))
    }

    #[test]
    fn merges_three_passes_in_priority_order() {
        let reader = Scripted::new(vec![
            Ok(vec![fragment("Para", 0.9), fragment("ol 500mg", 0.4)]),
            Ok(vec![fragment("Paracetamol", 0.6)]),
        ]);
        let extraction = fuse(&reader, &blank()).unwrap();
        assert_eq!(extraction.text, "Para ol 500mg Paracetamol");
        assert_eq!(extraction.word_count, 3);
        assert_eq!(extraction.confidence, 0.63);
    }

    #[test]
    fn case_insensitive_dedup_keeps_processed_casing() {
        let reader = Scripted::new(vec![
            Ok(vec![fragment("PARACETAMOL", 0.8)]),
            Ok(vec![fragment("Paracetamol", 0.6)]),
        ]);
        let extraction = fuse(&reader, &blank()).unwrap();
        assert_eq!(extraction.text, "PARACETAMOL");
        assert_eq!(extraction.word_count, 1);
        // The duplicate's confidence still contributes to the mean.
        assert_eq!(extraction.confidence, 0.7);
    }

    #[test]
    fn angle_tokens_fill_in_missed_text() {
        let reader = Scripted::new(vec![
            Ok(vec![]),
            Ok(vec![]),
            // Sweep: only 90° finds anything.
            Ok(vec![]),
            Ok(vec![fragment("Sideways", 0.5), fragment("label", 0.6)]),
        ]);
        let extraction = fuse(&reader, &blank()).unwrap();
        assert_eq!(extraction.text, "Sideways label");
        assert_eq!(extraction.word_count, 2);
        // Both tokens carry the sweep's mean confidence.
        assert_eq!(extraction.confidence, 0.55);
    }

    #[test]
    fn noise_fragments_are_dropped() {
        let reader = Scripted::new(vec![
            Ok(vec![
                fragment("!!!@@@###", 0.9),
                fragment("x", 0.8),
                fragment("legit", 0.7),
                fragment("ignored", 0.1),
            ]),
            Ok(vec![]),
        ]);
        let extraction = fuse(&reader, &blank()).unwrap();
        assert_eq!(extraction.text, "legit");
        assert_eq!(extraction.word_count, 1);
        assert_eq!(extraction.confidence, 0.7);
    }

    #[test]
    fn nothing_accepted_yields_empty_zero_confidence() {
        let reader = Scripted::new(vec![]);
        let extraction = fuse(&reader, &blank()).unwrap();
        assert_eq!(extraction.text, "");
        assert_eq!(extraction.word_count, 0);
        assert_eq!(extraction.confidence, 0.0);
    }

    #[test]
    fn engine_error_aborts_with_no_partial_result() {
        let reader = Scripted::new(vec![
            Ok(vec![fragment("partial", 0.9)]),
            Err(RecognizeError::msg("engine exploded")),
        ]);
        match fuse(&reader, &blank()) {
            Err(ExtractError::Recognition(_)) => {}
            other => panic!("expected recognition failure, got {other:?}"),
        }
    }

    #[test]
    fn confidence_stays_within_bounds() {
        let reader = Scripted::new(vec![
            Ok(vec![fragment("alpha", 1.0), fragment("beta", 0.99)]),
            Ok(vec![]),
        ]);
        let extraction = fuse(&reader, &blank()).unwrap();
        assert!(extraction.confidence >= 0.0 && extraction.confidence <= 1.0);
    }
}
