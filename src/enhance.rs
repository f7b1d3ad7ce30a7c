use std::path::{Path, PathBuf};

use image::{imageops::FilterType, DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::filter::{box_filter, gaussian_blur_f32, median_filter};
use imageproc::morphology::{close, open};
use thiserror::Error;
use tracing::instrument;

use crate::ExtractError;

/// Minimum side length glyph recognition copes well with; smaller photos are
/// upscaled before any other stage.
const MIN_SIDE: u32 = 800;
/// Local window for the adaptive thresholds is 11x11 (box radius 5).
const ADAPTIVE_RADIUS: u32 = 5;
/// Bias subtracted from the local mean before comparison.
const ADAPTIVE_BIAS: i16 = 2;
const GAUSSIAN_SIGMA: f32 = 2.0;
const CLAHE_CLIP_LIMIT: f32 = 3.0;
const CLAHE_TILES: u32 = 8;

/// Input accepted by the public operations: an already-decoded image or a
/// filesystem path. Decoding paths is this module's concern.
#[derive(Debug)]
pub enum ImageSource {
    Memory(DynamicImage),
    File(PathBuf),
}

impl ImageSource {
    pub(crate) fn load(self) -> Result<DynamicImage, ExtractError> {
        match self {
            ImageSource::Memory(image) => Ok(image),
            ImageSource::File(path) => {
                image::open(&path).map_err(|source| ExtractError::ImageRead { path, source })
            }
        }
    }
}

impl From<DynamicImage> for ImageSource {
    fn from(image: DynamicImage) -> Self {
        Self::Memory(image)
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        Self::File(path.to_path_buf())
    }
}

impl From<&str> for ImageSource {
    fn from(path: &str) -> Self {
        Self::File(PathBuf::from(path))
    }
}

#[derive(Debug, Error)]
enum EnhanceError {
    #[error("image has zero width or height")]
    EmptyImage,
}

/// Normalizes a packaging photo for glyph recognition: upscale, denoise,
/// local contrast, sharpen, binarize, morphological cleanup.
///
/// Never fails observably. If the full pipeline cannot run the image degrades
/// to plain grayscale, and if even that is impossible the input is passed
/// through unchanged; downstream passes always get *some* image.
#[instrument(level = "debug", skip(image))]
pub(crate) fn enhance(image: &DynamicImage) -> DynamicImage {
    enhance_full(image)
        .map(DynamicImage::ImageLuma8)
        .or_else(|err| {
            log::warn!("enhancement failed ({err}), falling back to grayscale");
            grayscale_fallback(image).map(DynamicImage::ImageLuma8)
        })
        .unwrap_or_else(|err| {
            log::error!("grayscale fallback failed ({err}), passing input through unchanged");
            image.clone()
        })
}

fn enhance_full(image: &DynamicImage) -> Result<GrayImage, EnhanceError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(EnhanceError::EmptyImage);
    }
    let upscaled = upscale(image);
    // Median filtering keeps glyph edges while flattening sensor noise.
    let denoised = median_filter(&upscaled.to_rgb8(), 1, 1);
    let contrasted = clahe_luminance(&denoised);
    let gray = to_gray(&contrasted);
    let sharpened = unsharp_mask(&gray);
    let binary = binarize(&sharpened);
    let cleaned = open(&close(&binary, Norm::L1, 1), Norm::L1, 1);
    Ok(median_filter(&cleaned, 1, 1))
}

fn grayscale_fallback(image: &DynamicImage) -> Result<GrayImage, EnhanceError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(EnhanceError::EmptyImage);
    }
    Ok(image.to_luma8())
}

/// Scales uniformly so both dimensions reach at least [`MIN_SIDE`], with
/// cubic resampling to avoid blocking artifacts.
fn upscale(image: &DynamicImage) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    if width >= MIN_SIDE && height >= MIN_SIDE {
        return image.clone();
    }
    let scale = (MIN_SIDE as f32 / width as f32).max(MIN_SIDE as f32 / height as f32);
    let target_width = (width as f32 * scale).round() as u32;
    let target_height = (height as f32 * scale).round() as u32;
    log::debug!("Upscaling from {width}x{height} to {target_width}x{target_height}.");
    image.resize_exact(target_width, target_height, FilterType::CatmullRom)
}

fn to_gray(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([luma(image.get_pixel(x, y))])
    })
}

fn luma(pixel: &Rgb<u8>) -> u8 {
    (0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32).round() as u8
}

/// Contrast-limited adaptive histogram equalization on the luminance channel
/// only; chroma is preserved by rescaling each pixel by its luminance ratio.
fn clahe_luminance(image: &RgbImage) -> RgbImage {
    let luminance = to_gray(image);
    let equalized = clahe(&luminance, CLAHE_CLIP_LIMIT, CLAHE_TILES);
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let pixel = image.get_pixel(x, y);
        let before = luminance.get_pixel(x, y)[0] as f32;
        let after = equalized.get_pixel(x, y)[0] as f32;
        if before == 0.0 {
            return Rgb([after as u8; 3]);
        }
        let factor = after / before;
        Rgb([
            (pixel[0] as f32 * factor).clamp(0.0, 255.0) as u8,
            (pixel[1] as f32 * factor).clamp(0.0, 255.0) as u8,
            (pixel[2] as f32 * factor).clamp(0.0, 255.0) as u8,
        ])
    })
}

/// CLAHE over a `tiles`x`tiles` grid: per-tile clipped-histogram lookup
/// tables, bilinearly interpolated between neighboring tiles per pixel.
fn clahe(image: &GrayImage, clip_limit: f32, tiles: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    let tile_width = width.div_ceil(tiles).max(1);
    let tile_height = height.div_ceil(tiles).max(1);
    let tiles_x = width.div_ceil(tile_width);
    let tiles_y = height.div_ceil(tile_height);

    let mut tables = vec![[0u8; 256]; (tiles_x * tiles_y) as usize];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_width;
            let y0 = ty * tile_height;
            let x1 = (x0 + tile_width).min(width);
            let y1 = (y0 + tile_height).min(height);

            let mut histogram = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    histogram[image.get_pixel(x, y)[0] as usize] += 1;
                }
            }

            let area = (x1 - x0) * (y1 - y0);
            let limit = ((clip_limit * area as f32 / 256.0).max(1.0)) as u32;
            let mut excess = 0;
            for bin in histogram.iter_mut() {
                if *bin > limit {
                    excess += *bin - limit;
                    *bin = limit;
                }
            }
            // Redistribute the clipped mass evenly; this is what caps the
            // contrast amplification.
            let bonus = excess / 256;
            for bin in histogram.iter_mut() {
                *bin += bonus;
            }

            let table = &mut tables[(ty * tiles_x + tx) as usize];
            let scale = 255.0 / area as f32;
            let mut cumulative = 0;
            for (value, bin) in histogram.iter().enumerate() {
                cumulative += *bin;
                table[value] = (cumulative as f32 * scale).min(255.0).round() as u8;
            }
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        let value = image.get_pixel(x, y)[0] as usize;
        let gx = ((x as f32 + 0.5) / tile_width as f32 - 0.5).clamp(0.0, (tiles_x - 1) as f32);
        let gy = ((y as f32 + 0.5) / tile_height as f32 - 0.5).clamp(0.0, (tiles_y - 1) as f32);
        let tx0 = gx.floor() as u32;
        let ty0 = gy.floor() as u32;
        let tx1 = (tx0 + 1).min(tiles_x - 1);
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        let wx = gx - tx0 as f32;
        let wy = gy - ty0 as f32;

        let lookup = |tx: u32, ty: u32| tables[(ty * tiles_x + tx) as usize][value] as f32;
        let top = lookup(tx0, ty0) * (1.0 - wx) + lookup(tx1, ty0) * wx;
        let bottom = lookup(tx0, ty1) * (1.0 - wx) + lookup(tx1, ty1) * wx;
        Luma([(top * (1.0 - wy) + bottom * wy).round() as u8])
    })
}

/// Unsharp masking: accentuate edges by subtracting half of a gaussian blur
/// from one-and-a-half times the original.
fn unsharp_mask(image: &GrayImage) -> GrayImage {
    let blurred = gaussian_blur_f32(image, GAUSSIAN_SIGMA);
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let original = image.get_pixel(x, y)[0] as f32;
        let blur = blurred.get_pixel(x, y)[0] as f32;
        Luma([(1.5 * original - 0.5 * blur).clamp(0.0, 255.0) as u8])
    })
}

/// Combines three independent thresholds: AND of the adaptive mean and
/// adaptive gaussian results suppresses inconsistent noise, OR with the
/// global Otsu result recovers uniform regions the adaptive windows miss.
fn binarize(image: &GrayImage) -> GrayImage {
    let mean = box_filter(image, ADAPTIVE_RADIUS, ADAPTIVE_RADIUS);
    let gaussian = gaussian_blur_f32(image, GAUSSIAN_SIGMA);
    let otsu = otsu_level(image) as i16;
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let value = image.get_pixel(x, y)[0] as i16;
        let above_mean = value > mean.get_pixel(x, y)[0] as i16 - ADAPTIVE_BIAS;
        let above_gaussian = value > gaussian.get_pixel(x, y)[0] as i16 - ADAPTIVE_BIAS;
        let above_otsu = value > otsu;
        if (above_mean && above_gaussian) || above_otsu {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            let value = ((x + y) % 256) as u8;
            Rgb([value, value, value])
        }))
    }

    #[test]
    fn upscales_small_images_to_min_side() {
        let upscaled = upscale(&gradient(100, 50));
        assert_eq!((upscaled.width(), upscaled.height()), (1600, 800));
    }

    #[test]
    fn leaves_large_images_unscaled() {
        let upscaled = upscale(&gradient(900, 850));
        assert_eq!((upscaled.width(), upscaled.height()), (900, 850));
    }

    #[test]
    fn output_is_binary() {
        let enhanced = enhance(&gradient(810, 810));
        let gray = enhanced.to_luma8();
        assert!(gray.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn degenerate_input_passes_through() {
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        let enhanced = enhance(&empty);
        assert_eq!((enhanced.width(), enhanced.height()), (0, 0));
    }

    #[test]
    fn grayscale_fallback_rejects_empty() {
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        assert!(grayscale_fallback(&empty).is_err());
        assert!(grayscale_fallback(&gradient(4, 4)).is_ok());
    }

    #[test]
    fn clahe_preserves_dimensions() {
        let gray = gradient(64, 48).to_luma8();
        let equalized = clahe(&gray, CLAHE_CLIP_LIMIT, CLAHE_TILES);
        assert_eq!(equalized.dimensions(), (64, 48));
    }

    #[test]
    fn loading_missing_path_is_a_read_error() {
        let source = ImageSource::from("does/not/exist.png");
        match source.load() {
            Err(ExtractError::ImageRead { path, .. }) => {
                assert_eq!(path, PathBuf::from("does/not/exist.png"));
            }
            other => panic!("expected ImageRead error, got {other:?}"),
        }
    }
}
