//! Image pre-processing ahead of OCR.
//!
//! The chain is: optional inversion → linear upscale → unsharp mask →
//! grayscale → Otsu threshold (inverted, so text comes out black on white).

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::filter::separable_filter_equal;
use serde::{Deserialize, Serialize};

/// Smallest upscale ratio accepted by `normalized`.
const MIN_UPSCALE_RATIO: f64 = 0.01;

/// Pre-processing parameters for one region.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PreProcessConfig {
    /// Invert colors before anything else (light text on dark background)
    #[serde(rename = "invert_img", default)]
    pub invert: bool,
    /// Resize factor (>1 enlarges)
    #[serde(default = "default_upscale_ratio")]
    pub upscale_ratio: f64,
    /// Gaussian kernel size of the unsharp mask (odd, positive)
    #[serde(default = "default_kernel_size")]
    pub unsharp_kernel_size: i32,
    /// Gaussian standard deviation of the unsharp mask (<= 0 derives it from the kernel size)
    #[serde(default = "default_sigma")]
    pub unsharp_sigma: f64,
    /// Sharpening strength
    #[serde(default = "default_amount")]
    pub unsharp_amount: f64,
}

fn default_upscale_ratio() -> f64 {
    1.0
}

fn default_kernel_size() -> i32 {
    5
}

fn default_sigma() -> f64 {
    1.0
}

fn default_amount() -> f64 {
    1.0
}

impl Default for PreProcessConfig {
    fn default() -> Self {
        Self {
            invert: false,
            upscale_ratio: default_upscale_ratio(),
            unsharp_kernel_size: default_kernel_size(),
            unsharp_sigma: default_sigma(),
            unsharp_amount: default_amount(),
        }
    }
}

impl PreProcessConfig {
    /// Returns a corrected copy of `self`.
    ///
    /// - kernel size is made positive, then odd (even sizes are incremented)
    /// - upscale ratio is made positive; a ratio below 0.01 (or NaN) is replaced
    ///   by `previous.upscale_ratio`
    pub fn normalized(&self, previous: &PreProcessConfig) -> PreProcessConfig {
        let mut config = self.clone();

        config.unsharp_kernel_size = config.unsharp_kernel_size.saturating_abs();
        if config.unsharp_kernel_size % 2 == 0 {
            config.unsharp_kernel_size += 1;
        }

        config.upscale_ratio = config.upscale_ratio.abs();
        if !(config.upscale_ratio >= MIN_UPSCALE_RATIO) {
            config.upscale_ratio = previous.upscale_ratio;
        }

        config
    }
}

/// Runs the full pre-processing chain on a region slice.
///
/// The returned binary image is what gets sent to the recognizer.
pub fn preprocess(img: &RgbImage, config: &PreProcessConfig) -> GrayImage {
    let mut img = img.clone();

    if config.invert {
        imageops::invert(&mut img);
    }

    let img = upscale(&img, config.upscale_ratio);
    let img = unsharp_mask(
        &img,
        config.unsharp_kernel_size.max(1) as usize,
        config.unsharp_sigma,
        config.unsharp_amount,
    );
    binarize_inverted(&to_grayscale(&img))
}

/// Resizes by `ratio` with linear interpolation. Dimensions never drop below 1px.
pub fn upscale(img: &RgbImage, ratio: f64) -> RgbImage {
    let (w, h) = img.dimensions();
    let new_w = ((w as f64 * ratio) as u32).max(1);
    let new_h = ((h as f64 * ratio) as u32).max(1);

    if (new_w, new_h) == (w, h) {
        return img.clone();
    }

    imageops::resize(img, new_w, new_h, FilterType::Triangle)
}

/// Sharpens with an unsharp mask:
/// `clamp((1 + amount) * img - amount * gaussian_blur(img), 0, 255)`
pub fn unsharp_mask(img: &RgbImage, kernel_size: usize, sigma: f64, amount: f64) -> RgbImage {
    let blurred = gaussian_blur(img, kernel_size, sigma);
    let amount = amount as f32;

    ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
        let orig = img.get_pixel(x, y);
        let blur = blurred.get_pixel(x, y);
        let mut out = [0u8; 3];
        for c in 0..3 {
            let v = (1.0 + amount) * orig[c] as f32 - amount * blur[c];
            out[c] = v.round().clamp(0.0, 255.0) as u8;
        }
        Rgb(out)
    })
}

/// Builds a normalized 1D Gaussian kernel.
///
/// A non-positive sigma is derived from the kernel size the same way OpenCV does.
fn gaussian_kernel(size: usize, sigma: f64) -> Vec<f32> {
    let size = size.max(1);
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8
    };

    let center = (size as f64 - 1.0) / 2.0;
    let weights: Vec<f64> = (0..size)
        .map(|i| {
            let d = i as f64 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();

    weights.iter().map(|w| (w / sum) as f32).collect()
}

/// Gaussian blur kept in f32 so the unsharp mask doesn't lose precision.
///
/// Borders replicate the edge pixel.
fn gaussian_blur(img: &RgbImage, kernel_size: usize, sigma: f64) -> ImageBuffer<Rgb<f32>, Vec<f32>> {
    let kernel = gaussian_kernel(kernel_size, sigma);
    let img: ImageBuffer<Rgb<f32>, Vec<f32>> = ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
        let p = img.get_pixel(x, y);
        Rgb([p[0] as f32, p[1] as f32, p[2] as f32])
    });

    separable_filter_equal(&img, &kernel)
}

/// Luma conversion with the ITU-R BT.601 weights.
pub fn to_grayscale(img: &RgbImage) -> GrayImage {
    ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
        let p = img.get_pixel(x, y);
        let v = 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32;
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

/// Otsu level followed by an inverted binary threshold: pixels above the
/// level become black (0), everything else white (255).
pub fn binarize_inverted(img: &GrayImage) -> GrayImage {
    let level = otsu_level(img);
    threshold(img, level, ThresholdType::BinaryInverted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_forces_odd_positive_kernel() {
        let previous = PreProcessConfig::default();

        let even = PreProcessConfig { unsharp_kernel_size: 4, ..Default::default() };
        assert_eq!(even.normalized(&previous).unsharp_kernel_size, 5);

        let negative = PreProcessConfig { unsharp_kernel_size: -3, ..Default::default() };
        assert_eq!(negative.normalized(&previous).unsharp_kernel_size, 3);

        let zero = PreProcessConfig { unsharp_kernel_size: 0, ..Default::default() };
        assert_eq!(zero.normalized(&previous).unsharp_kernel_size, 1);
    }

    #[test]
    fn test_normalize_ratio_floor_keeps_previous() {
        let previous = PreProcessConfig { upscale_ratio: 2.5, ..Default::default() };

        let tiny = PreProcessConfig { upscale_ratio: 0.001, ..Default::default() };
        assert_eq!(tiny.normalized(&previous).upscale_ratio, 2.5);

        let negative = PreProcessConfig { upscale_ratio: -3.0, ..Default::default() };
        assert_eq!(negative.normalized(&previous).upscale_ratio, 3.0);

        let nan = PreProcessConfig { upscale_ratio: f64::NAN, ..Default::default() };
        assert_eq!(nan.normalized(&previous).upscale_ratio, 2.5);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let previous = PreProcessConfig::default();
        let input = PreProcessConfig {
            invert: true,
            upscale_ratio: 0.0,
            unsharp_kernel_size: -8,
            unsharp_sigma: 0.5,
            unsharp_amount: 2.0,
        };

        let once = input.normalized(&previous);
        let twice = once.normalized(&once);
        assert_eq!(once, twice);
        assert_eq!(once.unsharp_kernel_size, 9);
        assert_eq!(once.upscale_ratio, 1.0);
    }

    #[test]
    fn test_config_json_field_names() {
        let config: PreProcessConfig = serde_json::from_str(
            r#"{"invert_img": true, "upscale_ratio": 2.0, "unsharp_kernel_size": 3,
                "unsharp_sigma": 1.5, "unsharp_amount": 0.5}"#,
        )
        .unwrap();

        assert!(config.invert);
        assert_eq!(config.unsharp_kernel_size, 3);
        assert_eq!(config.unsharp_sigma, 1.5);
    }

    #[test]
    fn test_blur_spreads_a_bright_column() {
        let img: RgbImage = ImageBuffer::from_fn(7, 3, |x, _| {
            if x == 3 { Rgb([200, 200, 200]) } else { Rgb([0, 0, 0]) }
        });
        let blurred = gaussian_blur(&img, 5, 1.0);

        let center = blurred.get_pixel(3, 1)[0];
        let side = blurred.get_pixel(2, 1)[0];
        assert!(center < 200.0 && center > side && side > 0.0);
        assert!((blurred.get_pixel(2, 1)[0] - blurred.get_pixel(4, 1)[0]).abs() < 1e-3);
        assert!(blurred.get_pixel(0, 1)[0] < 1.0);
    }

    #[test]
    fn test_gaussian_kernel_is_normalized() {
        let kernel = gaussian_kernel(5, 1.0);
        let sum: f32 = kernel.iter().sum();

        assert_eq!(kernel.len(), 5);
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(kernel[2] > kernel[1] && kernel[1] > kernel[0]);
    }

    #[test]
    fn test_unsharp_mask_keeps_flat_image() {
        let img: RgbImage = ImageBuffer::from_pixel(6, 4, Rgb([120, 120, 120]));
        let sharpened = unsharp_mask(&img, 5, 1.0, 2.0);

        assert!(sharpened.pixels().all(|p| p.0 == [120, 120, 120]));
    }

    #[test]
    fn test_unsharp_mask_clamps() {
        // Bright column next to dark ones overshoots past 255 and below 0
        let img: RgbImage = ImageBuffer::from_fn(5, 1, |x, _| {
            if x == 2 { Rgb([250, 250, 250]) } else { Rgb([5, 5, 5]) }
        });
        let sharpened = unsharp_mask(&img, 3, 1.0, 5.0);

        assert_eq!(sharpened.get_pixel(2, 0)[0], 255);
        assert_eq!(sharpened.get_pixel(1, 0)[0], 0);
    }

    #[test]
    fn test_upscale_dimensions() {
        let img: RgbImage = ImageBuffer::new(10, 4);

        assert_eq!(upscale(&img, 2.0).dimensions(), (20, 8));
        assert_eq!(upscale(&img, 0.01).dimensions(), (1, 1));
    }

    #[test]
    fn test_otsu_separates_two_levels() {
        let img: GrayImage = ImageBuffer::from_fn(10, 1, |x, _| {
            if x < 5 { Luma([30]) } else { Luma([200]) }
        });
        let level = otsu_level(&img);

        assert!((30..200).contains(&level));
        let binary = binarize_inverted(&img);
        assert_eq!(binary.get_pixel(0, 0)[0], 255);
        assert_eq!(binary.get_pixel(9, 0)[0], 0);
    }

    #[test]
    fn test_preprocess_inverts_polarity() {
        // Dark text (0) on a light background (220): after the inverted
        // threshold, the background becomes black and the text white.
        let img: RgbImage = ImageBuffer::from_fn(8, 8, |x, _| {
            if x == 3 || x == 4 { Rgb([0, 0, 0]) } else { Rgb([220, 220, 220]) }
        });
        let config = PreProcessConfig { unsharp_amount: 0.0, ..Default::default() };
        let out = preprocess(&img, &config);

        assert_eq!(out.dimensions(), (8, 8));
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(3, 3)[0], 255);

        // With inversion the text is the bright class instead
        let inverted = PreProcessConfig { invert: true, unsharp_amount: 0.0, ..Default::default() };
        let out = preprocess(&img, &inverted);
        assert_eq!(out.get_pixel(0, 0)[0], 255);
        assert_eq!(out.get_pixel(3, 3)[0], 0);
    }

    #[test]
    fn test_preprocess_applies_upscale() {
        let img: RgbImage = ImageBuffer::from_pixel(7, 3, Rgb([10, 200, 30]));
        let config = PreProcessConfig { upscale_ratio: 3.0, ..Default::default() };

        assert_eq!(preprocess(&img, &config).dimensions(), (21, 9));
    }
}
