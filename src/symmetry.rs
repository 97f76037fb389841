//! Left/right mirror symmetry of an image as a 0-100 score.

use std::fmt;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma, RgbImage};
use ndarray::{Array2, ArrayView2, Zip, s};
use serde::Serialize;

use crate::config::ScoringConfig;

/// Every image is scored on a square canvas of this size, so aspect ratio
/// and resolution drop out of the score.
pub const CANVAS_SIZE: u32 = 400;

/// 0-100, two decimals, 100 is a perfect mirror image.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct SymmetryScore(f64);

impl SymmetryScore {
    pub fn from_mean_difference(mean: f64) -> Self {
        let raw = 100.0 - (mean / 255.0 * 100.0);
        Self(((raw * 100.0).round() / 100.0).clamp(0.0, 100.0))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

/// Whole numbers keep one decimal place: `85.0`, `92.34`.
impl fmt::Display for SymmetryScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.fract() == 0.0 {
            write!(f, "{:.1}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[derive(Debug, Clone)]
pub struct SymmetryReport {
    pub score: SymmetryScore,
    /// `|left - mirrored right|` per pixel, `CANVAS_SIZE` rows by half the
    /// canvas width.
    pub difference: Array2<u8>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SymmetryScorer {
    config: ScoringConfig,
}

impl SymmetryScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Scores an image that has already been cropped to its subject.
    pub fn score(&self, image: &DynamicImage) -> SymmetryReport {
        // CatmullRom is the bicubic kernel
        let canvas = image.resize_exact(CANVAS_SIZE, CANVAS_SIZE, FilterType::CatmullRom);
        let mut gray = luma_601(&canvas.to_rgb8());
        if self.config.use_blur {
            gray = imageops::blur(&gray, self.config.blur_radius);
        }

        let pixels = luma_array(&gray);
        let difference = mirror_difference(pixels.view());
        let mean = difference.mapv(f64::from).mean().unwrap_or(0.0);

        SymmetryReport {
            score: SymmetryScore::from_mean_difference(mean),
            difference,
        }
    }
}

/// ITU-R 601-2 luma in 16.16 fixed point (299/587/114 per mille).
fn luma_601(rgb: &RgbImage) -> GrayImage {
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0.map(u32::from);
        let luma = (r * 19595 + g * 38470 + b * 7471 + 0x8000) >> 16;
        Luma([luma as u8])
    })
}

fn luma_array(gray: &GrayImage) -> Array2<u8> {
    let (width, height) = gray.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        gray.get_pixel(x as u32, y as u32)[0]
    })
}

/// Splits `pixels` at the vertical midline, mirrors the right half and
/// returns the absolute difference against the left half. On odd widths the
/// centre column is dropped.
pub fn mirror_difference(pixels: ArrayView2<'_, u8>) -> Array2<u8> {
    let mid = pixels.ncols() / 2;
    let left = pixels.slice(s![.., ..mid]);
    let mirrored = pixels.slice(s![.., mid..;-1]);

    let width = left.ncols().min(mirrored.ncols());
    let left = left.slice(s![.., ..width]);
    let mirrored = mirrored.slice(s![.., ..width]);

    Zip::from(&left)
        .and(&mirrored)
        .map_collect(|&l, &r| l.abs_diff(r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use ndarray::array;

    fn split_image(width: u32, height: u32, left: u8, right: u8) -> DynamicImage {
        let img = RgbImage::from_fn(width, height, |x, _| {
            let v = if x < width / 2 { left } else { right };
            Rgb([v, v, v])
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn mirrored_pattern_scores_100() {
        let img = RgbImage::from_fn(CANVAS_SIZE, CANVAS_SIZE, |x, y| {
            let mx = x.min(CANVAS_SIZE - 1 - x);
            Rgb([(mx % 256) as u8, ((mx + y) % 256) as u8, (y % 256) as u8])
        });

        let report = SymmetryScorer::default().score(&DynamicImage::ImageRgb8(img));

        assert_eq!(report.score.value(), 100.0);
        assert!(report.difference.iter().all(|&d| d == 0));
    }

    #[test]
    fn black_against_white_scores_0() {
        let report = SymmetryScorer::default().score(&split_image(CANVAS_SIZE, CANVAS_SIZE, 0, 255));
        assert_eq!(report.score.value(), 0.0);
    }

    #[test]
    fn colour_uses_601_luma_weights() {
        let img = RgbImage::from_fn(CANVAS_SIZE, CANVAS_SIZE, |x, _| {
            if x < CANVAS_SIZE / 2 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 255, 0])
            }
        });

        // red -> 76, green -> 150
        let report = SymmetryScorer::default().score(&DynamicImage::ImageRgb8(img));

        assert_eq!(report.score.value(), 70.98);
        assert!(report.difference.iter().all(|&d| d == 74));
    }

    #[test]
    fn luma_601_matches_reference_values() {
        let rgb = RgbImage::from_fn(4, 1, |x, _| match x {
            0 => Rgb([255, 255, 255]),
            1 => Rgb([0, 0, 255]),
            2 => Rgb([100, 150, 200]),
            _ => Rgb([0, 0, 0]),
        });
        let gray = luma_601(&rgb);
        let values: Vec<u8> = gray.pixels().map(|p| p[0]).collect();
        assert_eq!(values, vec![255, 29, 141, 0]);
    }

    #[test]
    fn difference_map_is_half_the_canvas() {
        let report = SymmetryScorer::default().score(&split_image(123, 77, 10, 20));
        assert_eq!(report.difference.dim(), (400, 200));
    }

    #[test]
    fn score_ignores_input_resolution() {
        let scorer = SymmetryScorer::default();
        let small = scorer.score(&split_image(400, 240, 40, 200)).score.value();
        let large = scorer.score(&split_image(1200, 720, 40, 200)).score.value();
        assert!((small - large).abs() < 1.0, "{small} vs {large}");
    }

    #[test]
    fn blur_keeps_symmetric_images_near_perfect() {
        let img = RgbImage::from_fn(CANVAS_SIZE, CANVAS_SIZE, |x, _| {
            let mx = x.min(CANVAS_SIZE - 1 - x);
            let v = if (mx / 20) % 2 == 0 { 30 } else { 220 };
            Rgb([v, v, v])
        });
        let scorer = SymmetryScorer::new(ScoringConfig {
            use_blur: true,
            blur_radius: 2.0,
            clamp_bbox: true,
        });

        let score = scorer.score(&DynamicImage::ImageRgb8(img)).score.value();
        assert!(score > 99.0, "{score}");
    }

    #[test]
    fn mirror_difference_drops_centre_column_on_odd_width() {
        let pixels = array![[1u8, 2, 9, 5, 7], [0, 0, 3, 0, 0]];
        let diff = mirror_difference(pixels.view());
        // left = [1, 2], mirrored right = [7, 5]
        assert_eq!(diff, array![[6u8, 3], [0, 0]]);
    }

    #[test]
    fn score_rounds_to_two_decimals() {
        let score = SymmetryScore::from_mean_difference(19.5534);
        assert_eq!(score.value(), 92.33);
        assert_eq!(score.to_string(), "92.33");
    }

    #[test]
    fn whole_scores_display_one_decimal() {
        assert_eq!(SymmetryScore::from_mean_difference(0.0).to_string(), "100.0");
        assert_eq!(SymmetryScore::from_mean_difference(255.0).to_string(), "0.0");
    }
}
