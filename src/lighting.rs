//! Per-frame lighting assessment.
//!
//! Every still is resampled onto a fixed 100×100 grid and every grid pixel
//! contributes its perceptual luminance to the mean. The thresholds are the
//! 450 lux / 1100 lux band of the ambient-light meter expressed on the
//! 8-bit luminance scale (lux ≈ luminance × 5.8).

use image::{imageops::FilterType, RgbImage};
use serde::{Deserialize, Serialize};

pub const SAMPLE_WIDTH: u32 = 100;
pub const SAMPLE_HEIGHT: u32 = 100;

/// Below this mean luminance a frame is `Dark`. The boundary itself is `Optimal`.
pub const DARK_THRESHOLD: f64 = 77.0;
/// Above this mean luminance a frame is `Bright`. The boundary itself is `Optimal`.
pub const BRIGHT_THRESHOLD: f64 = 190.0;

pub const LUX_PER_LUMINANCE: f64 = 5.8;

const WEIGHT_R: f64 = 0.2126;
const WEIGHT_G: f64 = 0.7152;
const WEIGHT_B: f64 = 0.0722;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LightingStatus {
    Dark,
    Optimal,
    Bright,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LightingReading {
    pub brightness: f64,
    pub estimated_lux: u32,
    pub status: LightingStatus,
}

/// Mean perceptual luminance of `image` on the canonical sampling grid.
pub fn measure_brightness(image: &RgbImage) -> f64 {
    if image.width() == 0 || image.height() == 0 {
        return 0.0;
    }

    let sample = if image.dimensions() == (SAMPLE_WIDTH, SAMPLE_HEIGHT) {
        image.clone()
    } else {
        image::imageops::resize(image, SAMPLE_WIDTH, SAMPLE_HEIGHT, FilterType::Triangle)
    };

    let total: f64 = sample
        .pixels()
        .map(|px| {
            let [r, g, b] = px.0;
            WEIGHT_R * f64::from(r) + WEIGHT_G * f64::from(g) + WEIGHT_B * f64::from(b)
        })
        .sum();

    total / f64::from(SAMPLE_WIDTH * SAMPLE_HEIGHT)
}

pub fn classify_brightness(brightness: f64) -> LightingStatus {
    if brightness < DARK_THRESHOLD {
        LightingStatus::Dark
    } else if brightness > BRIGHT_THRESHOLD {
        LightingStatus::Bright
    } else {
        LightingStatus::Optimal
    }
}

pub fn estimate_lux(brightness: f64) -> u32 {
    (brightness * LUX_PER_LUMINANCE).round().max(0.0) as u32
}

pub fn assess_lighting(image: &RgbImage) -> LightingReading {
    let brightness = measure_brightness(image);
    LightingReading {
        brightness,
        estimated_lux: estimate_lux(brightness),
        status: classify_brightness(brightness),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use image::Rgb;
    use rstest::rstest;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb(rgb))
    }

    #[rstest]
    #[case(0.0, LightingStatus::Dark)]
    #[case(76.999, LightingStatus::Dark)]
    #[case(DARK_THRESHOLD, LightingStatus::Optimal)]
    #[case(77.001, LightingStatus::Optimal)]
    #[case(128.0, LightingStatus::Optimal)]
    #[case(189.999, LightingStatus::Optimal)]
    #[case(BRIGHT_THRESHOLD, LightingStatus::Optimal)]
    #[case(190.001, LightingStatus::Bright)]
    #[case(255.0, LightingStatus::Bright)]
    fn classification_around_thresholds(#[case] brightness: f64, #[case] expected: LightingStatus) {
        assert_eq!(classify_brightness(brightness), expected);
    }

    #[test]
    fn grey_frame_measures_its_own_level() {
        let image = solid(SAMPLE_WIDTH, SAMPLE_HEIGHT, [120, 120, 120]);
        assert_abs_diff_eq!(measure_brightness(&image), 120.0, epsilon = 1e-9);
    }

    #[test]
    fn green_dominates_luminance() {
        let green = measure_brightness(&solid(SAMPLE_WIDTH, SAMPLE_HEIGHT, [0, 255, 0]));
        let blue = measure_brightness(&solid(SAMPLE_WIDTH, SAMPLE_HEIGHT, [0, 0, 255]));
        assert_abs_diff_eq!(green, 0.7152 * 255.0, epsilon = 1e-9);
        assert_abs_diff_eq!(blue, 0.0722 * 255.0, epsilon = 1e-9);
        assert_eq!(classify_brightness(blue), LightingStatus::Dark);
    }

    #[test]
    fn full_resolution_frames_are_resampled() {
        let image = solid(640, 480, [200, 200, 200]);
        let reading = assess_lighting(&image);
        assert_abs_diff_eq!(reading.brightness, 200.0, epsilon = 0.5);
        assert_eq!(reading.status, LightingStatus::Bright);
        assert_eq!(reading.estimated_lux, 1160);
    }

    #[test]
    fn measurement_is_deterministic() {
        let image = RgbImage::from_fn(320, 240, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 40]));
        assert_eq!(measure_brightness(&image), measure_brightness(&image));
    }

    #[test]
    fn empty_image_is_dark() {
        let reading = assess_lighting(&RgbImage::new(0, 0));
        assert_eq!(reading.brightness, 0.0);
        assert_eq!(reading.status, LightingStatus::Dark);
        assert_eq!(reading.estimated_lux, 0);
    }
}
