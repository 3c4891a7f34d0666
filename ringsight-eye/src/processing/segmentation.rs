//! HSV color-band segmentation

use super::{Frame, Mask};
use image::{Luma, Rgb};
use serde::{Deserialize, Serialize};

/// Foreground value written into masks
pub const MASK_ON: u8 = 255;

/// Inclusive HSV range. Hue uses the 8-bit convention (degrees / 2, 0..=179).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorBand {
    pub low: [u8; 3],
    pub high: [u8; 3],
}

impl ColorBand {
    /// Band used to localize the ring
    pub const ORANGE_RING: ColorBand = ColorBand {
        low: [0, 100, 100],
        high: [20, 255, 255],
    };

    /// Narrower band used for coverage reporting
    pub const ORANGE_NARROW: ColorBand = ColorBand {
        low: [5, 100, 100],
        high: [15, 255, 255],
    };

    pub fn new(low: [u8; 3], high: [u8; 3]) -> Self {
        Self { low, high }
    }

    /// Whether an HSV sample falls inside the band on all three channels
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|c| self.low[c] <= hsv[c] && hsv[c] <= self.high[c])
    }
}

impl Default for ColorBand {
    fn default() -> Self {
        Self::ORANGE_RING
    }
}

/// Convert an RGB sample to 8-bit HSV.
pub fn rgb_to_hsv(Rgb([r, g, b]): Rgb<u8>) -> [u8; 3] {
    let (r, g, b) = (i32::from(r), i32::from(g), i32::from(b));
    let v = r.max(g).max(b);
    let delta = v - r.min(g).min(b);

    let s = if v == 0 { 0 } else { (255 * delta + v / 2) / v };

    let h = if delta == 0 {
        0.0
    } else {
        let d = delta as f32;
        let h = if v == r {
            60.0 * (g - b) as f32 / d
        } else if v == g {
            120.0 + 60.0 * (b - r) as f32 / d
        } else {
            240.0 + 60.0 * (r - g) as f32 / d
        };
        if h < 0.0 {
            h + 360.0
        } else {
            h
        }
    };

    // 359.x degrees rounds up to 180, which is hue 0 again
    let h = (h / 2.0).round() as u32 % 180;

    [h as u8, s as u8, v as u8]
}

/// Whether a mask (or frame) has no pixels at all
pub fn is_empty<P: image::Pixel>(image: &image::ImageBuffer<P, Vec<P::Subpixel>>) -> bool {
    image.width() == 0 || image.height() == 0
}

/// Classify every pixel of `frame` against `band`.
///
/// An empty frame produces an empty mask; callers check with [`is_empty`]
/// before going further.
pub fn segment(frame: &Frame, band: &ColorBand) -> Mask {
    if is_empty(frame) {
        return Mask::new(0, 0);
    }

    Mask::from_fn(frame.width(), frame.height(), |x, y| {
        if band.contains(rgb_to_hsv(*frame.get_pixel(x, y))) {
            Luma([MASK_ON])
        } else {
            Luma([0])
        }
    })
}

/// Percentage (0..=100) of frame pixels inside `band`
pub fn coverage(frame: &Frame, band: &ColorBand) -> f64 {
    if is_empty(frame) {
        return 0.0;
    }

    let matching = frame
        .pixels()
        .filter(|p| band.contains(rgb_to_hsv(**p)))
        .count();
    let total = u64::from(frame.width()) * u64::from(frame.height());

    (matching as f64 / total as f64) * 100.0
}
