//! Pluggable per-frame pipelines

use crate::config::LocalizerConfig;
use crate::error::VisionError;
use crate::processing::{self, contours, overlay, segmentation, triangulation};
use crate::processing::{CameraGeometry, ColorBand, Frame, LocalizationResult, Span};
use image::RgbImage;
use tracing::debug;

/// A per-frame processing strategy
pub trait VisionPipeline: Send {
    type Output: Send;

    fn process(&mut self, frame: &Frame) -> Result<Self::Output, VisionError>;
}

/// Result of running the ring localizer on one frame
#[derive(Debug, Clone)]
pub struct Detection {
    pub result: LocalizationResult,
    pub span: Option<Span>,
    /// Annotated copy of the cleaned mask
    pub overlay: RgbImage,
}

/// Locates the orange ring and triangulates its range and bearing
#[derive(Debug, Clone)]
pub struct RingLocator {
    band: ColorBand,
    min_area: f64,
    geometry: CameraGeometry,
    width: u32,
    height: u32,
}

impl RingLocator {
    pub fn new(band: ColorBand, min_area: f64, geometry: CameraGeometry, resolution: (u32, u32)) -> Self {
        Self {
            band,
            min_area,
            geometry,
            width: resolution.0,
            height: resolution.1,
        }
    }

    pub fn from_config(config: &LocalizerConfig) -> Self {
        Self::new(config.band, config.min_area, config.geometry, config.resolution)
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Run segment, locate and triangulate on one frame.
    ///
    /// An empty frame is not an error: it yields the sentinel. A frame whose
    /// size differs from the calibrated resolution is a configuration error.
    pub fn locate(&self, frame: &Frame) -> Result<Detection, VisionError> {
        if segmentation::is_empty(frame) {
            debug!("Empty image");
            return Ok(Detection {
                result: LocalizationResult::NO_TARGET,
                span: None,
                overlay: RgbImage::new(0, 0),
            });
        }

        if frame.dimensions() != (self.width, self.height) {
            return Err(VisionError::Config(format!(
                "frame is {}x{} but the localizer is calibrated for {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }

        let mut mask = processing::segment(frame, &self.band);
        let span = contours::locate(&mut mask, self.min_area);
        let overlay = overlay::render_span(&mask, span, self.width, self.height);
        let result = triangulation::localize(span, self.width, &self.geometry);

        debug!("span={:?} result={:?}", span, result);
        Ok(Detection { result, span, overlay })
    }
}

impl Default for RingLocator {
    fn default() -> Self {
        Self::from_config(&LocalizerConfig::default())
    }
}

impl VisionPipeline for RingLocator {
    type Output = Detection;

    fn process(&mut self, frame: &Frame) -> Result<Detection, VisionError> {
        self.locate(frame)
    }
}

/// Counts the frames it has seen; the diagnostic capture path runs this
#[derive(Debug, Default)]
pub struct FrameCounter {
    count: u64,
}

impl FrameCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl VisionPipeline for FrameCounter {
    type Output = u64;

    fn process(&mut self, _frame: &Frame) -> Result<u64, VisionError> {
        self.count += 1;
        Ok(self.count)
    }
}

/// Reports how much of each frame falls in a color band, in percent
#[derive(Debug, Clone)]
pub struct CoverageMeter {
    band: ColorBand,
}

impl CoverageMeter {
    pub fn new(band: ColorBand) -> Self {
        Self { band }
    }
}

impl Default for CoverageMeter {
    fn default() -> Self {
        Self::new(ColorBand::ORANGE_NARROW)
    }
}

impl VisionPipeline for CoverageMeter {
    type Output = f64;

    fn process(&mut self, frame: &Frame) -> Result<f64, VisionError> {
        Ok(processing::coverage(frame, &self.band))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const ORANGE: Rgb<u8> = Rgb([255, 100, 0]);
    const GREY: Rgb<u8> = Rgb([90, 90, 90]);

    fn frame_with_blob(x0: u32, x1: u32) -> Frame {
        Frame::from_fn(160, 120, |x, y| {
            if (x0..=x1).contains(&x) && (40..=80).contains(&y) {
                ORANGE
            } else {
                GREY
            }
        })
    }

    #[test]
    fn test_locate_centered_blob() {
        let locator = RingLocator::default();
        let detection = locator.locate(&frame_with_blob(60, 100)).unwrap();

        assert_eq!(detection.span, Some(Span { leftmost_x: 60, rightmost_x: 100 }));
        assert!(detection.result.is_target());
        assert!(detection.result.distance > 0.0);
        assert_eq!(detection.result.bearing, 0.0);
        assert_eq!(detection.overlay.dimensions(), (160, 120));
    }

    #[test]
    fn test_locate_no_target() {
        let locator = RingLocator::default();
        let detection = locator.locate(&Frame::from_pixel(160, 120, GREY)).unwrap();
        assert_eq!(detection.span, None);
        assert_eq!(detection.result, LocalizationResult::NO_TARGET);
    }

    #[test]
    fn test_locate_empty_frame() {
        let detection = RingLocator::default().locate(&Frame::new(0, 0)).unwrap();
        assert_eq!(detection.result, LocalizationResult::NO_TARGET);
    }

    #[test]
    fn test_locate_wrong_size() {
        let err = RingLocator::default().locate(&Frame::new(320, 240)).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_frame_counter() {
        let mut counter = FrameCounter::new();
        let frame = Frame::new(1, 1);
        assert_eq!(counter.process(&frame).unwrap(), 1);
        assert_eq!(counter.process(&frame).unwrap(), 2);
        assert_eq!(counter.count(), 2);
    }

    #[test]
    fn test_coverage_meter() {
        let mut meter = CoverageMeter::default();
        let pct = meter.process(&frame_with_blob(0, 79)).unwrap();
        // 80 columns by 41 rows out of 160 by 120
        assert!((pct - (80.0 * 41.0) / (160.0 * 120.0) * 100.0).abs() < 1e-9);
    }
}
