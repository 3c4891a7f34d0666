//! Ring localization stages: segment, locate, triangulate, annotate

pub mod contours;
pub mod overlay;
pub mod segmentation;
pub mod triangulation;

/// Raw 8-bit RGB frame
pub type Frame = image::RgbImage;

/// Single-channel binary mask (0 or 255), same size as its frame
pub type Mask = image::GrayImage;

pub use contours::{locate, Span, DEFAULT_MIN_AREA};
pub use overlay::{render, render_span};
pub use segmentation::{coverage, segment, ColorBand};
pub use triangulation::{triangulate, CameraGeometry, LocalizationResult};
