//! Range and bearing from the horizontal extent of a ring of known size

use super::contours::Span;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Bearings beyond this many radians are rejected.
///
/// NOTE: far wider than any sub-radian field of view can produce, so in
/// practice this gate never fires. The literal threshold is kept for parity
/// with the deployed node until the intended bound is confirmed.
pub const MAX_BEARING_RAD: f64 = 2.0;

/// Fixed camera and target constants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraGeometry {
    /// Horizontal field of view, radians
    pub fov: f64,
    /// Physical radius of the ring
    pub target_radius: f64,
    /// Camera height above the plane the ring lies on, same unit as the radius
    pub camera_elevation: f64,
}

impl Default for CameraGeometry {
    fn default() -> Self {
        Self {
            fov: 0.9564404,
            target_radius: 0.1778,
            camera_elevation: 0.257556,
        }
    }
}

/// Ground distance and bearing to the target.
///
/// `(0.0, 0.0)` means "no target", never "target at the origin".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LocalizationResult {
    pub distance: f64,
    pub bearing: f64,
}

impl LocalizationResult {
    pub const NO_TARGET: LocalizationResult = LocalizationResult {
        distance: 0.0,
        bearing: 0.0,
    };

    pub fn is_target(&self) -> bool {
        *self != Self::NO_TARGET
    }

    /// Telemetry payload
    pub fn to_array(&self) -> [f64; 2] {
        [self.distance, self.bearing]
    }
}

/// Angular half-width subtended by the span, mapped linearly onto the field of view
pub fn internal_angle_offset(leftmost_x: f64, rightmost_x: f64, width: f64, fov: f64) -> f64 {
    ((((leftmost_x + rightmost_x) / 2.0) - leftmost_x) * 2.0 * fov) / width
}

/// Slant range to a ring whose visible diameter matches the span
pub fn hyp_distance(internal_angle_offset: f64, target_radius: f64) -> f64 {
    target_radius / internal_angle_offset.tan()
}

/// Angle from the image center column to the span center
pub fn bearing(leftmost_x: f64, rightmost_x: f64, width: f64, fov: f64) -> f64 {
    (fov / width) * ((leftmost_x + rightmost_x - width) / 2.0)
}

/// Convert horizontal extrema into a localization estimate.
pub fn triangulate(leftmost_x: f64, rightmost_x: f64, width: u32, geometry: &CameraGeometry) -> LocalizationResult {
    let width = f64::from(width);

    let angle = internal_angle_offset(leftmost_x, rightmost_x, width, geometry.fov);
    let hyp = hyp_distance(angle, geometry.target_radius);

    // Also rejects NaN: a zero-width span gives an infinite range, a
    // reversed one a negative range
    if !(hyp > geometry.camera_elevation) || !hyp.is_finite() {
        trace!("range gate rejected hyp={hyp}");
        return LocalizationResult::NO_TARGET;
    }

    let distance = (hyp.powi(2) - geometry.camera_elevation.powi(2)).sqrt();
    let theta = bearing(leftmost_x, rightmost_x, width, geometry.fov);

    if theta.abs() > MAX_BEARING_RAD {
        trace!("bearing gate rejected theta={theta}");
        return LocalizationResult::NO_TARGET;
    }

    LocalizationResult { distance, bearing: theta }
}

/// Triangulate a located span, or short-circuit to the sentinel when there is none
pub fn localize(span: Option<Span>, width: u32, geometry: &CameraGeometry) -> LocalizationResult {
    match span {
        Some(span) => triangulate(
            f64::from(span.leftmost_x),
            f64::from(span.rightmost_x),
            width,
            geometry,
        ),
        None => LocalizationResult::NO_TARGET,
    }
}
