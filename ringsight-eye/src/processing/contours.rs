//! Contour extraction and horizontal extrema of the target silhouette

use super::Mask;
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{dilate_mut, erode_mut};
use tracing::trace;

/// Contours at or below this area are treated as noise
pub const DEFAULT_MIN_AREA: f64 = 100.0;

/// Half-width of the square structuring element (5x5)
const KERNEL_RADIUS: u8 = 2;

/// Horizontal extent of all qualifying contours, in pixels.
///
/// `leftmost_x <= rightmost_x` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub leftmost_x: u32,
    pub rightmost_x: u32,
}

impl Span {
    pub fn width(&self) -> u32 {
        self.rightmost_x - self.leftmost_x
    }

    /// Signed half-span used by the overlay markers, truncated toward zero
    pub fn center_offset(&self) -> i32 {
        (self.leftmost_x as i32 - self.rightmost_x as i32) / 2
    }
}

/// Erode then dilate in place (a morphological opening).
///
/// Eroding first removes speckles before dilation could grow them.
pub fn open(mask: &mut Mask) {
    erode_mut(mask, Norm::LInf, KERNEL_RADIUS);
    dilate_mut(mask, Norm::LInf, KERNEL_RADIUS);
}

/// Polygon area of a contour (shoelace formula over its points)
pub fn contour_area(contour: &Contour<i32>) -> f64 {
    let points = &contour.points;
    if points.len() < 3 {
        return 0.0;
    }

    let twice_area: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| i64::from(a.x) * i64::from(b.y) - i64::from(b.x) * i64::from(a.y))
        .sum();

    twice_area.abs() as f64 / 2.0
}

/// Outermost contours of the mask whose area exceeds `min_area`
pub fn external_contours(mask: &Mask, min_area: f64) -> Vec<Contour<i32>> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .filter(|c| contour_area(c) > min_area)
        .collect()
}

/// Extrema of an already-cleaned mask. All qualifying contours are merged
/// into a single silhouette; no blob is preferred over another.
pub fn extrema(mask: &Mask, min_area: f64) -> Option<Span> {
    let contours = external_contours(mask, min_area);
    trace!("{} contours above area {}", contours.len(), min_area);

    let mut xs = contours.iter().flat_map(|c| c.points.iter().map(|p| p.x));
    let first = xs.next()?;
    let (left, right) = xs.fold((first, first), |(lo, hi), x| (lo.min(x), hi.max(x)));

    Some(Span {
        leftmost_x: left.max(0) as u32,
        rightmost_x: right.max(0) as u32,
    })
}

/// Open the mask in place, then reduce it to its horizontal extrema.
///
/// The opened mask is left behind for the overlay.
pub fn locate(mask: &mut Mask, min_area: f64) -> Option<Span> {
    open(mask);
    extrema(mask, min_area)
}
