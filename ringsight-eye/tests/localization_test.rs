//! End-to-end checks of segment, locate and triangulate

use image::{Luma, Rgb};
use proptest::prelude::*;
use ringsight_eye::processing::triangulation::{bearing, hyp_distance, internal_angle_offset};
use ringsight_eye::processing::{self, Span, DEFAULT_MIN_AREA};
use ringsight_eye::{CameraGeometry, ColorBand, Frame, LocalizationResult, Mask, RingLocator};

const WIDTH: u32 = 160;
const HEIGHT: u32 = 120;

fn mask_with_rects(rects: &[(u32, u32, u32, u32)]) -> Mask {
    Mask::from_fn(WIDTH, HEIGHT, |x, y| {
        let on = rects
            .iter()
            .any(|&(x0, y0, x1, y1)| (x0..=x1).contains(&x) && (y0..=y1).contains(&y));
        Luma([if on { 255 } else { 0 }])
    })
}

#[test]
fn test_square_blob_matches_direct_formula() {
    let geometry = CameraGeometry::default();
    let mut mask = mask_with_rects(&[(60, 40, 100, 80)]);

    let span = processing::locate(&mut mask, DEFAULT_MIN_AREA).unwrap();
    assert_eq!(span, Span { leftmost_x: 60, rightmost_x: 100 });

    let angle = ((80.0 - 60.0) * 2.0 * 0.9564404) / 160.0;
    let hyp = 0.1778 / f64::tan(angle);
    assert!(hyp > 0.257556);
    let expected = (hyp * hyp - 0.257556 * 0.257556).sqrt();

    let result = processing::triangulate(60.0, 100.0, WIDTH, &geometry);
    assert!(result.distance.is_finite() && result.distance > 0.0);
    assert!((result.distance - expected).abs() < 1e-12);
    assert_eq!(result.bearing, 0.0);

    // Helpers agree with the combined computation
    assert!((internal_angle_offset(60.0, 100.0, 160.0, geometry.fov) - angle).abs() < 1e-15);
    assert!((hyp_distance(angle, geometry.target_radius) - hyp).abs() < 1e-12);
    assert_eq!(bearing(60.0, 100.0, 160.0, geometry.fov), 0.0);
}

#[test]
fn test_empty_mask_yields_sentinel() {
    let mut mask = Mask::new(WIDTH, HEIGHT);
    let span = processing::locate(&mut mask, DEFAULT_MIN_AREA);
    assert_eq!(span, None);

    let result = processing::triangulation::localize(span, WIDTH, &CameraGeometry::default());
    assert_eq!(result, LocalizationResult::NO_TARGET);
    assert_eq!(result.to_array(), [0.0, 0.0]);
}

#[test]
fn test_off_center_blob_has_signed_bearing() {
    let geometry = CameraGeometry::default();
    let mut left = mask_with_rects(&[(10, 40, 50, 80)]);
    let mut right = mask_with_rects(&[(110, 40, 150, 80)]);

    let l = processing::triangulation::localize(processing::locate(&mut left, DEFAULT_MIN_AREA), WIDTH, &geometry);
    let r = processing::triangulation::localize(processing::locate(&mut right, DEFAULT_MIN_AREA), WIDTH, &geometry);

    assert!(l.bearing < 0.0);
    assert!(r.bearing > 0.0);
    assert!((l.bearing + r.bearing).abs() < 1e-12);
    assert!((l.distance - r.distance).abs() < 1e-12);
}

#[test]
fn test_locator_on_rendered_frame() {
    let frame = Frame::from_fn(WIDTH, HEIGHT, |x, y| {
        if (30..=70).contains(&x) && (50..=90).contains(&y) {
            Rgb([255, 100, 0])
        } else {
            Rgb([20, 60, 200])
        }
    });

    let detection = RingLocator::default().locate(&frame).unwrap();
    assert_eq!(detection.span, Some(Span { leftmost_x: 30, rightmost_x: 70 }));
    assert!(detection.result.is_target());
    assert!(detection.result.bearing < 0.0);

    // Edge lines are drawn in red on the overlay
    assert_eq!(*detection.overlay.get_pixel(30, 5), Rgb([255, 0, 0]));
    assert_eq!(*detection.overlay.get_pixel(70, 5), Rgb([255, 0, 0]));
}

#[test]
fn test_narrow_band_is_subset_of_ring_band() {
    let narrow = ColorBand::ORANGE_NARROW;
    let ring = ColorBand::ORANGE_RING;
    for channel in 0..3 {
        assert!(ring.low[channel] <= narrow.low[channel]);
        assert!(ring.high[channel] >= narrow.high[channel]);
    }
}

proptest! {
    #[test]
    fn prop_span_covers_all_rects(
        rects in prop::collection::vec((4u32..100, 4u32..60, 12u32..50, 12u32..50), 1..4)
    ) {
        let rects: Vec<_> = rects
            .into_iter()
            .map(|(x0, y0, w, h)| (x0, y0, x0 + w - 1, y0 + h - 1))
            .collect();
        let mut mask = mask_with_rects(&rects);

        let span = processing::locate(&mut mask, DEFAULT_MIN_AREA).unwrap();
        prop_assert!(span.leftmost_x <= span.rightmost_x);
        prop_assert_eq!(span.leftmost_x, rects.iter().map(|r| r.0).min().unwrap());
        prop_assert_eq!(span.rightmost_x, rects.iter().map(|r| r.2).max().unwrap());
    }

    #[test]
    fn prop_result_is_sentinel_or_fully_valid(l in 0u32..160, w in 0u32..160) {
        let r = (l + w).min(159);
        let geometry = CameraGeometry::default();
        let (l, r) = (f64::from(l), f64::from(r));
        let result = processing::triangulate(l, r, WIDTH, &geometry);
        if result.is_target() {
            prop_assert!(result.distance.is_finite() && result.distance > 0.0);

            let angle = internal_angle_offset(l, r, f64::from(WIDTH), geometry.fov);
            let hyp = hyp_distance(angle, geometry.target_radius);
            let expected = (hyp.powi(2) - geometry.camera_elevation.powi(2)).sqrt();
            prop_assert!((result.distance - expected).abs() <= 1e-12 * expected.max(1.0));
            prop_assert_eq!(result.bearing, bearing(l, r, f64::from(WIDTH), geometry.fov));
        } else {
            prop_assert_eq!(result.to_array(), [0.0, 0.0]);
        }
    }
}
