//! Diagnostic overlay drawn on top of the cleaned mask

use super::contours::Span;
use super::Mask;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;

pub const EDGE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const CENTER_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
pub const MARKER_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Column the symmetric offset markers are drawn around
pub const REFERENCE_COLUMN: i32 = 80;

fn vertical(img: &mut RgbImage, x: i32, height: u32, color: Rgb<u8>) {
    draw_line_segment_mut(img, (x as f32, 0.0), (x as f32, height as f32), color);
}

fn horizontal(img: &mut RgbImage, y: i32, width: u32, color: Rgb<u8>) {
    draw_line_segment_mut(img, (0.0, y as f32), (width as f32, y as f32), color);
}

fn to_rgb(mask: &Mask) -> RgbImage {
    RgbImage::from_fn(mask.width(), mask.height(), |x, y| {
        let v = mask.get_pixel(x, y).0[0];
        Rgb([v, v, v])
    })
}

fn center_lines(img: &mut RgbImage, width: u32, height: u32) {
    horizontal(img, (height / 2) as i32, width, CENTER_COLOR);
    vertical(img, (width / 2) as i32, height, CENTER_COLOR);
}

/// Annotate a detection: edges, center lines and the expected-bound markers.
///
/// Lines that fall outside the image are clipped. The mask is not touched.
pub fn render(
    mask: &Mask,
    leftmost_x: i32,
    rightmost_x: i32,
    width: u32,
    height: u32,
    center_offset: i32,
) -> RgbImage {
    let mut img = to_rgb(mask);

    vertical(&mut img, leftmost_x, height, EDGE_COLOR);
    vertical(&mut img, rightmost_x, height, EDGE_COLOR);
    center_lines(&mut img, width, height);

    vertical(&mut img, REFERENCE_COLUMN - center_offset, height, MARKER_COLOR);
    vertical(&mut img, REFERENCE_COLUMN + center_offset, height, MARKER_COLOR);

    img
}

/// Overlay for an optional span; without a target only the center lines are drawn
pub fn render_span(mask: &Mask, span: Option<Span>, width: u32, height: u32) -> RgbImage {
    match span {
        Some(span) => render(
            mask,
            span.leftmost_x as i32,
            span.rightmost_x as i32,
            width,
            height,
            span.center_offset(),
        ),
        None => {
            let mut img = to_rgb(mask);
            center_lines(&mut img, width, height);
            img
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn blob_mask() -> Mask {
        Mask::from_fn(160, 120, |x, y| {
            let on = (30..=70).contains(&x) && (0..=20).contains(&y);
            Luma([if on { 255 } else { 0 }])
        })
    }

    #[test]
    fn test_render_lines() {
        let mask = blob_mask();
        let span = Span { leftmost_x: 30, rightmost_x: 70 };
        let img = render_span(&mask, Some(span), 160, 120);

        assert_eq!(img.dimensions(), (160, 120));
        assert_eq!(*img.get_pixel(30, 10), EDGE_COLOR);
        assert_eq!(*img.get_pixel(70, 10), EDGE_COLOR);
        assert_eq!(*img.get_pixel(80, 10), CENTER_COLOR);
        assert_eq!(*img.get_pixel(5, 60), CENTER_COLOR);
        // center offset -20: markers at 80 + 20 and 80 - 20
        assert_eq!(*img.get_pixel(100, 10), MARKER_COLOR);
        assert_eq!(*img.get_pixel(60, 100), MARKER_COLOR);
        // mask shows through elsewhere
        assert_eq!(*img.get_pixel(45, 10), Rgb([255, 255, 255]));
        assert_eq!(*img.get_pixel(45, 100), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_render_does_not_touch_mask() {
        let mask = blob_mask();
        let before = mask.clone();
        let _ = render(&mask, 30, 70, 160, 120, -20);
        assert_eq!(mask, before);
    }

    #[test]
    fn test_render_without_target() {
        let img = render_span(&Mask::new(160, 120), None, 160, 120);
        assert_eq!(*img.get_pixel(80, 3), CENTER_COLOR);
        assert_eq!(*img.get_pixel(3, 60), CENTER_COLOR);
        assert_eq!(*img.get_pixel(3, 3), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_offscreen_markers_are_clipped() {
        let img = render(&Mask::new(160, 120), 0, 159, 160, 120, -100);
        assert_eq!(img.dimensions(), (160, 120));
    }
}
