//! Run the ring localizer over a still image and save the overlay
//!
//! cargo run -p ringsight-eye --example locate_still -- ring.png overlay.png

use ringsight_eye::{CameraGeometry, ColorBand, FrameSource, RingLocator, StillSource};
use ringsight_eye::processing::DEFAULT_MIN_AREA;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let input = args.next().ok_or("usage: locate_still <image> [overlay.png]")?;
    let output = args.next().unwrap_or_else(|| "overlay.png".to_string());

    let source = StillSource::open("still", &input)?;
    let frame = source.try_grab().ok_or("image has no pixels")?;

    // Calibrate to whatever size the image is
    let locator = RingLocator::new(
        ColorBand::ORANGE_RING,
        DEFAULT_MIN_AREA,
        CameraGeometry::default(),
        frame.dimensions(),
    );
    let detection = locator.locate(&frame)?;

    match detection.span {
        Some(span) => println!(
            "ring spans x={}..{} (center offset {})",
            span.leftmost_x,
            span.rightmost_x,
            span.center_offset()
        ),
        None => println!("no ring found"),
    }
    println!(
        "distance={:.4} bearing={:.4}",
        detection.result.distance, detection.result.bearing
    );

    detection.overlay.save(&output)?;
    println!("overlay written to {}", output);
    Ok(())
}
