//! USB camera capture through OpenCV
//!
//! Each camera owns a capture thread that keeps the newest frame in a
//! [`FrameSlot`]. Grabs read the slot, so a stalled device shows up as
//! missing frames instead of a blocked caller.

use crate::config::{CameraConfig, CaptureProperty};
use crate::error::VisionError;
use crate::processing::Frame;
use crate::source::{FrameSlot, FrameSource};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture, CAP_ANY},
};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Frames older than this are reported as missing
const STALE_AFTER: Duration = Duration::from_millis(500);

/// Pause after a failed or empty read before trying again
const READ_BACKOFF: Duration = Duration::from_millis(20);

/// A physical camera opened by device path
pub struct UsbCamera {
    name: String,
    path: String,
    slot: Arc<FrameSlot>,
    is_running: Arc<RwLock<bool>>,
}

impl UsbCamera {
    /// Open the device, apply the configured controls and start capturing
    pub fn open(config: &CameraConfig) -> Result<Self, VisionError> {
        info!("Starting camera '{}' on {}", config.name, config.path);

        let mut capture = VideoCapture::from_file(&config.path, CAP_ANY)
            .map_err(|e| VisionError::Camera(format!("Failed to open camera {}: {}", config.path, e)))?;

        if !capture
            .is_opened()
            .map_err(|e| VisionError::Camera(format!("Camera {} not opened: {}", config.path, e)))?
        {
            return Err(VisionError::Camera(format!("Camera {} failed to open", config.path)));
        }

        for (property, value) in config.capture_settings() {
            if !capture.set(capture_prop(property), value)? {
                warn!("Camera '{}' rejected {:?} = {}", config.name, property, value);
            }
        }

        let slot = Arc::new(FrameSlot::new(STALE_AFTER));
        let is_running = Arc::new(RwLock::new(true));

        let running = is_running.clone();
        let writer = slot.clone();
        let name = config.name.clone();
        std::thread::Builder::new()
            .name(format!("capture-{}", config.name))
            .spawn(move || {
                while *running.read() {
                    match read_frame(&mut capture) {
                        Ok(Some(frame)) => writer.store(frame),
                        Ok(None) => std::thread::sleep(READ_BACKOFF),
                        Err(e) => {
                            warn!("Camera '{}' read error: {}", name, e);
                            std::thread::sleep(READ_BACKOFF);
                        }
                    }
                }
                info!("Capture thread for '{}' stopped", name);
            })?;

        Ok(Self {
            name: config.name.clone(),
            path: config.path.clone(),
            slot,
            is_running,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl FrameSource for UsbCamera {
    fn name(&self) -> &str {
        &self.name
    }

    fn try_grab(&self) -> Option<Frame> {
        self.slot.latest()
    }
}

impl Drop for UsbCamera {
    fn drop(&mut self) {
        // Not joined: a read stuck on a dead device must not hold up shutdown
        *self.is_running.write() = false;
    }
}

fn capture_prop(property: CaptureProperty) -> i32 {
    match property {
        CaptureProperty::FourCc => videoio::CAP_PROP_FOURCC,
        CaptureProperty::Width => videoio::CAP_PROP_FRAME_WIDTH,
        CaptureProperty::Height => videoio::CAP_PROP_FRAME_HEIGHT,
        CaptureProperty::Fps => videoio::CAP_PROP_FPS,
        CaptureProperty::Brightness => videoio::CAP_PROP_BRIGHTNESS,
        CaptureProperty::Contrast => videoio::CAP_PROP_CONTRAST,
        CaptureProperty::Saturation => videoio::CAP_PROP_SATURATION,
        CaptureProperty::Hue => videoio::CAP_PROP_HUE,
        CaptureProperty::Gain => videoio::CAP_PROP_GAIN,
        CaptureProperty::Sharpness => videoio::CAP_PROP_SHARPNESS,
        CaptureProperty::Exposure => videoio::CAP_PROP_EXPOSURE,
        CaptureProperty::AutoExposure => videoio::CAP_PROP_AUTO_EXPOSURE,
        CaptureProperty::WhiteBalance => videoio::CAP_PROP_WB_TEMPERATURE,
        CaptureProperty::AutoWhiteBalance => videoio::CAP_PROP_AUTO_WB,
        CaptureProperty::Focus => videoio::CAP_PROP_FOCUS,
        CaptureProperty::AutoFocus => videoio::CAP_PROP_AUTOFOCUS,
    }
}

fn read_frame(capture: &mut VideoCapture) -> Result<Option<Frame>, VisionError> {
    let mut mat = Mat::default();
    if !capture.read(&mut mat)? || mat.rows() <= 0 || mat.cols() <= 0 {
        return Ok(None);
    }
    mat_to_frame(&mat).map(Some)
}

/// Copy a continuous 8-bit BGR `Mat` into an RGB frame
fn mat_to_frame(mat: &Mat) -> Result<Frame, VisionError> {
    if mat.channels() != 3 {
        return Err(VisionError::Camera(format!("Expected 3 channels, got {}", mat.channels())));
    }

    let (width, height) = (mat.cols() as u32, mat.rows() as u32);
    let bgr = mat.data_bytes()?;

    let rgb: Vec<u8> = bgr
        .chunks_exact(3)
        .flat_map(|px| [px[2], px[1], px[0]])
        .collect();
    debug!("Captured {}x{} frame", width, height);

    Frame::from_raw(width, height, rgb)
        .ok_or_else(|| VisionError::Camera("Frame buffer size mismatch".to_string()))
}
