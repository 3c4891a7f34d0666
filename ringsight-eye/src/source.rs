//! Frame sources and the camera registry

use crate::config::CameraConfig;
use crate::error::VisionError;
use crate::processing::Frame;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Anything that can hand out frames on demand.
///
/// `try_grab` must return promptly: a source with nothing to give returns
/// `None` rather than waiting for the next frame.
pub trait FrameSource: Send + Sync {
    /// Stable name used for selection by string
    fn name(&self) -> &str;

    /// Grab the latest frame, or `None` if none is available
    fn try_grab(&self) -> Option<Frame>;
}

/// A source that always yields the same image
pub struct StillSource {
    name: String,
    frame: Frame,
}

impl StillSource {
    pub fn new(name: impl Into<String>, frame: Frame) -> Self {
        Self {
            name: name.into(),
            frame,
        }
    }

    /// Load an image file as a still source
    pub fn open(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, VisionError> {
        let path = path.as_ref();
        let frame = image::open(path)?.to_rgb8();
        let name = name.into();
        info!(
            "Still source '{}' loaded from {} ({}x{})",
            name,
            path.display(),
            frame.width(),
            frame.height()
        );
        Ok(Self::new(name, frame))
    }
}

impl FrameSource for StillSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn try_grab(&self) -> Option<Frame> {
        Some(self.frame.clone())
    }
}

/// Most recent frame handed over by a capture thread.
///
/// Readers never wait on the producer and never consume the frame, so
/// several readers of one device all see the latest image. A frame older
/// than `max_age` counts as missing.
pub struct FrameSlot {
    latest: Mutex<Option<(Arc<Frame>, Instant)>>,
    max_age: Duration,
}

impl FrameSlot {
    pub fn new(max_age: Duration) -> Self {
        Self {
            latest: Mutex::new(None),
            max_age,
        }
    }

    /// Replace the held frame
    pub fn store(&self, frame: Frame) {
        *self.latest.lock() = Some((Arc::new(frame), Instant::now()));
    }

    /// Copy of the held frame if it is fresh enough
    pub fn latest(&self) -> Option<Frame> {
        let frame = {
            let latest = self.latest.lock();
            let (frame, stored_at) = latest.as_ref()?;
            if stored_at.elapsed() > self.max_age {
                return None;
            }
            frame.clone()
        };
        Some(Frame::clone(&frame))
    }
}

const STILL_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Open the source a camera entry describes: image files become still
/// sources, anything else is treated as a capture device.
pub fn open_camera(config: &CameraConfig) -> Result<Arc<dyn FrameSource>, VisionError> {
    let path = Path::new(&config.path);
    let is_still = path
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| STILL_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));

    if is_still {
        return Ok(Arc::new(StillSource::open(&config.name, path)?));
    }

    open_device(config)
}

#[cfg(feature = "opencv")]
fn open_device(config: &CameraConfig) -> Result<Arc<dyn FrameSource>, VisionError> {
    Ok(Arc::new(crate::camera::UsbCamera::open(config)?))
}

#[cfg(not(feature = "opencv"))]
fn open_device(config: &CameraConfig) -> Result<Arc<dyn FrameSource>, VisionError> {
    Err(VisionError::Camera(format!(
        "camera '{}': capture devices need the `opencv` feature ({})",
        config.name, config.path
    )))
}

/// Ordered, named sources. Indices are fixed once the registry is built.
#[derive(Clone, Default)]
pub struct CameraRegistry {
    sources: Vec<Arc<dyn FrameSource>>,
}

impl CameraRegistry {
    pub fn new(sources: Vec<Arc<dyn FrameSource>>) -> Self {
        Self { sources }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Bounds-checked lookup
    pub fn get(&self, index: usize) -> Option<&Arc<dyn FrameSource>> {
        self.sources.get(index)
    }

    /// Index of the first source with exactly this name
    pub fn position(&self, name: &str) -> Option<usize> {
        self.sources.iter().position(|s| s.name() == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.name())
    }
}

impl std::fmt::Debug for CameraRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
