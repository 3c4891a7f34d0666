//! Output streams: the diagnostic image feed and switched virtual cameras

use crate::processing::Frame;
use crate::source::FrameSource;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Push-only image feed holding the most recent frame.
///
/// Pushing never fails and never blocks; a viewer that falls behind only
/// ever sees the latest frame.
pub struct OutputStream {
    name: String,
    resolution: (u32, u32),
    sender: watch::Sender<Option<Arc<Frame>>>,
    frames: AtomicU64,
}

impl OutputStream {
    pub fn new(name: impl Into<String>, resolution: (u32, u32)) -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            name: name.into(),
            resolution,
            sender,
            frames: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared resolution of the stream
    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    /// Publish a frame for viewers
    pub fn put_frame(&self, frame: Frame) {
        if frame.dimensions() != self.resolution {
            debug!(
                "{}: frame is {:?}, stream declared {:?}",
                self.name,
                frame.dimensions(),
                self.resolution
            );
        }
        self.sender.send_replace(Some(Arc::new(frame)));
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Most recent frame, if any was pushed
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.sender.borrow().clone()
    }

    /// Receiver notified on every push
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Frame>>> {
        self.sender.subscribe()
    }

    /// Number of frames pushed so far
    pub fn frame_count(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

/// A named stream whose backing source can be replaced at runtime.
///
/// The replacement is a single `Arc` swap under a write lock, so readers
/// see either the old source or the new one.
pub struct SwitchedStream {
    name: String,
    active: RwLock<Option<Arc<dyn FrameSource>>>,
}

impl SwitchedStream {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: RwLock::new(None),
        }
    }

    /// Retarget the stream
    pub fn set_source(&self, source: Arc<dyn FrameSource>) {
        info!("{}: switching to '{}'", self.name, source.name());
        *self.active.write() = Some(source);
    }

    pub fn active(&self) -> Option<Arc<dyn FrameSource>> {
        self.active.read().clone()
    }

    pub fn active_name(&self) -> Option<String> {
        self.active.read().as_ref().map(|s| s.name().to_string())
    }
}

impl FrameSource for SwitchedStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn try_grab(&self) -> Option<Frame> {
        // Release the lock before grabbing so a swap never waits on a capture
        let source = self.active()?;
        source.try_grab()
    }
}
