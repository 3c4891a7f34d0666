//! Continuous capture loop running a pipeline on its own thread

use crate::error::VisionError;
use crate::pipeline::VisionPipeline;
use crate::source::FrameSource;
use parking_lot::RwLock;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Pause after an empty grab before trying again
const EMPTY_GRAB_BACKOFF: Duration = Duration::from_millis(10);

/// Pacing used by [`VisionThread::spawn`] (30 frames per second)
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_nanos(1_000_000_000 / 30);

/// Runs `pipeline` over every frame `source` produces and hands each output
/// to the listener. Grabs and processing share the one thread; nothing else
/// observes the pipeline's state.
pub struct VisionThread {
    name: String,
    is_running: Arc<RwLock<bool>>,
    handle: Option<JoinHandle<u64>>,
}

impl VisionThread {
    pub fn spawn<P, F>(source: Arc<dyn FrameSource>, pipeline: P, listener: F) -> Result<Self, VisionError>
    where
        P: VisionPipeline + 'static,
        F: FnMut(&P::Output) + Send + 'static,
    {
        Self::spawn_paced(source, pipeline, DEFAULT_FRAME_INTERVAL, listener)
    }

    /// Like [`spawn`](Self::spawn), processing at most one frame per `frame_interval`
    pub fn spawn_paced<P, F>(
        source: Arc<dyn FrameSource>,
        mut pipeline: P,
        frame_interval: Duration,
        mut listener: F,
    ) -> Result<Self, VisionError>
    where
        P: VisionPipeline + 'static,
        F: FnMut(&P::Output) + Send + 'static,
    {
        let name = format!("vision-{}", source.name());
        let is_running = Arc::new(RwLock::new(true));
        let running = is_running.clone();

        let handle = std::thread::Builder::new().name(name.clone()).spawn(move || {
            let mut processed = 0u64;
            while *running.read() {
                let start = Instant::now();
                let Some(frame) = source.try_grab() else {
                    std::thread::sleep(EMPTY_GRAB_BACKOFF);
                    continue;
                };

                match pipeline.process(&frame) {
                    Ok(output) => {
                        processed += 1;
                        listener(&output);
                    }
                    Err(e) if e.is_fatal() => {
                        error!("Vision thread stopping: {}", e);
                        break;
                    }
                    Err(e) => warn!("Pipeline error: {}", e),
                }

                let elapsed = start.elapsed();
                if elapsed < frame_interval {
                    std::thread::sleep(frame_interval - elapsed);
                }
            }
            *running.write() = false;
            processed
        })?;

        info!("Vision thread '{}' started", name);
        Ok(Self {
            name,
            is_running,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        *self.is_running.read()
    }

    /// Stop after the current frame and return how many frames were processed
    pub fn stop(&mut self) -> u64 {
        *self.is_running.write() = false;
        let processed = self
            .handle
            .take()
            .map(|h| h.join().unwrap_or_else(|_| {
                error!("Vision thread '{}' panicked", self.name);
                0
            }))
            .unwrap_or(0);
        info!("Vision thread '{}' stopped after {} frames", self.name, processed);
        processed
    }
}

impl Drop for VisionThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::FrameCounter;
    use crate::processing::Frame;
    use crate::source::StillSource;
    use std::sync::mpsc;

    #[test]
    fn test_counts_frames_until_stopped() {
        let source = Arc::new(StillSource::new("front", Frame::new(2, 2)));
        let (tx, rx) = mpsc::channel();

        let mut thread = VisionThread::spawn(source, FrameCounter::new(), move |count: &u64| {
            let _ = tx.send(*count);
        })
        .unwrap();
        assert_eq!(thread.name(), "vision-front");

        // Counts arrive in order starting from one
        let seen: Vec<u64> = rx.iter().take(5).collect();
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);

        let processed = thread.stop();
        assert!(processed >= 5);
        assert!(!thread.is_running());
    }

    #[test]
    fn test_paced_thread_does_not_spin() {
        let source = Arc::new(StillSource::new("still", Frame::new(2, 2)));
        let mut thread =
            VisionThread::spawn_paced(source, FrameCounter::new(), Duration::from_millis(20), |_: &u64| {})
                .unwrap();

        std::thread::sleep(Duration::from_millis(110));
        let processed = thread.stop();
        // About six frames at 20 ms; an unpaced loop would run thousands
        assert!(processed >= 1);
        assert!(processed <= 10, "processed {} frames", processed);
    }

    struct Never;

    impl FrameSource for Never {
        fn name(&self) -> &str {
            "never"
        }

        fn try_grab(&self) -> Option<Frame> {
            None
        }
    }

    #[test]
    fn test_empty_source_never_calls_listener() {
        let mut thread = VisionThread::spawn(Arc::new(Never), FrameCounter::new(), |_: &u64| {
            panic!("no frames expected");
        })
        .unwrap();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(thread.stop(), 0);
    }

    struct WrongSize;

    impl FrameSource for WrongSize {
        fn name(&self) -> &str {
            "wrong"
        }

        fn try_grab(&self) -> Option<Frame> {
            Some(Frame::new(8, 8))
        }
    }

    #[test]
    fn test_config_error_ends_thread() {
        let mut thread = VisionThread::spawn(
            Arc::new(WrongSize),
            crate::pipeline::RingLocator::default(),
            |_: &crate::pipeline::Detection| {},
        )
        .unwrap();
        for _ in 0..100 {
            if !thread.is_running() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!thread.is_running());
        assert_eq!(thread.stop(), 0);
    }
}
