//! Fixed-rate sampling loop
//!
//! Every tick grabs one frame, runs the localizer and publishes the result,
//! whether or not a target was found. Ticks are anchored to the start time,
//! so a slow cycle does not push later ticks back.

use crate::config::LocalizerConfig;
use crate::error::VisionError;
use crate::pipeline::{Detection, RingLocator, VisionPipeline};
use crate::processing::{segmentation, LocalizationResult};
use crate::source::FrameSource;
use crate::stream::OutputStream;
use crate::table::TelemetrySink;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// What to do with ticks that were missed because a cycle overran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MissedTickPolicy {
    /// Fire every missed tick back to back until caught up
    #[default]
    CatchUp,
    /// Drop missed ticks and resume on the original schedule
    Skip,
}

impl From<MissedTickPolicy> for MissedTickBehavior {
    fn from(policy: MissedTickPolicy) -> Self {
        match policy {
            MissedTickPolicy::CatchUp => MissedTickBehavior::Burst,
            MissedTickPolicy::Skip => MissedTickBehavior::Skip,
        }
    }
}

/// Drives a pipeline over a source on a fixed period and publishes each result.
///
/// Cycles run one at a time inside a single task, so they never overlap.
pub struct SampleScheduler<P> {
    source: Arc<dyn FrameSource>,
    pipeline: P,
    sink: Arc<dyn TelemetrySink>,
    channel: String,
    output: Option<Arc<OutputStream>>,
    period: Duration,
    initial_delay: Duration,
    policy: MissedTickPolicy,
    cycles: u64,
}

impl<P> SampleScheduler<P>
where
    P: VisionPipeline<Output = Detection> + 'static,
{
    pub fn new(
        source: Arc<dyn FrameSource>,
        pipeline: P,
        sink: Arc<dyn TelemetrySink>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            source,
            pipeline,
            sink,
            channel: channel.into(),
            output: None,
            period: Duration::from_millis(50),
            initial_delay: Duration::ZERO,
            policy: MissedTickPolicy::default(),
            cycles: 0,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_policy(mut self, policy: MissedTickPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Push each cycle's overlay to a diagnostic stream
    pub fn with_output(mut self, output: Arc<OutputStream>) -> Self {
        self.output = Some(output);
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Cycles completed so far
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// One grab, process, publish cycle.
    ///
    /// A missing frame or a non-fatal pipeline error publishes the sentinel.
    /// Only configuration errors are returned.
    pub fn run_cycle(&mut self) -> Result<LocalizationResult, VisionError> {
        let result = match self.source.try_grab() {
            None => {
                debug!("No frame available, publishing sentinel");
                LocalizationResult::NO_TARGET
            }
            Some(frame) => match self.pipeline.process(&frame) {
                Ok(detection) => {
                    if let Some(output) = &self.output {
                        if !segmentation::is_empty(&detection.overlay) {
                            output.put_frame(detection.overlay);
                        }
                    }
                    detection.result
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Localization failed: {}", e);
                    LocalizationResult::NO_TARGET
                }
            },
        };

        self.sink.publish(&self.channel, result.to_array());
        self.cycles += 1;
        Ok(result)
    }

    /// Run on the fixed-rate schedule. Stops after `max_cycles` cycles when
    /// given, otherwise only on a configuration error.
    pub async fn run(&mut self, max_cycles: Option<u64>) -> Result<u64, VisionError> {
        self.run_while(max_cycles, || true).await
    }

    async fn run_while(
        &mut self,
        max_cycles: Option<u64>,
        keep_running: impl Fn() -> bool,
    ) -> Result<u64, VisionError> {
        let mut interval = interval_at(Instant::now() + self.initial_delay, self.period);
        interval.set_missed_tick_behavior(self.policy.into());

        while keep_running() && max_cycles.map_or(true, |max| self.cycles < max) {
            interval.tick().await;
            if let Err(e) = self.run_cycle() {
                error!("Sampling stopped: {}", e);
                return Err(e);
            }
        }

        Ok(self.cycles)
    }

    /// Run on a background task until stopped
    pub fn spawn(mut self) -> SchedulerHandle {
        let is_running = Arc::new(RwLock::new(true));
        let running = is_running.clone();

        info!(
            "Sampling every {:?} ({:?} missed ticks) on '{}'",
            self.period, self.policy, self.channel
        );
        let handle = tokio::spawn(async move {
            let result = self.run_while(None, || *running.read()).await;
            *running.write() = false;
            result
        });

        SchedulerHandle { is_running, handle }
    }
}

impl SampleScheduler<RingLocator> {
    /// Ring localizer scheduled per the localizer configuration
    pub fn from_config(
        source: Arc<dyn FrameSource>,
        sink: Arc<dyn TelemetrySink>,
        config: &LocalizerConfig,
    ) -> Self {
        Self::new(source, RingLocator::from_config(config), sink, config.telemetry_channel.clone())
            .with_period(config.period())
            .with_initial_delay(config.initial_delay())
            .with_policy(config.missed_ticks)
    }
}

/// Handle to a spawned scheduler
pub struct SchedulerHandle {
    is_running: Arc<RwLock<bool>>,
    handle: JoinHandle<Result<u64, VisionError>>,
}

impl SchedulerHandle {
    pub fn is_running(&self) -> bool {
        *self.is_running.read()
    }

    /// Stop after the current cycle and return the number of cycles run
    pub async fn stop(self) -> Result<u64, VisionError> {
        *self.is_running.write() = false;
        self.join().await
    }

    /// Wait for the scheduler to finish on its own
    pub async fn join(self) -> Result<u64, VisionError> {
        self.handle
            .await
            .map_err(|e| VisionError::Processing(format!("Scheduler task failed: {}", e)))?
    }
}
