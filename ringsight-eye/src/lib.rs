//! ringsight-eye: onboard ring localization for a mobile robot
//!
//! Grabs frames from a camera, finds the orange ring, estimates its ground
//! distance and bearing, and publishes the estimate on a fixed period.
//! Switched streams let the robot pick which camera a viewer sees.

#[cfg(feature = "opencv")]
pub mod camera;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod processing;
pub mod router;
pub mod scheduler;
pub mod source;
pub mod stream;
pub mod table;
pub mod vision_thread;

pub use config::{LocalizerConfig, NodeConfig};
pub use error::VisionError;
pub use pipeline::{Detection, RingLocator, VisionPipeline};
pub use processing::{CameraGeometry, ColorBand, Frame, LocalizationResult, Mask};
pub use router::{SwitchBinding, SwitchRouter};
pub use scheduler::{MissedTickPolicy, SampleScheduler};
pub use source::{CameraRegistry, FrameSlot, FrameSource, StillSource};
pub use stream::{OutputStream, SwitchedStream};
pub use table::{TelemetrySink, Value, ValueTable};
