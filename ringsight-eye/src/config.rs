//! Configuration for ringsight-eye
//!
//! The node is configured from a single JSON file (by default
//! `/boot/frc.json`) listing the cameras to open and the switched
//! streams to create. An optional `localizer` section overrides the
//! pipeline constants.

use crate::error::VisionError;
use crate::processing::{CameraGeometry, ColorBand, DEFAULT_MIN_AREA};
use crate::scheduler::MissedTickPolicy;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "/boot/frc.json";

/// Telemetry link role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NtMode {
    Client,
    Server,
}

/// Named device property passed through to the camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraProperty {
    pub name: String,
    pub value: JsonValue,
}

/// One physical camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub name: String,
    /// Device path (e.g. `/dev/video0`) or a still image file
    pub path: String,
    #[serde(rename = "pixel format", default, skip_serializing_if = "Option::is_none")]
    pub pixel_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<JsonValue>,
    #[serde(rename = "white balance", default, skip_serializing_if = "Option::is_none")]
    pub white_balance: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposure: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<CameraProperty>,
    /// Settings for an MJPEG relay of this camera. Accepted for compatibility
    /// with existing config files; this node serves no relay, so it is unused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<JsonValue>,
}

impl CameraConfig {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            pixel_format: None,
            width: None,
            height: None,
            fps: None,
            brightness: None,
            white_balance: None,
            exposure: None,
            properties: Vec::new(),
            stream: None,
        }
    }

    /// Declared video mode, if both dimensions are given
    pub fn resolution(&self) -> Option<(u32, u32)> {
        self.width.zip(self.height)
    }

    /// Time between frames at the declared rate ([`DEFAULT_FPS`] when unset)
    pub fn frame_interval(&self) -> Duration {
        // Prevent division by zero
        let fps = self.fps.unwrap_or(DEFAULT_FPS).max(1);
        Duration::from_secs_f64(1.0 / f64::from(fps))
    }

    /// Device controls to apply when the camera is opened, in order.
    ///
    /// Values that cannot be mapped onto a control are logged and skipped.
    pub fn capture_settings(&self) -> Vec<(CaptureProperty, f64)> {
        let mut settings = Vec::new();

        if let Some(format) = &self.pixel_format {
            match pixel_format_code(format) {
                Some(code) => settings.push((CaptureProperty::FourCc, code)),
                None => warn!("camera '{}': unsupported pixel format '{}'", self.name, format),
            }
        }
        if let Some(width) = self.width {
            settings.push((CaptureProperty::Width, f64::from(width)));
        }
        if let Some(height) = self.height {
            settings.push((CaptureProperty::Height, f64::from(height)));
        }
        if let Some(fps) = self.fps {
            settings.push((CaptureProperty::Fps, f64::from(fps)));
        }

        if let Some(brightness) = &self.brightness {
            match json_number(brightness) {
                Some(v) => settings.push((CaptureProperty::Brightness, v)),
                None => warn!("camera '{}': brightness must be a number, got {}", self.name, brightness),
            }
        }

        if let Some(wb) = &self.white_balance {
            match wb.as_str().map(str::to_ascii_lowercase).as_deref() {
                Some("auto") => settings.push((CaptureProperty::AutoWhiteBalance, 1.0)),
                Some("hold") => settings.push((CaptureProperty::AutoWhiteBalance, 0.0)),
                _ => match json_number(wb) {
                    Some(v) => {
                        settings.push((CaptureProperty::AutoWhiteBalance, 0.0));
                        settings.push((CaptureProperty::WhiteBalance, v));
                    }
                    None => warn!("camera '{}': could not understand white balance {}", self.name, wb),
                },
            }
        }

        if let Some(exposure) = &self.exposure {
            match exposure.as_str().map(str::to_ascii_lowercase).as_deref() {
                Some("auto") => settings.push((CaptureProperty::AutoExposure, AUTO_EXPOSURE_ON)),
                Some("hold") => settings.push((CaptureProperty::AutoExposure, AUTO_EXPOSURE_OFF)),
                _ => match json_number(exposure) {
                    Some(v) => {
                        settings.push((CaptureProperty::AutoExposure, AUTO_EXPOSURE_OFF));
                        settings.push((CaptureProperty::Exposure, v));
                    }
                    None => warn!("camera '{}': could not understand exposure {}", self.name, exposure),
                },
            }
        }

        for property in &self.properties {
            let control = CaptureProperty::from_control_name(&property.name);
            match (control, json_number(&property.value)) {
                (Some(control), Some(v)) => settings.push((control, v)),
                (None, _) => warn!("camera '{}': unknown property '{}'", self.name, property.name),
                (_, None) => warn!(
                    "camera '{}': property '{}' must be numeric, got {}",
                    self.name, property.name, property.value
                ),
            }
        }

        settings
    }
}

/// Frame rate assumed when a camera does not declare one
pub const DEFAULT_FPS: u32 = 30;

/// V4L2 auto-exposure modes as understood by the capture backend
const AUTO_EXPOSURE_ON: f64 = 3.0;
const AUTO_EXPOSURE_OFF: f64 = 1.0;

/// Device controls a camera entry can set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureProperty {
    FourCc,
    Width,
    Height,
    Fps,
    Brightness,
    Contrast,
    Saturation,
    Hue,
    Gain,
    Sharpness,
    Exposure,
    AutoExposure,
    WhiteBalance,
    AutoWhiteBalance,
    Focus,
    AutoFocus,
}

impl CaptureProperty {
    /// Control for a V4L2 control name as listed under a camera's `properties`
    pub fn from_control_name(name: &str) -> Option<Self> {
        let control = match name {
            "brightness" => Self::Brightness,
            "contrast" => Self::Contrast,
            "saturation" => Self::Saturation,
            "hue" => Self::Hue,
            "gain" => Self::Gain,
            "sharpness" => Self::Sharpness,
            "exposure_absolute" | "exposure_time_absolute" => Self::Exposure,
            "exposure_auto" => Self::AutoExposure,
            "white_balance_temperature" => Self::WhiteBalance,
            "white_balance_temperature_auto" | "white_balance_automatic" => Self::AutoWhiteBalance,
            "focus_absolute" => Self::Focus,
            "focus_auto" | "focus_automatic_continuous" => Self::AutoFocus,
            _ => return None,
        };
        Some(control)
    }
}

/// Four-character code of a pixel format name, as the capture backend takes it
fn pixel_format_code(format: &str) -> Option<f64> {
    let code: &[u8; 4] = match format.to_ascii_lowercase().as_str() {
        "mjpeg" => b"MJPG",
        "yuyv" => b"YUYV",
        "gray" => b"GREY",
        "bgr" => b"BGR3",
        "rgb565" => b"RGBP",
        _ => return None,
    };
    Some(f64::from(u32::from_le_bytes(*code)))
}

/// Numeric control value; booleans map to 1 and 0
fn json_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// A virtual stream whose source is picked by a selector key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchedCameraConfig {
    pub name: String,
    pub key: String,
}

/// Pipeline and scheduling constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizerConfig {
    pub geometry: CameraGeometry,
    pub band: ColorBand,
    /// Contours must be strictly larger than this (pixels)
    pub min_area: f64,
    /// Frame size the geometry is calibrated for
    pub resolution: (u32, u32),
    pub period_ms: u64,
    pub initial_delay_ms: u64,
    pub missed_ticks: MissedTickPolicy,
    pub telemetry_channel: String,
    pub output_stream: String,
}

impl Default for LocalizerConfig {
    fn default() -> Self {
        Self {
            geometry: CameraGeometry::default(),
            band: ColorBand::ORANGE_RING,
            min_area: DEFAULT_MIN_AREA,
            resolution: (160, 120),
            period_ms: 50,
            initial_delay_ms: 0,
            missed_ticks: MissedTickPolicy::CatchUp,
            telemetry_channel: "Camera/NotePose".to_string(),
            output_stream: "ProcessedVideo".to_string(),
        }
    }
}

impl LocalizerConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.resolution.0 == 0 || self.resolution.1 == 0 {
            return Err("Resolution must be non-zero".to_string());
        }

        if self.period_ms == 0 {
            return Err("Sampling period must be non-zero".to_string());
        }

        let g = &self.geometry;
        for (name, v) in [
            ("fov", g.fov),
            ("target_radius", g.target_radius),
            ("camera_elevation", g.camera_elevation),
        ] {
            if !v.is_finite() || v <= 0.0 {
                return Err(format!("Geometry {} must be finite and positive, got {}", name, v));
            }
        }

        if !self.min_area.is_finite() || self.min_area < 0.0 {
            return Err("Minimum contour area must be finite and non-negative".to_string());
        }

        if (0..3).any(|c| self.band.low[c] > self.band.high[c]) {
            return Err("Color band low bound exceeds high bound".to_string());
        }

        if self.telemetry_channel.is_empty() {
            return Err("Telemetry channel must be named".to_string());
        }

        Ok(())
    }
}

/// Top-level node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub team: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ntmode: Option<String>,
    pub cameras: Vec<CameraConfig>,
    #[serde(rename = "switched cameras", default)]
    pub switched_cameras: Vec<SwitchedCameraConfig>,
    #[serde(default)]
    pub localizer: LocalizerConfig,
}

impl NodeConfig {
    /// Read, parse and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, VisionError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            VisionError::Config(format!("could not open '{}': {}", path.display(), e))
        })?;

        let config = Self::from_json(&text)
            .map_err(|e| VisionError::Config(format!("config error in '{}': {}", path.display(), e)))?;
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_json(text: &str) -> Result<Self, VisionError> {
        let config: NodeConfig = serde_json::from_str(text)?;
        config.validate().map_err(VisionError::Config)?;
        Ok(config)
    }

    /// Link role. Unrecognized values are reported and the client role kept.
    pub fn nt_mode(&self) -> NtMode {
        match self.ntmode.as_deref() {
            None => NtMode::Client,
            Some(s) if s.eq_ignore_ascii_case("client") => NtMode::Client,
            Some(s) if s.eq_ignore_ascii_case("server") => NtMode::Server,
            Some(s) => {
                warn!("could not understand ntmode value '{}'", s);
                NtMode::Client
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        for (i, camera) in self.cameras.iter().enumerate() {
            if camera.name.is_empty() {
                return Err(format!("camera {}: name must not be empty", i));
            }
            if camera.path.is_empty() {
                return Err(format!("camera '{}': path must not be empty", camera.name));
            }
        }

        for switched in &self.switched_cameras {
            if switched.name.is_empty() {
                return Err("switched camera name must not be empty".to_string());
            }
            if switched.key.is_empty() {
                return Err(format!("switched camera '{}': key must not be empty", switched.name));
            }
        }

        self.localizer.validate()?;

        // The localizer samples camera 0; its geometry is only valid at one size
        if let Some(declared) = self.cameras.first().and_then(CameraConfig::resolution) {
            if declared != self.localizer.resolution {
                return Err(format!(
                    "camera '{}' runs at {}x{} but the localizer expects {}x{}",
                    self.cameras[0].name,
                    declared.0,
                    declared.1,
                    self.localizer.resolution.0,
                    self.localizer.resolution.1
                ));
            }
        }

        Ok(())
    }
}
