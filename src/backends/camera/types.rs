// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where a camera is mounted relative to the display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CameraPosition {
    Front,
    /// Rear-facing camera (used for evidence capture)
    #[default]
    Back,
    External,
}

impl std::fmt::Display for CameraPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraPosition::Front => write!(f, "front"),
            CameraPosition::Back => write!(f, "back"),
            CameraPosition::External => write!(f, "external"),
        }
    }
}

/// Camera access permission as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthorizationStatus {
    #[default]
    Authorized,
    Denied,
}

impl AuthorizationStatus {
    pub fn is_authorized(&self) -> bool {
        matches!(self, AuthorizationStatus::Authorized)
    }
}

/// Represents a camera device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevice {
    pub id: String,
    pub name: String,
    pub position: CameraPosition,
    /// Device accepts a point-of-interest for autofocus
    pub supports_focus_point: bool,
    pub has_flash: bool,
    /// Largest still resolution (width, height)
    pub max_resolution: (u32, u32),
}

/// Flash mode applied to a single still capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlashMode {
    #[default]
    Off,
    On,
    /// Device decides based on scene brightness
    Auto,
}

impl std::str::FromStr for FlashMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(FlashMode::Off),
            "on" => Ok(FlashMode::On),
            "auto" => Ok(FlashMode::Auto),
            other => Err(format!("unknown flash mode '{}'", other)),
        }
    }
}

/// Device orientation at the moment of capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
}

impl Orientation {
    /// Clockwise rotation in degrees to apply to the sensor image
    pub fn degrees(&self) -> u32 {
        match self {
            Orientation::Portrait => 90,
            Orientation::PortraitUpsideDown => 270,
            Orientation::LandscapeLeft => 0,
            Orientation::LandscapeRight => 180,
        }
    }
}

/// Normalised point of interest, (0,0) top-left to (1,1) bottom-right
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusPoint {
    pub x: f32,
    pub y: f32,
}

impl FocusPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x: x.clamp(0.0, 1.0),
            y: y.clamp(0.0, 1.0),
        }
    }
}

/// Still-image output channel configuration, fixed at configure time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhotoOutputConfig {
    pub width: u32,
    pub height: u32,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
}

impl std::fmt::Display for PhotoOutputConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{} q{}", self.width, self.height, self.jpeg_quality)
    }
}

/// Per-capture settings. A fresh instance with a unique id is built for
/// every capture call; backends must never see the same id twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoSettings {
    pub id: u64,
    pub flash: FlashMode,
    pub orientation: Orientation,
}

/// A completed still capture
#[derive(Debug, Clone)]
pub struct CapturedPhoto {
    /// Encoded image bytes as produced by the output channel
    pub data: Arc<[u8]>,
    pub settings: PhotoSettings,
    pub captured_at: DateTime<Utc>,
}

/// State of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Configuring,
    Ready,
    Capturing,
    Stopped,
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Configuring => "configuring",
            SessionState::Ready => "ready",
            SessionState::Capturing => "capturing",
            SessionState::Stopped => "stopped",
            SessionState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Camera device not found
    DeviceNotFound(String),
    /// Device input could not be opened
    InputUnavailable(String),
    /// Output channel could not be attached
    OutputUnavailable(String),
    /// Device configuration lock could not be taken
    LockFailed(String),
    /// Still capture failed
    CaptureFailed(String),
    /// Operation needs a running feed
    NotRunning,
    /// Other errors
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::InputUnavailable(msg) => write!(f, "Input unavailable: {}", msg),
            BackendError::OutputUnavailable(msg) => write!(f, "Output unavailable: {}", msg),
            BackendError::LockFailed(msg) => write!(f, "Lock failed: {}", msg),
            BackendError::CaptureFailed(msg) => write!(f, "Capture failed: {}", msg),
            BackendError::NotRunning => write!(f, "Camera feed is not running"),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flash_mode_parse() {
        assert_eq!("AUTO".parse::<FlashMode>(), Ok(FlashMode::Auto));
        assert!("strobe".parse::<FlashMode>().is_err());
    }

    #[test]
    fn test_focus_point_clamped() {
        let p = FocusPoint::new(1.5, -0.2);
        assert_eq!(p, FocusPoint { x: 1.0, y: 0.0 });
    }
}
