// SPDX-License-Identifier: GPL-3.0-only

//! Virtual camera backend
//!
//! A software camera that renders a test pattern and encodes it as JPEG with
//! the quality fixed on its photo output. Failure modes (denied access,
//! missing rear camera, unopenable input, failing captures) are switchable so
//! the capture session can be driven end to end without hardware.
//!
//! A [`VirtualCameraProbe`] records what the backend was asked to do.

use super::types::*;
use super::{CameraBackend, CameraHandle};
use image::{Rgb, RgbImage};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

/// Switches for the virtual backend
#[derive(Debug, Clone)]
pub struct VirtualCameraOptions {
    pub authorization: AuthorizationStatus,
    pub devices: Vec<CameraDevice>,
    /// `open()` fails with `InputUnavailable`
    pub fail_open: bool,
    /// `lock_for_configuration()` fails
    pub fail_lock: bool,
    /// `set_focus_point()` fails after the lock is taken
    pub fail_focus: bool,
    /// Capture calls whose settings id is listed here fail
    pub fail_capture_ids: Vec<u64>,
    /// Simulated exposure time per still
    pub capture_delay: Duration,
    /// Simulated device wake-up time in `open()`
    pub open_delay: Duration,
}

impl Default for VirtualCameraOptions {
    fn default() -> Self {
        Self {
            authorization: AuthorizationStatus::Authorized,
            devices: vec![
                CameraDevice {
                    id: "virtual-back".to_string(),
                    name: "Virtual Rear Camera".to_string(),
                    position: CameraPosition::Back,
                    supports_focus_point: true,
                    has_flash: true,
                    max_resolution: (320, 240),
                },
                CameraDevice {
                    id: "virtual-front".to_string(),
                    name: "Virtual Front Camera".to_string(),
                    position: CameraPosition::Front,
                    supports_focus_point: false,
                    has_flash: false,
                    max_resolution: (160, 120),
                },
            ],
            fail_open: false,
            fail_lock: false,
            fail_focus: false,
            fail_capture_ids: Vec::new(),
            capture_delay: Duration::ZERO,
            open_delay: Duration::ZERO,
        }
    }
}

impl VirtualCameraOptions {
    /// Only a front camera is present
    pub fn without_rear_camera() -> Self {
        let mut options = Self::default();
        options.devices.retain(|d| d.position != CameraPosition::Back);
        options
    }

    pub fn denied() -> Self {
        Self {
            authorization: AuthorizationStatus::Denied,
            ..Self::default()
        }
    }
}

/// Observations recorded by the virtual backend
#[derive(Debug, Default, Clone)]
pub struct ProbeState {
    /// Every settings object handed to `capture_still`, in call order
    pub settings_seen: Vec<PhotoSettings>,
    pub opens: usize,
    pub feed_starts: usize,
    pub feed_stops: usize,
    pub locks: usize,
    pub unlocks: usize,
    pub focus_points: Vec<FocusPoint>,
    pub output: Option<PhotoOutputConfig>,
}

impl ProbeState {
    /// Number of times the hardware was asked for a still
    pub fn capture_calls(&self) -> usize {
        self.settings_seen.len()
    }
}

/// Shared view of what the virtual backend did
#[derive(Debug, Default, Clone)]
pub struct VirtualCameraProbe(Arc<Mutex<ProbeState>>);

impl VirtualCameraProbe {
    pub fn snapshot(&self) -> ProbeState {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, f: impl FnOnce(&mut ProbeState)) {
        let mut state = self.0.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state);
    }
}

/// Software camera backend
pub struct VirtualCameraBackend {
    options: VirtualCameraOptions,
    probe: VirtualCameraProbe,
}

impl VirtualCameraBackend {
    pub fn new(options: VirtualCameraOptions) -> Self {
        Self {
            options,
            probe: VirtualCameraProbe::default(),
        }
    }

    /// Handle for inspecting backend activity after it moved into a session
    pub fn probe(&self) -> VirtualCameraProbe {
        self.probe.clone()
    }
}

impl Default for VirtualCameraBackend {
    fn default() -> Self {
        Self::new(VirtualCameraOptions::default())
    }
}

impl CameraBackend for VirtualCameraBackend {
    fn authorization(&self) -> AuthorizationStatus {
        self.options.authorization
    }

    fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        self.options.devices.clone()
    }

    fn open(&mut self, device: &CameraDevice) -> BackendResult<Box<dyn CameraHandle>> {
        if !self.options.devices.iter().any(|d| d.id == device.id) {
            return Err(BackendError::DeviceNotFound(device.id.clone()));
        }
        if !self.options.open_delay.is_zero() {
            std::thread::sleep(self.options.open_delay);
        }
        if self.options.fail_open {
            return Err(BackendError::InputUnavailable(format!(
                "{} is busy",
                device.name
            )));
        }

        self.probe.record(|p| p.opens += 1);
        info!(device = %device.name, "Opened virtual camera");

        Ok(Box::new(VirtualCameraHandle {
            device: device.clone(),
            options: self.options.clone(),
            probe: self.probe.clone(),
            output: None,
            running: false,
            locked: false,
        }))
    }
}

struct VirtualCameraHandle {
    device: CameraDevice,
    options: VirtualCameraOptions,
    probe: VirtualCameraProbe,
    output: Option<PhotoOutputConfig>,
    running: bool,
    locked: bool,
}

impl CameraHandle for VirtualCameraHandle {
    fn attach_photo_output(&mut self, config: &PhotoOutputConfig) -> BackendResult<()> {
        let (max_w, max_h) = self.device.max_resolution;
        let config = PhotoOutputConfig {
            width: config.width.min(max_w),
            height: config.height.min(max_h),
            jpeg_quality: config.jpeg_quality.clamp(1, 100),
        };
        debug!(output = %config, "Attached virtual photo output");
        self.output = Some(config);
        self.probe.record(|p| p.output = Some(config));
        Ok(())
    }

    fn start_feed(&mut self) -> BackendResult<()> {
        self.running = true;
        self.probe.record(|p| p.feed_starts += 1);
        Ok(())
    }

    fn stop_feed(&mut self) {
        if self.running {
            self.running = false;
            self.probe.record(|p| p.feed_stops += 1);
        }
    }

    fn is_feed_running(&self) -> bool {
        self.running
    }

    fn capture_still(&mut self, settings: &PhotoSettings) -> BackendResult<Vec<u8>> {
        self.probe.record(|p| p.settings_seen.push(*settings));

        let output = self
            .output
            .ok_or_else(|| BackendError::OutputUnavailable("no photo output".to_string()))?;

        if !self.options.capture_delay.is_zero() {
            std::thread::sleep(self.options.capture_delay);
        }

        if self.options.fail_capture_ids.contains(&settings.id) {
            return Err(BackendError::CaptureFailed(format!(
                "sensor timeout (settings {})",
                settings.id
            )));
        }

        render_test_pattern(&output, settings)
    }

    fn supports_focus_point(&self) -> bool {
        self.device.supports_focus_point
    }

    fn has_flash(&self) -> bool {
        self.device.has_flash
    }

    fn lock_for_configuration(&mut self) -> BackendResult<()> {
        if self.options.fail_lock {
            return Err(BackendError::LockFailed("device busy".to_string()));
        }
        if self.locked {
            return Err(BackendError::LockFailed("already locked".to_string()));
        }
        self.locked = true;
        self.probe.record(|p| p.locks += 1);
        Ok(())
    }

    fn unlock_for_configuration(&mut self) {
        if self.locked {
            self.locked = false;
            self.probe.record(|p| p.unlocks += 1);
        }
    }

    fn set_focus_point(&mut self, point: FocusPoint) -> BackendResult<()> {
        if !self.locked {
            return Err(BackendError::LockFailed(
                "focus change without configuration lock".to_string(),
            ));
        }
        if self.options.fail_focus {
            return Err(BackendError::Other("focus motor stalled".to_string()));
        }
        self.probe.record(|p| p.focus_points.push(point));
        Ok(())
    }
}

/// Render a gradient stamped with the settings id and encode it as JPEG
fn render_test_pattern(
    output: &PhotoOutputConfig,
    settings: &PhotoSettings,
) -> BackendResult<Vec<u8>> {
    let (mut width, mut height) = (output.width.max(8), output.height.max(8));
    if matches!(settings.orientation.degrees(), 90 | 270) {
        std::mem::swap(&mut width, &mut height);
    }

    let tint = (settings.id.wrapping_mul(47) % 256) as u8;
    let image = RgbImage::from_fn(width, height, |x, y| {
        let r = ((x * 255) / width) as u8;
        let g = ((y * 255) / height) as u8;
        Rgb([r, g, tint])
    });

    let mut buffer = Vec::new();
    {
        let mut encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, output.jpeg_quality);
        encoder
            .encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ExtendedColorType::Rgb8,
            )
            .map_err(|e| BackendError::CaptureFailed(format!("JPEG encoding failed: {}", e)))?;
    }

    Ok(buffer)
}
