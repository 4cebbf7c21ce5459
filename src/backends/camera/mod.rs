// SPDX-License-Identifier: MPL-2.0

//! Camera backend abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │ Presentation / CLI  │
//! └──────────┬──────────┘
//!            │  Completion<T>, broadcast results
//!            ▼
//! ┌─────────────────────┐
//! │   CaptureSession    │  ← State machine + private serial worker thread
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │ CameraBackendManager│  ← Owns the backend and the exclusive device handle
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │ CameraBackend Trait │  ← Discovery, authorization, open
//! └──────────┬──────────┘
//!            │
//!            ▼
//!      ┌──────────┐
//!      │ Virtual  │  ← Software implementation
//!      └──────────┘
//! ```

pub mod manager;
pub mod session;
pub mod types;
pub mod virtual_device;

pub use manager::CameraBackendManager;
pub use session::{CaptureResult, CaptureSession, Completion};
pub use types::*;
pub use virtual_device::{VirtualCameraBackend, VirtualCameraOptions};

/// Platform camera service
///
/// Implementations enumerate devices, report access permission, and open a
/// device for exclusive use.
pub trait CameraBackend: Send {
    /// Current camera access permission
    fn authorization(&self) -> AuthorizationStatus;

    /// Enumerate available cameras
    fn enumerate_cameras(&self) -> Vec<CameraDevice>;

    /// Open the input channel of a device
    ///
    /// The returned handle owns the device until it is dropped.
    fn open(&mut self, device: &CameraDevice) -> BackendResult<Box<dyn CameraHandle>>;
}

/// An opened camera device with its input and still-image output channels
pub trait CameraHandle: Send {
    /// Attach a still-image output channel
    fn attach_photo_output(&mut self, config: &PhotoOutputConfig) -> BackendResult<()>;

    /// Begin the hardware feed
    fn start_feed(&mut self) -> BackendResult<()>;

    /// Release the hardware feed
    fn stop_feed(&mut self);

    fn is_feed_running(&self) -> bool;

    /// Take one still photo with the given settings
    fn capture_still(&mut self, settings: &PhotoSettings) -> BackendResult<Vec<u8>>;

    fn supports_focus_point(&self) -> bool;

    fn has_flash(&self) -> bool;

    /// Take the exclusive device-configuration lock.
    ///
    /// Prefer [`ConfigurationLock::acquire`], which releases it on drop.
    fn lock_for_configuration(&mut self) -> BackendResult<()>;

    fn unlock_for_configuration(&mut self);

    /// Set the autofocus point of interest. Requires the configuration lock.
    fn set_focus_point(&mut self, point: FocusPoint) -> BackendResult<()>;
}

/// Scoped device-configuration lock
///
/// Released when dropped, on every exit path.
pub struct ConfigurationLock<'a> {
    handle: &'a mut dyn CameraHandle,
}

impl<'a> ConfigurationLock<'a> {
    pub fn acquire(handle: &'a mut dyn CameraHandle) -> BackendResult<Self> {
        handle.lock_for_configuration()?;
        Ok(Self { handle })
    }

    /// Access the locked device
    pub fn device(&mut self) -> &mut dyn CameraHandle {
        &mut *self.handle
    }
}

impl Drop for ConfigurationLock<'_> {
    fn drop(&mut self) {
        self.handle.unlock_for_configuration();
    }
}

/// Pick the first camera at the requested position
pub fn find_camera(devices: &[CameraDevice], position: CameraPosition) -> Option<&CameraDevice> {
    devices.iter().find(|d| d.position == position)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str, position: CameraPosition) -> CameraDevice {
        CameraDevice {
            id: id.to_string(),
            name: id.to_string(),
            position,
            supports_focus_point: false,
            has_flash: false,
            max_resolution: (640, 480),
        }
    }

    #[test]
    fn test_find_camera_by_position() {
        let devices = vec![
            device("front0", CameraPosition::Front),
            device("back0", CameraPosition::Back),
            device("back1", CameraPosition::Back),
        ];
        let found = find_camera(&devices, CameraPosition::Back).unwrap();
        assert_eq!(found.id, "back0");
        assert!(find_camera(&devices, CameraPosition::External).is_none());
    }
}
