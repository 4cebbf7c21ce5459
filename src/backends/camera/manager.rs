// SPDX-License-Identifier: GPL-3.0-only

//! Camera backend lifecycle manager
//!
//! The manager provides:
//! - Exclusive ownership of the opened device handle
//! - Device discovery and opening (input + still output)
//! - Thread-safe access to the current device description

use super::types::*;
use super::{CameraBackend, CameraHandle, find_camera};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Internal manager state
struct ManagerState {
    /// The platform camera service
    backend: Box<dyn CameraBackend>,
    /// Opened device, at most one at a time
    handle: Option<Box<dyn CameraHandle>>,
    /// Description of the opened device
    device: Option<CameraDevice>,
}

/// Camera backend manager
///
/// Owns the backend and the device handle. Cloning shares the same state;
/// the capture session's worker thread is the only writer.
#[derive(Clone)]
pub struct CameraBackendManager {
    state: Arc<Mutex<ManagerState>>,
}

impl CameraBackendManager {
    pub fn new(backend: Box<dyn CameraBackend>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManagerState {
                backend,
                handle: None,
                device: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn authorization(&self) -> AuthorizationStatus {
        self.lock().backend.authorization()
    }

    /// Discover the camera at `position`, open its input and attach a still output.
    ///
    /// Any previously opened device is released first.
    pub fn open_camera(
        &self,
        position: CameraPosition,
        output: &PhotoOutputConfig,
    ) -> BackendResult<CameraDevice> {
        let mut state = self.lock();
        Self::release_locked(&mut state);

        let cameras = state.backend.enumerate_cameras();
        let device = find_camera(&cameras, position)
            .cloned()
            .ok_or_else(|| BackendError::DeviceNotFound(format!("no {} camera", position)))?;

        info!(device = %device.name, output = %output, "Opening camera");

        let mut handle = state.backend.open(&device)?;
        handle.attach_photo_output(output)?;

        state.handle = Some(handle);
        state.device = Some(device.clone());
        Ok(device)
    }

    /// Stop the feed and drop the device handle
    pub fn release(&self) {
        let mut state = self.lock();
        Self::release_locked(&mut state);
    }

    fn release_locked(state: &mut ManagerState) {
        if let Some(mut handle) = state.handle.take() {
            handle.stop_feed();
            if let Some(device) = state.device.take() {
                debug!(device = %device.name, "Released camera");
            }
        }
    }

    /// Run `f` against the opened device
    ///
    /// Fails with [`BackendError::NotRunning`] when no device is open.
    pub fn with_handle<T, E>(
        &self,
        f: impl FnOnce(&mut dyn CameraHandle) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<BackendError>,
    {
        let mut state = self.lock();
        match state.handle.as_mut() {
            Some(handle) => f(handle.as_mut()),
            None => {
                warn!("Camera operation without an opened device");
                Err(BackendError::NotRunning.into())
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.lock().handle.is_some()
    }

    pub fn is_feed_running(&self) -> bool {
        self.lock()
            .handle
            .as_ref()
            .is_some_and(|h| h.is_feed_running())
    }

    /// Get current device
    pub fn current_device(&self) -> Option<CameraDevice> {
        self.lock().device.clone()
    }
}

impl std::fmt::Debug for CameraBackendManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("CameraBackendManager")
            .field("device", &state.device.as_ref().map(|d| d.name.as_str()))
            .field("open", &state.handle.is_some())
            .finish()
    }
}
