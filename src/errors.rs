// SPDX-License-Identifier: MPL-2.0

//! Error types for the capture and storage core
//!
//! Every failure is delivered to its immediate caller through an explicit
//! result. Hardware faults arrive as [`CaptureError`], persistence faults as
//! [`StoreError`]; [`AppError`] unifies both for the coordinator and the CLI.

use crate::backends::camera::types::{BackendError, SessionState};
use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for capture session operations
pub type SessionResult<T> = Result<T, CaptureError>;

/// Result type alias for document store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Capture session errors
    Capture(CaptureError),
    /// Document store errors
    Store(StoreError),
    /// No album is selected to receive captures
    NoActiveAlbum,
    /// Configuration errors
    Config(String),
}

/// Why the capture device cannot be used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceUnavailableReason {
    /// The user denied camera access
    AuthorizationDenied,
    /// No rear-facing capture device exists
    NoDeviceFound,
}

/// Capture session errors
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureError {
    /// No capture hardware or access denied; terminal until a manual retry
    DeviceUnavailable(DeviceUnavailableReason),
    /// The device exists but its input channel could not be opened
    InputUnavailable(String),
    /// Transient setup failure, surfaced once and not retried
    ConfigurationFailed(String),
    /// `configure()` while the session is already configured
    AlreadyConfigured,
    /// `configure()` while another configuration is still running
    ConfigurationInProgress,
    /// Operation issued from a state that does not allow it
    NotReady(SessionState),
    /// The session was stopped before the operation could finish
    SessionStopped,
    /// The device does not support point-of-interest focus
    FocusUnsupported,
    /// The device configuration lock could not be taken
    LockFailed(String),
    /// The hardware failed to produce a photo
    CaptureFailed(String),
    /// The session worker is gone
    SessionClosed,
}

/// Document store errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Unknown album or document id
    NotFound(String),
    /// Album field name outside the fixed schema
    UnknownField(String),
    /// Latitude/longitude not finite or outside ±90/±180
    InvalidCoordinate(String),
    /// The underlying database cannot be opened or used
    StorageUnavailable(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Capture(e) => write!(f, "Capture error: {}", e),
            AppError::Store(e) => write!(f, "Storage error: {}", e),
            AppError::NoActiveAlbum => write!(f, "No active album selected"),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl fmt::Display for DeviceUnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceUnavailableReason::AuthorizationDenied => write!(f, "camera access denied"),
            DeviceUnavailableReason::NoDeviceFound => write!(f, "no rear camera found"),
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::DeviceUnavailable(reason) => write!(f, "Device unavailable: {}", reason),
            CaptureError::InputUnavailable(msg) => write!(f, "Input unavailable: {}", msg),
            CaptureError::ConfigurationFailed(msg) => write!(f, "Configuration failed: {}", msg),
            CaptureError::AlreadyConfigured => write!(f, "Session is already configured"),
            CaptureError::ConfigurationInProgress => write!(f, "Configuration already in progress"),
            CaptureError::NotReady(state) => write!(f, "Session not ready (state: {})", state),
            CaptureError::SessionStopped => write!(f, "Session was stopped"),
            CaptureError::FocusUnsupported => write!(f, "Device does not support focus point"),
            CaptureError::LockFailed(msg) => write!(f, "Device lock failed: {}", msg),
            CaptureError::CaptureFailed(msg) => write!(f, "Capture failed: {}", msg),
            CaptureError::SessionClosed => write!(f, "Capture session closed"),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(what) => write!(f, "Not found: {}", what),
            StoreError::UnknownField(name) => write!(f, "Unknown album field: {}", name),
            StoreError::InvalidCoordinate(msg) => write!(f, "Invalid coordinate: {}", msg),
            StoreError::StorageUnavailable(msg) => write!(f, "Storage unavailable: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for CaptureError {}
impl std::error::Error for StoreError {}

impl From<CaptureError> for AppError {
    fn from(err: CaptureError) -> Self {
        AppError::Capture(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::StorageUnavailable(err.to_string())
    }
}

impl From<BackendError> for CaptureError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::DeviceNotFound(_) => {
                CaptureError::DeviceUnavailable(DeviceUnavailableReason::NoDeviceFound)
            }
            BackendError::InputUnavailable(msg) => CaptureError::InputUnavailable(msg),
            BackendError::LockFailed(msg) => CaptureError::LockFailed(msg),
            BackendError::CaptureFailed(msg) => CaptureError::CaptureFailed(msg),
            BackendError::NotRunning => CaptureError::SessionStopped,
            other => CaptureError::ConfigurationFailed(other.to_string()),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

impl CaptureError {
    /// Whether this failure is terminal until the user retries manually
    pub fn is_terminal(&self) -> bool {
        matches!(self, CaptureError::DeviceUnavailable(_))
    }
}
