// SPDX-License-Identifier: GPL-3.0-only

//! Capture session: hardware state machine driven from a private serial worker
//!
//! ```text
//! Idle ──configure──▶ Configuring ──▶ Ready ◀──▶ Capturing
//!                         │             │            │
//!                         ▼             └────stop────┴──▶ Stopped
//!                       Failed
//! ```
//!
//! All hardware work (configuration, focus, capture, feed start/stop) runs on
//! one dedicated thread in submission order. Callers never wait on that
//! thread: every operation returns a [`Completion`] that resolves when the
//! worker is done. Completed captures are additionally published on a
//! broadcast channel so any number of consumers can observe them.

use super::manager::CameraBackendManager;
use super::types::*;
use super::{CameraBackend, ConfigurationLock};
use crate::constants::{DEFAULT_CAPTURE_HEIGHT, DEFAULT_CAPTURE_WIDTH, DEFAULT_JPEG_QUALITY};
use crate::errors::{CaptureError, DeviceUnavailableReason, SessionResult};
use chrono::Utc;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info, warn};

/// Outcome of one capture, as published to subscribers
pub type CaptureResult = Result<CapturedPhoto, CaptureError>;

/// Capacity of the capture result channel
const RESULT_CHANNEL_CAPACITY: usize = 64;

/// Pending result of a session operation
///
/// Await it from async code, or call [`Completion::wait`] from a plain thread.
#[must_use = "a completion carries the operation's result"]
pub struct Completion<T> {
    rx: oneshot::Receiver<SessionResult<T>>,
}

impl<T> Completion<T> {
    fn ready(result: SessionResult<T>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }

    /// Block the current thread until the result arrives.
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait(self) -> SessionResult<T> {
        self.rx
            .blocking_recv()
            .unwrap_or(Err(CaptureError::SessionClosed))
    }
}

impl<T> Future for Completion<T> {
    type Output = SessionResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(CaptureError::SessionClosed)))
    }
}

/// Static session parameters
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Which camera to open
    pub position: CameraPosition,
    /// Still output requested at configure time
    pub output: PhotoOutputConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            position: CameraPosition::Back,
            output: PhotoOutputConfig {
                width: DEFAULT_CAPTURE_WIDTH,
                height: DEFAULT_CAPTURE_HEIGHT,
                jpeg_quality: DEFAULT_JPEG_QUALITY,
            },
        }
    }
}

/// State shared between the session handle and its worker
#[derive(Debug, Default)]
struct Shared {
    state: SessionState,
    /// Captures accepted but not yet delivered
    in_flight: usize,
    /// Bumped on every configure and stop so a stale configure can tell it lost
    generation: u64,
    flash: FlashMode,
    orientation: Orientation,
    /// Mirrors of worker-side device state, readable without touching hardware
    running: bool,
    device: Option<CameraDevice>,
}

type Reply<T> = oneshot::Sender<SessionResult<T>>;

enum SessionJob {
    Authorize { reply: Reply<bool> },
    Configure { generation: u64, reply: Reply<CameraDevice> },
    Start { reply: Reply<()> },
    Stop { reply: Reply<()> },
    Capture { settings: PhotoSettings, reply: Reply<CapturedPhoto> },
    Focus { point: FocusPoint, reply: Reply<()> },
}

/// Capture session
///
/// The session exclusively owns its camera through a [`CameraBackendManager`].
/// Dropping it shuts the worker down after queued jobs finish and releases the
/// device.
pub struct CaptureSession {
    shared: Arc<Mutex<Shared>>,
    jobs: Option<mpsc::Sender<SessionJob>>,
    worker: Option<JoinHandle<()>>,
    results: broadcast::Sender<CaptureResult>,
    next_settings_id: AtomicU64,
    config: SessionConfig,
}

impl CaptureSession {
    pub fn new(backend: Box<dyn CameraBackend>, config: SessionConfig) -> Self {
        let manager = CameraBackendManager::new(backend);
        let shared = Arc::new(Mutex::new(Shared::default()));
        let (results, _) = broadcast::channel(RESULT_CHANNEL_CAPACITY);
        let (jobs_tx, jobs_rx) = mpsc::channel();

        let worker = SessionWorker {
            manager,
            shared: Arc::clone(&shared),
            results: results.clone(),
            config,
        };
        let handle = thread::spawn(move || worker.run(jobs_rx));

        info!(position = %config.position, output = %config.output, "Capture session created");

        Self {
            shared,
            jobs: Some(jobs_tx),
            worker: Some(handle),
            results,
            next_settings_id: AtomicU64::new(1),
            config,
        }
    }

    fn lock_shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn submit<T>(&self, make: impl FnOnce(Reply<T>) -> SessionJob) -> Completion<T> {
        let (tx, rx) = oneshot::channel();
        match &self.jobs {
            Some(jobs) => {
                if jobs.send(make(tx)).is_err() {
                    error!("Capture session worker is gone");
                }
            }
            None => drop(tx),
        }
        Completion { rx }
    }

    pub fn state(&self) -> SessionState {
        self.lock_shared().state
    }

    /// Whether the hardware feed is running
    pub fn is_running(&self) -> bool {
        self.lock_shared().running
    }

    /// Device opened by the last successful configure
    pub fn current_device(&self) -> Option<CameraDevice> {
        self.lock_shared().device.clone()
    }

    /// Subscribe to capture results
    pub fn subscribe(&self) -> broadcast::Receiver<CaptureResult> {
        self.results.subscribe()
    }

    /// Ask whether camera access is granted
    pub fn request_authorization(&self) -> Completion<bool> {
        self.submit(|reply| SessionJob::Authorize { reply })
    }

    /// Discover the rear camera, open its input and attach the still output.
    ///
    /// Allowed from Idle, Stopped and Failed. A configured session must be
    /// stopped before it can be configured again.
    pub fn configure(&self) -> Completion<CameraDevice> {
        let generation = {
            let mut shared = self.lock_shared();
            match shared.state {
                SessionState::Idle | SessionState::Stopped | SessionState::Failed => {}
                SessionState::Configuring => {
                    return Completion::ready(Err(CaptureError::ConfigurationInProgress));
                }
                SessionState::Ready | SessionState::Capturing => {
                    return Completion::ready(Err(CaptureError::AlreadyConfigured));
                }
            }
            shared.state = SessionState::Configuring;
            shared.generation += 1;
            shared.generation
        };

        debug!(generation, "Configure requested");
        self.submit(|reply| SessionJob::Configure { generation, reply })
    }

    /// Begin the hardware feed. Idempotent while running.
    pub fn start(&self) -> Completion<()> {
        let state = self.state();
        match state {
            SessionState::Ready | SessionState::Capturing => {
                self.submit(|reply| SessionJob::Start { reply })
            }
            other => Completion::ready(Err(CaptureError::NotReady(other))),
        }
    }

    /// Release the hardware feed.
    ///
    /// Safe to call repeatedly. Captures already accepted still complete;
    /// new captures are rejected immediately.
    pub fn stop(&self) -> Completion<()> {
        {
            let mut shared = self.lock_shared();
            match shared.state {
                SessionState::Configuring | SessionState::Ready | SessionState::Capturing => {
                    info!(from = %shared.state, "Stopping capture session");
                    shared.state = SessionState::Stopped;
                    shared.generation += 1;
                }
                _ => return Completion::ready(Ok(())),
            }
        }
        self.submit(|reply| SessionJob::Stop { reply })
    }

    /// Take one photo.
    ///
    /// Flash mode and orientation are read now, at call time. Concurrent
    /// calls are queued on the worker, each with its own settings object.
    pub fn capture(&self) -> Completion<CapturedPhoto> {
        let mut shared = self.lock_shared();
        match shared.state {
            SessionState::Ready | SessionState::Capturing => {}
            other => {
                debug!(state = %other, "Capture rejected");
                return Completion::ready(Err(CaptureError::NotReady(other)));
            }
        }
        shared.state = SessionState::Capturing;
        shared.in_flight += 1;
        let settings = PhotoSettings {
            id: self.next_settings_id.fetch_add(1, Ordering::SeqCst),
            flash: shared.flash,
            orientation: shared.orientation,
        };

        // Queue while still holding the lock so settings ids follow queue order
        debug!(settings_id = settings.id, flash = ?settings.flash, "Capture queued");
        self.submit(|reply| SessionJob::Capture { settings, reply })
    }

    /// Focus on a point of interest
    pub fn focus(&self, point: FocusPoint) -> Completion<()> {
        let state = self.state();
        match state {
            SessionState::Ready | SessionState::Capturing => {
                self.submit(|reply| SessionJob::Focus { point, reply })
            }
            other => Completion::ready(Err(CaptureError::NotReady(other))),
        }
    }

    pub fn set_flash_mode(&self, mode: FlashMode) {
        self.lock_shared().flash = mode;
    }

    pub fn flash_mode(&self) -> FlashMode {
        self.lock_shared().flash
    }

    pub fn set_orientation(&self, orientation: Orientation) {
        self.lock_shared().orientation = orientation;
    }

    pub fn orientation(&self) -> Orientation {
        self.lock_shared().orientation
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        // Closing the queue ends the worker loop once pending jobs are done
        drop(self.jobs.take());
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            error!("Capture session worker panicked");
        }
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("state", &self.state())
            .field("config", &self.config)
            .field("device", &self.current_device().map(|d| d.name))
            .finish()
    }
}

/// Runs on the private serial thread
struct SessionWorker {
    manager: CameraBackendManager,
    shared: Arc<Mutex<Shared>>,
    results: broadcast::Sender<CaptureResult>,
    config: SessionConfig,
}

impl SessionWorker {
    fn lock_shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn run(self, jobs: mpsc::Receiver<SessionJob>) {
        debug!("Capture session worker started");

        while let Ok(job) = jobs.recv() {
            match job {
                SessionJob::Authorize { reply } => {
                    let authorized = self.manager.authorization().is_authorized();
                    let _ = reply.send(Ok(authorized));
                }
                SessionJob::Configure { generation, reply } => {
                    let _ = reply.send(self.configure(generation));
                }
                SessionJob::Start { reply } => {
                    let _ = reply.send(self.start());
                }
                SessionJob::Stop { reply } => {
                    self.release();
                    let _ = reply.send(Ok(()));
                }
                SessionJob::Capture { settings, reply } => {
                    let _ = reply.send(self.capture(settings));
                }
                SessionJob::Focus { point, reply } => {
                    let _ = reply.send(self.focus(point));
                }
            }
        }

        self.release();
        info!("Capture session worker exiting");
    }

    fn release(&self) {
        self.manager.release();
        let mut shared = self.lock_shared();
        shared.running = false;
        shared.device = None;
    }

    fn configure(&self, generation: u64) -> SessionResult<CameraDevice> {
        let result = if self.manager.authorization().is_authorized() {
            self.manager
                .open_camera(self.config.position, &self.config.output)
                .map_err(CaptureError::from)
        } else {
            Err(CaptureError::DeviceUnavailable(
                DeviceUnavailableReason::AuthorizationDenied,
            ))
        };

        let superseded = {
            let mut shared = self.lock_shared();
            if shared.generation != generation || shared.state != SessionState::Configuring {
                true
            } else {
                match &result {
                    Ok(device) => {
                        shared.state = SessionState::Ready;
                        shared.device = Some(device.clone());
                    }
                    Err(_) => shared.state = SessionState::Failed,
                }
                false
            }
        };

        if superseded {
            warn!("Session stopped during configuration, releasing device");
            self.release();
            return Err(CaptureError::SessionStopped);
        }

        match &result {
            Ok(device) => info!(device = %device.name, "Capture session ready"),
            Err(e) => error!(error = %e, "Capture session configuration failed"),
        }
        result
    }

    fn start(&self) -> SessionResult<()> {
        let state = self.lock_shared().state;
        if !matches!(state, SessionState::Ready | SessionState::Capturing) {
            return Err(CaptureError::SessionStopped);
        }

        self.manager.with_handle(|handle| -> SessionResult<()> {
            if handle.is_feed_running() {
                debug!("Camera feed already running");
                return Ok(());
            }
            handle.start_feed().map_err(CaptureError::from)?;
            info!("Camera feed started");
            Ok(())
        })?;
        self.lock_shared().running = true;
        Ok(())
    }

    fn capture(&self, settings: PhotoSettings) -> CaptureResult {
        let result: CaptureResult = self.manager.with_handle(|handle| {
            let mut settings = settings;
            if settings.flash != FlashMode::Off && !handle.has_flash() {
                warn!(settings_id = settings.id, "Device has no flash, capturing without");
                settings.flash = FlashMode::Off;
            }
            let data = handle.capture_still(&settings).map_err(CaptureError::from)?;
            Ok(CapturedPhoto {
                data: Arc::from(data),
                settings,
                captured_at: Utc::now(),
            })
        });

        {
            let mut shared = self.lock_shared();
            shared.in_flight = shared.in_flight.saturating_sub(1);
            if shared.in_flight == 0 && shared.state == SessionState::Capturing {
                shared.state = SessionState::Ready;
            }
        }

        match &result {
            Ok(photo) => debug!(
                settings_id = photo.settings.id,
                bytes = photo.data.len(),
                "Photo captured"
            ),
            Err(e) => error!(settings_id = settings.id, error = %e, "Photo capture failed"),
        }

        // No subscribers is fine
        let _ = self.results.send(result.clone());
        result
    }

    fn focus(&self, point: FocusPoint) -> SessionResult<()> {
        self.manager.with_handle(|handle| -> SessionResult<()> {
            if !handle.supports_focus_point() {
                return Err(CaptureError::FocusUnsupported);
            }
            let mut lock = ConfigurationLock::acquire(handle)?;
            lock.device().set_focus_point(point)?;
            debug!(x = point.x, y = point.y, "Focus point set");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::virtual_device::VirtualCameraProbe;
    use crate::backends::camera::{VirtualCameraBackend, VirtualCameraOptions};
    use std::time::Duration;

    fn session_with(options: VirtualCameraOptions) -> (CaptureSession, VirtualCameraProbe) {
        let backend = VirtualCameraBackend::new(options);
        let probe = backend.probe();
        (
            CaptureSession::new(Box::new(backend), SessionConfig::default()),
            probe,
        )
    }

    #[test]
    fn test_configure_then_capture() {
        let (session, probe) = session_with(VirtualCameraOptions::default());
        assert_eq!(session.state(), SessionState::Idle);

        let device = session.configure().wait().unwrap();
        assert_eq!(device.position, CameraPosition::Back);
        assert_eq!(session.state(), SessionState::Ready);

        session.start().wait().unwrap();
        assert!(session.is_running());

        let photo = session.capture().wait().unwrap();
        assert_eq!(&photo.data[..2], &[0xFF, 0xD8]);
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(probe.snapshot().capture_calls(), 1);
    }

    #[test]
    fn test_configure_twice_rejected() {
        let (session, probe) = session_with(VirtualCameraOptions::default());
        session.configure().wait().unwrap();
        assert_eq!(
            session.configure().wait(),
            Err(CaptureError::AlreadyConfigured)
        );
        assert_eq!(probe.snapshot().opens, 1);
    }

    #[test]
    fn test_overlapping_configure_rejected() {
        let (session, _probe) = session_with(VirtualCameraOptions::default());
        let first = session.configure();
        let second = session.configure();
        assert_eq!(second.wait(), Err(CaptureError::ConfigurationInProgress));
        assert!(first.wait().is_ok());
    }

    #[test]
    fn test_no_rear_camera_fails_and_rejects_capture() {
        let (session, probe) = session_with(VirtualCameraOptions::without_rear_camera());
        let result = session.configure().wait();
        assert_eq!(
            result,
            Err(CaptureError::DeviceUnavailable(
                DeviceUnavailableReason::NoDeviceFound
            ))
        );
        assert_eq!(session.state(), SessionState::Failed);

        let capture = session.capture().wait();
        assert_eq!(
            capture.unwrap_err(),
            CaptureError::NotReady(SessionState::Failed)
        );
        assert_eq!(probe.snapshot().capture_calls(), 0);
    }

    #[test]
    fn test_authorization_denied_is_terminal() {
        let (session, probe) = session_with(VirtualCameraOptions::denied());
        assert_eq!(session.request_authorization().wait(), Ok(false));

        let err = session.configure().wait().unwrap_err();
        assert!(err.is_terminal());
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(probe.snapshot().opens, 0);
    }

    #[test]
    fn test_input_unavailable() {
        let (session, _probe) = session_with(VirtualCameraOptions {
            fail_open: true,
            ..Default::default()
        });
        let err = session.configure().wait().unwrap_err();
        assert!(matches!(err, CaptureError::InputUnavailable(_)));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[test]
    fn test_start_requires_ready() {
        let (session, _probe) = session_with(VirtualCameraOptions::default());
        assert_eq!(
            session.start().wait(),
            Err(CaptureError::NotReady(SessionState::Idle))
        );
    }

    #[test]
    fn test_start_is_idempotent() {
        let (session, probe) = session_with(VirtualCameraOptions::default());
        session.configure().wait().unwrap();
        session.start().wait().unwrap();
        session.start().wait().unwrap();
        assert_eq!(probe.snapshot().feed_starts, 1);
    }

    #[test]
    fn test_stop_twice_and_reconfigure() {
        let (session, probe) = session_with(VirtualCameraOptions::default());
        session.configure().wait().unwrap();
        session.start().wait().unwrap();

        session.stop().wait().unwrap();
        session.stop().wait().unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(!session.is_running());
        assert_eq!(probe.snapshot().feed_stops, 1);

        assert_eq!(
            session.capture().wait().unwrap_err(),
            CaptureError::NotReady(SessionState::Stopped)
        );

        session.configure().wait().unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(probe.snapshot().opens, 2);
    }

    #[test]
    fn test_stop_during_configure() {
        let (session, _probe) = session_with(VirtualCameraOptions {
            open_delay: Duration::from_millis(50),
            ..Default::default()
        });
        let pending = session.configure();
        session.stop().wait().unwrap();
        assert_eq!(pending.wait(), Err(CaptureError::SessionStopped));
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(session.current_device().is_none());
    }

    #[test]
    fn test_in_flight_capture_completes_after_stop() {
        let (session, _probe) = session_with(VirtualCameraOptions {
            capture_delay: Duration::from_millis(30),
            ..Default::default()
        });
        session.configure().wait().unwrap();
        let pending = session.capture();
        let stopped = session.stop();
        assert!(pending.wait().is_ok());
        stopped.wait().unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn test_flash_falls_back_without_hardware() {
        let mut options = VirtualCameraOptions::default();
        for device in &mut options.devices {
            device.has_flash = false;
        }
        let (session, probe) = session_with(options);
        session.configure().wait().unwrap();
        session.set_flash_mode(FlashMode::On);
        let photo = session.capture().wait().unwrap();
        assert_eq!(photo.settings.flash, FlashMode::Off);
        assert_eq!(probe.snapshot().settings_seen[0].flash, FlashMode::Off);
    }

    #[test]
    fn test_focus_sets_point_and_releases_lock() {
        let (session, probe) = session_with(VirtualCameraOptions::default());
        session.configure().wait().unwrap();
        let point = FocusPoint::new(0.25, 0.75);
        assert_eq!(session.focus(point).wait(), Ok(()));

        let snapshot = probe.snapshot();
        assert_eq!(snapshot.locks, 1);
        assert_eq!(snapshot.unlocks, 1);
        assert_eq!(snapshot.focus_points, vec![point]);
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[test]
    fn test_focus_releases_lock_on_failure() {
        let (session, probe) = session_with(VirtualCameraOptions {
            fail_focus: true,
            ..Default::default()
        });
        session.configure().wait().unwrap();
        assert!(session.focus(FocusPoint::new(0.3, 0.7)).wait().is_err());
        let snapshot = probe.snapshot();
        assert_eq!(snapshot.locks, 1);
        assert_eq!(snapshot.unlocks, 1);
    }

    #[test]
    fn test_focus_lock_failure_surfaced() {
        let (session, probe) = session_with(VirtualCameraOptions {
            fail_lock: true,
            ..Default::default()
        });
        session.configure().wait().unwrap();
        let err = session.focus(FocusPoint::new(0.5, 0.5)).wait().unwrap_err();
        assert!(matches!(err, CaptureError::LockFailed(_)));
        assert_eq!(probe.snapshot().unlocks, 0);
    }

    #[test]
    fn test_focus_unsupported() {
        let mut options = VirtualCameraOptions::default();
        for device in &mut options.devices {
            device.supports_focus_point = false;
        }
        let (session, probe) = session_with(options);
        session.configure().wait().unwrap();
        assert_eq!(
            session.focus(FocusPoint::new(0.5, 0.5)).wait(),
            Err(CaptureError::FocusUnsupported)
        );
        assert_eq!(probe.snapshot().locks, 0);
    }

    #[test]
    fn test_capture_failure_surfaced() {
        let (session, _probe) = session_with(VirtualCameraOptions {
            fail_capture_ids: vec![1],
            ..Default::default()
        });
        session.configure().wait().unwrap();
        let mut results = session.subscribe();

        let err = session.capture().wait().unwrap_err();
        assert!(matches!(err, CaptureError::CaptureFailed(_)));
        assert!(results.try_recv().unwrap().is_err());
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[test]
    fn test_queued_jobs_drained_on_drop() {
        let (session, _probe) = session_with(VirtualCameraOptions::default());
        let pending = session.request_authorization();
        drop(session);
        // Queued jobs are drained before the worker exits
        assert_eq!(pending.wait(), Ok(true));
    }
}
