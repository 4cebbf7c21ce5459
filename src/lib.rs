// SPDX-License-Identifier: MPL-2.0

//! Fieldcam - geotagged photographic evidence capture
//!
//! This library captures photos from a camera, stores each one as an
//! immutable document inside a user-defined album, and geotags it once a
//! location fix is available.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Camera backend abstraction and the capture session
//! - [`storage`]: Album and document persistence (SQLite)
//! - [`location`]: Position sources and the location provider
//! - [`coordinator`]: Commits capture results as documents
//! - [`config`]: User configuration handling
//!
//! # Example
//!
//! ```no_run
//! use fieldcam::backends::camera::{CaptureSession, VirtualCameraBackend};
//! use fieldcam::backends::camera::session::SessionConfig;
//! use fieldcam::storage::{AlbumField, DocumentStore};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = DocumentStore::open_in_memory()?;
//! let album = store.create_album(&[(AlbumField::Title, "Site survey")])?;
//!
//! let session = CaptureSession::new(
//!     Box::new(VirtualCameraBackend::default()),
//!     SessionConfig::default(),
//! );
//! session.configure().await?;
//! let photo = session.capture().await?;
//! store.create_document(&photo.data, album)?;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod errors;
pub mod location;
pub mod storage;

// Re-export commonly used types
pub use backends::camera::{CaptureSession, SessionState};
pub use config::Config;
pub use coordinator::{CaptureCoordinator, CoordinatorEvent};
pub use errors::{AppError, AppResult, CaptureError, StoreError};
pub use location::{Fix, LocationProvider};
pub use storage::{Album, AlbumId, Document, DocumentId, DocumentStore};
