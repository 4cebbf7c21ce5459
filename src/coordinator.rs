// SPDX-License-Identifier: GPL-3.0-only

//! Capture coordinator
//!
//! Turns capture results into stored documents. Each successful capture is
//! committed to the active album, then a location fix is attached in the
//! background. Commit failures discard the bytes and are reported once; there
//! is no retry queue.
//!
//! Progress is published as [`CoordinatorEvent`]s for the presentation layer.

use crate::backends::camera::{CaptureResult, CaptureSession};
use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::errors::{AppError, AppResult, CaptureError, StoreError};
use crate::location::LocationProvider;
use crate::storage::{AlbumId, DocumentId, DocumentStore};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What happened to a capture on its way into the store
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    /// A capture was committed as a new document
    DocumentCreated {
        document: DocumentId,
        album: AlbumId,
        bytes: usize,
    },
    /// A location fix was written to a document
    LocationAttached { document: DocumentId },
    /// No fix arrived in time, or the document was deleted first
    LocationUnresolved { document: DocumentId },
    /// The fix could not be written; the document keeps default coordinates
    LocationFailed {
        document: DocumentId,
        error: StoreError,
    },
    /// The camera failed to produce a photo
    CaptureFailed(CaptureError),
    /// A photo was taken but could not be stored; its bytes are gone
    CommitFailed(AppError),
}

struct Inner {
    store: DocumentStore,
    location: Arc<LocationProvider>,
    active_album: Mutex<Option<AlbumId>>,
    events: broadcast::Sender<CoordinatorEvent>,
}

/// Glue between a capture session and the document store
///
/// Cloning shares the same coordinator.
#[derive(Clone)]
pub struct CaptureCoordinator {
    inner: Arc<Inner>,
}

impl CaptureCoordinator {
    pub fn new(store: DocumentStore, location: Arc<LocationProvider>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                store,
                location,
                active_album: Mutex::new(None),
                events,
            }),
        }
    }

    /// Album that receives new captures
    pub fn set_active_album(&self, album: Option<AlbumId>) {
        *self
            .inner
            .active_album
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = album;
        debug!(album = ?album, "Active album changed");
    }

    pub fn active_album(&self) -> Option<AlbumId> {
        *self
            .inner
            .active_album
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.inner.events.subscribe()
    }

    fn publish(&self, event: CoordinatorEvent) {
        // Nobody listening is fine
        let _ = self.inner.events.send(event);
    }

    /// Store `image` as a new document in the active album.
    ///
    /// Returns once the document is committed. The location lookup continues
    /// in the background and never delays the next commit.
    pub async fn commit_capture(&self, image: Arc<[u8]>) -> AppResult<DocumentId> {
        let result = self.create_document(image).await;

        match &result {
            Ok((document, album, bytes)) => {
                info!(%document, %album, bytes, "Capture committed");
                self.publish(CoordinatorEvent::DocumentCreated {
                    document: *document,
                    album: *album,
                    bytes: *bytes,
                });
                self.schedule_location(*document);
            }
            Err(e) => {
                error!(error = %e, "Capture discarded");
                self.publish(CoordinatorEvent::CommitFailed(e.clone()));
            }
        }

        result.map(|(document, _, _)| document)
    }

    async fn create_document(&self, image: Arc<[u8]>) -> AppResult<(DocumentId, AlbumId, usize)> {
        let album = self.active_album().ok_or(AppError::NoActiveAlbum)?;
        let store = self.inner.store.clone();
        let bytes = image.len();

        let document = tokio::task::spawn_blocking(move || store.create_document(&image, album))
            .await
            .map_err(|e| StoreError::StorageUnavailable(e.to_string()))??;

        Ok((document, album, bytes))
    }

    fn schedule_location(&self, document: DocumentId) {
        let coordinator = self.clone();
        tokio::spawn(async move {
            match coordinator.inner.location.add_location(document).await {
                Ok(true) => {
                    coordinator.publish(CoordinatorEvent::LocationAttached { document });
                }
                Ok(false) => {
                    debug!(%document, "Document left without location");
                    coordinator.publish(CoordinatorEvent::LocationUnresolved { document });
                }
                Err(error) => {
                    warn!(%document, %error, "Failed to attach location");
                    coordinator.publish(CoordinatorEvent::LocationFailed { document, error });
                }
            }
        });
    }

    /// Commit every capture `session` publishes from now on.
    ///
    /// Captures are committed one after another in the order the session
    /// delivers them. The task ends when the session is dropped.
    pub fn spawn(&self, session: &CaptureSession) -> JoinHandle<()> {
        let mut results = session.subscribe();
        let coordinator = self.clone();

        tokio::spawn(async move {
            debug!("Coordinator listening for captures");
            loop {
                match results.recv().await {
                    Ok(result) => coordinator.handle_result(result).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        error!(missed, "Coordinator fell behind, captures lost");
                        coordinator.publish(CoordinatorEvent::CaptureFailed(
                            CaptureError::CaptureFailed(format!(
                                "{} captures dropped before commit",
                                missed
                            )),
                        ));
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Capture session closed, coordinator exiting");
        })
    }

    async fn handle_result(&self, result: CaptureResult) {
        match result {
            Ok(photo) => {
                // Failures are published by commit_capture
                let _ = self.commit_capture(photo.data).await;
            }
            Err(e) => {
                warn!(error = %e, "Capture failed");
                self.publish(CoordinatorEvent::CaptureFailed(e));
            }
        }
    }
}

impl std::fmt::Debug for CaptureCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureCoordinator")
            .field("active_album", &self.active_album())
            .finish_non_exhaustive()
    }
}
