// SPDX-License-Identifier: GPL-3.0-only

//! Location provider
//!
//! Runs a position source on a background task, remembers the latest fix and
//! forwards it to the document store when a document asks for one.

use super::{Fix, PositionSource};
use crate::constants::DEFAULT_LOCATION_TIMEOUT;
use crate::errors::{StoreError, StoreResult};
use crate::storage::{DocumentId, DocumentStore};
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct LocationProvider {
    store: DocumentStore,
    latest: Arc<watch::Sender<Option<Fix>>>,
    timeout: Duration,
    feed: Mutex<Option<JoinHandle<()>>>,
}

impl LocationProvider {
    pub fn new(store: DocumentStore) -> Self {
        Self::with_timeout(store, DEFAULT_LOCATION_TIMEOUT)
    }

    /// `timeout` bounds how long [`add_location`](Self::add_location) waits for a first fix
    pub fn with_timeout(store: DocumentStore, timeout: Duration) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            store,
            latest: Arc::new(latest),
            timeout,
            feed: Mutex::new(None),
        }
    }

    /// Begin consuming `source`, replacing any previous feed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, source: Box<dyn PositionSource>) {
        let latest = Arc::clone(&self.latest);
        let task = tokio::spawn(async move {
            let mut fixes = source.fixes();
            while let Some(fix) = fixes.next().await {
                debug!(
                    latitude = fix.latitude,
                    longitude = fix.longitude,
                    accuracy = ?fix.accuracy_m,
                    "Location fix"
                );
                latest.send_replace(Some(fix));
            }
            debug!("Position source ended");
        });

        let previous = self
            .feed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
        info!("Location feed started");
    }

    /// Stop the feed; the last fix stays available
    pub fn stop(&self) {
        if let Some(task) = self.feed.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
            info!("Location feed stopped");
        }
    }

    /// Most recent fix, if any arrived yet
    pub fn latest_fix(&self) -> Option<Fix> {
        *self.latest.borrow()
    }

    /// Wait up to `timeout` for a fix
    pub async fn wait_for_fix(&self, timeout: Duration) -> Option<Fix> {
        let mut rx = self.latest.subscribe();
        match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
            Ok(Ok(fix)) => *fix,
            _ => None,
        }
    }

    /// Attach the latest fix to `document`, waiting briefly if there is none yet.
    ///
    /// Returns `true` when coordinates were written. Without a fix, or when the
    /// document was deleted meanwhile, the document keeps its current coordinates.
    pub async fn add_location(&self, document: DocumentId) -> StoreResult<bool> {
        let Some(fix) = self.wait_for_fix(self.timeout).await else {
            debug!(%document, "No location fix available");
            return Ok(false);
        };

        let store = self.store.clone();
        tokio::task::spawn_blocking(move || {
            store.attach_location(document, fix.latitude, fix.longitude)
        })
        .await
        .map_err(|e| StoreError::StorageUnavailable(e.to_string()))?
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Drop for LocationProvider {
    fn drop(&mut self) {
        if let Some(task) = self.feed.get_mut().ok().and_then(Option::take) {
            task.abort();
        }
    }
}

impl std::fmt::Debug for LocationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationProvider")
            .field("latest", &self.latest_fix())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
