// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Managing albums
//! - Capturing geotagged photos into an album
//! - Listing and exporting documents

use fieldcam::backends::camera::{
    CaptureSession, FlashMode, VirtualCameraBackend, VirtualCameraOptions,
};
use fieldcam::config::Config;
use fieldcam::coordinator::{CaptureCoordinator, CoordinatorEvent};
use fieldcam::location::{Fix, LocationProvider, NmeaSource, NoSignal, StaticPosition};
use fieldcam::storage::{AlbumField, AlbumId, DocumentId, DocumentStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Open the configured document database
pub fn open_store(config: &Config) -> Result<DocumentStore, Box<dyn std::error::Error>> {
    Ok(DocumentStore::open(&config.database_path())?)
}

pub fn create_album(
    store: &DocumentStore,
    title: &str,
    case_number: Option<&str>,
    location: Option<&str>,
    description: Option<&str>,
    notes: Option<&str>,
) -> CliResult {
    let mut fields = vec![(AlbumField::Title, title)];
    for (field, value) in [
        (AlbumField::CaseNumber, case_number),
        (AlbumField::Location, location),
        (AlbumField::Description, description),
        (AlbumField::Notes, notes),
    ] {
        if let Some(value) = value {
            fields.push((field, value));
        }
    }

    let id = store.create_album(&fields)?;
    println!("{}", id);
    Ok(())
}

pub fn list_albums(store: &DocumentStore) -> CliResult {
    let albums = store.albums()?;
    if albums.is_empty() {
        println!("No albums.");
        return Ok(());
    }

    for album in albums {
        let count = store.document_count(album.id)?;
        println!("{}  {}", album.id, album.title);
        if !album.case_number.is_empty() {
            println!("      Case: {}", album.case_number);
        }
        if !album.location.is_empty() {
            println!("      Location: {}", album.location);
        }
        println!(
            "      {} document(s), created {}",
            count,
            album.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    Ok(())
}

pub fn set_album_field(store: &DocumentStore, album: AlbumId, field: &str, value: &str) -> CliResult {
    store.update_album_field(album, field, value)?;
    println!("{} = {}", field, value);
    Ok(())
}

pub fn delete_album(store: &DocumentStore, album: AlbumId) -> CliResult {
    let count = store.document_count(album)?;
    store.delete_album(album)?;
    println!("Deleted album {} and {} document(s)", album, count);
    Ok(())
}

pub fn list_documents(store: &DocumentStore, album: AlbumId) -> CliResult {
    let documents = store.documents_for(album)?;
    if documents.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    for doc in documents {
        let location = if doc.has_location() {
            format!("{:.6}, {:.6}", doc.latitude, doc.longitude)
        } else {
            "no location".to_string()
        };
        println!(
            "{}  {}  {} bytes  {}",
            doc.id,
            doc.created_at.format("%Y-%m-%d %H:%M:%S"),
            doc.image.len(),
            location
        );
        if let Some(remote) = doc.remote_id {
            println!("      Remote: {}", remote);
        }
    }
    Ok(())
}

pub fn export_document(store: &DocumentStore, document: DocumentId, path: &Path) -> CliResult {
    let doc = store.document(document)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, &doc.image)?;
    println!("Exported {} bytes to {}", doc.image.len(), path.display());
    Ok(())
}

/// Take `count` photos with the virtual camera and commit them to `album`
pub fn capture(
    config: &Config,
    store: DocumentStore,
    album: AlbumId,
    count: usize,
    flash: FlashMode,
    position: Option<(f64, f64)>,
    nmea: Option<PathBuf>,
) -> CliResult {
    // Fail before touching the camera if the album is wrong
    let title = store.album(album)?.title;
    println!("Album: {}", title);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_capture(config, store, album, count, flash, position, nmea))
}

async fn run_capture(
    config: &Config,
    store: DocumentStore,
    album: AlbumId,
    count: usize,
    flash: FlashMode,
    position: Option<(f64, f64)>,
    nmea: Option<PathBuf>,
) -> CliResult {
    let location = Arc::new(LocationProvider::with_timeout(
        store.clone(),
        config.location_timeout(),
    ));
    match (position, nmea) {
        (Some((latitude, longitude)), _) => {
            location.start(Box::new(StaticPosition(Fix::new(latitude, longitude))))
        }
        (None, Some(path)) => location.start(Box::new(NmeaSource::open(&path).await?)),
        (None, None) => location.start(Box::new(NoSignal)),
    }

    let coordinator = CaptureCoordinator::new(store, Arc::clone(&location));
    coordinator.set_active_album(Some(album));
    let mut events = coordinator.subscribe();

    let session = CaptureSession::new(
        Box::new(VirtualCameraBackend::new(VirtualCameraOptions::default())),
        config.session_config(),
    );

    if !session.request_authorization().await? {
        return Err("Camera access denied".into());
    }
    let device = session.configure().await?;
    println!("Using camera: {}", device.name);

    session.set_flash_mode(flash);
    session.start().await?;
    let listener = coordinator.spawn(&session);

    println!("Capturing {} photo(s)...", count);
    let pending: Vec<_> = (0..count).map(|_| session.capture()).collect();
    for completion in pending {
        // Failures are reported through the coordinator events
        if let Ok(photo) = completion.await {
            println!(
                "  Photo {} ({} bytes, flash {:?})",
                photo.settings.id,
                photo.data.len(),
                photo.settings.flash
            );
        }
    }
    session.stop().await?;

    let summary = collect_events(&mut events, count, location.timeout()).await;

    drop(session);
    let _ = listener.await;
    location.stop();

    println!(
        "Stored {} document(s), {} with location, {} failed",
        summary.created, summary.located, summary.failed
    );
    if summary.location_failed > 0 {
        eprintln!(
            "{} location fix(es) could not be recorded",
            summary.location_failed
        );
    }
    if summary.failed > 0 {
        return Err(format!("{} capture(s) were not stored", summary.failed).into());
    }
    Ok(())
}

#[derive(Debug, Default)]
struct CaptureSummary {
    created: usize,
    located: usize,
    unlocated: usize,
    location_failed: usize,
    failed: usize,
}

impl CaptureSummary {
    fn settled(&self, expected: usize) -> bool {
        self.created + self.failed >= expected
            && self.located + self.unlocated + self.location_failed >= self.created
    }
}

/// Wait until every capture was committed or failed and location lookups settled
async fn collect_events(
    events: &mut broadcast::Receiver<CoordinatorEvent>,
    expected: usize,
    location_timeout: Duration,
) -> CaptureSummary {
    let mut summary = CaptureSummary::default();
    let grace = location_timeout + Duration::from_secs(1);

    loop {
        if summary.settled(expected) {
            break;
        }

        match tokio::time::timeout(grace, events.recv()).await {
            Ok(Ok(CoordinatorEvent::DocumentCreated { document, .. })) => {
                println!("  Stored document {}", document);
                summary.created += 1;
            }
            Ok(Ok(CoordinatorEvent::LocationAttached { document })) => {
                println!("  Located document {}", document);
                summary.located += 1;
            }
            Ok(Ok(CoordinatorEvent::LocationUnresolved { document })) => {
                println!("  No location for document {}", document);
                summary.unlocated += 1;
            }
            Ok(Ok(CoordinatorEvent::LocationFailed { document, error })) => {
                eprintln!("  Location not recorded for {}: {}", document, error);
                summary.location_failed += 1;
            }
            Ok(Ok(CoordinatorEvent::CaptureFailed(e))) => {
                eprintln!("  Capture failed: {}", e);
                summary.failed += 1;
            }
            Ok(Ok(CoordinatorEvent::CommitFailed(e))) => {
                eprintln!("  Not stored: {}", e);
                summary.failed += 1;
            }
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) => break,
            // Safety net; every lookup reports an outcome
            Err(_) => break,
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldcam::errors::StoreError;

    #[tokio::test]
    async fn test_failed_location_settles_summary() {
        let (tx, mut rx) = broadcast::channel(8);
        let stored = DocumentId::new();
        let unlocated = DocumentId::new();
        tx.send(CoordinatorEvent::DocumentCreated {
            document: stored,
            album: AlbumId::new(),
            bytes: 3,
        })
        .unwrap();
        tx.send(CoordinatorEvent::DocumentCreated {
            document: unlocated,
            album: AlbumId::new(),
            bytes: 3,
        })
        .unwrap();
        tx.send(CoordinatorEvent::LocationFailed {
            document: stored,
            error: StoreError::InvalidCoordinate("latitude NaN".to_string()),
        })
        .unwrap();
        tx.send(CoordinatorEvent::LocationUnresolved { document: unlocated })
            .unwrap();

        // Returns on the events alone, long before the grace period
        let summary = tokio::time::timeout(
            Duration::from_secs(1),
            collect_events(&mut rx, 2, Duration::from_secs(60)),
        )
        .await
        .unwrap();
        assert_eq!(summary.created, 2);
        assert_eq!(summary.location_failed, 1);
        assert_eq!(summary.unlocated, 1);
        assert_eq!(summary.failed, 0);
    }
}
