// SPDX-License-Identifier: MPL-2.0

//! End-to-end tests: capture session -> coordinator -> document store

use fieldcam::backends::camera::session::SessionConfig;
use fieldcam::backends::camera::{CaptureSession, VirtualCameraBackend};
use fieldcam::location::NmeaSource;
use fieldcam::storage::{AlbumField, DocumentStore};
use fieldcam::{CaptureCoordinator, CoordinatorEvent, LocationProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const NMEA_LOG: &str = "\
$GPGGA,201530.00,,,,,0,00,99.99,,,,,,*63
$GNGGA,201530.00,4916.800,N,12307.200,W,1,09,1.2,70.0,M,-17.0,M,,*74
";

async fn next_event(rx: &mut broadcast::Receiver<CoordinatorEvent>) -> CoordinatorEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for coordinator event")
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_captures_become_geotagged_documents() {
    let store = DocumentStore::open_in_memory().unwrap();
    let album = store
        .create_album(&[(AlbumField::Title, "Bridge inspection")])
        .unwrap();

    let location = Arc::new(LocationProvider::with_timeout(
        store.clone(),
        Duration::from_secs(2),
    ));
    location.start(Box::new(NmeaSource::new(std::io::Cursor::new(
        NMEA_LOG.as_bytes().to_vec(),
    ))));

    let coordinator = CaptureCoordinator::new(store.clone(), Arc::clone(&location));
    coordinator.set_active_album(Some(album));
    let mut events = coordinator.subscribe();

    let session = CaptureSession::new(
        Box::new(VirtualCameraBackend::default()),
        SessionConfig::default(),
    );
    let listener = coordinator.spawn(&session);
    session.configure().await.unwrap();
    session.start().await.unwrap();

    let pending: Vec<_> = (0..3).map(|_| session.capture()).collect();
    let mut photos = Vec::new();
    for completion in pending {
        photos.push(completion.await.unwrap());
    }

    let mut created = Vec::new();
    let mut located = 0;
    while created.len() < 3 || located < 3 {
        match next_event(&mut events).await {
            CoordinatorEvent::DocumentCreated { document, album: a, .. } => {
                assert_eq!(a, album);
                created.push(document);
            }
            CoordinatorEvent::LocationAttached { .. } => located += 1,
            other => panic!("unexpected event {:?}", other),
        }
    }

    let documents = store.documents_for(album).unwrap();
    let stored: Vec<_> = documents.iter().map(|d| d.id).collect();
    assert_eq!(stored, created);
    for (doc, photo) in documents.iter().zip(&photos) {
        assert_eq!(&doc.image[..], &photo.data[..]);
        assert!((doc.latitude - 49.28).abs() < 1e-9);
        assert!((doc.longitude + 123.12).abs() < 1e-9);
    }

    session.stop().await.unwrap();
    drop(session);
    tokio::time::timeout(Duration::from_secs(5), listener)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_switching_album_between_captures() {
    let store = DocumentStore::open_in_memory().unwrap();
    let first = store.create_album(&[(AlbumField::Title, "first")]).unwrap();
    let second = store.create_album(&[(AlbumField::Title, "second")]).unwrap();

    let location = Arc::new(LocationProvider::with_timeout(
        store.clone(),
        Duration::from_millis(10),
    ));
    let coordinator = CaptureCoordinator::new(store.clone(), location);

    coordinator.set_active_album(Some(first));
    coordinator.commit_capture(Arc::from(&[1u8][..])).await.unwrap();
    coordinator.set_active_album(Some(second));
    assert_eq!(coordinator.active_album(), Some(second));
    coordinator.commit_capture(Arc::from(&[2u8][..])).await.unwrap();

    assert_eq!(store.documents_for(first).unwrap()[0].image, vec![1]);
    assert_eq!(store.documents_for(second).unwrap()[0].image, vec![2]);
}
