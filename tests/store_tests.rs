// SPDX-License-Identifier: MPL-2.0

//! Integration tests for the document store

use fieldcam::StoreError;
use fieldcam::storage::{AlbumField, DocumentStore};

#[test]
fn test_evidence_album_round_trip() {
    let store = DocumentStore::open_in_memory().unwrap();
    let album = store
        .create_album(&[
            (AlbumField::Title, "Warehouse fire"),
            (AlbumField::CaseNumber, "2026-0412"),
        ])
        .unwrap();

    let bytes = [0xFF, 0xD8, 0xFF, 0xDB, 0x00, 0x43];
    let id = store.create_document(&bytes, album).unwrap();

    let docs = store.documents_for(album).unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id, id);
    assert_eq!((docs[0].latitude, docs[0].longitude), (0.0, 0.0));

    assert!(store.attach_location(id, 49.28, -123.12).unwrap());
    let located = store.document(id).unwrap();
    assert_eq!((located.latitude, located.longitude), (49.28, -123.12));
    assert!(located.modified_at > docs[0].modified_at);
    assert_eq!(located.image, bytes);
}

#[test]
fn test_album_metadata_editing() {
    let store = DocumentStore::open_in_memory().unwrap();
    let album = store.create_album(&[(AlbumField::Title, "Draft")]).unwrap();

    for field in AlbumField::ALL {
        store
            .update_album_field(album, field.as_str(), &format!("{} value", field))
            .unwrap();
    }
    let edited = store.album(album).unwrap();
    for field in AlbumField::ALL {
        assert_eq!(edited.field(field), format!("{} value", field));
    }

    assert_eq!(
        store.update_album_field(album, "created_at", "yesterday"),
        Err(StoreError::UnknownField("created_at".to_string()))
    );
    assert_eq!(store.album(album).unwrap(), edited);
}

#[test]
fn test_deleting_album_leaves_no_orphans() {
    let store = DocumentStore::open_in_memory().unwrap();
    let doomed = store.create_album(&[(AlbumField::Title, "doomed")]).unwrap();
    let kept = store.create_album(&[(AlbumField::Title, "kept")]).unwrap();

    let gone: Vec<_> = (0..5)
        .map(|i| store.create_document(&[i], doomed).unwrap())
        .collect();
    let survivor = store.create_document(&[42], kept).unwrap();

    store.delete_album(doomed).unwrap();

    for id in gone {
        assert!(matches!(store.document(id), Err(StoreError::NotFound(_))));
        // Late location fixes for deleted documents are ignored
        assert!(!store.attach_location(id, 1.0, 1.0).unwrap());
    }
    assert_eq!(store.document(survivor).unwrap().image, vec![42]);
    assert_eq!(store.albums().unwrap().len(), 1);
    assert!(matches!(
        store.delete_album(doomed),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn test_store_shared_across_clones() {
    let dir = tempfile::tempdir().unwrap();
    let store = DocumentStore::open(&dir.path().join("documents.db")).unwrap();
    let editor = store.clone();

    let album = store.create_album(&[(AlbumField::Title, "shared")]).unwrap();
    let doc = store.create_document(&[1, 2, 3], album).unwrap();
    editor.update_album_field(album, "notes", "seen by editor").unwrap();

    assert_eq!(store.album(album).unwrap().notes, "seen by editor");
    assert_eq!(editor.documents_for(album).unwrap()[0].id, doc);
}
