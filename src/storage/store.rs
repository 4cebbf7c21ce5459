// SPDX-License-Identifier: GPL-3.0-only

//! SQLite-backed document store
//!
//! The store is the only component that mutates albums and documents. Each
//! mutating call runs in its own transaction on a single connection guarded
//! by a mutex, so writes from the capture path and the editing path never
//! interleave partially. Clones share the connection.

use super::model::*;
use super::schema::SCHEMA;
use crate::errors::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const ALBUM_COLUMNS: &str = "id, title, case_number, location, description, notes, created_at";
const DOCUMENT_COLUMNS: &str =
    "id, album_id, remote_id, created_at, modified_at, image, latitude, longitude";

/// Persistent store of albums and documents
#[derive(Clone)]
pub struct DocumentStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl DocumentStore {
    /// Open (or create) the database at `path`
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::StorageUnavailable(format!("{}: {}", parent.display(), e))
            })?;
        }
        let conn = Connection::open(path)?;
        let store = Self::init(conn, Some(path.to_path_buf()))?;
        info!(path = %path.display(), "Opened document store");
        Ok(store)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> StoreResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ========================================================================
    // Albums
    // ========================================================================

    /// Create an album with the given field values (unlisted fields are empty)
    pub fn create_album(&self, fields: &[(AlbumField, &str)]) -> StoreResult<AlbumId> {
        let mut album = Album {
            id: AlbumId::new(),
            title: String::new(),
            case_number: String::new(),
            location: String::new(),
            description: String::new(),
            notes: String::new(),
            created_at: now(),
        };
        for (field, value) in fields {
            *album.field_mut(*field) = (*value).to_string();
        }

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO albums (id, title, case_number, location, description, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                album.id.to_string(),
                album.title,
                album.case_number,
                album.location,
                album.description,
                album.notes,
                album.created_at.timestamp_micros(),
            ],
        )?;
        tx.commit()?;

        debug!(album = %album.id, title = %album.title, "Created album");
        Ok(album.id)
    }

    pub fn album(&self, id: AlbumId) -> StoreResult<Album> {
        self.lock()
            .query_row(
                &format!("SELECT {ALBUM_COLUMNS} FROM albums WHERE id = ?1"),
                [id.to_string()],
                album_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("album {}", id)))
    }

    /// All albums in creation order
    pub fn albums(&self) -> StoreResult<Vec<Album>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("SELECT {ALBUM_COLUMNS} FROM albums ORDER BY seq"))?;
        let albums = stmt
            .query_map([], album_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(albums)
    }

    /// Set one album field by name
    ///
    /// Fails with `UnknownField` for names outside the fixed schema and with
    /// `NotFound` when the album does not exist. Either way nothing changes.
    pub fn update_album_field(&self, id: AlbumId, field_name: &str, value: &str) -> StoreResult<()> {
        let field: AlbumField = field_name.parse()?;
        self.set_album_field(id, field, value)
    }

    pub fn set_album_field(&self, id: AlbumId, field: AlbumField, value: &str) -> StoreResult<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        // Column name comes from the closed AlbumField set
        let updated = tx.execute(
            &format!("UPDATE albums SET {} = ?1 WHERE id = ?2", field.as_str()),
            params![value, id.to_string()],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("album {}", id)));
        }
        tx.commit()?;

        debug!(album = %id, %field, "Updated album field");
        Ok(())
    }

    /// Delete an album together with all of its documents
    pub fn delete_album(&self, id: AlbumId) -> StoreResult<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM albums WHERE id = ?1", [id.to_string()])?;
        if removed == 0 {
            return Err(StoreError::NotFound(format!("album {}", id)));
        }
        tx.commit()?;

        info!(album = %id, "Deleted album");
        Ok(())
    }

    // ========================================================================
    // Documents
    // ========================================================================

    /// Store a new document holding `image` in `album`
    ///
    /// The document and its payload become visible together or not at all.
    pub fn create_document(&self, image: &[u8], album: AlbumId) -> StoreResult<DocumentId> {
        let id = DocumentId::new();
        let stamp = now().timestamp_micros();

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        if !album_exists(&tx, album)? {
            return Err(StoreError::NotFound(format!("album {}", album)));
        }
        tx.execute(
            "INSERT INTO documents (id, album_id, created_at, modified_at, image)
             VALUES (?1, ?2, ?3, ?3, ?4)",
            params![id.to_string(), album.to_string(), stamp, image],
        )?;
        tx.commit()?;

        debug!(document = %id, album = %album, bytes = image.len(), "Created document");
        Ok(id)
    }

    /// Record a location fix on a document
    ///
    /// Returns `false` without error when the document no longer exists.
    /// `modified_at` always moves forward, even within the same microsecond.
    pub fn attach_location(
        &self,
        id: DocumentId,
        latitude: f64,
        longitude: f64,
    ) -> StoreResult<bool> {
        check_coordinates(latitude, longitude)?;

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE documents
             SET latitude = ?1, longitude = ?2, modified_at = MAX(?3, modified_at + 1)
             WHERE id = ?4",
            params![latitude, longitude, now().timestamp_micros(), id.to_string()],
        )?;
        tx.commit()?;

        if updated == 0 {
            debug!(document = %id, "Document gone before location arrived");
        } else {
            debug!(document = %id, latitude, longitude, "Attached location");
        }
        Ok(updated > 0)
    }

    pub fn document(&self, id: DocumentId) -> StoreResult<Document> {
        self.lock()
            .query_row(
                &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
                [id.to_string()],
                document_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("document {}", id)))
    }

    /// Documents of an album in insertion order
    pub fn documents_for(&self, album: AlbumId) -> StoreResult<Vec<Document>> {
        let conn = self.lock();
        if !album_exists(&conn, album)? {
            return Err(StoreError::NotFound(format!("album {}", album)));
        }
        let mut stmt = conn.prepare(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE album_id = ?1 ORDER BY seq"
        ))?;
        let documents = stmt
            .query_map([album.to_string()], document_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(documents)
    }

    pub fn document_count(&self, album: AlbumId) -> StoreResult<usize> {
        let conn = self.lock();
        if !album_exists(&conn, album)? {
            return Err(StoreError::NotFound(format!("album {}", album)));
        }
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE album_id = ?1",
            [album.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn delete_document(&self, id: DocumentId) -> StoreResult<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM documents WHERE id = ?1", [id.to_string()])?;
        if removed == 0 {
            return Err(StoreError::NotFound(format!("document {}", id)));
        }
        tx.commit()?;

        debug!(document = %id, "Deleted document");
        Ok(())
    }

    /// Move a document to another album, e.g. before deleting its old one
    pub fn reassign_document(&self, id: DocumentId, album: AlbumId) -> StoreResult<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        if !album_exists(&tx, album)? {
            return Err(StoreError::NotFound(format!("album {}", album)));
        }
        let updated = tx.execute(
            "UPDATE documents SET album_id = ?1, modified_at = MAX(?2, modified_at + 1)
             WHERE id = ?3",
            params![album.to_string(), now().timestamp_micros(), id.to_string()],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("document {}", id)));
        }
        tx.commit()?;

        debug!(document = %id, album = %album, "Reassigned document");
        Ok(())
    }

    /// Record the identity a remote sync service gave this document
    pub fn assign_remote_id(&self, id: DocumentId, remote_id: &str) -> StoreResult<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE documents SET remote_id = ?1 WHERE id = ?2",
            params![remote_id, id.to_string()],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("document {}", id)));
        }
        tx.commit()?;
        Ok(())
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Current time truncated to the stored precision
fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}

fn album_exists(conn: &Connection, id: AlbumId) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM albums WHERE id = ?1)",
        [id.to_string()],
        |row| row.get(0),
    )
}

fn id_at<T: From<Uuid>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text)
        .map(T::from)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let micros: i64 = row.get(idx)?;
    DateTime::from_timestamp_micros(micros)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, micros))
}

fn album_from_row(row: &Row<'_>) -> rusqlite::Result<Album> {
    Ok(Album {
        id: id_at(row, 0)?,
        title: row.get(1)?,
        case_number: row.get(2)?,
        location: row.get(3)?,
        description: row.get(4)?,
        notes: row.get(5)?,
        created_at: time_at(row, 6)?,
    })
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: id_at(row, 0)?,
        album_id: id_at(row, 1)?,
        remote_id: row.get(2)?,
        created_at: time_at(row, 3)?,
        modified_at: time_at(row, 4)?,
        image: row.get(5)?,
        latitude: row.get(6)?,
        longitude: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46];

    fn store_with_album() -> (DocumentStore, AlbumId) {
        let store = DocumentStore::open_in_memory().unwrap();
        let album = store
            .create_album(&[(AlbumField::Title, "Site A"), (AlbumField::CaseNumber, "C-17")])
            .unwrap();
        (store, album)
    }

    #[test]
    fn test_document_lifecycle_with_location() {
        let (store, album) = store_with_album();
        let id = store.create_document(JPEG, album).unwrap();

        let docs = store.documents_for(album).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, id);
        assert_eq!(docs[0].latitude, 0.0);
        assert_eq!(docs[0].longitude, 0.0);
        assert_eq!(docs[0].created_at, docs[0].modified_at);
        assert!(docs[0].remote_id.is_none());
        let before = docs[0].modified_at;

        assert!(store.attach_location(id, 49.28, -123.12).unwrap());

        let doc = store.document(id).unwrap();
        assert_eq!(doc.latitude, 49.28);
        assert_eq!(doc.longitude, -123.12);
        assert!(doc.modified_at > before);
        assert_eq!(doc.created_at, docs[0].created_at);
        assert_eq!(doc.image, JPEG);
    }

    #[test]
    fn test_read_after_write_returns_exact_payload() {
        let (store, album) = store_with_album();
        let payload: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
        let id = store.create_document(&payload, album).unwrap();
        let docs = store.documents_for(album).unwrap();
        let doc = docs.iter().find(|d| d.id == id).unwrap();
        assert_eq!(doc.image, payload);
    }

    #[test]
    fn test_create_document_in_missing_album() {
        let store = DocumentStore::open_in_memory().unwrap();
        let result = store.create_document(JPEG, AlbumId::new());
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_invalid_coordinates_rejected_before_write() {
        let (store, album) = store_with_album();
        let id = store.create_document(JPEG, album).unwrap();
        let before = store.document(id).unwrap();

        for (lat, lon) in [
            (f64::NAN, 0.0),
            (0.0, f64::INFINITY),
            (90.5, 10.0),
            (10.0, -180.5),
        ] {
            assert!(matches!(
                store.attach_location(id, lat, lon),
                Err(StoreError::InvalidCoordinate(_))
            ));
        }
        assert_eq!(store.document(id).unwrap(), before);

        // Poles and the antimeridian are valid
        assert!(store.attach_location(id, -90.0, 180.0).unwrap());
    }

    #[test]
    fn test_attach_location_on_deleted_document_is_noop() {
        let (store, album) = store_with_album();
        let id = store.create_document(JPEG, album).unwrap();
        store.delete_document(id).unwrap();

        assert!(!store.attach_location(id, 1.0, 2.0).unwrap());
        assert!(matches!(store.document(id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_unknown_field_leaves_album_unchanged() {
        let (store, album) = store_with_album();
        let before = store.album(album).unwrap();

        let result = store.update_album_field(album, "weather", "rainy");
        assert_eq!(result, Err(StoreError::UnknownField("weather".to_string())));
        assert_eq!(store.album(album).unwrap(), before);
    }

    #[test]
    fn test_update_album_field() {
        let (store, album) = store_with_album();
        store.update_album_field(album, "notes", "north fence").unwrap();
        let updated = store.album(album).unwrap();
        assert_eq!(updated.notes, "north fence");
        assert_eq!(updated.title, "Site A");

        let missing = store.update_album_field(AlbumId::new(), "notes", "x");
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_delete_album_cascades() {
        let (store, album) = store_with_album();
        let docs: Vec<_> = (0..3)
            .map(|_| store.create_document(JPEG, album).unwrap())
            .collect();

        store.delete_album(album).unwrap();

        for id in docs {
            assert!(matches!(store.document(id), Err(StoreError::NotFound(_))));
        }
        assert!(matches!(
            store.documents_for(album),
            Err(StoreError::NotFound(_))
        ));
        let orphans: i64 = store
            .lock()
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn test_reassigned_document_survives_album_delete() {
        let (store, old) = store_with_album();
        let new = store.create_album(&[(AlbumField::Title, "Site B")]).unwrap();
        let kept = store.create_document(JPEG, old).unwrap();
        let dropped = store.create_document(JPEG, old).unwrap();

        store.reassign_document(kept, new).unwrap();
        store.delete_album(old).unwrap();

        assert_eq!(store.document(kept).unwrap().album_id, new);
        assert!(store.document(dropped).is_err());
        assert_eq!(store.document_count(new).unwrap(), 1);
    }

    #[test]
    fn test_documents_keep_insertion_order() {
        let (store, album) = store_with_album();
        let ids: Vec<_> = (0..10)
            .map(|i| store.create_document(&[i], album).unwrap())
            .collect();
        let listed: Vec<_> = store
            .documents_for(album)
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(listed, ids);
    }

    #[test]
    fn test_albums_in_creation_order() {
        let store = DocumentStore::open_in_memory().unwrap();
        let a = store.create_album(&[(AlbumField::Title, "a")]).unwrap();
        let b = store.create_album(&[(AlbumField::Title, "b")]).unwrap();
        let ids: Vec<_> = store.albums().unwrap().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn test_assign_remote_id() {
        let (store, album) = store_with_album();
        let id = store.create_document(JPEG, album).unwrap();
        store.assign_remote_id(id, "srv-0001").unwrap();
        assert_eq!(store.document(id).unwrap().remote_id.as_deref(), Some("srv-0001"));
        assert!(store.assign_remote_id(DocumentId::new(), "srv-0002").is_err());
    }

    #[test]
    fn test_concurrent_writers_on_different_records() {
        let (store, album) = store_with_album();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let id = store.create_document(&[i as u8; 32], album).unwrap();
                    store.attach_location(id, i as f64, -(i as f64)).unwrap();
                    if i % 2 == 0 {
                        store
                            .update_album_field(album, "notes", &format!("writer {}", i))
                            .unwrap();
                    }
                    id
                })
            })
            .collect();

        let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for (i, id) in ids.into_iter().enumerate() {
            let doc = store.document(id).unwrap();
            assert_eq!(doc.image, vec![i as u8; 32]);
            assert_eq!(doc.latitude, i as f64);
        }
        assert_eq!(store.document_count(album).unwrap(), 8);
    }

    #[test]
    fn test_open_unusable_path() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as a database file
        let result = DocumentStore::open(dir.path());
        assert!(matches!(result, Err(StoreError::StorageUnavailable(_))));
    }

    #[test]
    fn test_reopen_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("documents.db");
        let (album, doc) = {
            let store = DocumentStore::open(&path).unwrap();
            let album = store.create_album(&[(AlbumField::Title, "kept")]).unwrap();
            (album, store.create_document(JPEG, album).unwrap())
        };

        let store = DocumentStore::open(&path).unwrap();
        assert_eq!(store.album(album).unwrap().title, "kept");
        assert_eq!(store.document(doc).unwrap().image, JPEG);
    }
}
