// SPDX-License-Identifier: GPL-3.0-only

//! Database schema

/// Albums own documents; deleting an album cascades to its documents.
/// `seq` keeps insertion order independent of timestamps.
/// Timestamps are microseconds since the Unix epoch (UTC).
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS albums (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL DEFAULT '',
    case_number TEXT NOT NULL DEFAULT '',
    location TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    notes TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    album_id TEXT NOT NULL REFERENCES albums(id) ON DELETE CASCADE,
    remote_id TEXT,
    created_at INTEGER NOT NULL,
    modified_at INTEGER NOT NULL,
    image BLOB NOT NULL,
    latitude REAL NOT NULL DEFAULT 0.0,
    longitude REAL NOT NULL DEFAULT 0.0
);

CREATE INDEX IF NOT EXISTS idx_documents_album ON documents(album_id, seq);
CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_remote ON documents(remote_id)
    WHERE remote_id IS NOT NULL;
"#;
