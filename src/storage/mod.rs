// SPDX-License-Identifier: MPL-2.0

//! Document persistence
//!
//! Albums and their documents live in a single SQLite database owned by
//! [`DocumentStore`]. Other components hold ids only and go through the
//! store for every read and write.

pub mod model;
pub mod schema;
pub mod store;

pub use model::{Album, AlbumField, AlbumId, Document, DocumentId, check_coordinates};
pub use store::DocumentStore;
