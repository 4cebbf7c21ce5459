// SPDX-License-Identifier: GPL-3.0-only

//! Stored records and their identities

use crate::constants::UNRESOLVED_COORDINATE;
use crate::errors::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Allocate a fresh random id
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

record_id!(
    /// Stable album identity, assigned at creation
    AlbumId
);

record_id!(
    /// Stable local document identity, assigned at creation
    DocumentId
);

/// The fixed set of user-editable album fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlbumField {
    Title,
    CaseNumber,
    Location,
    Description,
    Notes,
}

impl AlbumField {
    pub const ALL: [AlbumField; 5] = [
        AlbumField::Title,
        AlbumField::CaseNumber,
        AlbumField::Location,
        AlbumField::Description,
        AlbumField::Notes,
    ];

    /// Field name, also the column name in the albums table
    pub fn as_str(&self) -> &'static str {
        match self {
            AlbumField::Title => "title",
            AlbumField::CaseNumber => "case_number",
            AlbumField::Location => "location",
            AlbumField::Description => "description",
            AlbumField::Notes => "notes",
        }
    }
}

impl fmt::Display for AlbumField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlbumField {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AlbumField::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| StoreError::UnknownField(s.to_string()))
    }
}

/// A named collection of documents with free-form metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Album {
    pub id: AlbumId,
    pub title: String,
    pub case_number: String,
    pub location: String,
    pub description: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl Album {
    pub fn field(&self, field: AlbumField) -> &str {
        match field {
            AlbumField::Title => &self.title,
            AlbumField::CaseNumber => &self.case_number,
            AlbumField::Location => &self.location,
            AlbumField::Description => &self.description,
            AlbumField::Notes => &self.notes,
        }
    }

    pub(crate) fn field_mut(&mut self, field: AlbumField) -> &mut String {
        match field {
            AlbumField::Title => &mut self.title,
            AlbumField::CaseNumber => &mut self.case_number,
            AlbumField::Location => &mut self.location,
            AlbumField::Description => &mut self.description,
            AlbumField::Notes => &mut self.notes,
        }
    }
}

/// One captured image with its location and timestamps
///
/// The image payload never changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: DocumentId,
    pub album_id: AlbumId,
    /// Identity assigned by a remote sync service, if any
    pub remote_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    #[serde(skip)]
    pub image: Vec<u8>,
    pub latitude: f64,
    pub longitude: f64,
}

impl Document {
    /// Whether a fix has been attached (unresolved documents sit at 0,0)
    pub fn has_location(&self) -> bool {
        self.latitude != UNRESOLVED_COORDINATE || self.longitude != UNRESOLVED_COORDINATE
    }
}

/// Reject coordinates that are not finite or fall outside ±90/±180 degrees
pub fn check_coordinates(latitude: f64, longitude: f64) -> Result<(), StoreError> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(StoreError::InvalidCoordinate(format!("latitude {}", latitude)));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(StoreError::InvalidCoordinate(format!("longitude {}", longitude)));
    }
    Ok(())
}
