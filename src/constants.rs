// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Application directory name under the platform config/data dirs
pub const APP_DIR_NAME: &str = "fieldcam";

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Document database file name
pub const DATABASE_FILE_NAME: &str = "documents.db";

/// Current configuration schema version
pub const CONFIG_VERSION: u32 = 1;

/// Still capture resolution requested from the device (12 MP, 4:3)
pub const DEFAULT_CAPTURE_WIDTH: u32 = 4032;
pub const DEFAULT_CAPTURE_HEIGHT: u32 = 3024;

/// JPEG compression quality for evidence photos
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// How long `add_location` waits for a first fix
pub const DEFAULT_LOCATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Coordinates a document keeps until a fix is attached
pub const UNRESOLVED_COORDINATE: f64 = 0.0;

/// Capacity of the coordinator event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Version string including the commit it was built from
pub const APP_VERSION: &str = env!("FIELDCAM_BUILD_VERSION");
