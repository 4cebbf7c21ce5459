// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use fieldcam::backends::camera::FlashMode;
use fieldcam::config::Config;
use fieldcam::constants::APP_VERSION;
use fieldcam::storage::{AlbumId, DocumentId, check_coordinates};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "fieldcam")]
#[command(about = "Geotagged evidence photos organised in albums")]
#[command(version = APP_VERSION)]
struct Cli {
    /// Configuration file (default: ~/.config/fieldcam/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Document database, overrides the configured path
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage albums
    Album {
        #[command(subcommand)]
        action: AlbumCommand,
    },

    /// Take photos into an album
    Capture {
        /// Album receiving the photos
        #[arg(short, long)]
        album: AlbumId,

        /// Number of photos to take
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        /// Flash mode: off, on or auto
        #[arg(short, long, default_value = "off")]
        flash: FlashMode,

        /// Known latitude in decimal degrees
        #[arg(long, requires = "lon", allow_negative_numbers = true, value_parser = parse_latitude)]
        lat: Option<f64>,

        /// Known longitude in decimal degrees
        #[arg(long, requires = "lat", allow_negative_numbers = true, value_parser = parse_longitude)]
        lon: Option<f64>,

        /// Read positions from an NMEA log or GPS device node
        #[arg(long, conflicts_with_all = ["lat", "lon"])]
        nmea: Option<PathBuf>,
    },

    /// List the documents of an album
    Documents {
        album: AlbumId,
    },

    /// Write a document's image to a file
    Export {
        document: DocumentId,
        path: PathBuf,
    },
}

#[derive(Subcommand)]
enum AlbumCommand {
    /// Create an album and print its id
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        case_number: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// List all albums
    List,

    /// Set one album field (title, case_number, location, description, notes)
    Set {
        album: AlbumId,
        field: String,
        value: String,
    },

    /// Delete an album and all of its documents
    Delete {
        album: AlbumId,
    },
}

fn parse_latitude(value: &str) -> Result<f64, String> {
    let latitude: f64 = value.parse().map_err(|e| format!("{}", e))?;
    check_coordinates(latitude, 0.0).map_err(|e| e.to_string())?;
    Ok(latitude)
}

fn parse_longitude(value: &str) -> Result<f64, String> {
    let longitude: f64 = value.parse().map_err(|e| format!("{}", e))?;
    check_coordinates(0.0, longitude).map_err(|e| e.to_string())?;
    Ok(longitude)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match cli.config.as_deref() {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(database) = cli.database {
        config.database_path = Some(database);
    }

    // Initialize logging
    // RUST_LOG wins over the configured level
    // Examples: RUST_LOG=debug, RUST_LOG=fieldcam=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let store = cli::open_store(&config)?;

    match cli.command {
        Commands::Album { action } => match action {
            AlbumCommand::Create {
                title,
                case_number,
                location,
                description,
                notes,
            } => cli::create_album(
                &store,
                &title,
                case_number.as_deref(),
                location.as_deref(),
                description.as_deref(),
                notes.as_deref(),
            ),
            AlbumCommand::List => cli::list_albums(&store),
            AlbumCommand::Set {
                album,
                field,
                value,
            } => cli::set_album_field(&store, album, &field, &value),
            AlbumCommand::Delete { album } => cli::delete_album(&store, album),
        },
        Commands::Capture {
            album,
            count,
            flash,
            lat,
            lon,
            nmea,
        } => {
            let position = lat.zip(lon);
            cli::capture(&config, store, album, count, flash, position, nmea)
        }
        Commands::Documents { album } => cli::list_documents(&store, album),
        Commands::Export { document, path } => cli::export_document(&store, document, &path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_arguments_validated() {
        assert_eq!(parse_latitude("-33.86"), Ok(-33.86));
        assert_eq!(parse_longitude("151.2"), Ok(151.2));
        assert!(parse_latitude("NaN").is_err());
        assert!(parse_latitude("91").is_err());
        assert!(parse_longitude("inf").is_err());
        assert!(parse_longitude("north").is_err());
    }

    #[test]
    fn test_capture_rejects_out_of_range_latitude() {
        let id = AlbumId::new().to_string();
        let parsed = Cli::try_parse_from([
            "fieldcam", "capture", "--album", &id, "--lat", "123", "--lon", "4",
        ]);
        assert!(parsed.is_err());
    }
}
