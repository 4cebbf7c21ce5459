// SPDX-License-Identifier: GPL-3.0-only

//! NMEA 0183 position sentences
//!
//! Understands the GGA (fix data) and RMC (recommended minimum) sentences from
//! any talker (`$GP`, `$GN`, `$GL`, ...). Everything else is ignored.

use super::{Fix, FixStream, PositionSource};
use chrono::{NaiveDate, NaiveTime, Utc};
use std::fmt;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, info, warn};

/// Typical receiver error per unit of HDOP, in metres
const UERE_METRES: f64 = 5.0;

#[derive(Debug, Clone, PartialEq)]
pub enum NmeaError {
    /// Line does not start with `$`
    NotASentence,
    /// No `*hh` checksum trailer
    MissingChecksum,
    /// Checksum present but wrong
    Checksum { expected: u8, computed: u8 },
    /// Valid sentence of a type that carries no position
    Unsupported(String),
    /// Receiver reports no fix
    NoFix,
    /// A field could not be parsed
    Malformed(&'static str),
}

impl fmt::Display for NmeaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NmeaError::NotASentence => write!(f, "not an NMEA sentence"),
            NmeaError::MissingChecksum => write!(f, "missing checksum"),
            NmeaError::Checksum { expected, computed } => write!(
                f,
                "checksum mismatch (expected {:02X}, computed {:02X})",
                expected, computed
            ),
            NmeaError::Unsupported(kind) => write!(f, "unsupported sentence {}", kind),
            NmeaError::NoFix => write!(f, "no fix"),
            NmeaError::Malformed(field) => write!(f, "malformed {}", field),
        }
    }
}

impl std::error::Error for NmeaError {}

/// Parse one sentence into a fix
pub fn parse_sentence(line: &str) -> Result<Fix, NmeaError> {
    let body = line
        .trim()
        .strip_prefix('$')
        .ok_or(NmeaError::NotASentence)?;

    // Geotags are evidence; unchecked sentences are not trusted
    let (body, checksum) = body.split_once('*').ok_or(NmeaError::MissingChecksum)?;
    if checksum.len() != 2 || !checksum.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(NmeaError::Malformed("checksum"));
    }
    let expected =
        u8::from_str_radix(checksum, 16).map_err(|_| NmeaError::Malformed("checksum"))?;
    let computed = body.bytes().fold(0u8, |acc, b| acc ^ b);
    if expected != computed {
        return Err(NmeaError::Checksum { expected, computed });
    }

    let fields: Vec<&str> = body.split(',').collect();
    let kind = fields[0];
    if kind.len() != 5 || !kind.is_ascii() {
        return Err(NmeaError::Malformed("sentence type"));
    }

    match &kind[2..] {
        "GGA" => parse_gga(&fields),
        "RMC" => parse_rmc(&fields),
        other => Err(NmeaError::Unsupported(other.to_string())),
    }
}

/// `$xxGGA,time,lat,N,lon,E,quality,sats,hdop,alt,M,geoid,M,age,station`
fn parse_gga(fields: &[&str]) -> Result<Fix, NmeaError> {
    if fields.len() < 9 {
        return Err(NmeaError::Malformed("GGA field count"));
    }
    if matches!(fields[6], "" | "0") {
        return Err(NmeaError::NoFix);
    }

    let time = parse_time(fields[1])?;
    let latitude = parse_coordinate(fields[2], fields[3], 2)?;
    let longitude = parse_coordinate(fields[4], fields[5], 3)?;
    let accuracy_m = fields[8].parse::<f64>().ok().map(|hdop| hdop * UERE_METRES);

    // GGA carries no date; assume the fix is from today
    let timestamp = Utc::now().date_naive().and_time(time).and_utc();

    Ok(Fix {
        latitude,
        longitude,
        accuracy_m,
        timestamp,
    })
}

/// `$xxRMC,time,status,lat,N,lon,E,speed,course,date,magvar,E[,mode]`
fn parse_rmc(fields: &[&str]) -> Result<Fix, NmeaError> {
    if fields.len() < 10 {
        return Err(NmeaError::Malformed("RMC field count"));
    }
    if fields[2] != "A" {
        return Err(NmeaError::NoFix);
    }

    let time = parse_time(fields[1])?;
    let latitude = parse_coordinate(fields[3], fields[4], 2)?;
    let longitude = parse_coordinate(fields[5], fields[6], 3)?;
    let date = parse_date(fields[9])?;

    Ok(Fix {
        latitude,
        longitude,
        accuracy_m: None,
        timestamp: date.and_time(time).and_utc(),
    })
}

/// `ddmm.mmmm` / `dddmm.mmmm` plus hemisphere into signed decimal degrees
fn parse_coordinate(value: &str, hemisphere: &str, degree_digits: usize) -> Result<f64, NmeaError> {
    if value.len() <= degree_digits || !value.is_ascii() {
        return Err(NmeaError::Malformed("coordinate"));
    }
    let (degrees, minutes) = value.split_at(degree_digits);
    let degrees: f64 = degrees
        .parse()
        .map_err(|_| NmeaError::Malformed("coordinate"))?;
    let minutes: f64 = minutes
        .parse()
        .map_err(|_| NmeaError::Malformed("coordinate"))?;
    if !(0.0..60.0).contains(&minutes) {
        return Err(NmeaError::Malformed("coordinate"));
    }

    let decimal = degrees + minutes / 60.0;
    let limit = if degree_digits == 2 { 90.0 } else { 180.0 };
    if decimal > limit {
        return Err(NmeaError::Malformed("coordinate"));
    }
    match hemisphere {
        "N" | "E" => Ok(decimal),
        "S" | "W" => Ok(-decimal),
        _ => Err(NmeaError::Malformed("hemisphere")),
    }
}

/// `hhmmss` with optional fractional seconds
fn parse_time(value: &str) -> Result<NaiveTime, NmeaError> {
    let malformed = || NmeaError::Malformed("time");
    if value.len() < 6 || !value.is_ascii() {
        return Err(malformed());
    }
    let hour: u32 = value[0..2].parse().map_err(|_| malformed())?;
    let minute: u32 = value[2..4].parse().map_err(|_| malformed())?;
    let seconds: f64 = value[4..].parse().map_err(|_| malformed())?;
    let whole = seconds.trunc() as u32;
    let micros = ((seconds - seconds.trunc()) * 1_000_000.0).round() as u32;
    NaiveTime::from_hms_micro_opt(hour, minute, whole, micros.min(999_999)).ok_or_else(malformed)
}

/// `ddmmyy`; two-digit years below 80 are 20xx
fn parse_date(value: &str) -> Result<NaiveDate, NmeaError> {
    let malformed = || NmeaError::Malformed("date");
    if value.len() != 6 || !value.is_ascii() {
        return Err(malformed());
    }
    let day: u32 = value[0..2].parse().map_err(|_| malformed())?;
    let month: u32 = value[2..4].parse().map_err(|_| malformed())?;
    let year: i32 = value[4..6].parse().map_err(|_| malformed())?;
    let year = if year < 80 { 2000 + year } else { 1900 + year };
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(malformed)
}

/// Position source reading NMEA sentences line by line
///
/// Sentences that fail to parse are skipped. The stream ends with the reader.
pub struct NmeaSource<R> {
    reader: R,
}

impl<R> NmeaSource<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl NmeaSource<tokio::fs::File> {
    /// Replay a captured NMEA log or read a serial device node
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        info!(path = %path.display(), "Reading NMEA sentences");
        Ok(Self::new(file))
    }
}

impl<R> PositionSource for NmeaSource<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    fn fixes(self: Box<Self>) -> FixStream {
        let mut lines = BufReader::new(self.reader).lines();
        Box::pin(async_stream::stream! {
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match parse_sentence(&line) {
                        Ok(fix) => yield fix,
                        Err(NmeaError::Unsupported(_)) => {}
                        Err(e) => debug!(error = %e, "Skipping NMEA sentence"),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "NMEA reader failed");
                        break;
                    }
                }
            }
        })
    }
}
