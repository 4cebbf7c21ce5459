// SPDX-License-Identifier: MPL-2.0

//! Best-effort positioning
//!
//! A [`PositionSource`] turns some positioning service into a stream of
//! [`Fix`]es. The [`LocationProvider`] keeps the most recent one and attaches
//! it to documents on request. A source that never yields is normal (no
//! signal) and simply leaves documents at their default coordinates.

pub mod nmea;
pub mod provider;

pub use nmea::NmeaSource;
pub use provider::LocationProvider;

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;
use std::pin::Pin;
use tokio::sync::mpsc;

/// A resolved geographic coordinate
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Fix {
    /// Decimal degrees, north positive
    pub latitude: f64,
    /// Decimal degrees, east positive
    pub longitude: f64,
    /// Estimated horizontal error in metres, if the source reports one
    pub accuracy_m: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Fix {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_m: None,
            timestamp: Utc::now(),
        }
    }
}

/// Stream of fixes produced by a source
pub type FixStream = Pin<Box<dyn Stream<Item = Fix> + Send>>;

/// A positioning service
pub trait PositionSource: Send + 'static {
    /// Start producing fixes; the stream may never yield
    fn fixes(self: Box<Self>) -> FixStream;
}

/// A fixed, known position (e.g. entered by the operator)
#[derive(Debug, Clone, Copy)]
pub struct StaticPosition(pub Fix);

impl PositionSource for StaticPosition {
    fn fixes(self: Box<Self>) -> FixStream {
        Box::pin(futures::stream::once(async move { self.0 }))
    }
}

/// A receiver with no signal: never produces a fix
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSignal;

impl PositionSource for NoSignal {
    fn fixes(self: Box<Self>) -> FixStream {
        Box::pin(futures::stream::pending::<Fix>())
    }
}

/// Fixes pushed by another part of the program
impl PositionSource for mpsc::UnboundedReceiver<Fix> {
    fn fixes(self: Box<Self>) -> FixStream {
        let mut rx = *self;
        Box::pin(async_stream::stream! {
            while let Some(fix) = rx.recv().await {
                yield fix;
            }
        })
    }
}
