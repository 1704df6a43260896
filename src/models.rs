//! Data models.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::SightingError;

/// Geographic position in WGS84 decimal degrees
///
/// Latitude is within [-90, 90] and longitude within [-180, 180]. A value of
/// this type can only be obtained through validation, so every stored or
/// compared coordinate is in range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    lat: f64,
    lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Result<Self, SightingError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(SightingError::InvalidCoordinate { lat, lon });
        }
        Ok(Self { lat, lon })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }
}

/// Facing direction reported by the observer, degrees clockwise from north
///
/// Accepted range is [0, 360] inclusive. This is the direction the camera
/// was pointing, unrelated to the bearing computed between two coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Bearing(f64);

impl TryFrom<f64> for Bearing {
    type Error = SightingError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !(0.0..=360.0).contains(&value) {
            return Err(SightingError::InvalidBearing(value));
        }
        Ok(Self(value))
    }
}

impl Bearing {
    pub fn value(&self) -> f64 {
        self.0
    }
}

/// Store-assigned sighting identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct SightingId(i64);

impl SightingId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for SightingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-supplied identifier of a live subscriber connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(String);

impl From<String> for SubscriberId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SubscriberId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of media attached to a sighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    Photo,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Photo => "photo",
            MediaType::Video => "video",
        }
    }

    /// Guess the media type from an upload's content type, e.g. `video/mp4`
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type.starts_with("video/") {
            MediaType::Video
        } else {
            MediaType::Photo
        }
    }
}

impl FromStr for MediaType {
    type Err = SightingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "photo" => Ok(MediaType::Photo),
            "video" => Ok(MediaType::Video),
            other => Err(SightingError::InvalidUpload(format!(
                "unknown media type '{}'",
                other
            ))),
        }
    }
}

/// Reference to a stored media file
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRef {
    /// File name as uploaded by the client
    pub original_name: String,
    /// Location of the stored file
    pub path: PathBuf,
}

impl MediaRef {
    /// Name of the stored file within the upload directory
    pub fn stored_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Public URL path under which the stored file is served
    pub fn url(&self) -> String {
        format!("/static/uploads/{}", self.stored_name())
    }
}

/// Validated sighting waiting to be persisted
#[derive(Debug, Clone, PartialEq)]
pub struct NewSighting {
    pub coordinate: Coordinate,
    pub bearing: Bearing,
    pub captured_at: DateTime<Utc>,
    pub device_id: String,
    pub flag: Option<String>,
    pub media_type: MediaType,
    pub media: MediaRef,
}

/// Persisted sighting report
///
/// Created once on upload and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SightingRecord {
    pub id: SightingId,
    pub coordinate: Coordinate,
    pub bearing: Bearing,
    /// Capture time reported by the device
    pub captured_at: DateTime<Utc>,
    pub device_id: String,
    /// Free-form tag chosen by the reporter
    pub flag: Option<String>,
    pub media_type: MediaType,
    pub media: MediaRef,
}

impl SightingRecord {
    pub fn from_new(id: SightingId, sighting: NewSighting) -> Self {
        Self {
            id,
            coordinate: sighting.coordinate,
            bearing: sighting.bearing,
            captured_at: sighting.captured_at,
            device_id: sighting.device_id,
            flag: sighting.flag,
            media_type: sighting.media_type,
            media: sighting.media,
        }
    }
}

/// Last location reported by a subscriber
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KnownLocation {
    pub coordinate: Coordinate,
    pub updated_at: DateTime<Utc>,
}

/// Sighting annotated with its position relative to a query origin
#[derive(Debug, Clone, PartialEq)]
pub struct ProximityResult {
    pub record: SightingRecord,
    /// Great-circle distance from the origin in kilometers
    pub distance_km: f64,
    /// Initial bearing from the origin to the sighting, [0, 360)
    pub bearing_from_origin: f64,
}

/// Sighting summary pushed to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertData {
    pub id: SightingId,
    pub lat: f64,
    pub lon: f64,
    pub bearing: f64,
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
    pub flag: Option<String>,
    pub media_type: MediaType,
    pub file_url: String,
}

impl From<&SightingRecord> for AlertData {
    fn from(record: &SightingRecord) -> Self {
        Self {
            id: record.id,
            lat: record.coordinate.lat(),
            lon: record.coordinate.lon(),
            bearing: record.bearing.value(),
            timestamp: record.captured_at,
            device_id: record.device_id.clone(),
            flag: record.flag.clone(),
            media_type: record.media_type,
            file_url: record.media.url(),
        }
    }
}

/// Messages sent from the server to a subscriber
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ProximityAlert { data: AlertData },
    LocationAck { lat: f64, lon: f64 },
}

/// Messages accepted from a subscriber
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    LocationUpdate { lat: f64, lon: f64 },
}

/// Parse a capture timestamp
///
/// Accepts RFC 3339 (`2024-06-01T21:30:00Z`, `2024-06-01T23:30:00+02:00`) and
/// offset-less ISO-8601 date-times, which are taken to be UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, SightingError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::from_str(value)
        .map(|naive| naive.and_utc())
        .map_err(|_| SightingError::InvalidTimestamp(value.to_string()))
}
