// src/database/models.rs
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::errors::SightingError;
use crate::models::{Bearing, Coordinate, MediaRef, SightingId, SightingRecord};

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SightingRow {
    id: SightingId,
    filename: String,
    media_path: String,
    lat: f64,
    lon: f64,
    bearing: f64,
    captured_at: DateTime<Utc>,
    device_id: String,
    user_flag: Option<String>,
    media_type: String,
}

impl TryFrom<SightingRow> for SightingRecord {
    type Error = SightingError;

    fn try_from(row: SightingRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = move |e: SightingError| {
            SightingError::StoreUnavailable(format!("sighting {} is corrupt: {}", id, e))
        };

        Ok(SightingRecord {
            id,
            coordinate: Coordinate::new(row.lat, row.lon).map_err(corrupt)?,
            bearing: Bearing::try_from(row.bearing).map_err(corrupt)?,
            captured_at: row.captured_at,
            device_id: row.device_id,
            flag: row.user_flag,
            media_type: row.media_type.parse().map_err(corrupt)?,
            media: MediaRef {
                original_name: row.filename,
                path: PathBuf::from(row.media_path),
            },
        })
    }
}
