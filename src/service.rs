//! Sighting use cases shared by the HTTP handlers

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use serde::Serialize;
use tracing::{error, info};

use crate::database::Database;
use crate::dispatch::NotificationDispatcher;
use crate::errors::SightingError;
use crate::media::MediaStore;
use crate::models::{
    parse_timestamp, Bearing, Coordinate, MediaType, NewSighting, ProximityResult, SightingRecord,
};
use crate::proximity::{self, ProximityQuery};
use crate::registry::SubscriberRegistry;

pub const UNKNOWN_DEVICE: &str = "unknown";

/// Raw sighting report as submitted by a client
#[derive(Debug, Clone, Default)]
pub struct SightingUpload {
    pub lat: f64,
    pub lon: f64,
    pub bearing: f64,
    pub timestamp: String,
    pub device_id: Option<String>,
    pub flag: Option<String>,
    pub media_type: Option<MediaType>,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Aggregate counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total_sightings: i64,
    pub recent_24h: i64,
    pub active_websocket_connections: usize,
    pub countries_represented: i64,
}

#[derive(Debug, Clone)]
pub struct SightingService {
    database: Database,
    media: MediaStore,
    dispatcher: NotificationDispatcher,
}

impl SightingService {
    pub fn new(database: Database, media: MediaStore, dispatcher: NotificationDispatcher) -> Self {
        Self {
            database,
            media,
            dispatcher,
        }
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        self.dispatcher.registry()
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn media(&self) -> &MediaStore {
        &self.media
    }

    /// Validate, persist and announce a new sighting
    ///
    /// Either the media file and the record are both stored or neither is.
    /// The announcement to subscribers cannot make creation fail.
    pub async fn create_sighting(
        &self,
        upload: SightingUpload,
    ) -> Result<SightingRecord, SightingError> {
        let coordinate = Coordinate::new(upload.lat, upload.lon)?;
        let bearing = Bearing::try_from(upload.bearing)?;
        let captured_at = parse_timestamp(&upload.timestamp)?;
        if upload.bytes.is_empty() {
            return Err(SightingError::InvalidUpload("media file is empty".to_string()));
        }

        let media = self.media.store(&upload.bytes, &upload.file_name).await?;
        let sighting = NewSighting {
            coordinate,
            bearing,
            captured_at,
            device_id: non_empty(upload.device_id).unwrap_or_else(|| UNKNOWN_DEVICE.to_string()),
            flag: non_empty(upload.flag),
            media_type: upload.media_type.unwrap_or_default(),
            media,
        };

        let id = match self.database.insert_sighting(&sighting).await {
            Ok(id) => id,
            Err(e) => {
                error!("Failed to save sighting: {}", e);
                self.media.remove(&sighting.media).await;
                return Err(store_unavailable(e));
            }
        };

        let record = SightingRecord::from_new(id, sighting);
        info!(
            "Sighting {} recorded at ({}, {}) by {}",
            record.id,
            record.coordinate.lat(),
            record.coordinate.lon(),
            record.device_id
        );

        self.dispatcher.on_sighting_created(&record).await;
        Ok(record)
    }

    /// Sightings newest first
    pub async fn list_sightings(
        &self,
        limit: i64,
        offset: u32,
    ) -> Result<Vec<SightingRecord>, SightingError> {
        if limit <= 0 {
            return Err(SightingError::InvalidLimit(limit));
        }
        self.database
            .list_sightings(limit, i64::from(offset))
            .await
            .map_err(store_unavailable)
    }

    /// Sightings around a point, nearest first
    pub async fn list_nearby(
        &self,
        query: &ProximityQuery,
    ) -> Result<Vec<ProximityResult>, SightingError> {
        let candidates = self
            .database
            .all_sightings()
            .await
            .map_err(store_unavailable)?;
        Ok(proximity::query(candidates, query, Utc::now()))
    }

    pub async fn stats(&self) -> Result<Stats, SightingError> {
        let since = Utc::now() - TimeDelta::hours(24);
        let total_sightings = self
            .database
            .count_sightings()
            .await
            .map_err(store_unavailable)?;
        let recent_24h = self
            .database
            .count_captured_since(since)
            .await
            .map_err(store_unavailable)?;
        let countries_represented = self
            .database
            .count_distinct_flags()
            .await
            .map_err(store_unavailable)?;

        Ok(Stats {
            total_sightings,
            recent_24h,
            active_websocket_connections: self.registry().len().await,
            countries_represented,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn store_unavailable(e: SightingError) -> SightingError {
    match e {
        SightingError::DatabaseError(e) => SightingError::StoreUnavailable(e.to_string()),
        SightingError::MigrationError(e) => SightingError::StoreUnavailable(e.to_string()),
        other => other,
    }
}
