// src/database.rs
mod models;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{error, info};

use crate::{
    config::DatabaseConfig,
    errors::SightingError,
    models::{NewSighting, SightingId, SightingRecord},
};
use models::SightingRow;

const SELECT_SIGHTINGS: &str = "SELECT id, filename, media_path, lat, lon, bearing, captured_at,
    device_id, user_flag, media_type FROM sightings";

/// Append-only store of sighting records
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the database described by `config`, creating it if missing
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, SightingError> {
        config.validate()?;
        Self::from_url(&config.url, config.max_connections).await
    }

    /// Open a database from a `sqlite:` URL, creating it if missing
    ///
    /// In-memory databases exist per connection, so they are served from a
    /// single connection that is never recycled.
    pub async fn from_url(url: &str, max_connections: u32) -> Result<Self, SightingError> {
        info!("Opening database at {}", url);
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool_options = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections)
        };

        let pool = pool_options.connect_with(options).await.map_err(|e| {
            error!("Failed to open database: {}", e);
            e
        })?;

        Self::new(pool).await
    }

    /// Wrap an existing pool, applying pending migrations
    pub async fn new(pool: SqlitePool) -> Result<Self, SightingError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Persist a new sighting and return its assigned id
    pub async fn insert_sighting(&self, sighting: &NewSighting) -> Result<SightingId, SightingError> {
        let result = sqlx::query(
            "INSERT INTO sightings (
                filename, media_path, lat, lon, bearing,
                captured_at, device_id, user_flag, media_type
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&sighting.media.original_name)
        .bind(sighting.media.path.to_string_lossy().into_owned())
        .bind(sighting.coordinate.lat())
        .bind(sighting.coordinate.lon())
        .bind(sighting.bearing.value())
        .bind(sighting.captured_at)
        .bind(&sighting.device_id)
        .bind(sighting.flag.as_deref())
        .bind(sighting.media_type.as_str())
        .execute(&self.pool)
        .await?;

        Ok(SightingId::new(result.last_insert_rowid()))
    }

    /// Fetch a single sighting
    pub async fn get_sighting(&self, id: SightingId) -> Result<Option<SightingRecord>, SightingError> {
        let row: Option<SightingRow> = sqlx::query_as(&format!("{} WHERE id = ?1", SELECT_SIGHTINGS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(SightingRecord::try_from).transpose()
    }

    /// Page through sightings, newest first
    pub async fn list_sightings(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SightingRecord>, SightingError> {
        let rows: Vec<SightingRow> = sqlx::query_as(&format!(
            "{} ORDER BY id DESC LIMIT ?1 OFFSET ?2",
            SELECT_SIGHTINGS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SightingRecord::try_from).collect()
    }

    /// All sightings in creation order
    pub async fn all_sightings(&self) -> Result<Vec<SightingRecord>, SightingError> {
        let rows: Vec<SightingRow> =
            sqlx::query_as(&format!("{} ORDER BY id ASC", SELECT_SIGHTINGS))
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(SightingRecord::try_from).collect()
    }

    pub async fn count_sightings(&self) -> Result<i64, SightingError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sightings")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Number of sightings captured at or after `since`
    pub async fn count_captured_since(&self, since: DateTime<Utc>) -> Result<i64, SightingError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sightings WHERE captured_at >= ?1")
            .bind(since)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Number of distinct non-empty flags across all sightings
    pub async fn count_distinct_flags(&self) -> Result<i64, SightingError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT user_flag) FROM sightings
             WHERE user_flag IS NOT NULL AND user_flag != ''",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
