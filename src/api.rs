//! HTTP API
//!
//! Routes:
//! - `GET /` and `GET /health`
//! - `POST /upload` multipart sighting upload
//! - `GET /sightings` newest first, paginated
//! - `GET /sightings/nearby` radius search around a point
//! - `GET /stats`
//! - `GET /ws/{subscriber_id}` live proximity alerts
//! - `/static/uploads/*` stored media

use axum::{
    extract::{rejection::QueryRejection, DefaultBodyLimit, Multipart, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::debug;

use crate::errors::SightingError;
use crate::models::{Coordinate, MediaType, ProximityResult, SightingId, SightingRecord};
use crate::proximity::{ProximityQuery, DEFAULT_LIMIT, DEFAULT_RADIUS_KM};
use crate::service::{SightingService, SightingUpload, Stats};
use crate::ws;

/// Shared state handed to every handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub service: SightingService,
    /// Capacity of each subscriber's outbound channel
    pub channel_capacity: usize,
}

impl AppState {
    pub fn new(service: SightingService, channel_capacity: usize) -> Self {
        Self {
            service,
            channel_capacity,
        }
    }
}

pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    let uploads = ServeDir::new(state.service.media().upload_dir());

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/upload", post(upload))
        .route("/sightings", get(list_sightings))
        .route("/sightings/nearby", get(nearby_sightings))
        .route("/stats", get(stats))
        .route("/ws/{subscriber_id}", get(ws::subscribe))
        .nest_service("/static/uploads", uploads)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Sighting as returned by the listing endpoints
#[derive(Debug, Serialize)]
pub struct SightingView {
    pub id: SightingId,
    pub filename: String,
    pub url: String,
    pub lat: f64,
    pub lon: f64,
    pub bearing: f64,
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
    pub user_flag: Option<String>,
    pub media_type: MediaType,
}

impl From<SightingRecord> for SightingView {
    fn from(record: SightingRecord) -> Self {
        Self {
            id: record.id,
            url: record.media.url(),
            filename: record.media.original_name,
            lat: record.coordinate.lat(),
            lon: record.coordinate.lon(),
            bearing: record.bearing.value(),
            timestamp: record.captured_at,
            device_id: record.device_id,
            user_flag: record.flag,
            media_type: record.media_type,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NearbySightingView {
    #[serde(flatten)]
    pub sighting: SightingView,
    /// Distance from the query point, rounded to 10 m
    pub distance_km: f64,
    /// Bearing from the query point to the sighting, rounded to 0.1°
    pub bearing_to_sighting: f64,
}

impl From<ProximityResult> for NearbySightingView {
    fn from(result: ProximityResult) -> Self {
        Self {
            distance_km: (result.distance_km * 100.0).round() / 100.0,
            bearing_to_sighting: (result.bearing_from_origin * 10.0).round() / 10.0 % 360.0,
            sighting: SightingView::from(result.record),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: &'static str,
    pub file_url: String,
    pub sighting_id: SightingId,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: u32,
}

#[derive(Debug, Deserialize)]
pub struct NearbyParams {
    pub lat: f64,
    pub lon: f64,
    #[serde(default = "default_radius", alias = "radius")]
    pub radius_km: f64,
    /// Only include sightings captured within this many hours
    pub hours: Option<u32>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

fn default_radius() -> f64 {
    DEFAULT_RADIUS_KM
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": format!("Sighting recorder API v{}", env!("CARGO_PKG_VERSION")),
        "status": "running",
        "features": ["websockets", "proximity_alerts", "real_time"],
    }))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
    }))
}

/// POST /upload
async fn upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, SightingError> {
    let upload = read_upload(multipart).await?;
    let record = state.service.create_sighting(upload).await?;

    Ok(Json(UploadResponse {
        status: "success",
        file_url: record.media.url(),
        sighting_id: record.id,
    }))
}

/// GET /sightings
async fn list_sightings(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<SightingView>>, SightingError> {
    let Query(params) = params.map_err(invalid_query)?;
    let records = state
        .service
        .list_sightings(params.limit, params.offset)
        .await?;
    Ok(Json(records.into_iter().map(SightingView::from).collect()))
}

/// GET /sightings/nearby
async fn nearby_sightings(
    State(state): State<AppState>,
    params: Result<Query<NearbyParams>, QueryRejection>,
) -> Result<Json<Vec<NearbySightingView>>, SightingError> {
    let Query(params) = params.map_err(invalid_query)?;
    let origin = Coordinate::new(params.lat, params.lon)?;
    let query = ProximityQuery::new(origin, params.radius_km, params.hours, params.limit)?;
    let results = state.service.list_nearby(&query).await?;
    Ok(Json(
        results.into_iter().map(NearbySightingView::from).collect(),
    ))
}

/// GET /stats
async fn stats(State(state): State<AppState>) -> Result<Json<Stats>, SightingError> {
    Ok(Json(state.service.stats().await?))
}

/// Collect the multipart form of an upload
async fn read_upload(mut multipart: Multipart) -> Result<SightingUpload, SightingError> {
    let mut lat = None;
    let mut lon = None;
    let mut bearing = None;
    let mut timestamp = None;
    let mut device_id = None;
    let mut flag = None;
    let mut media_type = None;
    let mut file = None;

    while let Some(field) = multipart.next_field().await.map_err(invalid_form)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(invalid_form)?;
                file = Some((file_name, content_type, bytes.to_vec()));
            }
            "lat" => lat = Some(parse_number(&name, &field.text().await.map_err(invalid_form)?)?),
            "lon" => lon = Some(parse_number(&name, &field.text().await.map_err(invalid_form)?)?),
            "bearing" => {
                bearing = Some(parse_number(&name, &field.text().await.map_err(invalid_form)?)?)
            }
            "timestamp" => timestamp = Some(field.text().await.map_err(invalid_form)?),
            "device_id" => device_id = Some(field.text().await.map_err(invalid_form)?),
            "user_flag" => flag = Some(field.text().await.map_err(invalid_form)?),
            "media_type" => {
                media_type = Some(field.text().await.map_err(invalid_form)?.parse::<MediaType>()?)
            }
            other => debug!("Ignoring upload field '{}'", other),
        }
    }

    let (file_name, content_type, bytes) = file.ok_or_else(|| missing("file"))?;
    let media_type = media_type.or_else(|| content_type.as_deref().map(MediaType::from_content_type));

    Ok(SightingUpload {
        lat: lat.ok_or_else(|| missing("lat"))?,
        lon: lon.ok_or_else(|| missing("lon"))?,
        bearing: bearing.ok_or_else(|| missing("bearing"))?,
        timestamp: timestamp.ok_or_else(|| missing("timestamp"))?,
        device_id,
        flag,
        media_type,
        file_name,
        bytes,
    })
}

fn parse_number(field: &str, value: &str) -> Result<f64, SightingError> {
    value
        .trim()
        .parse()
        .map_err(|_| SightingError::InvalidUpload(format!("field '{}' must be a number", field)))
}

fn missing(field: &str) -> SightingError {
    SightingError::InvalidUpload(format!("missing field '{}'", field))
}

fn invalid_query(e: QueryRejection) -> SightingError {
    SightingError::InvalidQuery(e.body_text())
}

fn invalid_form(e: axum::extract::multipart::MultipartError) -> SightingError {
    SightingError::InvalidUpload(e.body_text())
}
