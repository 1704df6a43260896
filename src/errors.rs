//! Errors for sighting recorder
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum SightingError {
    #[error("Invalid coordinates: lat={lat}, lon={lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },

    #[error("Bearing must be 0-360 degrees, got {0}")]
    InvalidBearing(f64),

    #[error("Limit must be a positive integer, got {0}")]
    InvalidLimit(i64),

    #[error("Radius must be a non-negative number of kilometers, got {0}")]
    InvalidRadius(f64),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Unknown subscriber: {0}")]
    UnknownSubscriber(String),

    #[error("Sighting store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Delivery to subscriber {0} failed")]
    DeliveryFailure(String),

    #[error("Configuration error")]
    ConfigError(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Serialization error")]
    SerdeError(#[from] serde_json::Error),

    #[error("IO error")]
    IoError(#[from] std::io::Error),

    #[error("HTTP server error: {0}")]
    ServerError(String),

    #[error("Database migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),
}

impl SightingError {
    /// HTTP status reported for this error at the request boundary
    pub fn status_code(&self) -> StatusCode {
        match self {
            SightingError::InvalidCoordinate { .. }
            | SightingError::InvalidBearing(_)
            | SightingError::InvalidLimit(_)
            | SightingError::InvalidRadius(_)
            | SightingError::InvalidTimestamp(_)
            | SightingError::InvalidUpload(_)
            | SightingError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            SightingError::UnknownSubscriber(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SightingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            error!("Request failed: {:?}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
