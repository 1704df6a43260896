//! Sighting recorder
//!
//! Accepts geotagged photo and video sighting reports, stores them, answers
//! radius queries and pushes every new sighting to connected WebSocket
//! subscribers.

pub mod api;
pub mod config;
pub mod database;
pub mod dispatch;
pub mod errors;
pub mod geo;
pub mod media;
pub mod models;
pub mod proximity;
pub mod registry;
pub mod service;
pub mod ws;
