//! Integration tests for the HTTP API

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::util::ServiceExt; // for `oneshot` method

use sighting_recorder::{
    api::{build_router, AppState},
    database::Database,
    dispatch::NotificationDispatcher,
    media::MediaStore,
    models::{ServerMessage, SubscriberId},
    registry::SubscriberRegistry,
    service::SightingService,
};

const BOUNDARY: &str = "sighting-test-boundary";

struct TestApp {
    router: Router,
    registry: Arc<SubscriberRegistry>,
    _upload_dir: TempDir,
}

async fn setup_app() -> TestApp {
    let database = Database::from_url("sqlite::memory:", 1)
        .await
        .expect("Should open in-memory database");
    let upload_dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(SubscriberRegistry::new(Duration::from_millis(100)));
    let service = SightingService::new(
        database,
        MediaStore::new(upload_dir.path()),
        NotificationDispatcher::new(Arc::clone(&registry)),
    );
    TestApp {
        router: build_router(AppState::new(service, 8), 1024 * 1024),
        registry,
        _upload_dir: upload_dir,
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn upload_request(fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, content_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn sighting_fields<'a>(lat: &'a str, lon: &'a str) -> Vec<(&'a str, &'a str)> {
    vec![
        ("lat", lat),
        ("lon", lon),
        ("bearing", "45"),
        ("timestamp", "2099-01-01T00:00:00Z"),
        ("device_id", "device-7"),
        ("user_flag", "FI"),
    ]
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

async fn post_sighting(app: &TestApp, lat: &str, lon: &str) -> Value {
    let request = upload_request(
        &sighting_fields(lat, lon),
        Some(("sky photo.jpg", "image/jpeg", b"jpeg")),
    );
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    extract_json(response.into_body()).await
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = setup_app().await;

    let response = app.router.clone().oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_upload_and_list() {
    let app = setup_app().await;
    let (tx, mut rx) = mpsc::channel(4);
    app.registry.connect(SubscriberId::from("watcher"), tx).await;

    let body = post_sighting(&app, "60.17", "24.94").await;

    assert_eq!(body["status"], "success");
    assert_eq!(body["sighting_id"], 1);
    let file_url = body["file_url"].as_str().unwrap().to_string();
    assert!(file_url.starts_with("/static/uploads/"));
    assert!(file_url.ends_with("_sky_photo.jpg"));
    assert!(matches!(
        rx.recv().await,
        Some(ServerMessage::ProximityAlert { .. })
    ));

    let response = app.router.clone().oneshot(get("/sightings")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let list = extract_json(response.into_body()).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["id"], 1);
    assert_eq!(list[0]["filename"], "sky photo.jpg");
    assert_eq!(list[0]["url"], file_url.as_str());
    assert_eq!(list[0]["lat"], 60.17);
    assert_eq!(list[0]["device_id"], "device-7");
    assert_eq!(list[0]["user_flag"], "FI");
    assert_eq!(list[0]["media_type"], "photo");

    let media = app.router.clone().oneshot(get(&file_url)).await.unwrap();
    assert_eq!(media.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(media.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"jpeg");
}

#[tokio::test]
async fn test_upload_invalid_latitude() {
    let app = setup_app().await;
    let (tx, mut rx) = mpsc::channel(4);
    app.registry.connect(SubscriberId::from("watcher"), tx).await;

    let request = upload_request(
        &sighting_fields("95", "0"),
        Some(("sky.jpg", "image/jpeg", b"jpeg")),
    );
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert!(body["error"].as_str().unwrap().contains("Invalid coordinates"));
    assert!(rx.try_recv().is_err());

    let response = app.router.clone().oneshot(get("/stats")).await.unwrap();
    let stats = extract_json(response.into_body()).await;
    assert_eq!(stats["total_sightings"], 0);
}

#[tokio::test]
async fn test_upload_invalid_bearing() {
    let app = setup_app().await;
    let mut fields = sighting_fields("10", "10");
    fields[2] = ("bearing", "400");

    let request = upload_request(&fields, Some(("sky.jpg", "image/jpeg", b"jpeg")));
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_missing_file() {
    let app = setup_app().await;

    let request = upload_request(&sighting_fields("10", "10"), None);
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"], "Invalid upload: missing field 'file'");
}

#[tokio::test]
async fn test_upload_video_content_type() {
    let app = setup_app().await;
    let request = upload_request(
        &sighting_fields("10", "10"),
        Some(("clip.mp4", "video/mp4", b"mp4")),
    );
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.router.clone().oneshot(get("/sightings")).await.unwrap();
    let list = extract_json(response.into_body()).await;
    assert_eq!(list[0]["media_type"], "video");
}

#[tokio::test]
async fn test_nearby_sightings() {
    let app = setup_app().await;
    post_sighting(&app, "41.0", "-75.0").await;
    post_sighting(&app, "40.0899", "-75.0").await;
    post_sighting(&app, "40.05", "-75.0").await;

    let response = app
        .router
        .clone()
        .oneshot(get("/sightings/nearby?lat=40.0&lon=-75.0&radius_km=10"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    let results = body.as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["id"], 3);
    assert_eq!(results[1]["id"], 2);
    assert_eq!(results[1]["distance_km"], 10.0);
    assert_eq!(results[1]["bearing_to_sighting"], 0.0);
}

#[tokio::test]
async fn test_nearby_default_radius_and_limit() {
    let app = setup_app().await;
    post_sighting(&app, "0.1", "0.0").await;
    post_sighting(&app, "0.2", "0.0").await;
    post_sighting(&app, "1.0", "0.0").await;

    let response = app
        .router
        .clone()
        .oneshot(get("/sightings/nearby?lat=0&lon=0&limit=1"))
        .await
        .unwrap();

    let body = extract_json(response.into_body()).await;
    let results = body.as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["id"], 1);
}

#[tokio::test]
async fn test_nearby_rejects_invalid_parameters() {
    let app = setup_app().await;

    for uri in [
        "/sightings/nearby?lat=91&lon=0",
        "/sightings/nearby?lat=0&lon=0&limit=0",
        "/sightings/nearby?lat=0&lon=0&limit=-3",
        "/sightings/nearby?lat=0&lon=0&radius_km=-1",
        "/sightings/nearby?lon=0",
        "/sightings/nearby?lat=0&lon=0&hours=-1",
        "/sightings?limit=ten",
        "/sightings?limit=0",
    ] {
        let response = app.router.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        let body = extract_json(response.into_body()).await;
        assert!(body["error"].is_string(), "{}", uri);
    }
}

#[tokio::test]
async fn test_malformed_query_reports_json_error() {
    let app = setup_app().await;

    let response = app
        .router
        .clone()
        .oneshot(get("/sightings/nearby?lon=0"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );
    let body = extract_json(response.into_body()).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid query: "));
}

#[tokio::test]
async fn test_stats() {
    let app = setup_app().await;
    let (tx, _rx) = mpsc::channel(4);
    app.registry.connect(SubscriberId::from("watcher"), tx).await;
    post_sighting(&app, "10", "10").await;

    let response = app.router.clone().oneshot(get("/stats")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let stats = extract_json(response.into_body()).await;
    assert_eq!(stats["total_sightings"], 1);
    assert_eq!(stats["active_websocket_connections"], 1);
    assert_eq!(stats["countries_represented"], 1);
}
