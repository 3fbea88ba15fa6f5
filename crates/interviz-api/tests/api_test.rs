//! HTTP tests against the router, backed by the in-memory engine

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use interviz_api::{create_router, ApiConfig, AppState};
use interviz_core::config::{ErrorStatusMode, RegionPolicy};
use interviz_core::models::RasterExtent;
use interviz_engine::{Dispatcher, DispatcherConfig, JobExecutor, MemoryEngine, Workspace};
use interviz_geo::transform::GeoTransform;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

struct Fixture {
    _dir: TempDir,
    router: Router,
    dispatcher: Arc<Dispatcher>,
}

/// Lambert-93 raster covering the Grenoble area, at a coarse resolution
fn lambert93_extent() -> RasterExtent {
    RasterExtent::new(
        Some(2154),
        "",
        [871682.0, 6392480.0, 984410.0, 6551114.0],
        500.0,
        500.0,
    )
    .unwrap()
}

async fn fixture(error_status: ErrorStatusMode) -> Fixture {
    let dir = TempDir::new().unwrap();
    let dem = dir.path().join("dem.tif");
    std::fs::write(&dem, b"dem").unwrap();
    std::fs::write(dir.path().join("index.html"), "<html>interviz</html>").unwrap();

    let extent = lambert93_extent();
    let transform = Arc::new(GeoTransform::for_extent(&extent).unwrap());
    let engine = Arc::new(MemoryEngine::new());
    let workspace = Arc::new(
        Workspace::bootstrap(engine.as_ref(), dir.path(), &dem, extent.clone()).await.unwrap(),
    );
    let executor = Arc::new(JobExecutor::new(engine, workspace.clone(), transform.clone()));
    let dispatcher = Arc::new(
        Dispatcher::start(
            DispatcherConfig {
                pool_size: 2,
                queue_capacity: 4,
                job_timeout: Duration::from_secs(30),
                region_policy: RegionPolicy::Isolated,
            },
            executor,
        )
        .unwrap(),
    );

    let config = ApiConfig {
        static_dir: dir.path().to_path_buf(),
        error_status,
        ..ApiConfig::default()
    };
    let state = Arc::new(AppState::new(
        extent,
        transform,
        dispatcher.clone(),
        config,
        workspace.location(),
        RegionPolicy::Isolated,
    ));

    Fixture {
        _dir: dir,
        router: create_router(state),
        dispatcher,
    }
}

async fn get(router: &Router, uri: &str) -> (StatusCode, String) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn get_json(router: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = get(router, uri).await;
    (status, serde_json::from_str(&body).unwrap())
}

fn error_message(body: &Value) -> &str {
    body["message"].as_str().unwrap_or_else(|| panic!("not an error body: {}", body))
}

#[tokio::test]
async fn test_viewshed_returns_features_near_the_observer() {
    let f = fixture(ErrorStatusMode::Compat).await;

    let (status, body) =
        get_json(&f.router, "/viewshed?coordinates=45.19,5.72&height1=1.6&height2=0").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "FeatureCollection");
    let features = body["features"].as_array().unwrap();
    assert_eq!(features.len(), 1);
    assert_eq!(features[0]["properties"], serde_json::json!({"visibility": 1.0}));

    let ring = features[0]["geometry"]["coordinates"][0].as_array().unwrap();
    for position in ring {
        let lon = position[0].as_f64().unwrap();
        let lat = position[1].as_f64().unwrap();
        // default max distance is 22 km
        assert!((lon - 5.72).abs() < 0.4, "lon = {}", lon);
        assert!((lat - 45.19).abs() < 0.3, "lat = {}", lat);
    }
}

#[tokio::test]
async fn test_point_outside_raster_is_rejected_before_dispatch() {
    let f = fixture(ErrorStatusMode::Compat).await;

    let (status, body) = get_json(&f.router, "/viewshed?coordinates=0,0&height1=1&height2=1").await;

    assert_eq!(status, StatusCode::OK);
    let message = error_message(&body);
    assert!(message.starts_with("Error : Requested point"), "{}", message);
    assert!(message.contains("outside the allowed region"));
    assert!(message.contains("(xmin=871682, xmax=984410, ymin=6392480, ymax=6551114)"));
    assert_eq!(f.dispatcher.stats().submitted, 0);
}

#[tokio::test]
async fn test_missing_and_malformed_parameters() {
    let f = fixture(ErrorStatusMode::Compat).await;

    let (_, body) = get_json(&f.router, "/viewshed?coordinates=45.19,5.72&height2=0").await;
    assert_eq!(error_message(&body), "Error : Missing parameter: height1");

    let (_, body) =
        get_json(&f.router, "/viewshed?coordinates=45.19,5.72&height1=tall&height2=0").await;
    assert!(error_message(&body).contains("height1"));

    let (_, body) = get_json(&f.router, "/viewshed?coordinates=45.19&height1=1&height2=0").await;
    assert!(error_message(&body).contains("coordinates"));

    assert_eq!(f.dispatcher.stats().submitted, 0);
}

#[tokio::test]
async fn test_sunmask_returns_sun_features() {
    let f = fixture(ErrorStatusMode::Compat).await;

    let (status, body) = get_json(
        &f.router,
        "/sunmask?coordinates=45.19,5.72&year=2024&month=6&day=21&hour=18&minute=30&timezone=2",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let features = body["features"].as_array().unwrap();
    assert!(!features.is_empty());
    for feature in features {
        assert_eq!(feature["properties"], serde_json::json!({"sun": 1.0}));
    }
}

#[tokio::test]
async fn test_sunmask_parameter_rules() {
    let f = fixture(ErrorStatusMode::Compat).await;
    let base = "/sunmask?coordinates=45.19,5.72&year=2024&month=6&day=21&hour=12&minute=0";

    let (_, body) = get_json(&f.router, &format!("{}&timezone=26", base)).await;
    assert!(error_message(&body).contains("timezone"));

    let (_, body) = get_json(&f.router, &format!("{}&max_distance=4000.5", base)).await;
    assert!(error_message(&body).contains("max_distance"));

    let (_, body) = get_json(&f.router, &format!("{}&timezone=25&max_distance=1000", base)).await;
    assert_eq!(body["type"], "FeatureCollection");

    // date and time are checked before the coordinates
    let (_, body) = get_json(
        &f.router,
        "/sunmask?coordinates=0,0&year=2024&month=13&day=1&hour=12&minute=0",
    )
    .await;
    assert!(!error_message(&body).contains("outside"), "{}", body);
}

#[tokio::test]
async fn test_http_status_mode() {
    let f = fixture(ErrorStatusMode::Http).await;

    let (status, body) = get_json(&f.router, "/viewshed?coordinates=0,0&height1=1&height2=1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_message(&body).starts_with("Error : "));

    let (status, _) =
        get_json(&f.router, "/viewshed?coordinates=45.19,5.72&height1=1.6&height2=0").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_reports_job_counters() {
    let f = fixture(ErrorStatusMode::Compat).await;
    get(&f.router, "/viewshed?coordinates=45.19,5.72&height1=1.6&height2=0").await;

    let (status, body) = get_json(&f.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["policy"], "isolated");
    assert_eq!(body["crs"], "EPSG:2154");
    assert_eq!(body["jobs"]["submitted"], 1);
    assert_eq!(body["jobs"]["succeeded"], 1);
    assert_eq!(body["location"].as_str().unwrap().len(), 24);
}

#[tokio::test]
async fn test_index_and_unknown_routes() {
    let f = fixture(ErrorStatusMode::Compat).await;

    for uri in ["/", "/index"] {
        let (status, body) = get(&f.router, uri).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("interviz"));
    }

    let (status, body) = get(&f.router, "/nothing/here").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ERROR 404 !");
}

#[tokio::test]
async fn test_unknown_route_status_in_http_mode() {
    let f = fixture(ErrorStatusMode::Http).await;

    let (status, body) = get(&f.router, "/nothing/here").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "ERROR 404 !");
}

#[tokio::test]
async fn test_repeated_parameter_uses_first_value() {
    let f = fixture(ErrorStatusMode::Compat).await;

    let (status, body) = get_json(
        &f.router,
        "/viewshed?coordinates=45.19,5.72&height1=1&height1=2&height2=0",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "FeatureCollection");

    // the first value decides, even when a later one is valid
    let (status, body) = get_json(
        &f.router,
        "/viewshed?coordinates=45.19,5.72&height1=tall&height1=2&height2=0",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(error_message(&body).contains("height1"), "{}", body);
}
