use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use interviz_core::config::{discover_dem, LayeredConfig};
use interviz_engine::{metadata, Dispatcher, DispatcherConfig, GrassEngine, JobExecutor, Workspace};
use interviz_geo::transform::GeoTransform;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use interviz_api::config::ApiConfig;
use interviz_api::router::create_router;
use interviz_api::state::AppState;

const GRASS_LAUNCHER: &str = "grass";
const GDALINFO: &str = "gdalinfo";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "interviz_api=info,interviz_engine=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = LayeredConfig::load().context("Failed to load configuration")?;
    let api_config = ApiConfig::from_layered(&config);

    let dem_path = match &config.dem_path.value {
        Some(path) => path.clone(),
        None => discover_dem(&std::env::current_dir()?)
            .context("No elevation raster configured (set INTERVIZ_DEM)")?,
    };

    tracing::info!(
        dem = %dem_path.display(),
        bind = %api_config.bind_address(),
        pool_size = config.pool_size.value,
        policy = %config.region_policy.value,
        "Starting Interviz API server"
    );

    let extent = metadata::read_extent(GDALINFO, &dem_path)
        .await
        .context("Failed to read raster metadata")?;
    let transform = Arc::new(
        GeoTransform::for_extent(&extent).context("Failed to set up coordinate transforms")?,
    );

    let engine = match GrassEngine::discover(GRASS_LAUNCHER).await {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            tracing::error!("GRASS GIS is not available: {}", e);
            tracing::error!(
                "Remediation:\n\
                1. Install GRASS GIS (8.x) so that `grass` is on the PATH\n\
                2. Check that `grass --config path` prints the installation directory"
            );
            std::process::exit(1);
        }
    };

    let workspace = match Workspace::bootstrap(
        engine.as_ref(),
        &config.temp_root.value,
        &dem_path,
        extent.clone(),
    )
    .await
    {
        Ok(workspace) => Arc::new(workspace),
        Err(e) => {
            tracing::error!("Failed to prepare the GRASS workspace: {}", e);
            tracing::error!(
                "Remediation:\n\
                1. Ensure {} is writable\n\
                2. Verify the raster is readable by GDAL (`gdalinfo {}`)\n\
                3. Check that GRASS knows the raster's CRS",
                config.temp_root.value.display(),
                dem_path.display()
            );
            std::process::exit(1);
        }
    };

    let executor = Arc::new(JobExecutor::new(engine, workspace.clone(), transform.clone()));
    let dispatcher = Arc::new(Dispatcher::start(
        DispatcherConfig {
            pool_size: config.pool_size.value,
            queue_capacity: config.queue_capacity.value,
            job_timeout: Duration::from_secs(config.job_timeout_secs.value),
            region_policy: config.region_policy.value,
        },
        executor,
    )?);

    let state = Arc::new(AppState::new(
        extent,
        transform,
        dispatcher.clone(),
        api_config.clone(),
        workspace.location(),
        config.region_policy.value,
    ));

    let cors = CorsLayer::new()
        .allow_origin(
            api_config
                .cors_origin
                .parse::<HeaderValue>()
                .context("Invalid CORS origin")?,
        )
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let app = create_router(state).layer(cors);

    let addr = api_config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Listening on {}", addr);
    tracing::info!("CORS enabled for {}", api_config.cors_origin);

    let served = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await;

    dispatcher.shutdown().await;
    workspace.cleanup();

    served.context("Server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
