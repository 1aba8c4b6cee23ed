use std::net::SocketAddr;
use mediakit::{config::MediaConfig, router, MediaService};

/// MediaKit standalone server entry point.
///
/// Initializes tracing, resolves configuration and storage mode once, and
/// serves media requests under the configured route prefix.
///
/// # Configuration
/// See [`MediaConfig::from_env`]. Setting `STORAGE_BUCKET` switches the
/// deployment to cloud-backed mode; otherwise originals are read from
/// `MEDIAKIT_ORIGIN_DIR`. `RUST_LOG` controls verbosity (default:
/// "mediakit=debug,tower_http=debug").
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mediakit=debug,tower_http=debug".into())
        )
        .init();

    tracing::info!("Starting MediaKit server");

    let cfg = MediaConfig::from_env()?;
    cfg.validate()?;

    let service = MediaService::from_config(&cfg)?;
    tracing::info!(
        mode = ?service.mode(),
        prefix = %cfg.route_prefix,
        cache_dir = %cfg.cache_dir.display(),
        "Storage mode resolved"
    );

    let app = router(service, &cfg);

    // Bind to 0.0.0.0 for external access (required for containerized deployment)
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
