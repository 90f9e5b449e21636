//! PhishNet - security-awareness campaign server entry point

use anyhow::Result;
use phishnet_api::AppState;
use phishnet_common::config::Config;
use phishnet_core::dispatch::{CampaignDispatcher, SmtpMailSender};
use phishnet_core::geo::{GeoResolver, IpinfoResolver, NullGeoResolver};
use phishnet_core::template::{AiTemplateProvider, LureRenderer, TemplateProvider};
use phishnet_core::tracking::EventCorrelator;
use phishnet_storage::DatabasePool;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config);

    info!("Starting PhishNet server...");

    // Initialize database
    let db_pool = DatabasePool::new(&config.database).await?;

    // Run migrations
    db_pool.migrate().await?;

    // Outbound SMTP transport: constructed once here and injected, never
    // ambient global state
    let sender = Arc::new(SmtpMailSender::new(config.smtp.clone())?);
    info!(
        "SMTP sender ready ({}:{})",
        config.smtp.host, config.smtp.port
    );

    let renderer = LureRenderer::new(config.tracking.base_url.clone());

    let template_provider: Arc<dyn TemplateProvider> =
        Arc::new(AiTemplateProvider::new(config.template.clone()));

    let geo: Arc<dyn GeoResolver> = if config.geo.enabled {
        Arc::new(IpinfoResolver::new(config.geo.clone()))
    } else {
        info!("Geolocation disabled; events will carry Unknown locations");
        Arc::new(NullGeoResolver)
    };

    let dispatcher = CampaignDispatcher::new(
        db_pool.clone(),
        sender,
        renderer.clone(),
        config.dispatch.concurrency,
    );
    let correlator = EventCorrelator::new(db_pool.clone(), geo);

    let state = Arc::new(AppState {
        db_pool,
        dispatcher,
        correlator,
        template_provider,
        renderer,
    });

    // Start API server
    let app = phishnet_api::create_router(state);
    let addr = format!("{}:{}", config.server.bind_address, config.api.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("PhishNet server shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},phishnet=debug", config.logging.level)));

    if config.logging.format == "json" {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_level(true))
            .with(filter)
            .init();
    }
}
