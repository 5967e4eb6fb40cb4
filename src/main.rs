use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hitcount::api::{self, AppState};
use hitcount::classify::{Classifier, DnsHostnameResolver, HostnameResolver, NoopHostnameResolver};
use hitcount::config::Config;
use hitcount::plugins::Plugins;
use hitcount::recorder::Recorder;
use hitcount::storage::{RequestStorage, SqliteStorage};
use hitcount::traffic::Modules;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration");

    info!("Using SQLite storage: {}", config.database.url);
    let storage: Arc<dyn RequestStorage> = Arc::new(
        SqliteStorage::new(&config.database.url, config.database.max_connections).await?,
    );
    storage.init().await?;
    info!("Database initialized successfully");

    let metrics = config.metrics.clone();

    // Misconfigured module or plugin lists stop the server here, not on
    // the first report.
    let modules = Modules::new(metrics.traffic_modules.clone(), metrics.module_context());
    modules.load().context("failed to load traffic modules")?;
    let plugins = Plugins::new(metrics.plugins.clone(), metrics.module_context());
    plugins.load().context("failed to load plugins")?;

    let hostnames: Arc<dyn HostnameResolver> = if metrics.hostname_lookup {
        info!("Reverse DNS lookups enabled (timeout {:?})", metrics.hostname_timeout());
        Arc::new(DnsHostnameResolver::new())
    } else {
        Arc::new(NoopHostnameResolver)
    };
    let classifier = Arc::new(Classifier::with_defaults(hostnames)?);

    let recorder = Arc::new(
        Recorder::new(Arc::clone(&storage), metrics.clone(), config.proxy.clone())
            .context("invalid ignore patterns")?,
    );

    let state = Arc::new(AppState {
        storage,
        modules: Arc::new(modules),
        plugins: Arc::new(plugins),
        classifier,
        hostname_lookup: metrics.hostname_lookup,
        hostname_timeout: metrics.hostname_timeout(),
    });
    let app = api::with_recording(api::create_api_router(state), recorder);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    info!("   - Reports available at http://{}/api/...", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
