use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use slotwise_booking::TenantRegistry;
use slotwise_core::config::SlotwiseConfig;
use slotwise_scheduler::{build_sender, ClientDirectory, Notifier, ReminderEngine, ReminderSweeper};

mod app;
mod http;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "slotwise_gateway=info,slotwise_booking=info,slotwise_scheduler=info,tower_http=debug"
                    .into()
            }),
        )
        .init();

    // load config: SLOTWISE_CONFIG env > ~/.slotwise/slotwise.toml
    let config_path = std::env::var("SLOTWISE_CONFIG").ok();
    let config = SlotwiseConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        SlotwiseConfig::default()
    });

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    // one SQLite file per tenant; in-memory when no data dir is configured
    let data_dir = config.database.data_dir.as_ref().map(PathBuf::from);
    if let Some(dir) = &data_dir {
        std::fs::create_dir_all(dir)?;
        info!(path = %dir.display(), "tenant data directory");
    } else {
        warn!("no database.data_dir configured; tenant data is kept in memory");
    }
    let registry = Arc::new(TenantRegistry::new(
        data_dir,
        config.database.max_tenants,
        &config.booking.default_timezone,
    ));
    let known = registry.discover()?;
    info!(tenants = known, "tenant stores opened");

    let sender = build_sender(&config.notifications)?;
    info!(provider = sender.name(), "notification sender ready");
    let notifier = Notifier::new(Arc::new(ClientDirectory::new(registry.clone())), sender);
    let sweeper = Arc::new(ReminderSweeper::new(notifier.clone()));

    if config.gateway.cron_token.is_none() {
        warn!("gateway.cron_token is not set; POST /cron/reminders rejects every call");
    }
    if config.gateway.operator_token.is_none() {
        warn!("gateway.operator_token is not set; operator endpoints are unreachable");
    }

    let engine = ReminderEngine::new(
        registry.clone(),
        sweeper.clone(),
        config.reminders.clone(),
        config.purge.clone(),
    );
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let engine_task = tokio::spawn(engine.run(shutdown_rx));

    let state = Arc::new(app::AppState::new(config, registry, notifier, sweeper));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!(%addr, "slotwise gateway listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // stop the reminder engine once the server has drained
    let _ = shutdown_tx.send(true);
    let _ = engine_task.await;
    info!("slotwise gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("could not listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
