use anyhow::Context;
use std::sync::Arc;
use stocklot_api::{
    app_router,
    config::{init_tracing, load_config},
    db,
    events::{self, EventSender},
    AppState,
};
use tokio::sync::mpsc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    init_tracing(config.log_level(), config.log_json);
    info!(
        environment = %config.environment,
        "Starting stocklot-api"
    );

    let db_pool = Arc::new(
        db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?,
    );
    if config.auto_migrate {
        db::run_migrations(&db_pool)
            .await
            .context("failed to run migrations")?;
        info!("Migrations applied");
    }

    let (event_tx, event_rx) = mpsc::channel(1024);
    tokio::spawn(events::process_events(event_rx));
    let event_sender = Some(Arc::new(EventSender::new(event_tx)));

    let addr = config.server_addr();
    let state = AppState::new(db_pool.clone(), Arc::new(config), event_sender);
    let app = app_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(addr = %addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received terminate signal"),
    }
}
