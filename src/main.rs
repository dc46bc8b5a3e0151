use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use veranda::engine::Engine;
use veranda::http::{router, AppState};
use veranda::mailer::LogMailer;
use veranda::notify::NotifyHub;
use veranda::payment::StaticGateway;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("VERANDA_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    veranda::observability::init(metrics_port);

    let port = std::env::var("VERANDA_PORT").unwrap_or_else(|_| "8080".into());
    let bind = std::env::var("VERANDA_BIND").unwrap_or_else(|_| "0.0.0.0".into());
    let data_dir = std::env::var("VERANDA_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let compact_threshold: u64 = std::env::var("VERANDA_COMPACT_THRESHOLD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);
    let webhook_secret = std::env::var("VERANDA_WEBHOOK_SECRET").ok();
    let payment_key =
        std::env::var("VERANDA_PAYMENT_KEY").unwrap_or_else(|_| "key_local".into());

    // Ensure data directory exists
    std::fs::create_dir_all(&data_dir)?;
    let wal_path = PathBuf::from(&data_dir).join("veranda.wal");

    let notify = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::new(wal_path, notify)?);
    tokio::spawn(veranda::compactor::run_compactor(engine.clone(), compact_threshold));

    let state = AppState {
        engine,
        gateway: Arc::new(StaticGateway::new(payment_key)),
        mailer: Arc::new(LogMailer),
        webhook_secret,
    };

    let addr = format!("{bind}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("veranda listening on {addr}");
    info!("  data_dir: {data_dir}");
    info!("  webhook signature: {}", if state.webhook_secret.is_some() { "required" } else { "disabled" });
    info!("  metrics: {}", metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight requests
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
        info!("shutdown signal received");
    };

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("bye");
    Ok(())
}
