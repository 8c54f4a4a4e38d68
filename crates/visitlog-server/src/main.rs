use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use visitlog_server::state::AppState;

/// `visitlog health`: liveness probe for Docker HEALTHCHECK.
///
/// Calls `GET http://localhost:$VISITLOG_PORT/health`.
/// Exits 0 if the server responds with HTTP 200, exits 1 otherwise.
fn run_health_check() -> ! {
    let port = std::env::var("VISITLOG_PORT").unwrap_or_else(|_| "3000".to_string());
    let url = format!("http://localhost:{}/health", port);
    match ureq::get(&url).call() {
        Ok(resp) if resp.status() == 200 => std::process::exit(0),
        _ => std::process::exit(1),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(|s| s.as_str()) == Some("health") {
        run_health_check();
    }
    // Structured JSON logging. Level controlled via RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("visitlog=info".parse()?),
        )
        .json()
        .init();

    let cfg = visitlog_server::config::Config::from_env()?;

    std::fs::create_dir_all(&cfg.data_dir)?;
    let db_path = format!("{}/visitlog.db", cfg.data_dir);
    let db = visitlog_duckdb::DuckDbBackend::open(&db_path, &cfg.duckdb_memory_limit)?;

    let state = Arc::new(AppState::new(db, cfg.clone()));

    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            state.run_retention_loop().await;
        });
    }

    let addr = format!("0.0.0.0:{}", cfg.port);
    let app = visitlog_server::app::build_app(Arc::clone(&state));

    info!(
        port = cfg.port,
        timezone = %cfg.pipeline.timezone,
        retention_days = cfg.retention_days,
        "visitlog listening on {}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        tokio::signal::ctrl_c().await.ok();
    })
    .await?;

    if tokio::time::timeout(
        std::time::Duration::from_secs(5),
        state.pipeline.shutdown(),
    )
    .await
    .is_err()
    {
        warn!("Pipeline shutdown timed out, buffered events may be lost");
    }

    Ok(())
}
