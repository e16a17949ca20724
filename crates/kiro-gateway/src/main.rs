use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

mod app;
mod http;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("KIRO_CONFIG").ok();
    let config = kiro_core::config::GatewayConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        eprintln!("config load failed ({e}), using defaults");
        kiro_core::config::GatewayConfig::default()
    });

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "kiro_gateway={0},kiro_accounts={0},kiro_auth={0},tower_http=info",
            config.log_level
        )
        .into()
    });
    if config.log_json {
        tracing_subscriber::fmt().with_env_filter(env_filter).json().try_init().ok();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).try_init().ok();
    }

    let http = reqwest::Client::builder()
        .pool_max_idle_per_host(config.max_conns)
        .build()?;

    let store = kiro_store::StoreClient::connect(&config.redis_url, config.redis_key_prefix.clone()).await?;

    match store.get_all_accounts().await {
        Ok(accounts) => {
            let healthy = accounts.iter().filter(|a| a.is_healthy && !a.is_disabled).count();
            if accounts.is_empty() {
                warn!("starting with an empty account pool");
            } else {
                info!(total = accounts.len(), healthy, "loaded account pool");
            }
        }
        Err(e) => warn!(error = %e, "could not reach the store at startup, continuing anyway"),
    }

    let bind = config.host.clone();
    let port = config.port;
    let shutdown_deadline = Duration::from_secs(config.shutdown_deadline_secs);

    let state = Arc::new(app::AppState::new(config, store, http));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!(%addr, "kiro gateway listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown_deadline))
        .await?;

    Ok(())
}

/// Wait for SIGINT/SIGTERM, then arm a watchdog that force-exits if draining
/// in-flight requests takes longer than `deadline`.
async fn shutdown_signal(deadline: Duration) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(?deadline, "shutdown signal received, draining in-flight requests");
    tokio::spawn(async move {
        tokio::time::sleep(deadline).await;
        error!("graceful shutdown deadline exceeded, forcing exit");
        std::process::exit(1);
    });
}
