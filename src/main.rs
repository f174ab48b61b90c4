use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;

use nscr::db::Db;
use nscr::http::{self, AppState};
use nscr::store::Store;
use nscr::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(true)
        .compact()
        .init();

    let config = Config::from_env()?;
    tracing::info!(port = config.port, database_path = %config.database_path, "starting nscr");

    let db = Db::connect(&config).await?;
    let store = Store::new(db);
    let config = Arc::new(config);

    if config.gc_enabled {
        spawn_gc_timer(store.clone(), config.clone());
    }
    spawn_session_sweeper(store.clone(), config.clone());

    let healthy = Arc::new(AtomicBool::new(true));
    spawn_integrity_monitor(store.clone(), healthy.clone());

    let state = AppState {
        store,
        config: config.clone(),
        healthy,
    };
    let app = http::router(state);

    let addr: std::net::SocketAddr = config.bind_addr().parse()?;
    tracing::info!(%addr, "listening");

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Runs garbage collection on `NSCR_GC_INTERVAL_HOURS`. Errors are logged,
/// never propagated -- a failed GC pass must not take the server down.
fn spawn_gc_timer(store: Store, config: Arc<Config>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(config.gc_interval());
        loop {
            interval.tick().await;
            match store.garbage_collect(config.session_ttl()).await {
                Ok(result) => tracing::info!(?result, "garbage collection complete"),
                Err(e) => tracing::error!(error = ?e, "garbage collection failed"),
            }
        }
    });
}

/// Sweeps abandoned upload sessions independently of GC, on a tighter
/// cadence than the GC interval so expired sessions don't linger for a
/// full day by default.
fn spawn_session_sweeper(store: Store, config: Arc<Config>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            match store.sweep_expired_sessions(config.session_ttl()).await {
                Ok(n) if n > 0 => tracing::info!(swept = n, "swept abandoned upload sessions"),
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "session sweep failed"),
            }
        }
    });
}

/// Periodic `PRAGMA integrity_check` on a timer. A failed check gets one
/// immediate retry before the shared `healthy` flag flips false and a
/// fatal diagnostic is logged; admin/`/v2` handlers start returning 503
/// via `require_healthy` the moment that happens. A later passing check
/// flips it back.
fn spawn_integrity_monitor(store: Store, healthy: Arc<AtomicBool>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(900));
        loop {
            interval.tick().await;
            let mut ok = match store.db().integrity_check().await {
                Ok(ok) => ok,
                Err(e) => {
                    tracing::error!(error = ?e, "integrity check query failed");
                    false
                }
            };
            if !ok {
                tracing::warn!("integrity check failed, attempting one-shot recovery");
                ok = store.db().integrity_check().await.unwrap_or(false);
            }
            if ok {
                if !healthy.swap(true, Ordering::Relaxed) {
                    tracing::info!("database integrity restored");
                }
            } else if healthy.swap(false, Ordering::Relaxed) {
                tracing::error!("database corruption detected after recovery attempt, serving 503");
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
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
    tracing::info!("shutdown signal received");
}
