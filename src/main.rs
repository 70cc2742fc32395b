use std::sync::Arc;

use circulation::config::{Config, StoreKind};
use circulation::db::{self, Backend, FileBackend};
use circulation::{routes, state::AppState, storage};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "circulation=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    let backend = match config.store {
        StoreKind::File => {
            storage::ensure_dirs(&config.data_dir)?;
            tracing::info!(dir = %config.data_dir.display(), "Using file store");
            Backend::File(FileBackend::new(&config.data_dir))
        }
        StoreKind::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or("DATABASE_URL must be set when STORE_BACKEND=postgres")?;
            let pool = db::create_pool(url).await?;
            db::run_migrations(pool.as_ref()).await?;
            tracing::info!("Using Postgres store");
            Backend::Postgres(pool)
        }
    };

    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::new(Arc::new(backend), config));
    let sessions = state.sessions.clone();
    let app = routes::router(state);

    tracing::info!("Circulation listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sessions.shutdown_all().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
