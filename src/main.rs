use env_logger::Env;
use std::sync::Arc;
use tracing::{error, info};

use snippetbox::{
    database::{self, PgSnippetStore, PgUserStore, RedisSessionStore},
    router, AppError, AppState, Config, Result,
};

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };
    env_logger::init_from_env(Env::default().default_filter_or(config.rust_log()));

    if let Err(e) = run(config).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<()> {
    let pool = database::create_pool(&config).await?;
    info!("Database pool created");
    if config.run_migrations {
        database::run_migrations(&pool).await?;
    }

    let session_store = RedisSessionStore::new(&config).await?;

    let state = AppState::new(
        &config,
        Arc::new(PgUserStore::new(pool.clone())),
        Arc::new(PgSnippetStore::new(pool)),
        Arc::new(session_store),
    );
    let app = router(state, &config);

    let bind_address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .map_err(|e| AppError::config(format!("Failed to bind to {}: {}", bind_address, e)))?;

    info!("🚀 Starting server at http://{}", bind_address);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::internal(format!("Server error: {}", e)))?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
