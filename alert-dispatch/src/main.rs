use std::sync::Arc;

use alert_dispatch::api::{ApiServer, AppState};
use alert_dispatch::backends::BackendRegistry;
use alert_dispatch::config::AppConfig;
use alert_dispatch::database::{self, repositories::SqlxServiceConfigRepository};
use alert_dispatch::dispatch::Dispatcher;
use alert_dispatch::logging;
use alert_dispatch::service::ServiceConfigService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    let _log_guard = logging::init_logging(&config.logging)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting alert-dispatch");

    let pool =
        database::init_pool_with_size(&config.database.url, config.database.max_connections)
            .await?;
    database::run_migrations(&pool).await?;

    let repo = Arc::new(SqlxServiceConfigRepository::new(pool.clone()));
    let registry = Arc::new(BackendRegistry::new(&config.http, &config.endpoints)?);

    let dispatcher = Dispatcher::new(config.dispatcher.clone(), repo.clone(), registry.clone());
    let dispatch_handle = dispatcher.start();

    let service = Arc::new(ServiceConfigService::new(
        repo,
        registry,
        dispatcher.clone(),
        config.public_url.clone(),
    ));

    let state = AppState::new(service, dispatcher.clone(), dispatch_handle);
    let server = ApiServer::new(config.api.clone(), state);
    let server_token = server.cancel_token();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
        }
        server_token.cancel();
    });

    let served = server.run().await;

    dispatcher.shutdown().await;
    pool.close().await;

    served?;
    tracing::info!("alert-dispatch stopped");
    Ok(())
}
