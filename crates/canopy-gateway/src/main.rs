//! Canopy gateway binary

use std::sync::Arc;

use canopy_common::audit::AuditLogger;
use canopy_gateway::{
    rest, Dispatcher, GatewayConfig, InMemoryPayoutLedger, InMemoryPolicyRegistry, LogFormat,
    PayoutOrchestrator, Pipeline,
};
use canopy_ledger::{InMemoryStateStore, Ledger};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::load()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    let ledger = Ledger::new(Arc::new(InMemoryStateStore::new()), &config.ledger);
    let pipeline = Pipeline::new(config.pipeline.clone());
    let dispatcher = Dispatcher::new(ledger.clone(), pipeline, Arc::new(AuditLogger::new()));

    if config.orchestrator.enabled {
        let policies = match &config.orchestrator.policy_file {
            Some(path) => InMemoryPolicyRegistry::from_file(path)?,
            None => InMemoryPolicyRegistry::new(),
        };
        if policies.is_empty() {
            warn!("No insurance policies loaded; automatic payouts will not trigger any claims");
        }
        let orchestrator = PayoutOrchestrator::new(
            dispatcher.clone(),
            Arc::new(policies),
            Arc::new(InMemoryPayoutLedger::new()),
            config.orchestrator.clone(),
        );
        tokio::spawn(orchestrator.run(ledger.subscribe()));
    } else {
        warn!("Payout orchestrator disabled");
    }

    let app = rest::router(dispatcher);
    let addr = config.bind_addr();
    info!(%addr, "Canopy gateway starting");
    info!(
        "Endpoints: /health, /api/v1/functions, /api/v1/submit/:function, \
         /api/v1/evaluate/:function"
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Canopy gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
