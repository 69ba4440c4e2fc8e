use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;

use vacation_saga::{
    gateway, register_booking_activities, ActivityRegistry, BookingSaga, ClientConfig, CliArgs,
    LocalExecutor, SagaClient, SagaStats, SimulatedServices, TracingObserver, Worker,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging()?;

    let args = CliArgs::parse();
    let config = args.saga_config();
    let stats = Arc::new(SagaStats::new());
    let observer = Arc::new(TracingObserver);

    let mut registry = ActivityRegistry::new();
    register_booking_activities(
        &mut registry,
        SimulatedServices::new().with_transient_flight_failures(args.flight_failures),
    );
    let executor = Arc::new(
        LocalExecutor::new(registry)
            .with_observer(observer.clone())
            .with_stats(stats.clone()),
    );
    let saga = Arc::new(
        BookingSaga::new(executor, config.clone())
            .with_observer(observer)
            .with_stats(stats.clone()),
    );

    let client = SagaClient::connect(ClientConfig::default())?;
    let worker = Worker::new(&client, &config.task_queue, saga)?;

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(worker.run(async move {
        let _ = shutdown_rx.changed().await;
    }));
    tracing::info!(task_queue = %config.task_queue, "Worker started");

    let state = gateway::GatewayState::new(client.clone(), &config.task_queue, stats);
    gateway::serve(args.listen, state, wait_for_ctrl_c())
        .await
        .context("gateway failed")?;

    client.disconnect();
    let _ = shutdown_tx.send(true);
    worker.await.context("worker task panicked")?;

    tracing::info!("Shut down");
    Ok(())
}

fn setup_logging() -> anyhow::Result<()> {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {}", e);
    }
    tracing::info!("Shutting down gracefully...");
}
