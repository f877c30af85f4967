//! Load records from a Kafka topic into MongoDB.
use std::fmt::Display;
use std::sync::Arc;

use anyhow::{Context, Result};
use dataloader_common::{
    buffer::record_buffer,
    kafka::KafkaConsumer,
    metrics::{probe_router, serve, setup_metrics_recorder, setup_metrics_routes},
    shutdown::{listen_for_signals, Shutdown},
    source::{RecordSource, SourceExit},
    store::MongoStore,
};
use dataloader_worker::{
    config::Config,
    pipeline::{Pipeline, PipelineExit},
};
use envconfig::Envconfig;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

/// Wait for a task and exit the process if it failed. Fatal errors are not recoverable here, and
/// the other task may be blocked on something we have no way to cancel.
async fn exit_on_failure<T, E: Display>(name: &'static str, task: JoinHandle<Result<T, E>>) -> T {
    match task.await {
        Ok(Ok(exit)) => exit,
        Ok(Err(e)) => {
            error!(task = name, error = %e, "fatal error, exiting");
            std::process::exit(1);
        }
        Err(e) => {
            error!(task = name, error = %e, "task panicked, exiting");
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    info!("starting dataloader");

    let config = Config::init_from_env().context("failed to load configuration from env")?;

    let shutdown = Shutdown::new();

    let recorder_handle = setup_metrics_recorder().context("failed to install metrics recorder")?;
    let router = setup_metrics_routes(probe_router(shutdown.clone()), recorder_handle);
    let bind = config.bind();
    tokio::task::spawn(async move {
        if let Err(e) = serve(router, &bind).await {
            error!(error = %e, "failed to serve metrics");
        }
    });

    let store = MongoStore::connect(&config.mongodb_uri, config.database_name.as_str())
        .await
        .context("failed to connect to mongodb")?;

    let consumer = KafkaConsumer::new(&config.kafka).context("failed to create kafka consumer")?;

    let (tx, rx) = record_buffer(config.record_buffer_capacity);

    let source = tokio::spawn(RecordSource::new(consumer, tx).run(shutdown.clone()));

    let pipeline = Pipeline::new(Arc::new(store), rx)
        .payload_kind(config.payload_kind)
        .failure_policy(config.on_record_error)
        .collection(config.collection.map(|c| c.0));
    let pipeline = tokio::spawn(pipeline.run(shutdown.clone()));

    tokio::spawn(async move {
        if let Err(e) = listen_for_signals(shutdown).await {
            error!(error = %e, "failed to install signal handlers");
        }
    });

    let (source_exit, pipeline_exit) = tokio::join!(
        exit_on_failure("source", source),
        exit_on_failure("pipeline", pipeline)
    );

    if source_exit == SourceExit::Aborted || pipeline_exit == PipelineExit::Aborted {
        // Blocking closes may still be running, and the runtime would wait for them on drop.
        warn!("exiting without graceful close");
        std::process::exit(0);
    }

    info!("dataloader stopped");
    Ok(())
}
