//! opwatch server - change-log replay and event printer.

use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufRead, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opwatch_core::{ChangeFeed, TracingLogger};
use opwatch_server::{replay, shared_writer, watch, Args};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "opwatch_server=info,opwatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting opwatch server");

    let args = Args::parse();
    let config = args.into_config();

    tracing::info!(
        input = ?config.input,
        exclusions = ?config.exclusions_path,
        fixtures = ?config.fixtures_path,
        watch = ?config.watch,
        debug = config.debug,
        "configuration loaded"
    );

    let feed = ChangeFeed::new(config.feed_config()?, config.registry()?, Arc::new(TracingLogger));
    let subscription = watch(feed.bus(), config.watch.clone(), shared_writer(std::io::stdout()));
    let (handle, dispatcher) = feed.start();

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &config.input {
        Some(path) => Box::new(BufReader::new(tokio::fs::File::open(path).await?)),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    tokio::select! {
        result = replay(reader, &handle) => {
            let stats = result?;
            tracing::info!(
                lines = stats.lines,
                forwarded = stats.forwarded,
                skipped = stats.skipped,
                errors = stats.errors,
                "replay finished"
            );
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::error!(error = %e, "failed to listen for ctrl+c");
            }
            tracing::info!("received shutdown signal");
        }
    }

    // Closing the channel lets the dispatcher drain in-flight records.
    drop(handle);
    dispatcher.await?;
    subscription.unsubscribe();

    tracing::info!("shutdown complete");
    Ok(())
}
