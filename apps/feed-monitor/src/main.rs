//! Blockfeed monitor entry point.
//!
//! Follows the live feed through the shared realtime service, keeps a chain
//! view current with the push hooks and the REST fallback, and logs a
//! summary until Ctrl-C.
//!
//! Usage: `blockfeed-monitor [config.toml]`

mod config;
mod report;
mod rest;

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use blockfeed_realtime::FeedFactory;
use blockfeed_state::{mount_all, run_fallback_poller, shared_view};

use crate::config::MonitorConfig;
use crate::rest::MempoolRest;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting blockfeed monitor"
    );

    // Load configuration.
    let loaded = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => MonitorConfig::load_from(&path),
        None => MonitorConfig::load(),
    };
    let config = match loaded {
        Ok(c) => {
            tracing::info!(ws = %c.ws_url, api = %c.api_url, "configuration loaded");
            c
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            MonitorConfig::default()
        }
    };

    let factory = Arc::new(FeedFactory::new(config.to_feed_config()));
    let service = factory.get_or_create();
    if let Some(events) = service.take_events() {
        tokio::spawn(report::log_events(events));
    }

    let view = shared_view(config.history());
    let hooks = mount_all(&service, &view);

    let cancel = CancellationToken::new();
    let rest = Arc::new(MempoolRest::new(&config.api_url)?);
    let poller = tokio::spawn(run_fallback_poller(
        rest,
        view.clone(),
        config.poll_interval(),
        cancel.clone(),
    ));
    let summary = tokio::spawn(report::run_summary(
        view,
        factory.clone(),
        config.summary_interval(),
        cancel.clone(),
    ));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    cancel.cancel();
    for hook in &hooks {
        hook.unmount();
    }
    factory.teardown();
    let _ = tokio::join!(poller, summary);

    Ok(())
}
