//! Periodic one-line summary of the chain view.

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use blockfeed_realtime::{ConnectionEvent, ConnectionState, FeedFactory};
use blockfeed_state::{ChainView, SharedView};

/// Renders the view as a single log line.
pub fn summarize(view: &ChainView, state: Option<ConnectionState>, now: DateTime<Utc>) -> String {
    let feed = match state {
        Some(ConnectionState::Open) => "live".to_string(),
        Some(ConnectionState::ReconnectScheduled { attempt, .. }) => format!("retry #{attempt}"),
        Some(other) => format!("{other:?}").to_lowercase(),
        None => "idle".to_string(),
    };

    let tip = match view.tip_height() {
        Some(h) => h.to_string(),
        None => "?".to_string(),
    };

    let age = view
        .latest_block()
        .and_then(|b| DateTime::from_timestamp(b.timestamp, 0))
        .map(|mined| {
            let mins = (now - mined).num_minutes().max(0);
            format!("{mins}m ago")
        })
        .unwrap_or_else(|| "-".to_string());

    let next_fee = view
        .next_block()
        .map(|p| format!("{:.1} sat/vB", p.median_fee))
        .unwrap_or_else(|| "-".to_string());

    let usd = view
        .conversions()
        .rate("USD")
        .map(|r| format!("${r:.0}"))
        .unwrap_or_else(|| "-".to_string());

    format!("[{feed}] tip {tip} ({age}) | next block {next_fee} | {usd}")
}

/// Logs a summary every `interval` until cancelled.
pub async fn run_summary(
    view: SharedView,
    factory: Arc<FeedFactory>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let line = {
                    let view = view.read().unwrap_or_else(PoisonError::into_inner);
                    summarize(&view, factory.connection_state(), Utc::now())
                };
                info!("{line}");
            }
        }
    }
}

/// Logs connection events until the service goes away.
pub async fn log_events(mut events: mpsc::Receiver<ConnectionEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::StateChanged(state) => debug!(?state, "feed state changed"),
            ConnectionEvent::Reconnecting { attempt, delay } => {
                warn!(attempt, delay_ms = delay.as_millis() as u64, "feed reconnecting")
            }
            ConnectionEvent::RetriesExhausted { attempts } => {
                error!(attempts, "feed gave up; relying on polling until restart")
            }
            ConnectionEvent::DecodeFailed { error } => warn!(%error, "undecodable frame"),
            ConnectionEvent::CallbackFailed { topic, error } => {
                warn!(%topic, %error, "consumer failed on event")
            }
        }
    }
}
