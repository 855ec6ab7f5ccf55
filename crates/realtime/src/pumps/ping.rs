//! WebSocket ping pump: periodic keepalive pings.

use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Queues a ping every `period` until cancelled or the writer is gone.
///
/// The first ping goes out one full period after start. A ping that finds
/// the outbound queue full is skipped; the read deadline covers a writer
/// that stays stuck.
pub(crate) async fn ping_pump(
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
    period: Duration,
) {
    let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticks.tick() => {}
        }
        match write_tx.try_send(tungstenite::Message::Ping(Vec::new().into())) {
            Ok(()) => trace!("ping queued"),
            Err(TrySendError::Full(_)) => trace!("outbound queue full, ping skipped"),
            Err(TrySendError::Closed(_)) => return,
        }
    }
}
