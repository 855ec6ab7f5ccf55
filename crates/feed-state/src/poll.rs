//! Periodic REST refetch that runs alongside the push feed.
//!
//! The poller never looks at push health: it keeps refreshing the same
//! [`SharedView`] at its own, longer interval, so consumers still see fresh
//! data while the WebSocket is down or reconnecting.

use std::future::Future;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use blockfeed_protocol::{Block, Conversions, ProjectedBlock};

use crate::error::PollError;
use crate::hooks::SharedView;
use crate::state::{ChainView, UpdateSource};

/// Where the fallback poller fetches from.
pub trait PollSource: Send + Sync + 'static {
    fn recent_blocks(&self) -> BoxFuture<'_, Result<Vec<Block>, PollError>>;

    fn projected_blocks(&self) -> BoxFuture<'_, Result<Vec<ProjectedBlock>, PollError>>;

    fn conversions(&self) -> BoxFuture<'_, Result<Conversions, PollError>>;
}

/// Outcome of one poll round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub refreshed: usize,
    pub failed: usize,
}

async fn fetch<T>(
    endpoint: &'static str,
    timeout: Duration,
    fut: impl Future<Output = Result<T, PollError>>,
) -> Result<T, PollError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res,
        Err(_) => Err(PollError::Timeout { endpoint, timeout }),
    }
}

fn apply<T>(
    view: &SharedView,
    report: &mut PollReport,
    endpoint: &'static str,
    result: Result<T, PollError>,
    update: impl FnOnce(&mut ChainView, T),
) {
    match result {
        Ok(value) => {
            let mut view = view.write().unwrap_or_else(PoisonError::into_inner);
            update(&mut view, value);
            report.refreshed += 1;
        }
        Err(e) => {
            warn!(endpoint, error = %e, "fallback poll failed");
            report.failed += 1;
        }
    }
}

/// Fetches everything once and merges what succeeded into `view`.
///
/// Each endpoint is bounded by `timeout` and fails independently.
pub async fn poll_once(source: &dyn PollSource, view: &SharedView, timeout: Duration) -> PollReport {
    let (blocks, projected, conversions) = tokio::join!(
        fetch("blocks", timeout, source.recent_blocks()),
        fetch("mempool-blocks", timeout, source.projected_blocks()),
        fetch("prices", timeout, source.conversions()),
    );

    let mut report = PollReport::default();
    apply(view, &mut report, "blocks", blocks, |v, blocks| {
        let changed = v.apply_blocks(blocks, UpdateSource::Poll);
        if changed > 0 {
            debug!(changed, "poll added blocks");
        }
    });
    apply(view, &mut report, "mempool-blocks", projected, |v, projected| {
        v.replace_projected(projected, UpdateSource::Poll)
    });
    apply(view, &mut report, "prices", conversions, |v, conversions| {
        v.merge_conversions(conversions, UpdateSource::Poll)
    });
    report
}

/// Polls every `interval` until `cancel` fires. The first round runs
/// immediately.
pub async fn run_fallback_poller(
    source: Arc<dyn PollSource>,
    view: SharedView,
    interval: Duration,
    cancel: CancellationToken,
) {
    info!(interval_secs = interval.as_secs(), "fallback poller started");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let report = tokio::select! {
                    _ = cancel.cancelled() => break,
                    report = poll_once(source.as_ref(), &view, interval) => report,
                };
                debug!(refreshed = report.refreshed, failed = report.failed, "poll round done");
            }
        }
    }
    info!("fallback poller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use crate::hooks::shared_view;

    #[derive(Default)]
    struct MockSource {
        rounds: AtomicUsize,
        fail_blocks: AtomicBool,
        hang_prices: AtomicBool,
    }

    impl MockSource {
        fn height(&self) -> u64 {
            100 + self.rounds.load(Ordering::SeqCst) as u64
        }
    }

    impl PollSource for MockSource {
        fn recent_blocks(&self) -> BoxFuture<'_, Result<Vec<Block>, PollError>> {
            Box::pin(async move {
                self.rounds.fetch_add(1, Ordering::SeqCst);
                if self.fail_blocks.load(Ordering::SeqCst) {
                    return Err(PollError::fetch("blocks", "HTTP 503"));
                }
                let height = self.height();
                Ok(vec![Block {
                    id: format!("hash{height}"),
                    height,
                    timestamp: 0,
                    tx_count: 1,
                    size: 0,
                    weight: 0,
                    previous_block_hash: None,
                    extras: None,
                }])
            })
        }

        fn projected_blocks(&self) -> BoxFuture<'_, Result<Vec<ProjectedBlock>, PollError>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn conversions(&self) -> BoxFuture<'_, Result<Conversions, PollError>> {
            Box::pin(async move {
                if self.hang_prices.load(Ordering::SeqCst) {
                    std::future::pending::<()>().await;
                }
                Ok(Conversions {
                    time: Some(1),
                    rates: BTreeMap::from([("USD".into(), 1.0)]),
                })
            })
        }
    }

    #[tokio::test]
    async fn poll_once_merges_everything() {
        let source = MockSource::default();
        let view = shared_view(10);

        let report = poll_once(&source, &view, Duration::from_secs(5)).await;

        assert_eq!(report, PollReport { refreshed: 3, failed: 0 });
        let view = view.read().unwrap();
        assert_eq!(view.tip_height(), Some(101));
        assert_eq!(view.conversions().rate("USD"), Some(1.0));
        assert!(view.last_poll().is_some());
        assert!(view.last_push().is_none());
    }

    #[tokio::test]
    async fn failing_endpoint_does_not_block_others() {
        let source = MockSource::default();
        source.fail_blocks.store(true, Ordering::SeqCst);
        let view = shared_view(10);

        let report = poll_once(&source, &view, Duration::from_secs(5)).await;

        assert_eq!(report, PollReport { refreshed: 2, failed: 1 });
        assert_eq!(view.read().unwrap().tip_height(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_endpoint_times_out() {
        let source = MockSource::default();
        source.hang_prices.store(true, Ordering::SeqCst);
        let view = shared_view(10);

        let report = poll_once(&source, &view, Duration::from_secs(2)).await;

        assert_eq!(report, PollReport { refreshed: 2, failed: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn poller_keeps_running_until_cancelled() {
        let source = Arc::new(MockSource::default());
        let view = shared_view(10);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_fallback_poller(
            source.clone(),
            view.clone(),
            Duration::from_secs(30),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(65)).await;
        assert_eq!(source.rounds.load(Ordering::SeqCst), 3, "t=0, 30, 60");
        assert_eq!(view.read().unwrap().tip_height(), Some(103));

        // A failing round is logged and the next one still runs.
        source.fail_blocks.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
        source.fail_blocks.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.rounds.load(Ordering::SeqCst), 5);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("poller should stop")
            .expect("no panic");
    }
}
