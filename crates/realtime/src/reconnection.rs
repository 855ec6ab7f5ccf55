//! Reconnect timer with exponential backoff.
//!
//! The delay itself comes from [`ReconnectConfig::delay_for_attempt`]
//! (a pure function of the attempt count). This module only owns the
//! cancellable timer that calls back into the service when it fires.
//!
//! [`ReconnectConfig::delay_for_attempt`]: crate::ReconnectConfig::delay_for_attempt

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::service::Shared;

/// Cancels the pending reconnect timer, if any.
pub(crate) fn cancel_timer(slot: &mut Option<CancellationToken>) {
    if let Some(token) = slot.take() {
        token.cancel();
    }
}

/// Arms a timer that asks the service to connect again after `delay`.
///
/// Any previous timer in `slot` is cancelled first, so at most one timer
/// is ever pending. The timer holds only a weak reference: a service that
/// has been dropped is never resurrected by a late timer.
pub(crate) fn schedule_reconnect(
    shared: &Arc<Shared>,
    slot: &mut Option<CancellationToken>,
    delay: Duration,
) {
    cancel_timer(slot);

    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!("no tokio runtime, reconnect not scheduled");
        return;
    };

    let token = CancellationToken::new();
    *slot = Some(token.clone());
    let weak: Weak<Shared> = Arc::downgrade(shared);

    runtime.spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("reconnect timer cancelled");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
        if let Some(shared) = weak.upgrade() {
            shared.fire_reconnect(&token);
        }
    });
}
