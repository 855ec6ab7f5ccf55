//! Bindings that keep a [`ChainView`] in sync with realtime topics.
//!
//! Mounting a hook subscribes a handler on the shared service; the returned
//! [`HookBinding`] unmounts it exactly once, explicitly or on drop.

use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::debug;

use blockfeed_protocol::{Block, Conversions, ProjectedBlock, Topic};
use blockfeed_realtime::{CallbackError, RealtimeService, Subscription};

use crate::error::PayloadError;
use crate::state::{ChainView, UpdateSource};

/// View shared between hook handlers, the poller and readers.
pub type SharedView = Arc<RwLock<ChainView>>;

/// Creates an empty shared view keeping `history` recent blocks.
pub fn shared_view(history: usize) -> SharedView {
    Arc::new(RwLock::new(ChainView::new(history)))
}

/// A mounted hook.
#[derive(Debug)]
pub struct HookBinding {
    subscription: Subscription,
}

impl HookBinding {
    pub fn topic(&self) -> Topic {
        self.subscription.topic()
    }

    /// `false` once unmounted, or once the service cleared its
    /// subscriptions on disconnect.
    pub fn is_mounted(&self) -> bool {
        self.subscription.is_active()
    }

    /// Stops updating the view. Later calls do nothing.
    pub fn unmount(&self) {
        if self.is_mounted() {
            debug!(topic = %self.topic(), "hook unmounted");
        }
        self.subscription.unsubscribe();
    }
}

fn mount<F>(service: &RealtimeService, topic: Topic, view: &SharedView, apply: F) -> HookBinding
where
    F: Fn(&mut ChainView, &Value) -> Result<(), PayloadError> + Send + Sync + 'static,
{
    let view = Arc::clone(view);
    let subscription = service.subscribe(topic, move |payload| -> Result<(), CallbackError> {
        let mut view = view.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut view, payload)?;
        Ok(())
    });
    debug!(topic = %topic, "hook mounted");
    HookBinding { subscription }
}

/// Pushed blocks move the tip and land in the recent-block history.
pub fn use_blocks(service: &RealtimeService, view: &SharedView) -> HookBinding {
    mount(service, Topic::Blocks, view, |view, payload| {
        let block: Block = serde_json::from_value(payload.clone())?;
        view.apply_block(block, UpdateSource::Push);
        Ok(())
    })
}

/// Pushed mempool projections replace the previous ones.
pub fn use_mempool_blocks(service: &RealtimeService, view: &SharedView) -> HookBinding {
    mount(service, Topic::MempoolBlocks, view, |view, payload| {
        let projected = serde_json::from_value::<Vec<ProjectedBlock>>(payload.clone())?;
        view.replace_projected(projected, UpdateSource::Push);
        Ok(())
    })
}

/// Pushed prices are merged into the current ones.
pub fn use_stats(service: &RealtimeService, view: &SharedView) -> HookBinding {
    mount(service, Topic::Stats, view, |view, payload| {
        let conversions = payload
            .get("conversions")
            .ok_or(PayloadError::Missing("conversions"))?;
        view.merge_conversions(
            serde_json::from_value::<Conversions>(conversions.clone())?,
            UpdateSource::Push,
        );
        Ok(())
    })
}

/// Mounts every hook on one view.
pub fn mount_all(service: &RealtimeService, view: &SharedView) -> Vec<HookBinding> {
    vec![
        use_blocks(service, view),
        use_mempool_blocks(service, view),
        use_stats(service, view),
    ]
}
