//! Owner of the process-wide [`RealtimeService`].
//!
//! The application creates one `FeedFactory` and hands it (or clones of the
//! service it yields) to every consumer. The service is built on first use
//! and lives until [`FeedFactory::teardown`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::info;

use crate::service::RealtimeService;
use crate::transport::{Connector, TungsteniteConnector};
use crate::types::{ConnectionState, FeedConfig};

pub struct FeedFactory {
    config: FeedConfig,
    connector: Arc<dyn Connector>,
    slot: Mutex<Option<RealtimeService>>,
}

impl FeedFactory {
    pub fn new(config: FeedConfig) -> Self {
        let connector = Arc::new(TungsteniteConnector::new(config.max_message_size));
        Self::with_connector(config, connector)
    }

    pub fn with_connector(config: FeedConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            slot: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<RealtimeService>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the shared service, creating it on first call.
    ///
    /// Creating the service does not connect; the first subscription does.
    pub fn get_or_create(&self) -> RealtimeService {
        self.slot()
            .get_or_insert_with(|| {
                info!(url = %self.config.url, "creating realtime service");
                RealtimeService::with_connector(self.config.clone(), self.connector.clone())
            })
            .clone()
    }

    /// The service, if one has been created.
    pub fn current(&self) -> Option<RealtimeService> {
        self.slot().clone()
    }

    /// State of the shared connection, or `None` before first use.
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.current().map(|s| s.connection_state())
    }

    pub fn is_connected(&self) -> bool {
        self.current().is_some_and(|s| s.is_connected())
    }

    /// Disconnects and forgets the service. The next
    /// [`get_or_create`](Self::get_or_create) builds a fresh one.
    pub fn teardown(&self) {
        let service = self.slot().take();
        if let Some(service) = service {
            service.disconnect();
            info!("realtime service torn down");
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }
}

impl std::fmt::Debug for FeedFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedFactory")
            .field("config", &self.config)
            .field("created", &self.slot().is_some())
            .finish()
    }
}
