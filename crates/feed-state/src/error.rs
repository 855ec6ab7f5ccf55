use std::time::Duration;

/// A pushed payload that does not have the expected shape.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("invalid payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload missing `{0}`")]
    Missing(&'static str),
}

/// A polling fallback fetch that failed.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("{endpoint}: {source}")]
    Fetch {
        endpoint: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{endpoint}: no response within {timeout:?}")]
    Timeout {
        endpoint: &'static str,
        timeout: Duration,
    },
}

impl PollError {
    pub fn fetch(
        endpoint: &'static str,
        err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Fetch {
            endpoint,
            source: err.into(),
        }
    }
}
