//! mempool.space REST client used by the polling fallback.

use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;

use blockfeed_protocol::{Block, Conversions, ProjectedBlock};
use blockfeed_state::{PollError, PollSource};

/// Errors from the REST client.
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Client for the public mempool.space API.
pub struct MempoolRest {
    http: reqwest::Client,
    base_url: String,
}

impl MempoolRest {
    /// `base_url` is the API root, e.g. `https://mempool.space/api`.
    pub fn new(base_url: &str) -> Result<Self, RestError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("blockfeed-monitor/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, RestError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let resp = self.http.get(&url).send().await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RestError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Most recent confirmed blocks, newest first.
    pub async fn blocks(&self) -> Result<Vec<Block>, RestError> {
        self.get("/v1/blocks").await
    }

    /// Projected blocks from the current mempool.
    pub async fn mempool_blocks(&self) -> Result<Vec<ProjectedBlock>, RestError> {
        self.get("/v1/fees/mempool-blocks").await
    }

    /// Current BTC prices.
    pub async fn prices(&self) -> Result<Conversions, RestError> {
        self.get("/v1/prices").await
    }
}

impl PollSource for MempoolRest {
    fn recent_blocks(&self) -> BoxFuture<'_, Result<Vec<Block>, PollError>> {
        Box::pin(async move {
            self.blocks()
                .await
                .map_err(|e| PollError::fetch("blocks", e))
        })
    }

    fn projected_blocks(&self) -> BoxFuture<'_, Result<Vec<ProjectedBlock>, PollError>> {
        Box::pin(async move {
            self.mempool_blocks()
                .await
                .map_err(|e| PollError::fetch("mempool-blocks", e))
        })
    }

    fn conversions(&self) -> BoxFuture<'_, Result<Conversions, PollError>> {
        Box::pin(async move {
            self.prices()
                .await
                .map_err(|e| PollError::fetch("prices", e))
        })
    }
}
