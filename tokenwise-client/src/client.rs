//! TokenWise backend REST client
//!
//! Provides the snapshot fetches (holders, dashboard, wallet history) and the
//! monitoring control calls. Every call is independent: no retries, no
//! caching, and failures are returned to the caller as-is.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokenwise_core::{
    DashboardSnapshot, HolderRecord, TokenwiseError, TokenwiseResult, WalletDrillDown,
};
use tracing::{debug, info, instrument, warn};

use crate::config::ClientConfig;

/// Source of polled snapshots
///
/// The engine and controller only talk to the backend through this trait, so
/// they can be driven by an in-memory source in tests.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Top holders of `contract`, in backend order
    ///
    /// An unseeded backend yields `Ok(vec![])`, never an error.
    async fn fetch_holders(&self, contract: &str) -> TokenwiseResult<Vec<HolderRecord>>;

    async fn fetch_dashboard(&self) -> TokenwiseResult<DashboardSnapshot>;

    async fn fetch_wallet_history(&self, owner: &str) -> TokenwiseResult<WalletDrillDown>;

    async fn start_monitoring(&self) -> TokenwiseResult<()>;

    async fn stop_monitoring(&self) -> TokenwiseResult<()>;
}

/// reqwest-backed [`SnapshotSource`]
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    api_base: String,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> TokenwiseResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TokenwiseError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base(),
        })
    }

    /// Get the API base URL
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, what: &str) -> TokenwiseResult<T> {
        let url = format!("{}{}", self.api_base, path);
        debug!("Fetching {} from: {}", what, url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TokenwiseError::network(format!("Failed to fetch {}: {}", what, e)))?;

        let response = Self::check_status(response, what).await?;

        response
            .json()
            .await
            .map_err(|e| TokenwiseError::parse(format!("Failed to parse {} response: {}", what, e)))
    }

    async fn post(&self, path: &str, what: &str) -> TokenwiseResult<()> {
        let url = format!("{}{}", self.api_base, path);
        debug!("Posting {} to: {}", what, url);

        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| TokenwiseError::network(format!("Failed to {}: {}", what, e)))?;

        Self::check_status(response, what).await?;
        Ok(())
    }

    async fn check_status(response: Response, what: &str) -> TokenwiseResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(TokenwiseError::not_found(format!("{}: {}", what, body)));
        }
        Err(TokenwiseError::api(format!(
            "TokenWise API error for {} ({}): {}",
            what, status, body
        )))
    }
}

#[async_trait]
impl SnapshotSource for ApiClient {
    #[instrument(skip(self))]
    async fn fetch_holders(&self, contract: &str) -> TokenwiseResult<Vec<HolderRecord>> {
        let path = format!("/token-holders/{}", contract);
        match self.get_json::<Vec<HolderRecord>>(&path, "token holders").await {
            Ok(holders) => {
                debug!("Fetched {} token holders", holders.len());
                Ok(holders)
            }
            // The backend answers 404 until the holder snapshot is seeded
            Err(TokenwiseError::NotFound(detail)) => {
                warn!("Holder snapshot not found ({}), treating as empty", detail);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    async fn fetch_dashboard(&self) -> TokenwiseResult<DashboardSnapshot> {
        self.get_json("/analytics/dashboard", "dashboard").await
    }

    #[instrument(skip(self))]
    async fn fetch_wallet_history(&self, owner: &str) -> TokenwiseResult<WalletDrillDown> {
        let path = format!("/wallets/{}/transactions", owner);
        self.get_json(&path, "wallet transactions").await
    }

    #[instrument(skip(self))]
    async fn start_monitoring(&self) -> TokenwiseResult<()> {
        self.post("/realtime/start-monitoring", "start monitoring")
            .await?;
        info!("Requested backend to start real-time monitoring");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop_monitoring(&self) -> TokenwiseResult<()> {
        self.post("/realtime/stop-monitoring", "stop monitoring")
            .await?;
        info!("Requested backend to stop real-time monitoring");
        Ok(())
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("api_base", &self.api_base)
            .finish()
    }
}
