use std::time::Duration;

use anyhow::{Context, Result};

use crate::ledger::RestLedger;

/// Creates a shared HTTP client with connection pooling, used both for the
/// access node and for script downloads.
pub fn create_shared_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(100)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(60))
        .build()
        .context("Failed to build HTTP client")
}

/// Creates the access node client
pub(crate) fn create_ledger(http_client: reqwest::Client, rpc_url: &str) -> Result<RestLedger> {
    RestLedger::new(http_client, rpc_url).context("Invalid access node URL")
}
