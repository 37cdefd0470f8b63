use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use super::{cache::ScriptCache, template};
use crate::{error::LoadError, ledger::AccountKey};

/// Retrieves script source text by URL.
#[async_trait]
pub trait ScriptFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, LoadError>;
}

/// Plain HTTP GET fetcher; any non-2xx status is an error.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ScriptFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, LoadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LoadError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| LoadError::Read {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        if body.is_empty() {
            return Err(LoadError::Empty {
                url: url.to_string(),
            });
        }
        Ok(body)
    }
}

/// Where the base script of a loader comes from.
#[derive(Debug, Clone)]
pub enum ScriptSource {
    /// Literal script bytes.
    Bytes(Bytes),
    /// Script fetched once from `url` and memoized in `cache`.
    Remote {
        url: String,
        cache: Arc<ScriptCache>,
    },
    /// Account creation script registering `keys`, without contract code.
    AccountCreation { keys: Vec<AccountKey> },
}

impl ScriptSource {
    pub async fn load(&self) -> Result<Bytes, LoadError> {
        match self {
            Self::Bytes(bytes) => Ok(bytes.clone()),
            Self::Remote { url, cache } => cache.get(url).await,
            Self::AccountCreation { keys } => Ok(template::create_account(keys, &[])),
        }
    }
}
