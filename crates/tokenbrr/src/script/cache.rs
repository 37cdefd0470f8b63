//! URL-keyed memoization of remote scripts.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use bytes::Bytes;
use tokio::sync::OnceCell;
use tracing::debug;

use super::source::{HttpFetcher, ScriptFetcher};
use crate::error::LoadError;

/// Shared script cache. Entries never expire; concurrent requests for the same
/// URL share a single fetch, and a failed fetch leaves the entry empty so the
/// next request tries again.
pub struct ScriptCache {
    fetcher: Arc<dyn ScriptFetcher>,
    entries: Mutex<HashMap<String, Arc<OnceCell<Bytes>>>>,
}

impl ScriptCache {
    pub fn new(fetcher: Arc<dyn ScriptFetcher>) -> Self {
        Self {
            fetcher,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cache backed by plain HTTP fetches.
    pub fn http(client: reqwest::Client) -> Self {
        Self::new(Arc::new(HttpFetcher::new(client)))
    }

    pub async fn get(&self, url: &str) -> Result<Bytes, LoadError> {
        let cell = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(entries.entry(url.to_string()).or_default())
        };

        let script = cell
            .get_or_try_init(|| async {
                debug!(url, "Fetching script");
                self.fetcher.fetch(url).await
            })
            .await?;
        Ok(script.clone())
    }

    /// Number of URLs with a cached script.
    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.values().filter(|cell| cell.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ScriptCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptCache")
            .field("cached", &self.len())
            .finish_non_exhaustive()
    }
}
