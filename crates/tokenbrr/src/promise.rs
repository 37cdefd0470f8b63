//! Asynchronous resolution of a submitted transaction.
//!
//! Every promise owns a background task that polls the ledger until the
//! transaction reaches a terminal state or the deadline passes. The outcome is
//! published once through a `watch` channel; readers suspend on the channel
//! and every read after resolution returns the same cached outcome.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::watch,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, warn};

use crate::{
    error::{LedgerError, PromiseError},
    ledger::{Address, Identifier, Ledger, SharedLedger, TransactionResult, TransactionStatus},
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_SEAL_DEADLINE: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromiseConfig {
    pub poll_interval: Duration,
    /// Overall time allowed for the transaction to seal.
    pub deadline: Duration,
}

impl Default for PromiseConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            deadline: DEFAULT_SEAL_DEADLINE,
        }
    }
}

type Resolution = Result<Arc<TransactionResult>, PromiseError>;

/// Handle on the eventual outcome of one transaction. Clones share the same
/// resolution.
#[derive(Debug, Clone)]
pub struct TransactionPromise {
    id: Identifier,
    state: watch::Receiver<Option<Resolution>>,
}

impl TransactionPromise {
    /// Starts resolving `id` in the background.
    pub fn spawn(ledger: SharedLedger, id: Identifier, config: PromiseConfig) -> Self {
        let (tx, rx) = watch::channel(None);
        tokio::spawn(async move {
            let resolution = resolve(ledger.as_ref(), id, config).await;
            tx.send_replace(Some(resolution));
        });
        Self { id, state: rx }
    }

    pub const fn id(&self) -> Identifier {
        self.id
    }

    pub fn is_resolved(&self) -> bool {
        self.state.borrow().is_some()
    }

    /// Waits for resolution and returns the sealed result.
    pub async fn wait(&self) -> Result<Arc<TransactionResult>, PromiseError> {
        let mut state = self.state.clone();
        let resolution = match state.wait_for(Option::is_some).await {
            Ok(resolved) => (*resolved).clone(),
            Err(_) => None,
        };
        resolution.unwrap_or(Err(PromiseError::Abandoned { id: self.id }))
    }

    /// Waits for resolution; `None` only if the transaction sealed without error.
    pub async fn error(&self) -> Option<PromiseError> {
        self.wait().await.err()
    }

    /// Waits for resolution and returns the address of the first account
    /// created by the transaction.
    pub async fn created_address(&self) -> Result<Address, PromiseError> {
        let result = self.wait().await?;
        result
            .created_address()
            .ok_or(PromiseError::NoCreationEvent { id: self.id })
    }
}

async fn resolve(ledger: &dyn Ledger, id: Identifier, config: PromiseConfig) -> Resolution {
    let deadline = time::sleep(config.deadline);
    tokio::pin!(deadline);

    let mut poll = time::interval_at(Instant::now() + config.poll_interval, config.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_error: Option<LedgerError> = None;

    loop {
        tokio::select! {
            biased;
            () = &mut deadline => {
                if let Some(e) = last_error {
                    warn!(tx = %id, error = %e, "Last poll failed before deadline");
                }
                return Err(PromiseError::Timeout {
                    id,
                    deadline: config.deadline,
                });
            }
            outcome = async {
                poll.tick().await;
                ledger.transaction_result(id).await
            } => match outcome {
                Ok(result) => {
                    if let Some(message) = result.error.clone() {
                        return Err(PromiseError::Sealed { id, message });
                    }
                    match result.status {
                        TransactionStatus::Sealed => return Ok(Arc::new(result)),
                        TransactionStatus::Expired => return Err(PromiseError::Expired { id }),
                        status => debug!(tx = %id, ?status, "Waiting for seal"),
                    }
                }
                Err(e) => {
                    debug!(tx = %id, error = %e, "Transaction result query failed");
                    last_error = Some(e);
                }
            }
        }
    }
}
