//! Error taxonomy for every stage of a submission.
//!
//! Library stages return these typed errors; orchestration code wraps them in
//! `anyhow` with context. Each error exposes a short `kind()` label which the
//! tracker uses as its failure-reason key.

use std::time::Duration;

use thiserror::Error;

use crate::ledger::{Address, Identifier};

/// Script acquisition failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The request never produced a response.
    #[error("could not get response for {url}: {reason}")]
    Transport { url: String, reason: String },
    /// The server answered with a non-2xx status.
    #[error("could not retrieve script from {url} (status: {status})")]
    Status { url: String, status: u16 },
    /// The response body could not be read.
    #[error("could not read script from {url}: {reason}")]
    Read { url: String, reason: String },
    /// The response body was empty.
    #[error("script from {url} is empty")]
    Empty { url: String },
}

/// A call against the ledger access node failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("request to {path} failed: {reason}")]
    Request { path: String, reason: String },
    #[error("access node returned HTTP {status} for {path}: {message}")]
    Http {
        path: String,
        status: u16,
        message: String,
    },
    #[error("could not decode response for {path}: {reason}")]
    Decode { path: String, reason: String },
}

/// Key handling or signing failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignError {
    #[error("invalid private key: {0}")]
    InvalidKey(String),
    #[error("unsupported signature algorithm {0}")]
    UnsupportedAlgorithm(String),
    #[error("could not sign {role} for {address}: {reason}")]
    Signature {
        role: &'static str,
        address: Address,
        reason: String,
    },
}

/// A submission through an account agent failed.
///
/// Each variant corresponds to one stage of the submission; a failure at any
/// stage discards the whole attempt.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("could not load script: {0}")]
    Load(#[from] LoadError),
    #[error("could not refresh account {address}: {source}")]
    Refresh {
        address: Address,
        #[source]
        source: LedgerError,
    },
    #[error("could not get latest block header: {0}")]
    Reference(#[source] LedgerError),
    #[error("account {0} has no usable key")]
    NoKey(Address),
    #[error("could not sign transaction: {0}")]
    Sign(#[from] SignError),
    #[error("could not send transaction: {0}")]
    Submit(#[source] LedgerError),
    #[error(transparent)]
    Promise(#[from] PromiseError),
}

impl AgentError {
    /// Short label of the failing stage.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Load(_) => "load",
            Self::Refresh { .. } => "refresh",
            Self::Reference(_) => "reference",
            Self::NoKey(_) => "no_key",
            Self::Sign(_) => "sign",
            Self::Submit(_) => "submit",
            Self::Promise(e) => e.kind(),
        }
    }
}

/// Terminal failure of a transaction promise.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromiseError {
    /// The network executed the transaction and reported an error.
    #[error("transaction {id} failed: {message}")]
    Sealed { id: Identifier, message: String },
    /// The transaction expired before it could be sealed.
    #[error("transaction {id} expired")]
    Expired { id: Identifier },
    /// No terminal state was observed before the deadline.
    #[error("transaction {id} was never sealed (waited {deadline:?})")]
    Timeout { id: Identifier, deadline: Duration },
    /// The sealed result carries no account creation event.
    #[error("transaction {id} didn't create an account")]
    NoCreationEvent { id: Identifier },
    /// The resolver stopped without producing an outcome.
    #[error("resolution of transaction {id} was abandoned")]
    Abandoned { id: Identifier },
}

impl PromiseError {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Sealed { .. } => "sealed",
            Self::Expired { .. } => "expired",
            Self::Timeout { .. } => "timeout",
            Self::NoCreationEvent { .. } => "no_creation_event",
            Self::Abandoned { .. } => "abandoned",
        }
    }

    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
