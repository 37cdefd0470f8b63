mod agent;
mod cli;
mod client;
mod config;
mod error;
mod generator;
mod keys;
pub mod ledger;
mod pool;
mod promise;
mod provisioner;
mod runner;
pub mod script;
mod stats;
mod tracker;

#[cfg(test)]
mod testing;

pub use agent::{AccountAgent, AgentConfig, TransactionDecorator, DEFAULT_GAS_LIMIT};
pub use cli::{Args, LogFormat};
pub use client::create_shared_client;
pub use config::{Amounts, Placeholders, ScriptUrls, TestConfig};
pub use error::{AgentError, LedgerError, LoadError, PromiseError, SignError};
pub use generator::{SharedAgent, TransferPlan};
pub use keys::KeyPair;
pub use pool::{AgentPool, PoolLease};
pub use promise::{PromiseConfig, TransactionPromise};
pub use runner::run_load_test;
pub use tracker::Stats;
