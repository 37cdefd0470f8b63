use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{agent::AgentConfig, promise::PromiseConfig};

const FLOW_FT: &str = "https://raw.githubusercontent.com/onflow/flow-ft/master";

/// Where the contracts and transaction templates are fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptUrls {
    pub fungible_token_contract: String,
    pub token_contract: String,
    pub setup_account: String,
    pub mint_tokens: String,
    pub transfer_tokens: String,
}

impl Default for ScriptUrls {
    fn default() -> Self {
        Self {
            fungible_token_contract: format!("{FLOW_FT}/contracts/FungibleToken.cdc"),
            token_contract: format!("{FLOW_FT}/contracts/FlowToken.cdc"),
            setup_account: format!("{FLOW_FT}/transactions/setup_account.cdc"),
            mint_tokens: format!("{FLOW_FT}/transactions/mint_tokens.cdc"),
            transfer_tokens: format!("{FLOW_FT}/transactions/transfer_tokens.cdc"),
        }
    }
}

/// Literal text the templates use where addresses and amounts go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Placeholders {
    pub fungible_token: String,
    pub token: String,
    pub mint_recipient: String,
    pub transfer_recipient: String,
    pub allowed_amount: String,
    pub mint_amount: String,
    pub transfer_amount: String,
}

impl Default for Placeholders {
    fn default() -> Self {
        Self {
            fungible_token: "0x02".to_string(),
            token: "0x03".to_string(),
            mint_recipient: "0x03".to_string(),
            transfer_recipient: "0x04".to_string(),
            allowed_amount: "100.0".to_string(),
            mint_amount: "10.0".to_string(),
            transfer_amount: "10.0".to_string(),
        }
    }
}

/// Token amounts in whole units; rendered as `{amount}.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Amounts {
    /// Minting allowance granted when the token contract is deployed.
    pub allowed: u64,
    /// Minted into every provisioned account.
    pub mint: u64,
    /// Moved by every transfer.
    pub transfer: u64,
}

impl Default for Amounts {
    fn default() -> Self {
        Self {
            allowed: 184_467_440_737,
            mint: 1_000_000,
            transfer: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    pub scripts: ScriptUrls,
    pub placeholders: Placeholders,
    pub amounts: Amounts,
    pub gas_limit: u64,
    /// How often a pending transaction's result is queried (e.g. "100ms").
    pub poll_interval: String,
    /// How long a transaction may take to seal (e.g. "20s").
    pub seal_timeout: String,
    /// Seed for sender/receiver selection; random when absent.
    pub seed: Option<u64>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            scripts: ScriptUrls::default(),
            placeholders: Placeholders::default(),
            amounts: Amounts::default(),
            gas_limit: crate::agent::DEFAULT_GAS_LIMIT,
            poll_interval: "100ms".to_string(),
            seal_timeout: "20s".to_string(),
            seed: None,
        }
    }
}

impl TestConfig {
    pub fn load(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {path}"))?;
        serde_yaml::from_str(&contents).context("failed to parse config YAML")
    }

    pub fn parse_poll_interval(&self) -> Result<Duration> {
        parse_duration(&self.poll_interval).context("invalid poll_interval")
    }

    pub fn parse_seal_timeout(&self) -> Result<Duration> {
        parse_duration(&self.seal_timeout).context("invalid seal_timeout")
    }

    pub fn agent_config(&self) -> Result<AgentConfig> {
        Ok(AgentConfig {
            gas_limit: self.gas_limit,
            promise: PromiseConfig {
                poll_interval: self.parse_poll_interval()?,
                deadline: self.parse_seal_timeout()?,
            },
        })
    }
}

fn parse_duration(raw: &str) -> Result<Duration> {
    let duration = humantime::parse_duration(raw.trim())
        .with_context(|| format!("invalid duration: {raw}"))?;
    anyhow::ensure!(!duration.is_zero(), "duration must be greater than zero");
    Ok(duration)
}
