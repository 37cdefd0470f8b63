use std::time::Duration;

use clap::Parser;

use crate::generator::MAX_TPS;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown log format: {s}. Use 'text' or 'json'")),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "tokenbrr")]
#[command(
    about = "Fungible token load tester - deploys token contracts, provisions funded accounts, and streams transfers between them"
)]
pub struct Args {
    /// REST endpoint of the access node
    #[arg(long, env = "TOKENBRR_RPC", default_value = "http://127.0.0.1:8888")]
    pub rpc: String,

    /// Operator private key (hex, with or without 0x prefix)
    #[arg(long, env = "TOKENBRR_HEX", hide_env_values = true)]
    pub hex: String,

    /// Operator account address
    #[arg(long, env = "TOKENBRR_ADDRESS", default_value = "f8d6e0586b0a20c7")]
    pub address: String,

    /// Number of user accounts to provision
    #[arg(long, env = "TOKENBRR_NUM", default_value = "100")]
    pub num: u32,

    /// Transfers to submit per second
    #[arg(long, env = "TOKENBRR_TPS", default_value = "10")]
    pub tps: u32,

    /// Test duration (e.g., "60s", "5m"). If not specified, runs until Ctrl+C
    #[arg(long, env = "TOKENBRR_DURATION")]
    pub duration: Option<String>,

    /// YAML file with script URLs, placeholders, amounts and timings
    #[arg(long, env = "TOKENBRR_CONFIG")]
    pub config: Option<String>,

    /// Log output format (text, json)
    #[arg(long, env = "TOKENBRR_LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}

impl Args {
    pub fn parse_log_format(&self) -> Result<LogFormat, String> {
        self.log_format.parse()
    }

    pub fn parse_duration(&self) -> Result<Option<Duration>, String> {
        self.duration
            .as_deref()
            .map(|d| {
                humantime::parse_duration(d.trim())
                    .map_err(|e| format!("invalid duration {d}: {e}"))
            })
            .transpose()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.tps == 0 {
            return Err("--tps must be greater than zero".to_string());
        }
        if self.tps > MAX_TPS {
            return Err(format!("--tps must be at most {MAX_TPS}"));
        }
        self.parse_duration()?;
        self.parse_log_format()?;
        Ok(())
    }
}
