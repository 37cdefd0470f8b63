//! Ledger capability consumed by the agents and promises.
//!
//! [`Ledger`] is the seam between the load tester and the access node. The
//! production implementation is [`RestLedger`]; tests substitute an in-memory
//! mock.

use std::{fmt, str::FromStr, sync::Arc};

use alloy_primitives::{hex, Bytes, B256};
use async_trait::async_trait;
use thiserror::Error;

use crate::error::LedgerError;

mod rest;
pub mod transaction;

pub use rest::RestLedger;
pub use transaction::{ProposalKey, Transaction, TransactionSignature};

/// Transaction identifier assigned by the network.
pub type Identifier = B256;

/// Event type emitted when a transaction creates an account.
pub const ACCOUNT_CREATED_EVENT: &str = "flow.AccountCreated";

/// Weight a key needs to authorize on its own.
pub const KEY_WEIGHT_THRESHOLD: u32 = 1000;

/// Ledger account address (8 bytes).
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; 8]);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid address {input:?}: {reason}")]
pub struct ParseAddressError {
    input: String,
    reason: String,
}

impl Address {
    pub const LEN: usize = 8;

    pub const fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Parses a hex address with or without `0x` prefix; short input is
    /// left-padded with zeros.
    pub fn from_hex(input: &str) -> Result<Self, ParseAddressError> {
        let trimmed = input.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        if digits.is_empty() || digits.len() > Self::LEN * 2 {
            return Err(ParseAddressError {
                input: input.to_string(),
                reason: format!("expected 1 to {} hex digits", Self::LEN * 2),
            });
        }
        let padded = format!("{digits:0>16}");
        let decoded = hex::decode(&padded).map_err(|e| ParseAddressError {
            input: input.to_string(),
            reason: e.to_string(),
        })?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&decoded);
        Ok(Self(bytes))
    }

    /// Lowercase hex without prefix, always 16 digits.
    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }

    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Signature algorithm of an account key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    EcdsaP256,
    EcdsaSecp256k1,
}

impl SignatureAlgorithm {
    /// Numeric code used in the encoded account key.
    pub const fn code(&self) -> u64 {
        match self {
            Self::EcdsaP256 => 2,
            Self::EcdsaSecp256k1 => 3,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EcdsaP256 => "ECDSA_P256",
            Self::EcdsaSecp256k1 => "ECDSA_secp256k1",
        }
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ecdsa_p256" | "p256" => Ok(Self::EcdsaP256),
            "ecdsa_secp256k1" | "secp256k1" => Ok(Self::EcdsaSecp256k1),
            _ => Err(format!("Unknown signature algorithm: {s}")),
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hash algorithm an account key signs with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha2_256,
    #[default]
    Sha3_256,
}

impl HashAlgorithm {
    pub const fn code(&self) -> u64 {
        match self {
            Self::Sha2_256 => 1,
            Self::Sha3_256 => 3,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sha2_256 => "SHA2_256",
            Self::Sha3_256 => "SHA3_256",
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sha2_256" | "sha256" => Ok(Self::Sha2_256),
            "sha3_256" => Ok(Self::Sha3_256),
            _ => Err(format!("Unknown hash algorithm: {s}")),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Public key registered on an account, with its own sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountKey {
    pub index: u32,
    pub public_key: Bytes,
    pub sign_algo: SignatureAlgorithm,
    pub hash_algo: HashAlgorithm,
    pub weight: u32,
    pub sequence_number: u64,
    pub revoked: bool,
}

/// Snapshot of an account's public state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub address: Address,
    pub balance: u64,
    pub keys: Vec<AccountKey>,
}

impl Account {
    /// First key that has not been revoked.
    pub fn first_usable_key(&self) -> Option<&AccountKey> {
        self.keys.iter().find(|key| !key.revoked)
    }
}

/// Processing status of a submitted transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
    #[default]
    Unknown,
    Pending,
    Finalized,
    Executed,
    Sealed,
    Expired,
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "" | "unknown" => Ok(Self::Unknown),
            "pending" => Ok(Self::Pending),
            "finalized" => Ok(Self::Finalized),
            "executed" => Ok(Self::Executed),
            "sealed" => Ok(Self::Sealed),
            "expired" => Ok(Self::Expired),
            _ => Err(format!("Unknown transaction status: {s}")),
        }
    }
}

/// Event emitted by an executed transaction. The payload is the decoded
/// JSON-Cadence value.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_type: String,
    pub transaction_index: u32,
    pub event_index: u32,
    pub payload: serde_json::Value,
}

impl Event {
    /// Builds the event the network emits for a newly created account.
    pub fn account_created(address: Address) -> Self {
        Self {
            event_type: ACCOUNT_CREATED_EVENT.to_string(),
            transaction_index: 0,
            event_index: 0,
            payload: serde_json::json!({
                "type": "Event",
                "value": {
                    "id": ACCOUNT_CREATED_EVENT,
                    "fields": [
                        {
                            "name": "address",
                            "value": { "type": "Address", "value": address.to_string() }
                        }
                    ]
                }
            }),
        }
    }

    /// Address named by an account creation event; `None` for any other event.
    pub fn created_address(&self) -> Option<Address> {
        if self.event_type != ACCOUNT_CREATED_EVENT {
            return None;
        }
        self.payload["value"]["fields"]
            .as_array()?
            .iter()
            .find(|field| field["name"] == "address")
            .and_then(|field| field["value"]["value"].as_str())
            .and_then(|raw| Address::from_hex(raw).ok())
    }
}

/// Outcome of a transaction as last reported by the network.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionResult {
    pub status: TransactionStatus,
    pub error: Option<String>,
    pub events: Vec<Event>,
}

impl TransactionResult {
    /// Address named by the first account creation event, in emission order.
    /// `None` if there is no such event or its payload names no valid address.
    pub fn created_address(&self) -> Option<Address> {
        self.events
            .iter()
            .find(|event| event.event_type == ACCOUNT_CREATED_EVENT)
            .and_then(Event::created_address)
    }
}

/// Operations the load tester needs from the ledger network.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Fetches the current public state of an account, keys included.
    async fn get_account(&self, address: Address) -> Result<Account, LedgerError>;

    /// Returns the id of the latest sealed block, used as reference block.
    async fn latest_reference(&self) -> Result<Identifier, LedgerError>;

    /// Submits a fully signed transaction and returns its identifier.
    async fn send_transaction(&self, tx: &Transaction) -> Result<Identifier, LedgerError>;

    /// Queries the current result of a submitted transaction.
    async fn transaction_result(&self, id: Identifier) -> Result<TransactionResult, LedgerError>;
}

/// Ledger handle shared across agents and promise resolvers.
pub type SharedLedger = Arc<dyn Ledger>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_pads_short_hex() {
        let address = Address::from_hex("0x01ab").unwrap();
        assert_eq!(address.hex(), "00000000000001ab");
        assert_eq!(address.to_string(), "0x00000000000001ab");
        assert_eq!("f8d6e0586b0a20c7".parse::<Address>().unwrap().hex(), "f8d6e0586b0a20c7");
    }

    #[test]
    fn address_rejects_garbage() {
        assert!(Address::from_hex("").is_err());
        assert!(Address::from_hex("0x").is_err());
        assert!(Address::from_hex("zz").is_err());
        assert!(Address::from_hex("00000000000000001").is_err());
    }

    #[test]
    fn creation_event_yields_address() {
        let address = Address::from_hex("e03daebed8ca0615").unwrap();
        let result = TransactionResult {
            status: TransactionStatus::Sealed,
            error: None,
            events: vec![
                Event {
                    event_type: "A.0ae53cb6e3f42a79.FlowToken.TokensWithdrawn".to_string(),
                    transaction_index: 0,
                    event_index: 0,
                    payload: serde_json::Value::Null,
                },
                Event::account_created(address),
            ],
        };
        assert_eq!(result.created_address(), Some(address));
    }

    #[test]
    fn only_the_first_creation_event_counts() {
        let malformed = Event {
            event_type: ACCOUNT_CREATED_EVENT.to_string(),
            transaction_index: 0,
            event_index: 0,
            payload: serde_json::json!({ "value": { "fields": [] } }),
        };
        let result = TransactionResult {
            status: TransactionStatus::Sealed,
            error: None,
            events: vec![malformed, Event::account_created(Address::from_hex("02").unwrap())],
        };
        assert_eq!(result.created_address(), None);
    }

    #[test]
    fn parses_statuses_case_insensitively() {
        assert_eq!("Sealed".parse::<TransactionStatus>().unwrap(), TransactionStatus::Sealed);
        assert_eq!("EXPIRED".parse::<TransactionStatus>().unwrap(), TransactionStatus::Expired);
        assert!("bogus".parse::<TransactionStatus>().is_err());
    }
}
