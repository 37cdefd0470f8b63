use std::str::FromStr;

use alloy_primitives::{hex, Bytes, B256};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{
    Account, AccountKey, Address, Event, Identifier, Ledger, Transaction, TransactionResult,
    TransactionSignature, TransactionStatus,
};
use crate::error::LedgerError;

/// [`Ledger`] backed by the access node's REST API.
#[derive(Debug, Clone)]
pub struct RestLedger {
    client: reqwest::Client,
    base: Url,
}

impl RestLedger {
    /// Creates a ledger client rooted at `endpoint` (e.g. `http://127.0.0.1:8888`).
    pub fn new(client: reqwest::Client, endpoint: &str) -> Result<Self, url::ParseError> {
        let mut base = Url::parse(endpoint)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { client, base })
    }

    pub const fn endpoint(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url, LedgerError> {
        self.base
            .join(path)
            .map_err(|e| LedgerError::Request {
                path: path.to_string(),
                reason: e.to_string(),
            })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, LedgerError> {
        let response = self
            .client
            .get(self.url(path)?)
            .send()
            .await
            .map_err(|e| LedgerError::Request {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        decode_response(path, response).await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, LedgerError> {
        let response = self
            .client
            .post(self.url(path)?)
            .json(body)
            .send()
            .await
            .map_err(|e| LedgerError::Request {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        decode_response(path, response).await
    }
}

async fn decode_response<T: DeserializeOwned>(
    path: &str,
    response: reqwest::Response,
) -> Result<T, LedgerError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|e| e.message)
            .unwrap_or(body);
        return Err(LedgerError::Http {
            path: path.to_string(),
            status: status.as_u16(),
            message,
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|e| LedgerError::Decode {
            path: path.to_string(),
            reason: e.to_string(),
        })
}

#[async_trait]
impl Ledger for RestLedger {
    async fn get_account(&self, address: Address) -> Result<Account, LedgerError> {
        let path = format!("v1/accounts/{}?expand=keys", address.hex());
        let body: AccountBody = self.get(&path).await?;
        body.into_account(&path)
    }

    async fn latest_reference(&self) -> Result<Identifier, LedgerError> {
        let path = "v1/blocks?height=sealed";
        let blocks: Vec<BlockBody> = self.get(path).await?;
        let block = blocks.into_iter().next().ok_or_else(|| LedgerError::Decode {
            path: path.to_string(),
            reason: "no sealed block returned".to_string(),
        })?;
        parse_id(path, &block.header.id)
    }

    async fn send_transaction(&self, tx: &Transaction) -> Result<Identifier, LedgerError> {
        let path = "v1/transactions";
        let body = TransactionBody::from(tx);
        let submitted: SubmittedBody = self.post(path, &body).await?;
        let id = parse_id(path, &submitted.id)?;
        debug!(tx = %id, proposer = %tx.proposal_key.address, "Transaction submitted");
        Ok(id)
    }

    async fn transaction_result(&self, id: Identifier) -> Result<TransactionResult, LedgerError> {
        let path = format!("v1/transaction_results/{}", hex::encode(id));
        let body: TransactionResultBody = self.get(&path).await?;
        body.into_result(&path)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct AccountBody {
    address: String,
    #[serde(default)]
    balance: String,
    #[serde(default)]
    keys: Vec<AccountKeyBody>,
}

#[derive(Debug, Deserialize)]
struct AccountKeyBody {
    index: String,
    public_key: String,
    signing_algorithm: String,
    hashing_algorithm: String,
    sequence_number: String,
    weight: String,
    #[serde(default)]
    revoked: bool,
}

#[derive(Debug, Deserialize)]
struct BlockBody {
    header: BlockHeaderBody,
}

#[derive(Debug, Deserialize)]
struct BlockHeaderBody {
    id: String,
}

#[derive(Debug, Serialize)]
struct TransactionBody {
    script: String,
    arguments: Vec<String>,
    reference_block_id: String,
    gas_limit: String,
    payer: String,
    proposal_key: ProposalKeyBody,
    authorizers: Vec<String>,
    payload_signatures: Vec<SignatureBody>,
    envelope_signatures: Vec<SignatureBody>,
}

#[derive(Debug, Serialize)]
struct ProposalKeyBody {
    address: String,
    key_index: String,
    sequence_number: String,
}

#[derive(Debug, Serialize)]
struct SignatureBody {
    address: String,
    key_index: String,
    signature: String,
}

#[derive(Debug, Deserialize)]
struct SubmittedBody {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TransactionResultBody {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error_message: String,
    #[serde(default)]
    events: Vec<EventBody>,
}

#[derive(Debug, Deserialize)]
struct EventBody {
    #[serde(rename = "type")]
    event_type: String,
    transaction_index: String,
    event_index: String,
    payload: String,
}

impl From<&TransactionSignature> for SignatureBody {
    fn from(sig: &TransactionSignature) -> Self {
        Self {
            address: sig.address.hex(),
            key_index: sig.key_index.to_string(),
            signature: STANDARD.encode(&sig.signature),
        }
    }
}

impl From<&Transaction> for TransactionBody {
    fn from(tx: &Transaction) -> Self {
        Self {
            script: STANDARD.encode(&tx.script),
            arguments: tx
                .arguments
                .iter()
                .map(|arg| STANDARD.encode(arg))
                .collect(),
            reference_block_id: hex::encode(tx.reference_block_id),
            gas_limit: tx.gas_limit.to_string(),
            payer: tx.payer.hex(),
            proposal_key: ProposalKeyBody {
                address: tx.proposal_key.address.hex(),
                key_index: tx.proposal_key.key_index.to_string(),
                sequence_number: tx.proposal_key.sequence_number.to_string(),
            },
            authorizers: tx.authorizers.iter().map(Address::hex).collect(),
            payload_signatures: tx
                .payload_signatures
                .iter()
                .map(SignatureBody::from)
                .collect(),
            envelope_signatures: tx
                .envelope_signatures
                .iter()
                .map(SignatureBody::from)
                .collect(),
        }
    }
}

impl AccountBody {
    fn into_account(self, path: &str) -> Result<Account, LedgerError> {
        let address = Address::from_hex(&self.address)
            .map_err(|e| decode_error(path, e))?;
        let balance = if self.balance.is_empty() {
            0
        } else {
            parse_field(path, &self.balance)?
        };
        let keys = self
            .keys
            .into_iter()
            .map(|key| key.into_key(path))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Account {
            address,
            balance,
            keys,
        })
    }
}

impl AccountKeyBody {
    fn into_key(self, path: &str) -> Result<AccountKey, LedgerError> {
        let public_key: Bytes = self.public_key.parse().map_err(|e| decode_error(path, e))?;
        Ok(AccountKey {
            index: parse_field(path, &self.index)?,
            public_key,
            sign_algo: parse_field(path, &self.signing_algorithm)?,
            hash_algo: parse_field(path, &self.hashing_algorithm)?,
            weight: parse_field(path, &self.weight)?,
            sequence_number: parse_field(path, &self.sequence_number)?,
            revoked: self.revoked,
        })
    }
}

impl TransactionResultBody {
    fn into_result(self, path: &str) -> Result<TransactionResult, LedgerError> {
        let status: TransactionStatus = parse_field(path, &self.status)?;
        let error = (!self.error_message.is_empty())
            .then_some(self.error_message);
        let events = self
            .events
            .into_iter()
            .map(|event| event.into_event(path))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TransactionResult {
            status,
            error,
            events,
        })
    }
}

impl EventBody {
    fn into_event(self, path: &str) -> Result<Event, LedgerError> {
        let raw = STANDARD
            .decode(self.payload.as_bytes())
            .map_err(|e| decode_error(path, e))?;
        let payload = serde_json::from_slice(&raw).map_err(|e| decode_error(path, e))?;
        Ok(Event {
            event_type: self.event_type,
            transaction_index: parse_field(path, &self.transaction_index)?,
            event_index: parse_field(path, &self.event_index)?,
            payload,
        })
    }
}

fn parse_id(path: &str, raw: &str) -> Result<Identifier, LedgerError> {
    raw.parse::<B256>().map_err(|e| decode_error(path, e))
}

fn parse_field<T>(path: &str, raw: &str) -> Result<T, LedgerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| decode_error(path, e))
}

fn decode_error(path: &str, reason: impl std::fmt::Display) -> LedgerError {
    LedgerError::Decode {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}
