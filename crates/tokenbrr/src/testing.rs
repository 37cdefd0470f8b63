//! In-memory ledger and script fetcher for unit tests.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use alloy_primitives::{Bytes as LedgerBytes, B256};
use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    error::{LedgerError, LoadError},
    ledger::{
        Account, AccountKey, Address, Event, HashAlgorithm, Identifier, Ledger,
        SignatureAlgorithm, Transaction, TransactionResult, TransactionStatus,
        KEY_WEIGHT_THRESHOLD,
    },
    script::ScriptFetcher,
};

/// Marker that identifies account creation scripts.
const CREATES_ACCOUNT: &str = "AuthAccount(payer: signer)";

struct State {
    accounts: HashMap<Address, Account>,
    results: HashMap<Identifier, TransactionResult>,
    queries: HashMap<Identifier, usize>,
    submitted: Vec<Transaction>,
    failing_scripts: Vec<(String, String)>,
    default_status: TransactionStatus,
    next_address: u64,
    fail_reference: bool,
    fail_submit: bool,
    fail_results: bool,
    suppress_creation_events: bool,
}

/// Ledger that keeps accounts and results in memory. Submissions must carry the
/// proposer's current sequence number and bump it when accepted, like the
/// network does.
pub(crate) struct MockLedger {
    state: Mutex<State>,
}

impl MockLedger {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State {
                accounts: HashMap::new(),
                results: HashMap::new(),
                queries: HashMap::new(),
                submitted: Vec::new(),
                failing_scripts: Vec::new(),
                default_status: TransactionStatus::Sealed,
                next_address: 0x1000,
                fail_reference: false,
                fail_submit: false,
                fail_results: false,
                suppress_creation_events: false,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers an account holding a single key, stored at index 0.
    pub(crate) fn add_account(&self, address: Address, key: AccountKey) {
        let account = Account {
            address,
            balance: 0,
            keys: vec![AccountKey { index: 0, ..key }],
        };
        self.state().accounts.insert(address, account);
    }

    pub(crate) fn remove_account(&self, address: Address) {
        self.state().accounts.remove(&address);
    }

    pub(crate) fn get_account_snapshot(&self, address: Address) -> Option<Account> {
        self.state().accounts.get(&address).cloned()
    }

    pub(crate) fn set_result(&self, id: Identifier, result: TransactionResult) {
        self.state().results.insert(id, result);
    }

    pub(crate) fn result_queries(&self, id: Identifier) -> usize {
        self.state().queries.get(&id).copied().unwrap_or(0)
    }

    /// Status given to accepted transactions that do not fail.
    pub(crate) fn set_default_status(&self, status: TransactionStatus) {
        self.state().default_status = status;
    }

    /// Transactions whose script contains `pattern` seal with `message` as
    /// their error.
    pub(crate) fn fail_scripts_containing(&self, pattern: &str, message: &str) {
        self.state()
            .failing_scripts
            .push((pattern.to_string(), message.to_string()));
    }

    pub(crate) fn fail_reference(&self, fail: bool) {
        self.state().fail_reference = fail;
    }

    pub(crate) fn fail_submit(&self, fail: bool) {
        self.state().fail_submit = fail;
    }

    pub(crate) fn fail_results(&self, fail: bool) {
        self.state().fail_results = fail;
    }

    pub(crate) fn suppress_creation_events(&self, suppress: bool) {
        self.state().suppress_creation_events = suppress;
    }

    /// Accepted transactions, in submission order.
    pub(crate) fn submitted(&self) -> Vec<Transaction> {
        self.state().submitted.clone()
    }
}

fn rejected(tx: &Transaction, message: &str) -> LedgerError {
    LedgerError::Http {
        path: "v1/transactions".to_string(),
        status: 400,
        message: format!("{message} (proposer {})", tx.proposal_key.address),
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn get_account(&self, address: Address) -> Result<Account, LedgerError> {
        self.state()
            .accounts
            .get(&address)
            .cloned()
            .ok_or_else(|| LedgerError::Http {
                path: format!("v1/accounts/{}", address.hex()),
                status: 404,
                message: "account not found".to_string(),
            })
    }

    async fn latest_reference(&self) -> Result<Identifier, LedgerError> {
        if self.state().fail_reference {
            return Err(LedgerError::Request {
                path: "v1/blocks".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(B256::repeat_byte(0xbb))
    }

    async fn send_transaction(&self, tx: &Transaction) -> Result<Identifier, LedgerError> {
        let mut state = self.state();
        if state.fail_submit {
            return Err(rejected(tx, "invalid transaction"));
        }
        if tx.envelope_signatures.is_empty() {
            return Err(rejected(tx, "missing envelope signature"));
        }

        let proposal = tx.proposal_key;
        let key = state
            .accounts
            .get_mut(&proposal.address)
            .and_then(|account| account.keys.get_mut(proposal.key_index as usize))
            .ok_or_else(|| rejected(tx, "unknown proposal key"))?;
        if key.sequence_number != proposal.sequence_number {
            return Err(rejected(tx, "invalid proposal key: sequence number mismatch"));
        }
        key.sequence_number += 1;

        let id = tx.id();
        let script = String::from_utf8_lossy(&tx.script).into_owned();
        let failure = state
            .failing_scripts
            .iter()
            .find(|(pattern, _)| script.contains(pattern.as_str()))
            .map(|(_, message)| message.clone());

        let result = match failure {
            Some(message) => TransactionResult {
                status: TransactionStatus::Sealed,
                error: Some(message),
                events: vec![],
            },
            None => {
                let mut events = Vec::new();
                if script.contains(CREATES_ACCOUNT) {
                    let address = Address::new(state.next_address.to_be_bytes());
                    state.next_address += 1;
                    let key = AccountKey {
                        index: 0,
                        public_key: LedgerBytes::new(),
                        sign_algo: SignatureAlgorithm::EcdsaSecp256k1,
                        hash_algo: HashAlgorithm::Sha3_256,
                        weight: KEY_WEIGHT_THRESHOLD,
                        sequence_number: 0,
                        revoked: false,
                    };
                    let account = Account {
                        address,
                        balance: 0,
                        keys: vec![key],
                    };
                    state.accounts.insert(address, account);
                    if !state.suppress_creation_events {
                        events.push(Event::account_created(address));
                    }
                }
                TransactionResult {
                    status: state.default_status,
                    error: None,
                    events,
                }
            }
        };

        state.results.insert(id, result);
        state.submitted.push(tx.clone());
        Ok(id)
    }

    async fn transaction_result(&self, id: Identifier) -> Result<TransactionResult, LedgerError> {
        let mut state = self.state();
        *state.queries.entry(id).or_default() += 1;
        if state.fail_results {
            return Err(LedgerError::Request {
                path: format!("v1/transaction_results/{id:x}"),
                reason: "connection reset".to_string(),
            });
        }
        Ok(state.results.get(&id).cloned().unwrap_or_default())
    }
}

/// Serves scripts from memory and counts fetches per URL. Unknown URLs answer
/// with a 404.
pub(crate) struct StaticFetcher {
    scripts: HashMap<String, Bytes>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl StaticFetcher {
    pub(crate) fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            fetches: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn with_script(mut self, url: &str, script: &str) -> Self {
        self.scripts.insert(url.to_string(), Bytes::copy_from_slice(script.as_bytes()));
        self
    }

    pub(crate) fn fetch_count(&self, url: &str) -> usize {
        self.fetches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ScriptFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, LoadError> {
        *self
            .fetches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(url.to_string())
            .or_default() += 1;
        // let concurrent callers overlap
        tokio::task::yield_now().await;
        self.scripts
            .get(url)
            .cloned()
            .ok_or_else(|| LoadError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}
