//! Account agents: one per ledger account, owning its key and sequencing.

use std::sync::{Arc, Mutex, PoisonError};

use alloy_primitives::Bytes;
use tracing::debug;

use crate::{
    error::{AgentError, SignError},
    keys::KeyPair,
    ledger::{
        Account, AccountKey, Address, Identifier, ProposalKey, SharedLedger, SignatureAlgorithm,
        Transaction, KEY_WEIGHT_THRESHOLD,
    },
    promise::{PromiseConfig, TransactionPromise},
    script::ScriptLoader,
};

/// Computation limit attached to every transaction.
pub const DEFAULT_GAS_LIMIT: u64 = 9999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentConfig {
    pub gas_limit: u64,
    pub promise: PromiseConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            gas_limit: DEFAULT_GAS_LIMIT,
            promise: PromiseConfig::default(),
        }
    }
}

/// Extra effect applied to a transaction after the proposer and payer are set
/// and before the envelope is signed.
#[derive(Debug, Clone)]
pub enum TransactionDecorator {
    /// Adds an authorizer.
    Authorize(Address),
    /// Adds a payload signature for `address`, which must already be a signer.
    SignPayload {
        address: Address,
        key_index: u32,
        key: Arc<KeyPair>,
    },
}

impl TransactionDecorator {
    fn apply(&self, tx: &mut Transaction) -> Result<(), SignError> {
        match self {
            Self::Authorize(address) => {
                tx.add_authorizer(*address);
                Ok(())
            }
            Self::SignPayload {
                address,
                key_index,
                key,
            } => tx.sign_payload(*address, *key_index, key),
        }
    }
}

/// Owns one account's private key and a snapshot of its public state.
///
/// Every submission refreshes the snapshot first, so the proposal key always
/// carries the sequence number the network last reported. Callers must not
/// submit through the same agent concurrently.
pub struct AccountAgent {
    ledger: SharedLedger,
    address: Address,
    key: Arc<KeyPair>,
    account: Mutex<Account>,
    config: AgentConfig,
}

impl std::fmt::Debug for AccountAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountAgent")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl AccountAgent {
    /// Binds `key` to an existing account.
    pub async fn connect(
        ledger: SharedLedger,
        address: Address,
        key: KeyPair,
        config: AgentConfig,
    ) -> Result<Self, AgentError> {
        let account = ledger
            .get_account(address)
            .await
            .map_err(|source| AgentError::Refresh { address, source })?;
        let account_key = account.first_usable_key().ok_or(AgentError::NoKey(address))?;
        if account_key.sign_algo != SignatureAlgorithm::EcdsaSecp256k1 {
            let algorithm = account_key.sign_algo.to_string();
            return Err(SignError::UnsupportedAlgorithm(algorithm).into());
        }
        let key = key.with_hash_algorithm(account_key.hash_algo);
        debug!(
            address = %address,
            key_index = account_key.index,
            sequence = account_key.sequence_number,
            "Account connected"
        );

        Ok(Self {
            ledger,
            address,
            key: Arc::new(key),
            account: Mutex::new(account),
            config,
        })
    }

    /// Creates a new account funded by `creator`, controlled by a freshly
    /// generated key.
    pub async fn create(creator: &Self) -> Result<Self, AgentError> {
        let key = KeyPair::random();
        let loader = ScriptLoader::account_creation(vec![key.account_key(KEY_WEIGHT_THRESHOLD)]);
        let promise = creator
            .run_code(&loader, &[TransactionDecorator::Authorize(creator.address)])
            .await?;
        let address = promise.created_address().await?;
        let ledger = Arc::clone(&creator.ledger);
        Self::connect(ledger, address, key, creator.config).await
    }

    /// Loads the script and submits it. The returned promise resolves once the
    /// transaction seals, fails or times out.
    pub async fn run_code(
        &self,
        loader: &ScriptLoader,
        decorators: &[TransactionDecorator],
    ) -> Result<TransactionPromise, AgentError> {
        let script = loader.load().await?;
        let id = self.submit(Bytes::from(script), decorators).await?;
        Ok(TransactionPromise::spawn(Arc::clone(&self.ledger), id, self.config.promise))
    }

    /// Builds, signs and sends a transaction with this account as proposer and
    /// payer. Decorators run in the given order; the envelope is signed last.
    pub async fn submit(
        &self,
        script: Bytes,
        decorators: &[TransactionDecorator],
    ) -> Result<Identifier, AgentError> {
        let proposal_key = self.refresh().await?;
        let reference = self
            .ledger
            .latest_reference()
            .await
            .map_err(AgentError::Reference)?;

        let mut tx = Transaction::new(script)
            .with_reference_block(reference)
            .with_gas_limit(self.config.gas_limit)
            .with_proposal_key(proposal_key)
            .with_payer(self.address);
        for decorator in decorators {
            decorator.apply(&mut tx)?;
        }
        tx.sign_envelope(self.address, proposal_key.key_index, &self.key)?;

        let id = self
            .ledger
            .send_transaction(&tx)
            .await
            .map_err(AgentError::Submit)?;
        debug!(
            tx = %id,
            proposer = %self.address,
            sequence = proposal_key.sequence_number,
            "Transaction sent"
        );
        Ok(id)
    }

    async fn refresh(&self) -> Result<ProposalKey, AgentError> {
        let account = self
            .ledger
            .get_account(self.address)
            .await
            .map_err(|source| AgentError::Refresh {
                address: self.address,
                source,
            })?;
        let key = account
            .first_usable_key()
            .ok_or(AgentError::NoKey(self.address))?;
        let proposal_key = ProposalKey {
            address: self.address,
            key_index: key.index,
            sequence_number: key.sequence_number,
        };
        *self.account.lock().unwrap_or_else(PoisonError::into_inner) = account;
        Ok(proposal_key)
    }

    pub const fn address(&self) -> Address {
        self.address
    }

    pub fn key(&self) -> Arc<KeyPair> {
        Arc::clone(&self.key)
    }

    /// Key descriptor suitable for registering this agent's key elsewhere.
    pub fn account_key(&self) -> AccountKey {
        self.key.account_key(KEY_WEIGHT_THRESHOLD)
    }

    /// Last account snapshot fetched from the network.
    pub fn account(&self) -> Account {
        self.account
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{LedgerError, LoadError, PromiseError},
        ledger::HashAlgorithm,
        script::ScriptCache,
        testing::{MockLedger, StaticFetcher},
    };

    const ROOT: &str = "f8d6e0586b0a20c7";

    async fn root(ledger: &Arc<MockLedger>) -> AccountAgent {
        let key = KeyPair::random();
        let address = Address::from_hex(ROOT).unwrap();
        ledger.add_account(address, key.account_key(KEY_WEIGHT_THRESHOLD));
        AccountAgent::connect(ledger.clone(), address, key, AgentConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn back_to_back_submissions_use_fresh_sequence_numbers() {
        let ledger = Arc::new(MockLedger::new());
        let agent = root(&ledger).await;

        for _ in 0..3 {
            agent.submit(Bytes::from_static(b"transaction {}"), &[]).await.unwrap();
        }

        let sequences: Vec<u64> = ledger
            .submitted()
            .iter()
            .map(|tx| tx.proposal_key.sequence_number)
            .collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        assert_eq!(agent.account().first_usable_key().unwrap().sequence_number, 2);
    }

    #[tokio::test]
    async fn decorators_apply_in_order_before_envelope() {
        let ledger = Arc::new(MockLedger::new());
        let agent = root(&ledger).await;
        let token = Address::from_hex("01cf0e2f2f715450").unwrap();
        let token_key = Arc::new(KeyPair::random());

        let decorators = [
            TransactionDecorator::Authorize(token),
            TransactionDecorator::SignPayload {
                address: token,
                key_index: 0,
                key: token_key.clone(),
            },
        ];
        agent
            .submit(Bytes::from_static(b"transaction {}"), &decorators)
            .await
            .unwrap();

        let tx = ledger.submitted().pop().unwrap();
        assert_eq!(tx.authorizers, vec![token]);
        assert_eq!(tx.payload_signatures.len(), 1);
        assert_eq!(tx.payload_signatures[0].address, token);
        assert_eq!(tx.envelope_signatures.len(), 1);
        assert_eq!(tx.envelope_signatures[0].address, agent.address());

        // Signing before the address is an authorizer aborts the submission.
        let reversed = [decorators[1].clone(), decorators[0].clone()];
        let err = agent
            .submit(Bytes::from_static(b"transaction {}"), &reversed)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Sign(SignError::Signature { role: "payload", .. })));
        assert_eq!(ledger.submitted().len(), 1);
    }

    #[tokio::test]
    async fn each_stage_reports_its_own_error() {
        let ledger = Arc::new(MockLedger::new());
        let agent = root(&ledger).await;
        let script = Bytes::from_static(b"transaction {}");

        ledger.fail_reference(true);
        let err = agent.submit(script.clone(), &[]).await.unwrap_err();
        assert_eq!(err.kind(), "reference");
        ledger.fail_reference(false);

        ledger.fail_submit(true);
        let err = agent.submit(script.clone(), &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::Submit(LedgerError::Http { status: 400, .. })));
        ledger.fail_submit(false);

        ledger.remove_account(agent.address());
        let err = agent.submit(script, &[]).await.unwrap_err();
        assert_eq!(err.kind(), "refresh");
        assert!(ledger.submitted().is_empty());
    }

    #[tokio::test]
    async fn run_code_surfaces_load_errors() {
        let ledger = Arc::new(MockLedger::new());
        let agent = root(&ledger).await;
        let cache = Arc::new(ScriptCache::new(Arc::new(StaticFetcher::new())));
        let loader = ScriptLoader::remote("https://scripts.test/missing.cdc", cache);

        let err = agent.run_code(&loader, &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::Load(LoadError::Status { status: 404, .. })));
        assert!(ledger.submitted().is_empty());
    }

    #[tokio::test]
    async fn create_connects_to_new_account() {
        let ledger = Arc::new(MockLedger::new());
        let root = root(&ledger).await;

        let user = AccountAgent::create(&root).await.unwrap();
        assert_ne!(user.address(), root.address());
        assert!(ledger.get_account_snapshot(user.address()).is_some());

        let creation = ledger.submitted().pop().unwrap();
        assert_eq!(creation.authorizers, vec![root.address()]);
        assert!(std::str::from_utf8(&creation.script).unwrap().contains("addPublicKey"));
    }

    #[tokio::test]
    async fn create_without_creation_event_fails() {
        let ledger = Arc::new(MockLedger::new());
        let root = root(&ledger).await;
        ledger.suppress_creation_events(true);

        let err = AccountAgent::create(&root).await.unwrap_err();
        assert!(matches!(err, AgentError::Promise(PromiseError::NoCreationEvent { .. })));
    }

    #[tokio::test]
    async fn connect_adopts_key_hash_algorithm_and_rejects_p256() {
        let ledger = Arc::new(MockLedger::new());
        let key = KeyPair::random();

        let sha2 = Address::from_hex("02").unwrap();
        let mut account_key = key.account_key(KEY_WEIGHT_THRESHOLD);
        account_key.hash_algo = HashAlgorithm::Sha2_256;
        ledger.add_account(sha2, account_key.clone());
        let agent = AccountAgent::connect(ledger.clone(), sha2, key.clone(), AgentConfig::default())
            .await
            .unwrap();
        assert_eq!(agent.key().hash_algorithm(), HashAlgorithm::Sha2_256);

        let p256 = Address::from_hex("03").unwrap();
        account_key.sign_algo = SignatureAlgorithm::EcdsaP256;
        ledger.add_account(p256, account_key);
        let err = AccountAgent::connect(ledger.clone(), p256, key, AgentConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Sign(SignError::UnsupportedAlgorithm(_))));
    }
}
