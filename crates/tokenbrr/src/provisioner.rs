//! Setup phase: contract deployment and user account provisioning.
//!
//! Every step waits for its transaction to seal before the next one starts,
//! and any failure aborts the run.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::{
    agent::{AccountAgent, TransactionDecorator},
    config::{Amounts, Placeholders, ScriptUrls, TestConfig},
    error::AgentError,
    generator::{SharedAgent, TransferPlan},
    ledger::Address,
    script::{ScriptCache, ScriptLoader, ScriptSource, Transform},
};

/// Addresses of the deployed contracts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Deployment {
    pub(crate) fungible_token: Address,
    pub(crate) token: Address,
}

/// Deploys the token contracts and provisions funded user accounts through the
/// root agent
pub(crate) struct Provisioner {
    root: SharedAgent,
    cache: Arc<ScriptCache>,
    scripts: ScriptUrls,
    placeholders: Placeholders,
    amounts: Amounts,
}

impl Provisioner {
    pub(crate) fn new(root: SharedAgent, cache: Arc<ScriptCache>, config: &TestConfig) -> Self {
        Self {
            root,
            cache,
            scripts: config.scripts.clone(),
            placeholders: config.placeholders.clone(),
            amounts: config.amounts,
        }
    }

    /// Deploys the fungible token interface, then the token contract on an
    /// account controlled by the root key.
    pub(crate) async fn deploy(&self) -> Result<Deployment> {
        let interface = self
            .remote(&self.scripts.fungible_token_contract)
            .with(Transform::DeployContract { keys: vec![] });
        let fungible_token = self
            .deploy_contract(&interface)
            .await
            .context("could not deploy fungible token contract")?;
        info!(address = %fungible_token, "Fungible token contract deployed");

        let token = self
            .remote(&self.scripts.token_contract)
            .with(Transform::replace_import(
                &self.placeholders.fungible_token,
                fungible_token,
            ))
            .with(Transform::replace_amount(
                &self.placeholders.allowed_amount,
                self.amounts.allowed,
            ))
            .with(Transform::DeployContract {
                keys: vec![self.root.account_key()],
            });
        let token = self
            .deploy_contract(&token)
            .await
            .context("could not deploy token contract")?;
        info!(address = %token, "Token contract deployed");

        Ok(Deployment {
            fungible_token,
            token,
        })
    }

    /// Creates `count` user accounts, each set up to hold the token and funded
    /// with the mint amount.
    pub(crate) async fn provision(
        &self,
        deployment: &Deployment,
        count: u32,
    ) -> Result<Vec<SharedAgent>> {
        info!(count, "Provisioning user accounts");
        let mut users = Vec::with_capacity(count as usize);
        for index in 0..count {
            let user = self
                .provision_user(deployment)
                .await
                .with_context(|| format!("could not provision user {index}"))?;
            users.push(Arc::new(user));
        }
        Ok(users)
    }

    /// Script plan for steady-state transfers between provisioned users.
    pub(crate) fn transfer_plan(&self, deployment: &Deployment) -> TransferPlan {
        TransferPlan {
            source: ScriptSource::Remote {
                url: self.scripts.transfer_tokens.clone(),
                cache: Arc::clone(&self.cache),
            },
            imports: self.imports(deployment),
            recipient_placeholder: self.placeholders.transfer_recipient.clone(),
            amount_placeholder: self.placeholders.transfer_amount.clone(),
            amount: self.amounts.transfer,
        }
    }

    async fn provision_user(&self, deployment: &Deployment) -> Result<AccountAgent> {
        let user = AccountAgent::create(&self.root)
            .await
            .context("could not create random user")?;
        let address = user.address();
        info!(address = %address, "User generated");

        let setup = self
            .remote(&self.scripts.setup_account)
            .then(self.imports(deployment));
        user.run_code(&setup, &[TransactionDecorator::Authorize(address)])
            .await
            .context("could not submit setup account transaction")?
            .wait()
            .await
            .context("could not set up account")?;
        info!(address = %address, "Account set up");

        let mint = self
            .remote(&self.scripts.mint_tokens)
            .then(self.imports(deployment))
            .with(Transform::replace_recipient(
                &self.placeholders.mint_recipient,
                address,
            ))
            .with(Transform::replace_amount(
                &self.placeholders.mint_amount,
                self.amounts.mint,
            ));
        let decorators = [
            TransactionDecorator::Authorize(deployment.token),
            TransactionDecorator::SignPayload {
                address: deployment.token,
                key_index: 0,
                key: self.root.key(),
            },
        ];
        user.run_code(&mint, &decorators)
            .await
            .context("could not submit mint tokens transaction")?
            .wait()
            .await
            .context("could not mint tokens")?;
        info!(address = %address, amount = self.amounts.mint, "Tokens minted");

        Ok(user)
    }

    async fn deploy_contract(&self, loader: &ScriptLoader) -> Result<Address, AgentError> {
        let promise = self
            .root
            .run_code(loader, &[TransactionDecorator::Authorize(self.root.address())])
            .await?;
        Ok(promise.created_address().await?)
    }

    fn remote(&self, url: &str) -> ScriptLoader {
        ScriptLoader::remote(url, Arc::clone(&self.cache))
    }

    fn imports(&self, deployment: &Deployment) -> Vec<Transform> {
        vec![
            Transform::replace_import(
                &self.placeholders.fungible_token,
                deployment.fungible_token,
            ),
            Transform::replace_import(&self.placeholders.token, deployment.token),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        agent::AgentConfig,
        keys::KeyPair,
        ledger::KEY_WEIGHT_THRESHOLD,
        promise::PromiseConfig,
        testing::{MockLedger, StaticFetcher},
    };

    fn fetcher(scripts: &ScriptUrls) -> StaticFetcher {
        StaticFetcher::new()
            .with_script(
                &scripts.fungible_token_contract,
                "pub contract interface FungibleToken {}",
            )
            .with_script(
                &scripts.token_contract,
                "import FungibleToken from 0x02\npub contract FlowToken { let allowed = 100.0 }",
            )
            .with_script(
                &scripts.setup_account,
                "import FungibleToken from 0x02\nimport FlowToken from 0x03\ntransaction {}",
            )
            .with_script(
                &scripts.mint_tokens,
                "import FungibleToken from 0x02\nimport FlowToken from 0x03\n\
                 transaction { execute { getAccount(0x03).mint(10.0) } }",
            )
            .with_script(
                &scripts.transfer_tokens,
                "import FungibleToken from 0x02\nimport FlowToken from 0x03\n\
                 transaction { execute { getAccount(0x04).deposit(10.0) } }",
            )
    }

    async fn provisioner(ledger: &Arc<MockLedger>) -> Provisioner {
        let config = TestConfig::default();
        let key = KeyPair::random();
        let address = Address::from_hex("f8d6e0586b0a20c7").unwrap();
        ledger.add_account(address, key.account_key(KEY_WEIGHT_THRESHOLD));
        let agent_config = AgentConfig {
            promise: PromiseConfig {
                poll_interval: std::time::Duration::from_millis(5),
                ..PromiseConfig::default()
            },
            ..AgentConfig::default()
        };
        let root = AccountAgent::connect(ledger.clone(), address, key, agent_config)
            .await
            .unwrap();
        let cache = Arc::new(ScriptCache::new(Arc::new(fetcher(&config.scripts))));
        Provisioner::new(Arc::new(root), cache, &config)
    }

    fn script(ledger: &MockLedger, index: usize) -> String {
        let submitted = ledger.submitted();
        String::from_utf8(submitted[index].script.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn deploys_and_provisions_users() {
        let ledger = Arc::new(MockLedger::new());
        let provisioner = provisioner(&ledger).await;

        let deployment = provisioner.deploy().await.unwrap();
        assert_ne!(deployment.fungible_token, deployment.token);

        let users = provisioner.provision(&deployment, 2).await.unwrap();
        assert_eq!(users.len(), 2);

        // 2 deployments, then create + setup + mint per user
        assert_eq!(ledger.submitted().len(), 8);

        let token_deploy = script(&ledger, 1);
        assert!(token_deploy.contains("addPublicKey"));
        assert!(token_deploy.contains(&alloy_primitives::hex::encode("184467440737.0")));

        let mint_tx = ledger.submitted()[4].clone();
        assert_eq!(mint_tx.proposal_key.address, users[0].address());
        assert_eq!(mint_tx.authorizers, vec![deployment.token]);
        assert_eq!(mint_tx.payload_signatures.len(), 1);

        let mint = script(&ledger, 4);
        assert!(mint.contains(&format!("import FlowToken from {}", deployment.token)));
        assert!(mint.contains(&format!("getAccount({})", users[0].address())));
        assert!(mint.contains("mint(1000000.0)"));
    }

    #[tokio::test]
    async fn setup_failure_is_fatal() {
        let ledger = Arc::new(MockLedger::new());
        let provisioner = provisioner(&ledger).await;
        let deployment = provisioner.deploy().await.unwrap();

        ledger.fail_scripts_containing("transaction {}", "resource already exists");
        let err = provisioner.provision(&deployment, 3).await.unwrap_err();
        let chain = format!("{err:#}");
        assert!(chain.contains("could not provision user 0"));
        assert!(chain.contains("could not set up account"));
        assert!(chain.contains("resource already exists"));
    }

    #[tokio::test]
    async fn transfer_plan_targets_receiver() {
        let ledger = Arc::new(MockLedger::new());
        let provisioner = provisioner(&ledger).await;
        let deployment = provisioner.deploy().await.unwrap();
        let receiver = Address::from_hex("0a").unwrap();

        let script = provisioner
            .transfer_plan(&deployment)
            .loader(receiver)
            .load()
            .await
            .unwrap();
        let script = std::str::from_utf8(&script).unwrap();
        let import = format!("import FungibleToken from {}", deployment.fungible_token);
        assert!(script.contains(&import));
        assert!(script.contains("getAccount(0x000000000000000a).deposit(1.0)"));
    }
}
