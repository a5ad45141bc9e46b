//! Chain deployment orchestration.
//!
//! Contracts are deployed in dependency order: facets first, then the diamond
//! init contract, then the proxy whose constructor consumes the initial cut,
//! then the bridges. Every deployed address is recorded in the persistent
//! address store the moment it is known, so an interrupted run leaves a full
//! trace of what it managed to deploy.

use std::{collections::HashMap, sync::Arc};

use anyhow::Context as _;
use tokio::sync::watch;
use zkchain_eth_client::ExecutedTxStatus;
use zkchain_governance::{plan_additions, DiamondCutData, FacetDescriptor};
use zkchain_types::{
    ethabi::{self, Token},
    web3::{contract::Options, types::BlockNumber},
    Address,
};

use crate::{
    polling::{wait_for_tx_status, Clock, SystemClock},
    DeployContext,
};

/// Source of a single facet: its EVM init code and the JSON ABI its selectors
/// are derived from.
#[derive(Debug, Clone)]
pub struct FacetSource {
    pub name: String,
    pub init_code: Vec<u8>,
    pub raw_abi: String,
    pub is_freezable: bool,
}

/// Source of a plain contract deployed alongside the diamond.
#[derive(Debug, Clone)]
pub struct ContractSource {
    pub name: String,
    pub init_code: Vec<u8>,
}

/// Everything needed to bring up a chain from scratch.
#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    pub facets: Vec<FacetSource>,
    pub diamond_init_code: Vec<u8>,
    /// Calldata of the one-off initializing delegate call performed by the
    /// proxy constructor.
    pub init_calldata: Vec<u8>,
    pub diamond_proxy_code: Vec<u8>,
    pub bridges: Vec<ContractSource>,
}

/// Addresses of a freshly deployed chain.
#[derive(Debug, Clone)]
pub struct DeployedChain {
    pub facets: Vec<FacetDescriptor>,
    pub diamond_init: Address,
    pub diamond_proxy: Address,
    pub bridges: Vec<(String, Address)>,
}

/// Drives contract deployments and governance calls against a single L1.
///
/// The orchestrator keeps a local nonce counter per account, seeded from the
/// pending chain nonce on first use. This lets it sign a batch of transactions
/// without waiting for the previous ones to be mined, and keeps the nonces
/// stable when the node's pending view lags behind.
#[derive(Debug)]
pub struct DeploymentOrchestrator {
    context: DeployContext,
    nonces: HashMap<Address, u64>,
    clock: Arc<dyn Clock>,
}

impl DeploymentOrchestrator {
    pub fn new(context: DeployContext) -> Self {
        Self {
            context,
            nonces: HashMap::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used between polling attempts.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn context(&self) -> &DeployContext {
        &self.context
    }

    pub fn into_context(self) -> DeployContext {
        self.context
    }

    /// Reserves `count` consecutive nonces for `account` and returns the first
    /// of them.
    pub async fn reserve_nonces(&mut self, account: Address, count: u64) -> anyhow::Result<u64> {
        anyhow::ensure!(count > 0, "cannot reserve an empty nonce range");
        let first = match self.nonces.get(&account).copied() {
            Some(next) => next,
            None => {
                let nonce = self
                    .context
                    .query_client()
                    .nonce_at_for_account(account, BlockNumber::Pending)
                    .await
                    .context("failed fetching the pending nonce")?;
                nonce.as_u64()
            }
        };
        self.nonces.insert(account, first + count);
        Ok(first)
    }

    /// Deploys a contract and records its address under `name`.
    ///
    /// Recording an already recorded name fails; a re-run over a used address
    /// store must be explicit about which addresses it overwrites rather than
    /// silently skipping steps.
    pub async fn deploy_contract(
        &mut self,
        name: &str,
        init_code: Vec<u8>,
        stop_receiver: &mut watch::Receiver<bool>,
    ) -> anyhow::Result<Address> {
        let sender = self.context.client().sender_account();
        let nonce = self.reserve_nonces(sender, 1).await?;
        let options = Options {
            nonce: Some(nonce.into()),
            ..Options::default()
        };
        let signed = self
            .context
            .client()
            .sign_prepared_deploy_tx(init_code, options)
            .await
            .with_context(|| format!("failed signing deployment of `{name}`"))?;
        let tx_hash = self
            .context
            .query_client()
            .send_raw_tx(signed.raw_tx)
            .await
            .with_context(|| format!("failed sending deployment of `{name}`"))?;

        let policy = self.context.retry_policy();
        let status = wait_for_tx_status(
            self.context.query_client(),
            tx_hash,
            &policy,
            self.clock.as_ref(),
            stop_receiver,
        )
        .await
        .with_context(|| format!("deployment of `{name}` was not executed"))?;
        anyhow::ensure!(
            status.success,
            "deployment of `{name}` reverted in tx {tx_hash:?}"
        );
        let address = status
            .receipt
            .contract_address
            .with_context(|| format!("receipt for `{name}` misses the contract address"))?;

        self.context.addresses_mut().record(name, address)?;
        tracing::info!("Deployed `{name}` at {address:?} (tx {tx_hash:?})");
        Ok(address)
    }

    /// Deploys each facet and derives its registry descriptor from its ABI.
    pub async fn deploy_facets(
        &mut self,
        facets: &[FacetSource],
        stop_receiver: &mut watch::Receiver<bool>,
    ) -> anyhow::Result<Vec<FacetDescriptor>> {
        let mut descriptors = Vec::with_capacity(facets.len());
        for facet in facets {
            let record_name = format!("Facets.{}", facet.name);
            let address = self
                .deploy_contract(&record_name, facet.init_code.clone(), stop_receiver)
                .await?;
            descriptors.push(FacetDescriptor::from_abi(
                facet.name.clone(),
                address,
                &facet.raw_abi,
                facet.is_freezable,
            ));
        }
        Ok(descriptors)
    }

    /// Deploys the diamond proxy with the initial cut applied by its
    /// constructor.
    pub async fn deploy_diamond_proxy(
        &mut self,
        mut init_code: Vec<u8>,
        cut: &DiamondCutData,
        stop_receiver: &mut watch::Receiver<bool>,
    ) -> anyhow::Result<Address> {
        cut.validate().context("malformed initial diamond cut")?;
        let chain_id = self.context.config().l2_chain_id;
        let constructor_input = ethabi::encode(&[Token::Uint(chain_id.0.into()), cut.encode()]);
        init_code.extend_from_slice(&constructor_input);
        self.deploy_contract("DiamondProxy", init_code, stop_receiver)
            .await
    }

    /// Deploys the whole chain described by `plan`.
    ///
    /// Later steps consume the addresses of earlier ones: the initial cut
    /// points at the deployed facets, and the proxy constructor consumes the
    /// cut, so the order is fixed.
    pub async fn run(
        &mut self,
        plan: DeploymentPlan,
        stop_receiver: &mut watch::Receiver<bool>,
    ) -> anyhow::Result<DeployedChain> {
        let facets = self.deploy_facets(&plan.facets, stop_receiver).await?;
        let diamond_init = self
            .deploy_contract("DiamondInit", plan.diamond_init_code, stop_receiver)
            .await?;

        let facet_cuts = plan_additions(&facets)?;
        let cut = DiamondCutData {
            facet_cuts,
            init_address: diamond_init,
            init_calldata: plan.init_calldata,
        };
        let diamond_proxy = self
            .deploy_diamond_proxy(plan.diamond_proxy_code, &cut, stop_receiver)
            .await?;

        let mut bridges = Vec::with_capacity(plan.bridges.len());
        for bridge in plan.bridges {
            let record_name = format!("Bridges.{}", bridge.name);
            let address = self
                .deploy_contract(&record_name, bridge.init_code, stop_receiver)
                .await?;
            bridges.push((bridge.name, address));
        }

        Ok(DeployedChain {
            facets,
            diamond_init,
            diamond_proxy,
            bridges,
        })
    }

    /// Signs and submits a call to the contract the client is bound to, then
    /// waits for its execution.
    pub async fn submit_governance_call(
        &mut self,
        calldata: Vec<u8>,
        stop_receiver: &mut watch::Receiver<bool>,
    ) -> anyhow::Result<ExecutedTxStatus> {
        let sender = self.context.client().sender_account();
        let nonce = self.reserve_nonces(sender, 1).await?;
        let options = Options {
            nonce: Some(nonce.into()),
            ..Options::default()
        };
        let signed = self
            .context
            .client()
            .sign_prepared_tx(calldata, options)
            .await
            .context("failed signing the governance call")?;
        let tx_hash = self
            .context
            .query_client()
            .send_raw_tx(signed.raw_tx)
            .await
            .context("failed sending the governance call")?;

        let policy = self.context.retry_policy();
        let status = wait_for_tx_status(
            self.context.query_client(),
            tx_hash,
            &policy,
            self.clock.as_ref(),
            stop_receiver,
        )
        .await
        .context("the governance call was not executed")?;
        anyhow::ensure!(status.success, "governance call reverted in tx {tx_hash:?}");
        tracing::info!(
            "Executed governance call in tx {tx_hash:?} (block {:?})",
            status.receipt.block_number
        );
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use assert_matches::assert_matches;
    use zkchain_config::DeployedAddresses;
    use zkchain_contracts::diamond_cut_facet_contract;
    use zkchain_eth_client::{clients::MockChain, BoundEthInterface};
    use zkchain_types::address::deployed_address_evm_create;

    use super::*;
    use crate::{
        testonly::{mock_config, mock_plan, ExecutingClock},
        PollError,
    };

    fn test_orchestrator(client: &MockChain, store_path: &Path) -> DeploymentOrchestrator {
        let context = DeployContext::new(
            Box::new(client.clone()),
            mock_config(),
            DeployedAddresses::new(store_path),
        );
        DeploymentOrchestrator::new(context).with_clock(Arc::new(ExecutingClock(client.clone())))
    }

    #[tokio::test]
    async fn deploying_a_full_chain() {
        let client = MockChain::default();
        let store = tempfile::NamedTempFile::new().unwrap();
        let mut orchestrator = test_orchestrator(&client, store.path());
        let (_stop_sender, mut stop_receiver) = watch::channel(false);

        let chain = orchestrator
            .run(mock_plan(), &mut stop_receiver)
            .await
            .unwrap();

        let sender = client.sender_account();
        assert_eq!(chain.facets.len(), 2);
        assert_eq!(
            chain.facets[0].address,
            deployed_address_evm_create(sender, 0.into())
        );
        assert_eq!(
            chain.facets[1].address,
            deployed_address_evm_create(sender, 1.into())
        );
        assert_eq!(
            chain.diamond_init,
            deployed_address_evm_create(sender, 2.into())
        );
        assert_eq!(
            chain.diamond_proxy,
            deployed_address_evm_create(sender, 3.into())
        );
        assert_eq!(chain.bridges.len(), 1);
        assert_eq!(chain.bridges[0].0, "SharedBridge");
        assert_eq!(
            chain.bridges[0].1,
            deployed_address_evm_create(sender, 4.into())
        );
        assert!(!chain.facets[0].selectors.is_empty());
        assert!(!chain.facets[1].selectors.is_empty());

        let addresses = orchestrator.context().addresses();
        assert_eq!(
            addresses.get("Facets.GettersFacet"),
            Some(chain.facets[0].address)
        );
        assert_eq!(
            addresses.get("Facets.MailboxFacet"),
            Some(chain.facets[1].address)
        );
        assert_eq!(addresses.get("DiamondProxy"), Some(chain.diamond_proxy));
        assert_eq!(
            addresses.get("Bridges.SharedBridge"),
            Some(chain.bridges[0].1)
        );

        // The store is persisted on every record, not at the end of the run.
        let reloaded = DeployedAddresses::load(store.path()).unwrap();
        assert_eq!(reloaded.get("DiamondInit"), Some(chain.diamond_init));
    }

    #[tokio::test]
    async fn repeated_runs_are_not_silently_skipped() {
        let client = MockChain::default();
        let store = tempfile::NamedTempFile::new().unwrap();
        let mut orchestrator = test_orchestrator(&client, store.path());
        let (_stop_sender, mut stop_receiver) = watch::channel(false);
        orchestrator
            .run(mock_plan(), &mut stop_receiver)
            .await
            .unwrap();

        let context = DeployContext::new(
            Box::new(client.clone()),
            mock_config(),
            DeployedAddresses::load(store.path()).unwrap(),
        );
        let mut orchestrator = DeploymentOrchestrator::new(context)
            .with_clock(Arc::new(ExecutingClock(client.clone())));
        let err = orchestrator
            .run(mock_plan(), &mut stop_receiver)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already recorded"), "{err:#}");
    }

    #[tokio::test]
    async fn reserving_nonce_ranges() {
        let client = MockChain::default().with_non_ordering_confirmation(true);
        let store = tempfile::NamedTempFile::new().unwrap();
        let mut orchestrator = test_orchestrator(&client, store.path());
        let (_stop_sender, mut stop_receiver) = watch::channel(false);

        let sender = client.sender_account();
        assert_eq!(orchestrator.reserve_nonces(sender, 3).await.unwrap(), 0);
        assert_eq!(orchestrator.reserve_nonces(sender, 1).await.unwrap(), 3);
        let err = orchestrator.reserve_nonces(sender, 0).await.unwrap_err();
        assert!(err.to_string().contains("empty nonce range"), "{err:#}");

        // Deployments draw nonces from the same counter.
        let address = orchestrator
            .deploy_contract("Timelock", vec![0xfe], &mut stop_receiver)
            .await
            .unwrap();
        assert_eq!(address, deployed_address_evm_create(sender, 4.into()));
    }

    #[tokio::test]
    async fn stopping_a_deployment() {
        let client = MockChain::default();
        let store = tempfile::NamedTempFile::new().unwrap();
        let mut orchestrator = test_orchestrator(&client, store.path());
        let (stop_sender, mut stop_receiver) = watch::channel(false);
        stop_sender.send(true).unwrap();

        let err = orchestrator
            .run(mock_plan(), &mut stop_receiver)
            .await
            .unwrap_err();
        assert_matches!(err.downcast_ref::<PollError>(), Some(PollError::Stopped));
        // The interrupted deployment is not recorded.
        assert_eq!(orchestrator.context().addresses().iter().count(), 0);
    }

    #[tokio::test]
    async fn submitting_a_governance_call() {
        let proxy_addr = Address::repeat_byte(0x23);
        let client = MockChain::default().with_contract(diamond_cut_facet_contract(), proxy_addr);
        let store = tempfile::NamedTempFile::new().unwrap();
        let mut orchestrator = test_orchestrator(&client, store.path());
        let (_stop_sender, mut stop_receiver) = watch::channel(false);

        let calldata = orchestrator.context().client().encode_tx_data("freezeDiamond", ());
        let status = orchestrator
            .submit_governance_call(calldata, &mut stop_receiver)
            .await
            .unwrap();
        assert!(status.success);
        assert_eq!(client.sent_tx_count(), 1);
    }
}
