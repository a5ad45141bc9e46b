//! Deployment toolkit for diamond proxy chains.
//!
//! The crate drives the L1 side of bringing up and upgrading a chain: it deploys
//! the facets, the diamond proxy and the bridge contracts in dependency order,
//! submits governance calls, prepares L1 -> L2 priority transactions and polls
//! either layer for their inclusion.

use zkchain_config::{DeployConfig, DeployedAddresses};
use zkchain_eth_client::{BoundEthInterface, EthInterface};

pub use self::{
    orchestrator::{
        ContractSource, DeployedChain, DeploymentOrchestrator, DeploymentPlan, FacetSource,
    },
    polling::{wait_for_tx_status, Clock, PollError, RetryPolicy, SystemClock},
    priority::{
        priority_op_from_receipt, L2ContractDeployment, PriorityOpRequest,
        PriorityTransactionBuilder,
    },
};

pub mod orchestrator;
pub mod polling;
pub mod priority;
#[cfg(test)]
mod testonly;

/// Everything a deployment run carries around: the L1 client bound to the deployer
/// account, the validated configuration and the persistent address store.
///
/// The context is built once from a validated [`DeployConfig`]; the rest of the
/// toolkit takes it by reference and never re-validates the config.
#[derive(Debug)]
pub struct DeployContext {
    client: Box<dyn BoundEthInterface>,
    config: DeployConfig,
    addresses: DeployedAddresses,
}

impl DeployContext {
    pub fn new(
        client: Box<dyn BoundEthInterface>,
        config: DeployConfig,
        addresses: DeployedAddresses,
    ) -> Self {
        Self {
            client,
            config,
            addresses,
        }
    }

    /// Client bound to the deployer account.
    pub fn client(&self) -> &dyn BoundEthInterface {
        self.client.as_ref()
    }

    /// Unbound querying view of the same client.
    pub fn query_client(&self) -> &dyn EthInterface {
        (*self.client).as_ref()
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    pub fn addresses(&self) -> &DeployedAddresses {
        &self.addresses
    }

    pub fn addresses_mut(&mut self) -> &mut DeployedAddresses {
        &mut self.addresses
    }

    /// Polling policy derived from the config.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            interval: self.config.poll_interval(),
            max_attempts: self.config.max_poll_attempts,
        }
    }
}
