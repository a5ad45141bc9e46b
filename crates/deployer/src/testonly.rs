//! Shared test helpers.

use std::time::Duration;

use async_trait::async_trait;
use zkchain_config::{DeployConfig, WalletBuilder};
use zkchain_contracts::{GETTERS_FACET_ABI, MAILBOX_FACET_ABI};
use zkchain_eth_client::clients::MockChain;
use zkchain_types::{L1ChainId, L2ChainId, H256};

use crate::{
    orchestrator::{ContractSource, DeploymentPlan, FacetSource},
    polling::Clock,
};

/// Clock that executes all pending mock transactions instead of sleeping, so
/// polling loops driven by it converge on the next attempt.
#[derive(Debug)]
pub(crate) struct ExecutingClock(pub(crate) MockChain);

#[async_trait]
impl Clock for ExecutingClock {
    async fn sleep(&self, _duration: Duration) {
        for tx_hash in self.0.pending_tx_hashes() {
            self.0.execute_tx(tx_hash, true, 1);
        }
    }
}

/// Minimal two-facet deployment plan over the embedded facet ABIs.
pub(crate) fn mock_plan() -> DeploymentPlan {
    DeploymentPlan {
        facets: vec![
            FacetSource {
                name: "GettersFacet".to_owned(),
                init_code: vec![0x60, 0x0a],
                raw_abi: GETTERS_FACET_ABI.to_owned(),
                is_freezable: false,
            },
            FacetSource {
                name: "MailboxFacet".to_owned(),
                init_code: vec![0x60, 0x0b],
                raw_abi: MAILBOX_FACET_ABI.to_owned(),
                is_freezable: true,
            },
        ],
        diamond_init_code: vec![0x60, 0x0c],
        init_calldata: vec![0xab, 0xcd],
        diamond_proxy_code: vec![0x60, 0x0d],
        bridges: vec![ContractSource {
            name: "SharedBridge".to_owned(),
            init_code: vec![0x60, 0x0e],
        }],
    }
}

/// Config with throwaway in-memory wallets, suitable for mock-backed tests.
pub(crate) fn mock_config() -> DeployConfig {
    DeployConfig {
        l1_chain_id: L1ChainId(9),
        l2_chain_id: L2ChainId(270),
        deployer: WalletBuilder::new().private_key(H256::repeat_byte(1)).build().unwrap(),
        governor: WalletBuilder::new().private_key(H256::repeat_byte(2)).build().unwrap(),
        diamond_proxy_addr: None,
        create2_salt: H256::zero(),
        poll_interval_ms: 10,
        max_poll_attempts: 10,
    }
}
