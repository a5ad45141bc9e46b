//! L1 -> L2 priority transactions: base cost queries, CREATE2 deployment
//! requests and refund recipient aliasing.

use anyhow::Context as _;
use zkchain_contracts::{
    l2_deployer_contract, mailbox_facet_contract, L2_DEPLOYER_SYSTEM_CONTRACT_ADDR,
};
use zkchain_eth_client::{CallFunctionArgs, Error as ClientError, EthInterface};
use zkchain_governance::upgrade_tx::{
    PRIORITY_TX_MAX_GAS_LIMIT, REQUIRED_L2_GAS_PRICE_PER_PUBDATA,
};
use zkchain_types::{
    abi::NewPriorityRequest,
    address::{apply_l1_to_l2_alias, deployed_address_create2},
    bytecode::hash_bytecode,
    ethabi::Token,
    web3::types::BlockNumber,
    Address, TransactionReceipt, H256, U256,
};

/// Builder of L1 -> L2 priority transactions targeting a single diamond proxy.
///
/// Priority transactions enter the chain through the mailbox facet; this type
/// prepares the `requestL2Transaction` calls and the values they must carry.
#[derive(Debug, Clone, Copy)]
pub struct PriorityTransactionBuilder<'a> {
    client: &'a dyn EthInterface,
    diamond_proxy: Address,
}

impl<'a> PriorityTransactionBuilder<'a> {
    pub fn new(client: &'a dyn EthInterface, diamond_proxy: Address) -> Self {
        Self {
            client,
            diamond_proxy,
        }
    }

    /// Queries the mailbox for the base cost in wei of a priority transaction
    /// with the given L2 gas parameters at the given L1 gas price.
    pub async fn base_cost(
        &self,
        gas_price: U256,
        l2_gas_limit: U256,
        gas_per_pubdata: U256,
    ) -> Result<U256, ClientError> {
        CallFunctionArgs::new(
            "l2TransactionBaseCost",
            (gas_price, l2_gas_limit, gas_per_pubdata),
        )
        .for_contract(self.diamond_proxy, &mailbox_facet_contract())
        .call(self.client)
        .await
    }

    /// Prepares an L2 contract deployment executed via the shared deployer
    /// system contract, pre-computing the address the contract will occupy.
    ///
    /// `sender` is the L2-side sender of the priority transaction: address
    /// derivation commits to it, so deploying the same bytecode and salt from
    /// a different account lands on a different address.
    pub async fn build_deployment_tx(
        &self,
        sender: Address,
        bytecode: Vec<u8>,
        constructor_input: Vec<u8>,
        salt: H256,
        l2_gas_limit: U256,
    ) -> anyhow::Result<L2ContractDeployment> {
        anyhow::ensure!(
            l2_gas_limit <= PRIORITY_TX_MAX_GAS_LIMIT.into(),
            "L2 gas limit {l2_gas_limit} exceeds the cap {PRIORITY_TX_MAX_GAS_LIMIT}"
        );
        let bytecode_hash = hash_bytecode(&bytecode).context("invalid deployment bytecode")?;
        let deployed_address =
            deployed_address_create2(sender, bytecode_hash, salt, &constructor_input);

        let calldata = l2_deployer_contract()
            .function("create2")
            .expect("failed to get function parameters")
            .encode_input(&[
                Token::FixedBytes(salt.as_bytes().to_vec()),
                Token::FixedBytes(bytecode_hash.as_bytes().to_vec()),
                Token::Bytes(constructor_input),
            ])
            .expect("failed to encode parameters");
        let refund_recipient = self.refund_recipient_for(sender).await?;

        Ok(L2ContractDeployment {
            address: deployed_address,
            request: PriorityOpRequest {
                contract_l2: L2_DEPLOYER_SYSTEM_CONTRACT_ADDR,
                l2_value: U256::zero(),
                calldata,
                l2_gas_limit,
                gas_per_pubdata_limit: REQUIRED_L2_GAS_PRICE_PER_PUBDATA.into(),
                factory_deps: vec![bytecode],
                refund_recipient,
            },
        })
    }

    /// Resolves the refund recipient for a priority transaction initiated by
    /// `candidate`.
    ///
    /// A contract address is aliased, an EOA is kept as is. Without the alias,
    /// refunds for a contract-initiated transaction would be credited to the L2
    /// account with the same address, which nobody controls.
    pub async fn refund_recipient_for(&self, candidate: Address) -> Result<Address, ClientError> {
        let code = self.client.code_at(candidate, BlockNumber::Latest).await?;
        Ok(if code.0.is_empty() {
            candidate
        } else {
            apply_l1_to_l2_alias(candidate)
        })
    }
}

/// Planned L2 contract deployment: the address the contract will occupy and the
/// priority operation that deploys it.
#[derive(Debug, Clone, PartialEq)]
pub struct L2ContractDeployment {
    pub address: Address,
    pub request: PriorityOpRequest,
}

/// Parameters of a `requestL2Transaction` call to the mailbox facet.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorityOpRequest {
    pub contract_l2: Address,
    pub l2_value: U256,
    pub calldata: Vec<u8>,
    pub l2_gas_limit: U256,
    pub gas_per_pubdata_limit: U256,
    pub factory_deps: Vec<Vec<u8>>,
    pub refund_recipient: Address,
}

impl PriorityOpRequest {
    /// Encodes the `requestL2Transaction` calldata submitting this operation.
    pub fn request_l2_transaction_calldata(&self) -> Vec<u8> {
        let factory_deps = self
            .factory_deps
            .iter()
            .map(|dep| Token::Bytes(dep.clone()))
            .collect();
        mailbox_facet_contract()
            .function("requestL2Transaction")
            .expect("failed to get function parameters")
            .encode_input(&[
                Token::Address(self.contract_l2),
                Token::Uint(self.l2_value),
                Token::Bytes(self.calldata.clone()),
                Token::Uint(self.l2_gas_limit),
                Token::Uint(self.gas_per_pubdata_limit),
                Token::Array(factory_deps),
                Token::Address(self.refund_recipient),
            ])
            .expect("failed to encode parameters")
    }

    /// ETH value the L1 transaction must carry: the base cost of the priority
    /// transaction plus the value it passes on to the L2 recipient.
    pub fn required_value(&self, base_cost: U256) -> U256 {
        base_cost + self.l2_value
    }
}

/// Extracts the `NewPriorityRequest` acknowledged by the mailbox from an L1
/// receipt.
///
/// Returns `None` if the receipt carries no such event, e.g. when the
/// transaction reverted. The canonical hash in the returned request is the key
/// for polling the transaction on the destination chain.
pub fn priority_op_from_receipt(
    receipt: &TransactionReceipt,
) -> anyhow::Result<Option<NewPriorityRequest>> {
    let event_signature = mailbox_facet_contract()
        .event("NewPriorityRequest")
        .expect("failed to get event")
        .signature();
    for log in &receipt.logs {
        if log.topics.first() == Some(&event_signature) {
            let request = NewPriorityRequest::decode(&log.data.0)
                .context("malformed NewPriorityRequest event")?;
            return Ok(Some(request));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use zkchain_eth_client::clients::MockChain;
    use zkchain_types::{address::L1_TO_L2_ALIAS_OFFSET, web3};

    use super::*;

    const DIAMOND_PROXY_ADDR: Address = Address::repeat_byte(0x23);

    #[tokio::test]
    async fn querying_base_cost() {
        let client = MockChain::default().with_call_handler(|call, _block_id| {
            assert_eq!(call.to, Some(DIAMOND_PROXY_ADDR));
            Token::Uint(4_242.into())
        });
        let builder = PriorityTransactionBuilder::new(&client, DIAMOND_PROXY_ADDR);

        let gas_price = client.get_gas_price().await.unwrap();
        let base_cost = builder
            .base_cost(gas_price, 2_000_000.into(), 800.into())
            .await
            .unwrap();
        assert_eq!(base_cost, 4_242.into());

        let request = PriorityOpRequest {
            contract_l2: L2_DEPLOYER_SYSTEM_CONTRACT_ADDR,
            l2_value: 100.into(),
            calldata: vec![],
            l2_gas_limit: 2_000_000.into(),
            gas_per_pubdata_limit: 800.into(),
            factory_deps: vec![],
            refund_recipient: Address::repeat_byte(1),
        };
        assert_eq!(request.required_value(base_cost), 4_342.into());
    }

    #[tokio::test]
    async fn propagating_query_errors() {
        let client = MockChain::default().with_fallible_call_handler(|_call, _block_id| {
            Err(ClientError::EthereumGateway(web3::Error::Unreachable))
        });
        let builder = PriorityTransactionBuilder::new(&client, DIAMOND_PROXY_ADDR);

        let err = builder
            .base_cost(1_000.into(), 2_000_000.into(), 800.into())
            .await
            .unwrap_err();
        assert_matches!(err, ClientError::EthereumGateway(_));
    }

    #[tokio::test]
    async fn building_deployment_request() {
        let client = MockChain::default();
        let builder = PriorityTransactionBuilder::new(&client, DIAMOND_PROXY_ADDR);

        let sender = Address::repeat_byte(0x42);
        let bytecode = vec![0xab; 96];
        let constructor_input = b"constructor input".to_vec();
        let salt = H256::repeat_byte(0x07);
        let deployment = builder
            .build_deployment_tx(
                sender,
                bytecode.clone(),
                constructor_input.clone(),
                salt,
                2_000_000.into(),
            )
            .await
            .unwrap();

        let bytecode_hash = hash_bytecode(&bytecode).unwrap();
        assert_eq!(
            deployment.address,
            deployed_address_create2(sender, bytecode_hash, salt, &constructor_input)
        );
        let request = &deployment.request;
        assert_eq!(request.contract_l2, L2_DEPLOYER_SYSTEM_CONTRACT_ADDR);
        assert_eq!(request.l2_value, U256::zero());
        assert_eq!(request.factory_deps, [bytecode]);
        // The sender is an EOA on the mock chain, so no alias is applied.
        assert_eq!(request.refund_recipient, sender);

        let create2_function = l2_deployer_contract().function("create2").unwrap().clone();
        assert_eq!(&request.calldata[..4], create2_function.short_signature());
        let tokens = create2_function.decode_input(&request.calldata[4..]).unwrap();
        assert_eq!(
            tokens,
            [
                Token::FixedBytes(salt.as_bytes().to_vec()),
                Token::FixedBytes(bytecode_hash.as_bytes().to_vec()),
                Token::Bytes(constructor_input),
            ]
        );
    }

    #[tokio::test]
    async fn rejecting_misshapen_bytecode() {
        let client = MockChain::default();
        let builder = PriorityTransactionBuilder::new(&client, DIAMOND_PROXY_ADDR);

        // 64 bytes is an even number of words.
        let err = builder
            .build_deployment_tx(
                Address::repeat_byte(0x42),
                vec![0xab; 64],
                vec![],
                H256::zero(),
                2_000_000.into(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid deployment bytecode"), "{err:#}");
    }

    #[tokio::test]
    async fn rejecting_oversized_gas_limit() {
        let client = MockChain::default();
        let builder = PriorityTransactionBuilder::new(&client, DIAMOND_PROXY_ADDR);

        let err = builder
            .build_deployment_tx(
                Address::repeat_byte(0x42),
                vec![0xab; 96],
                vec![],
                H256::zero(),
                U256::from(PRIORITY_TX_MAX_GAS_LIMIT) + 1,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exceeds the cap"), "{err:#}");
    }

    #[tokio::test]
    async fn aliasing_refund_recipient_for_contract_senders() {
        let eoa = Address::repeat_byte(0x42);
        let contract = Address::repeat_byte(0x43);
        let client = MockChain::default().with_contract_code(contract, vec![0xfe, 0xed]);
        let builder = PriorityTransactionBuilder::new(&client, DIAMOND_PROXY_ADDR);

        assert_eq!(builder.refund_recipient_for(eoa).await.unwrap(), eoa);
        let aliased = builder.refund_recipient_for(contract).await.unwrap();
        assert_eq!(aliased, apply_l1_to_l2_alias(contract));
        assert_ne!(aliased, contract);
        assert_eq!(
            U256::from_big_endian(aliased.as_bytes()),
            U256::from_big_endian(contract.as_bytes())
                + U256::from_big_endian(L1_TO_L2_ALIAS_OFFSET.as_bytes())
        );
    }
}
