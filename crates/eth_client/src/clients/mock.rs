use std::{
    collections::{hash_map::DefaultHasher, BTreeMap, HashMap},
    fmt,
    hash::Hasher,
    sync::{Arc, RwLock, RwLockWriteGuard},
};

use async_trait::async_trait;
use zkchain_types::{
    address::deployed_address_evm_create,
    web3::{
        self,
        contract::{tokens::Tokenize, Options},
        ethabi,
        types::{
            Address, BlockId, BlockNumber, Bytes, CallRequest, Log, TransactionReceipt, H160,
            H256, U256, U64,
        },
    },
    L1ChainId,
};

use crate::{
    types::{Error, ExecutedTxStatus, SignedCallResult},
    BoundEthInterface, EthInterface, RawTransactionBytes,
};

/// Transaction record recovered from raw bytes produced by [`MockChain::sign_prepared_tx()`].
#[derive(Debug, Clone)]
struct SentTx {
    hash: H256,
    input: Vec<u8>,
    recipient: Address,
    nonce: u64,
    max_fee_per_gas: U256,
    max_priority_fee_per_gas: U256,
}

impl SentTx {
    /// Layout: 32-byte hash, the original payload, then the 116-byte trailer appended
    /// by the signer (20-byte recipient and three 32-byte ABI-encoded uints).
    fn parse(raw: &[u8]) -> Self {
        let trailer = raw.len() - 116;
        Self {
            hash: H256::from_slice(&raw[..32]),
            input: raw[32..trailer].to_vec(),
            recipient: Address::from_slice(&raw[trailer..trailer + 20]),
            max_fee_per_gas: U256::from_big_endian(&raw[trailer + 20..trailer + 52]),
            max_priority_fee_per_gas: U256::from_big_endian(&raw[trailer + 52..trailer + 84]),
            nonce: U256::from_big_endian(&raw[trailer + 84..]).as_u64(),
        }
    }
}

/// Mutable part of [`MockChain`] that needs to be synchronized via an `RwLock`.
#[derive(Debug, Default)]
struct MockChainInner {
    block_number: u64,
    tx_statuses: HashMap<H256, ExecutedTxStatus>,
    sent_txs: HashMap<H256, SentTx>,
    current_nonce: u64,
    pending_nonce: u64,
    nonces: BTreeMap<u64, u64>,
    code: HashMap<Address, Vec<u8>>,
}

impl MockChainInner {
    fn insert_status(
        &mut self,
        tx_hash: H256,
        success: bool,
        included_at: u64,
        contract_address: Option<Address>,
    ) {
        let status = ExecutedTxStatus {
            tx_hash,
            success,
            receipt: TransactionReceipt {
                gas_used: Some(21_000_u32.into()),
                block_number: Some(included_at.into()),
                transaction_hash: tx_hash,
                contract_address,
                ..TransactionReceipt::default()
            },
        };
        self.tx_statuses.insert(tx_hash, status);
    }

    fn execute_tx(&mut self, tx_hash: H256, success: bool, confirmations: u64, ordered: bool) {
        let included_at = self.block_number;
        self.block_number += confirmations;
        let expected_nonce = self.current_nonce;
        self.current_nonce += 1;

        let tx = self.sent_txs[&tx_hash].clone();
        if ordered {
            assert_eq!(tx.nonce, expected_nonce, "nonce mismatch");
        } else if tx.nonce >= expected_nonce {
            self.current_nonce = tx.nonce;
        }
        self.nonces.insert(included_at, expected_nonce + 1);

        // A zero recipient marks a deployment transaction; see `sign_prepared_deploy_tx()`.
        let deployed = (tx.recipient == Address::zero()).then(|| {
            let address = deployed_address_evm_create(MockChain::SENDER_ACCOUNT, tx.nonce.into());
            self.code.insert(address, tx.input.clone());
            address
        });
        self.insert_status(tx_hash, success, included_at, deployed);
    }

    fn execute_external_tx(&mut self, tx_hash: H256, success: bool, confirmations: u64) {
        let included_at = self.block_number;
        self.block_number += confirmations;
        self.insert_status(tx_hash, success, included_at, None);
    }
}

/// Handle to a just-executed transaction allowing to customize the stored receipt.
#[derive(Debug)]
pub struct MockExecutedTxHandle<'a> {
    inner: RwLockWriteGuard<'a, MockChainInner>,
    tx_hash: H256,
}

impl MockExecutedTxHandle<'_> {
    pub fn with_logs(&mut self, logs: Vec<Log>) -> &mut Self {
        let status = self.inner.tx_statuses.get_mut(&self.tx_hash).unwrap();
        status.receipt.logs = logs;
        self
    }
}

type CallHandler = dyn Fn(&CallRequest, BlockId) -> Result<ethabi::Token, Error> + Send + Sync;

/// Mock Ethereum client capable of recording all the incoming requests for further analysis.
#[derive(Clone)]
pub struct MockChain {
    max_fee_per_gas: U256,
    max_priority_fee_per_gas: U256,
    /// If true, the mock will not check the nonce ordering of executed transactions,
    /// letting tests drive confirmations out of order.
    non_ordering_confirmations: bool,
    contract: Option<ethabi::Contract>,
    contract_address: Address,
    inner: Arc<RwLock<MockChainInner>>,
    call_handler: Arc<CallHandler>,
}

impl fmt::Debug for MockChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockChain")
            .field("max_fee_per_gas", &self.max_fee_per_gas)
            .field("max_priority_fee_per_gas", &self.max_priority_fee_per_gas)
            .field(
                "non_ordering_confirmations",
                &self.non_ordering_confirmations,
            )
            .field("contract_address", &self.contract_address)
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl Default for MockChain {
    fn default() -> Self {
        Self {
            max_fee_per_gas: 100.into(),
            max_priority_fee_per_gas: 10.into(),
            non_ordering_confirmations: false,
            contract: None,
            contract_address: Address::repeat_byte(0x22),
            inner: Arc::default(),
            call_handler: Arc::new(|request, block| {
                panic!("unexpected eth_call: {request:?} at {block:?}");
            }),
        }
    }
}

impl MockChain {
    const SENDER_ACCOUNT: Address = Address::repeat_byte(0xab);

    /// Hashes bytes with `DefaultHasher` instead of a real `keccak256`. Mock transaction
    /// hashes only need to be unique, not cryptographic.
    fn fake_hash(data: &[u8]) -> H256 {
        let mut hasher = DefaultHasher::new();
        hasher.write(data);
        H256::from_low_u64_ne(hasher.finish())
    }

    /// Returns how many transactions were sent through this client.
    pub fn sent_tx_count(&self) -> usize {
        self.inner.read().unwrap().sent_txs.len()
    }

    /// Returns the hashes of the sent but not yet executed transactions, in nonce order.
    pub fn pending_tx_hashes(&self) -> Vec<H256> {
        let inner = self.inner.read().unwrap();
        let mut txs: Vec<_> = inner
            .sent_txs
            .iter()
            .filter(|(hash, _)| !inner.tx_statuses.contains_key(hash))
            .map(|(hash, tx)| (tx.nonce, *hash))
            .collect();
        txs.sort_unstable_by_key(|(nonce, _)| *nonce);
        txs.into_iter().map(|(_, hash)| hash).collect()
    }

    /// Increments the block number by the provided `confirmations` and marks the sent transaction
    /// as executed with the provided `success` status.
    pub fn execute_tx(
        &self,
        tx_hash: H256,
        success: bool,
        confirmations: u64,
    ) -> MockExecutedTxHandle<'_> {
        let mut inner = self.inner.write().unwrap();
        let ordered = !self.non_ordering_confirmations;
        inner.execute_tx(tx_hash, success, confirmations, ordered);
        MockExecutedTxHandle { inner, tx_hash }
    }

    /// Marks a transaction that did not originate from this client as executed. This emulates
    /// transactions included by other actors, e.g. an L1 -> L2 transaction processed by the
    /// sequencer, whose hash is known in advance but which is never sent via
    /// `eth_sendRawTransaction`.
    pub fn execute_external_tx(
        &self,
        tx_hash: H256,
        success: bool,
        confirmations: u64,
    ) -> MockExecutedTxHandle<'_> {
        let mut inner = self.inner.write().unwrap();
        inner.execute_external_tx(tx_hash, success, confirmations);
        MockExecutedTxHandle { inner, tx_hash }
    }

    pub fn sign_prepared_tx(
        &self,
        mut raw_tx: Vec<u8>,
        contract_addr: Address,
        options: Options,
    ) -> Result<SignedCallResult, Error> {
        let Options { max_fee_per_gas, max_priority_fee_per_gas, nonce, .. } = options;
        let max_fee_per_gas = max_fee_per_gas.unwrap_or(self.max_fee_per_gas);
        let max_priority_fee_per_gas =
            max_priority_fee_per_gas.unwrap_or(self.max_priority_fee_per_gas);
        let nonce = nonce.expect("nonce must be set for every tx");

        // The recipient, gas prices and nonce are appended to the payload so that otherwise
        // identical transactions get distinct hashes.
        raw_tx.extend_from_slice(contract_addr.as_bytes());
        for value in [max_fee_per_gas, max_priority_fee_per_gas, nonce] {
            raw_tx.extend_from_slice(&ethabi::encode(&value.into_tokens()));
        }
        let hash = Self::fake_hash(&raw_tx);

        // The final raw transaction starts with the hash, so that `send_raw_tx()` can recover it.
        let mut signed = hash.as_bytes().to_vec();
        signed.extend(raw_tx);
        Ok(SignedCallResult::new(
            RawTransactionBytes(signed),
            max_priority_fee_per_gas,
            max_fee_per_gas,
            nonce,
            hash,
        ))
    }

    pub fn advance_block_number(&self, blocks: u64) -> u64 {
        let mut inner = self.inner.write().unwrap();
        inner.block_number += blocks;
        inner.block_number
    }

    pub fn with_non_ordering_confirmation(self, non_ordering_confirmations: bool) -> Self {
        Self {
            non_ordering_confirmations,
            ..self
        }
    }

    /// Attaches a contract ABI and address returned by the `BoundEthInterface` methods.
    pub fn with_contract(self, contract: ethabi::Contract, contract_address: Address) -> Self {
        Self {
            contract: Some(contract),
            contract_address,
            ..self
        }
    }

    /// Seeds the code registry, so that `code_at()` reports the address as a contract.
    pub fn with_contract_code(self, address: Address, code: Vec<u8>) -> Self {
        self.inner.write().unwrap().code.insert(address, code);
        self
    }

    /// Routes `eth_call` requests to the provided handler.
    pub fn with_call_handler<F>(self, call_handler: F) -> Self
    where
        F: 'static + Send + Sync + Fn(&CallRequest, BlockId) -> ethabi::Token,
    {
        Self {
            call_handler: Arc::new(move |request, block| Ok(call_handler(request, block))),
            ..self
        }
    }

    /// Same as [`Self::with_call_handler()`], but allows the handler to fail the call.
    pub fn with_fallible_call_handler<F>(self, call_handler: F) -> Self
    where
        F: 'static + Send + Sync + Fn(&CallRequest, BlockId) -> Result<ethabi::Token, Error>,
    {
        Self {
            call_handler: Arc::new(call_handler),
            ..self
        }
    }
}

#[async_trait]
impl EthInterface for MockChain {
    fn clone_boxed(&self) -> Box<dyn EthInterface> {
        Box::new(self.clone())
    }

    async fn nonce_at_for_account(
        &self,
        account: Address,
        block: BlockNumber,
    ) -> Result<U256, Error> {
        assert_eq!(account, Self::SENDER_ACCOUNT, "only the sender account is tracked");

        let inner = self.inner.read().unwrap();
        let nonce = match block {
            BlockNumber::Pending => inner.pending_nonce,
            BlockNumber::Latest => inner.current_nonce,
            BlockNumber::Number(number) => {
                let mined_before = inner.nonces.range(..=number.as_u64());
                mined_before.last().map_or(0, |(_, &nonce)| nonce)
            }
            _ => unimplemented!("unsupported block specifier: {block:?}"),
        };
        Ok(nonce.into())
    }

    async fn get_gas_price(&self) -> Result<U256, Error> {
        Ok(self.max_fee_per_gas)
    }

    async fn block_number(&self) -> Result<U64, Error> {
        Ok(self.inner.read().unwrap().block_number.into())
    }

    async fn send_raw_tx(&self, tx: RawTransactionBytes) -> Result<H256, Error> {
        let tx = SentTx::parse(&tx.0);
        let tx_hash = tx.hash;
        let mut inner = self.inner.write().unwrap();

        if tx.nonce < inner.current_nonce {
            let message = "transaction with the same nonce already processed";
            let err = web3::error::TransportError::Message(message.into());
            return Err(Error::EthereumGateway(web3::Error::Transport(err)));
        }
        if tx.nonce == inner.pending_nonce {
            inner.pending_nonce += 1;
        }
        inner.sent_txs.insert(tx_hash, tx);
        Ok(tx_hash)
    }

    async fn get_tx_status(&self, hash: H256) -> Result<Option<ExecutedTxStatus>, Error> {
        Ok(self.inner.read().unwrap().tx_statuses.get(&hash).cloned())
    }

    async fn tx_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>, Error> {
        let inner = self.inner.read().unwrap();
        let status = inner.tx_statuses.get(&tx_hash);
        Ok(status.map(|status| status.receipt.clone()))
    }

    async fn code_at(&self, address: Address, _block: BlockNumber) -> Result<Bytes, Error> {
        let inner = self.inner.read().unwrap();
        Ok(Bytes(inner.code.get(&address).cloned().unwrap_or_default()))
    }

    async fn call_contract_function(
        &self,
        request: CallRequest,
        block: Option<BlockId>,
    ) -> Result<Bytes, Error> {
        let block = block.unwrap_or_else(|| BlockNumber::Pending.into());
        let token = (self.call_handler)(&request, block)?;
        Ok(Bytes(ethabi::encode(&[token])))
    }
}

impl AsRef<dyn EthInterface> for MockChain {
    fn as_ref(&self) -> &dyn EthInterface {
        self
    }
}

#[async_trait]
impl BoundEthInterface for MockChain {
    fn clone_boxed(&self) -> Box<dyn BoundEthInterface> {
        Box::new(self.clone())
    }

    fn contract(&self) -> &ethabi::Contract {
        self.contract
            .as_ref()
            .expect("no contract attached to the mock client")
    }

    fn contract_addr(&self) -> H160 {
        self.contract_address
    }

    fn chain_id(&self) -> L1ChainId {
        L1ChainId(9)
    }

    fn sender_account(&self) -> Address {
        Self::SENDER_ACCOUNT
    }

    async fn sign_prepared_tx_for_addr(
        &self,
        data: Vec<u8>,
        contract_addr: H160,
        options: Options,
    ) -> Result<SignedCallResult, Error> {
        self.sign_prepared_tx(data, contract_addr, options)
    }

    async fn sign_prepared_deploy_tx(
        &self,
        data: Vec<u8>,
        options: Options,
    ) -> Result<SignedCallResult, Error> {
        // The zero recipient marks a deployment transaction.
        self.sign_prepared_tx(data, Address::zero(), options)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::CallFunctionArgs;

    fn tx_options(nonce: u64) -> Options {
        Options {
            nonce: Some(nonce.into()),
            ..Options::default()
        }
    }

    #[tokio::test]
    async fn advancing_the_block_number() {
        let client = MockChain::default();
        assert_eq!(client.block_number().await.unwrap(), 0.into());

        assert_eq!(client.advance_block_number(3), 3);
        assert_eq!(client.advance_block_number(2), 5);
        assert_eq!(client.block_number().await.unwrap(), 5.into());
    }

    #[tokio::test]
    async fn sending_and_executing_transactions() {
        let client = MockChain::default().with_non_ordering_confirmation(true);
        client.advance_block_number(2);

        let signed_tx = client
            .sign_prepared_tx(b"calldata".to_vec(), Address::repeat_byte(1), tx_options(1))
            .unwrap();
        assert_eq!(signed_tx.nonce, 1.into());
        assert!(signed_tx.max_fee_per_gas > 0.into());
        assert!(signed_tx.max_priority_fee_per_gas > 0.into());

        let tx_hash = client.send_raw_tx(signed_tx.raw_tx.clone()).await.unwrap();
        assert_eq!(tx_hash, signed_tx.hash);
        assert_eq!(client.sent_tx_count(), 1);
        assert_eq!(client.pending_tx_hashes(), [tx_hash]);

        client.execute_tx(tx_hash, true, 3);
        let status = client.get_tx_status(tx_hash).await.unwrap().expect("no status");
        assert!(status.success);
        assert_eq!(status.tx_hash, tx_hash);
        assert_eq!(status.receipt.block_number, Some(2.into()));
        assert_eq!(status.receipt.contract_address, None);
        assert!(client.pending_tx_hashes().is_empty());
    }

    #[tokio::test]
    async fn managing_deployment_transactions() {
        let client = MockChain::default();
        let signed_tx = client
            .sign_prepared_deploy_tx(b"contract code".to_vec(), tx_options(0))
            .await
            .unwrap();
        let tx_hash = client.send_raw_tx(signed_tx.raw_tx).await.unwrap();
        client.execute_tx(tx_hash, true, 1);

        let receipt = client.tx_receipt(tx_hash).await.unwrap().expect("no receipt");
        let expected_address = deployed_address_evm_create(client.sender_account(), 0.into());
        assert_eq!(receipt.contract_address, Some(expected_address));

        let code = client
            .code_at(expected_address, BlockNumber::Latest)
            .await
            .unwrap();
        assert_eq!(code.0, b"contract code");
        let no_code = client
            .code_at(Address::repeat_byte(0x77), BlockNumber::Latest)
            .await
            .unwrap();
        assert!(no_code.0.is_empty());
    }

    #[tokio::test]
    async fn calling_contract_functions() {
        const ABI: &str = r#"[
            {
                "inputs": [],
                "name": "getProtocolVersion",
                "outputs": [{ "internalType": "uint256", "name": "", "type": "uint256" }],
                "stateMutability": "view",
                "type": "function"
            }
        ]"#;

        let contract = ethabi::Contract::load(ABI.as_bytes()).unwrap();
        let contract_address = Address::repeat_byte(0x23);
        let client = MockChain::default().with_call_handler(move |req, block_id| {
            assert_eq!(req.to, Some(contract_address));
            match block_id {
                BlockId::Number(BlockNumber::Pending) => {
                    assert_eq!(req.from, None);
                    ethabi::Token::Uint(24.into())
                }
                BlockId::Number(BlockNumber::Latest) => {
                    assert_eq!(req.from, Some(MockChain::SENDER_ACCOUNT));
                    ethabi::Token::Uint(25.into())
                }
                _ => panic!("unexpected block: {block_id:?}"),
            }
        });

        let version: U256 = CallFunctionArgs::new("getProtocolVersion", ())
            .for_contract(contract_address, &contract)
            .call(&client)
            .await
            .unwrap();
        assert_eq!(version, 24.into());

        let boxed_client = EthInterface::clone_boxed(&client);
        let version: U256 = CallFunctionArgs::new("getProtocolVersion", ())
            .with_sender(MockChain::SENDER_ACCOUNT)
            .with_block(BlockId::Number(BlockNumber::Latest))
            .for_contract(contract_address, &contract)
            .call(boxed_client.as_ref())
            .await
            .unwrap();
        assert_eq!(version, 25.into());
    }

    #[tokio::test]
    async fn tracking_nonces_for_the_bound_account() {
        let mock = MockChain::default();
        let client: Box<dyn BoundEthInterface> = Box::new(mock.clone());
        // Boxed clones share the underlying chain state.
        let client = client.clone();

        assert_eq!(client.current_nonce().await.unwrap(), 0.into());
        assert_eq!(client.pending_nonce().await.unwrap(), 0.into());

        let signed_tx = client
            .sign_prepared_tx(b"test".to_vec(), tx_options(0))
            .await
            .unwrap();
        let tx_hash = mock.send_raw_tx(signed_tx.raw_tx).await.unwrap();

        // The pending nonce is bumped as soon as the transaction is sent; the current one
        // only after it is executed.
        assert_eq!(client.current_nonce().await.unwrap(), 0.into());
        assert_eq!(client.pending_nonce().await.unwrap(), 1.into());

        mock.execute_tx(tx_hash, true, 1);
        assert_eq!(client.current_nonce().await.unwrap(), 1.into());
        let nonce_at_block = client.nonce_at(BlockNumber::Number(0.into())).await.unwrap();
        assert_eq!(nonce_at_block, 1.into());
    }

    #[tokio::test]
    async fn rejecting_stale_nonces() {
        let client = MockChain::default();
        let send_with_nonce = |nonce: u64| {
            let signed_tx = client
                .sign_prepared_tx(b"test".to_vec(), Address::repeat_byte(1), tx_options(nonce))
                .unwrap();
            (signed_tx.hash, signed_tx.raw_tx)
        };

        let (tx_hash, raw_tx) = send_with_nonce(0);
        client.send_raw_tx(raw_tx).await.unwrap();
        client.execute_tx(tx_hash, true, 1);

        let (_, stale_raw_tx) = send_with_nonce(0);
        let err = client.send_raw_tx(stale_raw_tx).await.unwrap_err();
        assert_matches!(err, Error::EthereumGateway(_));
    }
}
