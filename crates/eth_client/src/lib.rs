#![allow(clippy::upper_case_acronyms, clippy::derive_partial_eq_without_eq)]

use std::fmt;

use async_trait::async_trait;
use zkchain_types::{
    web3::{
        contract::{tokens::Tokenize, Options},
        ethabi,
        types::{
            Address, BlockId, BlockNumber, Bytes, CallRequest, TransactionReceipt, H160, H256,
            U256, U64,
        },
    },
    L1ChainId,
};

pub use crate::types::{
    CallFunctionArgs, ContractCall, Error, ExecutedTxStatus, RawTokens, RawTransactionBytes,
    SignedCallResult,
};

pub mod clients;
mod types;

/// Low-level Web3 interface used by the deployment toolkit.
/// Wraps raw RPC interactions behind a typed, mockable API.
///
/// Methods here are "unbound": they make no assumptions about the contract or the account
/// a query concerns. Anything that needs a specific contract ABI, address or signer belongs
/// to [`BoundEthInterface`] instead.
#[async_trait]
pub trait EthInterface: 'static + Sync + Send + fmt::Debug {
    /// Clones this client.
    fn clone_boxed(&self) -> Box<dyn EthInterface>;

    /// Returns the nonce of `account` as of the given block.
    async fn nonce_at_for_account(
        &self,
        account: Address,
        block: BlockNumber,
    ) -> Result<U256, Error>;

    /// Returns the gas price reported by the network.
    async fn get_gas_price(&self) -> Result<U256, Error>;

    /// Returns the latest block number.
    async fn block_number(&self) -> Result<U64, Error>;

    /// Submits a signed transaction via `eth_sendRawTransaction`.
    async fn send_raw_tx(&self, tx: RawTransactionBytes) -> Result<H256, Error>;

    /// Looks up the execution status of a transaction.
    ///
    /// `Ok(None)` means the transaction is unknown to the network or not yet executed;
    /// errors are reserved for transport failures.
    async fn get_tx_status(&self, hash: H256) -> Result<Option<ExecutedTxStatus>, Error>;

    /// Looks up the receipt of a transaction. Same `Ok(None)` semantics as
    /// [`Self::get_tx_status()`].
    async fn tx_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>, Error>;

    /// Returns the code deployed at `address`. An empty result means the address is not
    /// a contract (an externally owned account or an empty slot).
    async fn code_at(&self, address: Address, block: BlockNumber) -> Result<Bytes, Error>;

    /// Performs an `eth_call`. Prefer [`CallFunctionArgs`], which takes care of ABI coding
    /// on both ends, over calling this directly.
    async fn call_contract_function(
        &self,
        request: CallRequest,
        block: Option<BlockId>,
    ) -> Result<Bytes, Error>;
}

impl Clone for Box<dyn EthInterface> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

/// Extension of [`EthInterface`] for queries bound to a particular contract and sender
/// account.
///
/// The toolkit uses two such bindings: the deployer wallet submitting deployment
/// transactions, and the governor wallet driving the diamond proxy.
///
/// When adding a method here, check that it actually depends on the binding; unbound
/// queries go to [`EthInterface`]. Convenience wrappers around unbound methods belong
/// to the `impl dyn BoundEthInterface` block instead.
#[async_trait]
pub trait BoundEthInterface: AsRef<dyn EthInterface> + 'static + Sync + Send + fmt::Debug {
    /// Clones this client.
    fn clone_boxed(&self) -> Box<dyn BoundEthInterface>;

    /// ABI of the bound contract.
    fn contract(&self) -> &ethabi::Contract;

    /// Address of the bound contract.
    fn contract_addr(&self) -> H160;

    /// L1 chain ID the client is configured for. Taken from the config rather than
    /// fetched from the network, so that an RPC URL pointing at a wrong network is
    /// detectable as a mismatch.
    fn chain_id(&self) -> L1ChainId;

    /// Address the client signs transactions with.
    fn sender_account(&self) -> Address;

    /// Signs a prepared transaction addressed to `contract_addr` using the credentials
    /// of [`Self::sender_account()`].
    async fn sign_prepared_tx_for_addr(
        &self,
        data: Vec<u8>,
        contract_addr: H160,
        options: Options,
    ) -> Result<SignedCallResult, Error>;

    /// Signs a prepared contract deployment transaction (a transaction without
    /// a recipient).
    async fn sign_prepared_deploy_tx(
        &self,
        data: Vec<u8>,
        options: Options,
    ) -> Result<SignedCallResult, Error>;
}

impl Clone for Box<dyn BoundEthInterface> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

impl dyn BoundEthInterface {
    /// [`BoundEthInterface::sign_prepared_tx_for_addr()`] fixed over
    /// [`Self::contract_addr()`].
    pub async fn sign_prepared_tx(
        &self,
        data: Vec<u8>,
        options: Options,
    ) -> Result<SignedCallResult, Error> {
        self.sign_prepared_tx_for_addr(data, self.contract_addr(), options)
            .await
    }

    /// Nonce of the sender account at the given block.
    pub async fn nonce_at(&self, block: BlockNumber) -> Result<U256, Error> {
        self.as_ref()
            .nonce_at_for_account(self.sender_account(), block)
            .await
    }

    /// Latest executed nonce of the sender account.
    pub async fn current_nonce(&self) -> Result<U256, Error> {
        self.nonce_at(BlockNumber::Latest).await
    }

    /// Pending nonce of the sender account.
    pub async fn pending_nonce(&self) -> Result<U256, Error> {
        self.nonce_at(BlockNumber::Pending).await
    }

    /// ABI-encodes a call to `func` of the bound contract.
    ///
    /// `params` are tokenized arguments of the function. Most of the time, you can use
    /// [`Tokenize`] implementations to convert the arguments into tokens.
    pub fn encode_tx_data<P: Tokenize>(&self, func: &str, params: P) -> Vec<u8> {
        let func = self.contract().function(func).expect("unknown function");
        func.encode_input(&params.into_tokens())
            .expect("failed to encode parameters")
    }
}
