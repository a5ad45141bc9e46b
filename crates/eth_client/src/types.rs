use std::marker::PhantomData;

use zkchain_types::web3::{
    self,
    contract::tokens::{Detokenize, Tokenize},
    ethabi,
    types::{Address, BlockId, TransactionReceipt, H256, U256},
};

use crate::EthInterface;

/// Pass-through `Tokenize` / `Detokenize` implementation for a prepared token list.
/// Unlike the tuple implementations, does not wrap the tokens into an outer tuple.
#[derive(Debug)]
pub struct RawTokens(pub Vec<ethabi::Token>);

impl Tokenize for RawTokens {
    fn into_tokens(self) -> Vec<ethabi::Token> {
        self.0
    }
}

impl Detokenize for RawTokens {
    fn from_tokens(tokens: Vec<ethabi::Token>) -> Result<Self, web3::contract::Error> {
        Ok(Self(tokens))
    }
}

/// Function name and arguments of a contract call, not yet bound to a contract.
#[derive(Debug)]
pub struct CallFunctionArgs {
    pub(crate) name: String,
    pub(crate) from: Option<Address>,
    pub(crate) block: Option<BlockId>,
    pub(crate) params: RawTokens,
}

impl CallFunctionArgs {
    pub fn new(name: &str, params: impl Tokenize) -> Self {
        Self {
            name: name.to_owned(),
            from: None,
            block: None,
            params: RawTokens(params.into_tokens()),
        }
    }

    /// Sets the sender address (`from`) for the call.
    pub fn with_sender(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    /// Pins the call to the specified block instead of the pending one.
    pub fn with_block(mut self, block: BlockId) -> Self {
        self.block = Some(block);
        self
    }

    pub fn for_contract<Res>(
        self,
        contract_address: Address,
        contract_abi: &ethabi::Contract,
    ) -> ContractCall<'_, Res> {
        ContractCall {
            contract_address,
            contract_abi,
            inner: self,
            _marker: PhantomData,
        }
    }
}

/// A function call bound to a specific contract, ready to be submitted via `eth_call`.
/// Created with [`CallFunctionArgs::for_contract()`]; the type param is the decoded output.
#[derive(Debug)]
pub struct ContractCall<'a, Res> {
    pub(crate) contract_address: Address,
    pub(crate) contract_abi: &'a ethabi::Contract,
    pub(crate) inner: CallFunctionArgs,
    _marker: PhantomData<Res>,
}

impl<Res: Detokenize> ContractCall<'_, Res> {
    pub fn contract_address(&self) -> Address {
        self.contract_address
    }

    pub fn function_name(&self) -> &str {
        &self.inner.name
    }

    pub fn args(&self) -> &[ethabi::Token] {
        &self.inner.params.0
    }

    pub async fn call(&self, client: &dyn EthInterface) -> Result<Res, Error> {
        let func = self.contract_abi.function(&self.inner.name)?;
        self.call_with_function(client, func.clone()).await
    }

    /// Calls a contract function with the specified function resolved externally, e.g. when
    /// the function is overloaded and cannot be resolved by name alone.
    pub async fn call_with_function(
        &self,
        client: &dyn EthInterface,
        func: ethabi::Function,
    ) -> Result<Res, Error> {
        let encoded_input = func.encode_input(&self.inner.params.0)?;
        let request = web3::types::CallRequest {
            from: self.inner.from,
            to: Some(self.contract_address),
            data: Some(encoded_input.into()),
            // Other options are skipped for calls.
            ..web3::types::CallRequest::default()
        };
        let encoded_output = client.call_contract_function(request, self.inner.block).await?;
        let output_tokens = func.decode_output(&encoded_output.0)?;
        Ok(Res::from_tokens(output_tokens)?)
    }
}

/// Common error type exposed by the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport-level failure: RPC connectivity, malformed responses and the like.
    #[error("request to Ethereum gateway failed: {0}")]
    EthereumGateway(#[from] web3::Error),
    /// Contract interaction failed on the ABI level.
    #[error("contract call failed: {0}")]
    Contract(#[from] web3::contract::Error),
    /// Contract response could not be decoded.
    #[error("decoding contract response failed: {0}")]
    Decode(#[from] ethabi::Error),
}

/// Opaque signed transaction bytes, as accepted by `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTransactionBytes(pub(crate) Vec<u8>);

impl AsRef<[u8]> for RawTransactionBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Signed transaction together with the fee parameters it was signed with.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedCallResult {
    /// Signed bytes ready to be sent to the network.
    pub raw_tx: RawTransactionBytes,
    /// EIP-1559 priority fee used for signing.
    pub max_priority_fee_per_gas: U256,
    /// EIP-1559 fee cap used for signing.
    pub max_fee_per_gas: U256,
    /// Nonce the transaction was signed with.
    pub nonce: U256,
    /// Hash of the signed transaction.
    pub hash: H256,
}

impl SignedCallResult {
    pub fn new(
        raw_tx: RawTransactionBytes,
        max_priority_fee_per_gas: U256,
        max_fee_per_gas: U256,
        nonce: U256,
        hash: H256,
    ) -> Self {
        Self {
            raw_tx,
            max_priority_fee_per_gas,
            max_fee_per_gas,
            nonce,
            hash,
        }
    }
}

/// Outcome of an executed Ethereum transaction, as reported by the network.
#[derive(Debug, Clone)]
pub struct ExecutedTxStatus {
    /// Hash of the executed transaction.
    pub tx_hash: H256,
    /// Whether the execution succeeded.
    pub success: bool,
    /// Full transaction receipt.
    pub receipt: TransactionReceipt,
}
