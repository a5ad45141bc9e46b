//! ABI-stable encodings of the L1->L2 transaction format.

use anyhow::Context as _;

use crate::{
    ethabi::{self, ParamType, Token},
    web3::signing::keccak256,
    H256, U256,
};

/// The canonical L2 transaction record carried by L1->L2 operations: priority
/// transactions and protocol upgrade transactions.
///
/// The encoding must stay byte-stable: its hash is emitted in L1 event logs and
/// matched against the destination layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct L2CanonicalTransaction {
    pub tx_type: U256,
    pub from: U256,
    pub to: U256,
    pub gas_limit: U256,
    pub gas_per_pubdata_byte_limit: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster: U256,
    pub nonce: U256,
    pub value: U256,
    pub reserved: [U256; 4],
    pub data: Vec<u8>,
    pub signature: Vec<u8>,
    pub factory_deps: Vec<U256>,
    pub paymaster_input: Vec<u8>,
    pub reserved_dynamic: Vec<u8>,
}

impl L2CanonicalTransaction {
    /// ABI schema of the transaction tuple. Fields follow the struct
    /// declaration order.
    pub fn schema() -> ParamType {
        ParamType::Tuple(vec![
            ParamType::Uint(256), // tx_type
            ParamType::Uint(256), // from
            ParamType::Uint(256), // to
            ParamType::Uint(256), // gas_limit
            ParamType::Uint(256), // gas_per_pubdata_byte_limit
            ParamType::Uint(256), // max_fee_per_gas
            ParamType::Uint(256), // max_priority_fee_per_gas
            ParamType::Uint(256), // paymaster
            ParamType::Uint(256), // nonce
            ParamType::Uint(256), // value
            ParamType::FixedArray(ParamType::Uint(256).into(), 4),
            ParamType::Bytes, // data
            ParamType::Bytes, // signature
            ParamType::Array(Box::new(ParamType::Uint(256))),
            ParamType::Bytes, // paymaster_input
            ParamType::Bytes, // reserved_dynamic
        ])
    }

    /// Encodes the transaction to an ABI token.
    pub fn encode(&self) -> Token {
        Token::Tuple(vec![
            Token::Uint(self.tx_type),
            Token::Uint(self.from),
            Token::Uint(self.to),
            Token::Uint(self.gas_limit),
            Token::Uint(self.gas_per_pubdata_byte_limit),
            Token::Uint(self.max_fee_per_gas),
            Token::Uint(self.max_priority_fee_per_gas),
            Token::Uint(self.paymaster),
            Token::Uint(self.nonce),
            Token::Uint(self.value),
            Token::FixedArray(self.reserved.iter().copied().map(Token::Uint).collect()),
            Token::Bytes(self.data.clone()),
            Token::Bytes(self.signature.clone()),
            Token::Array(self.factory_deps.iter().copied().map(Token::Uint).collect()),
            Token::Bytes(self.paymaster_input.clone()),
            Token::Bytes(self.reserved_dynamic.clone()),
        ])
    }

    /// Decodes the transaction from an ABI token.
    /// Returns an error if the token doesn't match `schema()`.
    pub fn decode(token: Token) -> anyhow::Result<Self> {
        let fields = token.into_tuple().context("not a tuple")?;
        anyhow::ensure!(fields.len() == 16, "expected 16 fields");
        let mut fields = fields.into_iter();

        Ok(Self {
            tx_type: uint_field(&mut fields, "tx_type")?,
            from: uint_field(&mut fields, "from")?,
            to: uint_field(&mut fields, "to")?,
            gas_limit: uint_field(&mut fields, "gas_limit")?,
            gas_per_pubdata_byte_limit: uint_field(&mut fields, "gas_per_pubdata_byte_limit")?,
            max_fee_per_gas: uint_field(&mut fields, "max_fee_per_gas")?,
            max_priority_fee_per_gas: uint_field(&mut fields, "max_priority_fee_per_gas")?,
            paymaster: uint_field(&mut fields, "paymaster")?,
            nonce: uint_field(&mut fields, "nonce")?,
            value: uint_field(&mut fields, "value")?,
            reserved: {
                let slots = uint_array_field(&mut fields, "reserved")?;
                <[U256; 4]>::try_from(slots).ok().context("reserved")?
            },
            data: bytes_field(&mut fields, "data")?,
            signature: bytes_field(&mut fields, "signature")?,
            factory_deps: uint_array_field(&mut fields, "factory_deps")?,
            paymaster_input: bytes_field(&mut fields, "paymaster_input")?,
            reserved_dynamic: bytes_field(&mut fields, "reserved_dynamic")?,
        })
    }

    /// Canonical hash of the transaction, as emitted in the L1 log stream.
    pub fn hash(&self) -> H256 {
        H256::from_slice(&keccak256(&ethabi::encode(&[self.encode()])))
    }
}

fn uint_field(
    fields: &mut impl Iterator<Item = Token>,
    name: &'static str,
) -> anyhow::Result<U256> {
    fields.next().context(name)?.into_uint().context(name)
}

fn bytes_field(
    fields: &mut impl Iterator<Item = Token>,
    name: &'static str,
) -> anyhow::Result<Vec<u8>> {
    fields.next().context(name)?.into_bytes().context(name)
}

fn uint_array_field(
    fields: &mut impl Iterator<Item = Token>,
    name: &'static str,
) -> anyhow::Result<Vec<U256>> {
    let tokens = match fields.next().context(name)? {
        Token::Array(tokens) | Token::FixedArray(tokens) => tokens,
        _ => anyhow::bail!("`{name}` is not an array"),
    };
    let values: Option<Vec<_>> = tokens.into_iter().map(Token::into_uint).collect();
    values.with_context(|| format!("`{name}` is not an array of uints"))
}

/// Payload of the `NewPriorityRequest` event emitted by the mailbox facet for every
/// accepted L1->L2 priority operation.
#[derive(Debug)]
pub struct NewPriorityRequest {
    pub tx_id: U256,
    pub tx_hash: [u8; 32],
    pub expiration_timestamp: u64,
    pub transaction: Box<L2CanonicalTransaction>,
    pub factory_deps: Vec<Vec<u8>>,
}

impl NewPriorityRequest {
    /// Encodes the request to the sequence of ABI tokens forming the event data.
    pub fn encode(&self) -> Vec<Token> {
        let factory_deps = self.factory_deps.iter().cloned().map(Token::Bytes);
        vec![
            Token::Uint(self.tx_id),
            Token::FixedBytes(self.tx_hash.into()),
            Token::Uint(self.expiration_timestamp.into()),
            self.transaction.encode(),
            Token::Array(factory_deps.collect()),
        ]
    }

    /// Decodes the request from the event data.
    pub fn decode(data: &[u8]) -> anyhow::Result<Self> {
        let schema = [
            ParamType::Uint(256),
            ParamType::FixedBytes(32),
            ParamType::Uint(64),
            L2CanonicalTransaction::schema(),
            ParamType::Array(ParamType::Bytes.into()),
        ];
        let mut fields = ethabi::decode(&schema, data)?.into_iter();

        let tx_id = uint_field(&mut fields, "tx_id")?;
        let hash_bytes = bytes_fixed_field(&mut fields, "tx_hash")?;
        let tx_hash = <[u8; 32]>::try_from(hash_bytes).ok().context("tx_hash")?;
        let expiration_timestamp: u64 = uint_field(&mut fields, "expiration_timestamp")?
            .try_into()
            .ok()
            .context("expiration_timestamp")?;
        let transaction = fields.next().context("transaction")?;
        let transaction = L2CanonicalTransaction::decode(transaction).context("transaction")?;
        let deps = match fields.next().context("factory_deps")? {
            Token::Array(tokens) => tokens,
            _ => anyhow::bail!("`factory_deps` is not an array"),
        };
        let factory_deps: Option<Vec<_>> = deps.into_iter().map(Token::into_bytes).collect();

        Ok(Self {
            tx_id,
            tx_hash,
            expiration_timestamp,
            transaction: transaction.into(),
            factory_deps: factory_deps.context("factory_deps")?,
        })
    }
}

fn bytes_fixed_field(
    fields: &mut impl Iterator<Item = Token>,
    name: &'static str,
) -> anyhow::Result<Vec<u8>> {
    fields.next().context(name)?.into_fixed_bytes().context(name)
}
