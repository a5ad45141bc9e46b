//! Validation of protocol upgrade transactions: the special L1->L2 transactions
//! that swap out system contracts as part of a diamond upgrade.

use zkchain_types::{
    abi::L2CanonicalTransaction,
    bytecode::{hash_bytecode, InvalidBytecodeError},
    convert::u256_to_h256,
    ProtocolVersionId, H256, PROTOCOL_UPGRADE_TX_TYPE, U256,
};

/// Hard cap on the gas limit of a single L1->L2 transaction.
pub const PRIORITY_TX_MAX_GAS_LIMIT: u64 = 72_000_000;
/// Hard cap on the pubdata a single L1->L2 transaction may produce.
pub const PRIORITY_TX_MAX_PUBDATA: u64 = 99_000;
/// Gas an L1->L2 transaction spends before any of its calldata executes.
pub const L1_TX_INTRINSIC_L2_GAS: u64 = 167_157;
/// Pubdata bytes an L1->L2 transaction publishes regardless of its payload.
pub const L1_TX_INTRINSIC_PUBDATA: u64 = 88;
/// Gas per pubdata byte that L1->L2 transactions are charged with.
pub const REQUIRED_L2_GAS_PRICE_PER_PUBDATA: u64 = 800;
/// Upper bound on the number of factory dependencies of a single transaction.
pub const MAX_NEW_FACTORY_DEPS: usize = 32;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum UpgradeTxError {
    #[error(
        "upgrade transaction has type {0}, expected {expected}",
        expected = PROTOCOL_UPGRADE_TX_TYPE
    )]
    WrongUpgradeTxType(U256),
    #[error(
        "upgrade transaction nonce {nonce} does not carry the new protocol version {version}"
    )]
    ProtocolVersionNotInNonce {
        nonce: U256,
        version: ProtocolVersionId,
    },
    #[error("proposed protocol version {proposed} does not supersede the current one {current}")]
    ProtocolVersionNotIncreasing {
        current: ProtocolVersionId,
        proposed: ProtocolVersionId,
    },
    #[error("gas limit {gas_limit} does not cover the intrinsic transaction costs {required}")]
    InsufficientOverhead { gas_limit: U256, required: U256 },
    #[error("gas limit {gas_limit} exceeds the per-transaction cap {max}")]
    GasLimitTooLarge { gas_limit: U256, max: u64 },
    #[error("gas limit allows {pubdata} pubdata bytes, more than the per-transaction cap {max}")]
    PubdataLimitExceeded { pubdata: U256, max: u64 },
    #[error("{0} factory dependencies, at most {max} are allowed", max = MAX_NEW_FACTORY_DEPS)]
    TooManyFactoryDeps(usize),
    #[error("{declared} factory dependency hashes declared, {provided} bytecodes provided")]
    FactoryDepCountMismatch { declared: usize, provided: usize },
    #[error(
        "factory dependency {index} hashes to {computed:?}, transaction declares {declared:?}"
    )]
    FactoryDepHashMismatch {
        index: usize,
        declared: H256,
        computed: H256,
    },
    #[error("factory dependency {index} is not a valid bytecode: {source}")]
    MalformedFactoryDep {
        index: usize,
        #[source]
        source: InvalidBytecodeError,
    },
    #[error("paymaster must not be set for an upgrade transaction")]
    NonZeroPaymaster,
    #[error("value must be zero for an upgrade transaction")]
    NonZeroValue,
    #[error("reserved field {0} must be zero for an upgrade transaction")]
    NonZeroReservedField(usize),
    #[error("upgrade transactions are unsigned, the signature field must be empty")]
    NonEmptySignature,
    #[error("paymaster input must be empty for an upgrade transaction")]
    NonEmptyPaymasterInput,
    #[error("the reserved dynamic field must be empty for an upgrade transaction")]
    NonEmptyReservedDynamic,
    #[error(
        "included upgrade transaction hash {observed:?} does not match the pending {expected:?}"
    )]
    UpgradeTxHashMismatch { expected: H256, observed: H256 },
    #[error("upgrade transaction {pending_hash:?} is still awaiting finalization")]
    PreviousUpgradeNotFinalized { pending_hash: H256 },
    #[error("no upgrade transaction is pending")]
    NoPendingUpgrade,
}

impl UpgradeTxError {
    /// Short stable code mirroring the on-chain revert reason.
    pub fn code(&self) -> &'static str {
        match self {
            Self::WrongUpgradeTxType(_) => "WRONG_UPGRADE_TX_TYPE",
            Self::ProtocolVersionNotInNonce { .. } => "PROTOCOL_VERSION_NOT_IN_NONCE",
            Self::ProtocolVersionNotIncreasing { .. } => "PROTOCOL_VERSION_NOT_INCREASING",
            Self::InsufficientOverhead { .. } => "INSUFFICIENT_OVERHEAD",
            Self::GasLimitTooLarge { .. } => "GAS_LIMIT_TOO_LARGE",
            Self::PubdataLimitExceeded { .. } => "PUBDATA_LIMIT_EXCEEDED",
            Self::TooManyFactoryDeps(_) => "TOO_MANY_FACTORY_DEPS",
            Self::FactoryDepCountMismatch { .. } => "FACTORY_DEP_COUNT_MISMATCH",
            Self::FactoryDepHashMismatch { .. } => "FACTORY_DEP_HASH_MISMATCH",
            Self::MalformedFactoryDep { .. } => "MALFORMED_FACTORY_DEP",
            Self::NonZeroPaymaster => "NON_ZERO_PAYMASTER",
            Self::NonZeroValue => "NON_ZERO_VALUE",
            Self::NonZeroReservedField(_) => "NON_ZERO_RESERVED_FIELD",
            Self::NonEmptySignature => "NON_EMPTY_SIGNATURE",
            Self::NonEmptyPaymasterInput => "NON_EMPTY_PAYMASTER_INPUT",
            Self::NonEmptyReservedDynamic => "NON_EMPTY_RESERVED_DYNAMIC",
            Self::UpgradeTxHashMismatch { .. } => "UPGRADE_TX_HASH_MISMATCH",
            Self::PreviousUpgradeNotFinalized { .. } => "PREVIOUS_UPGRADE_NOT_FINALIZED",
            Self::NoPendingUpgrade => "NO_PENDING_UPGRADE",
        }
    }
}

/// Validates an upgrade transaction against the format enforced on L1 and the
/// currently stored protocol version.
///
/// `factory_deps` are the full bytecodes submitted alongside the transaction;
/// they must match `tx.factory_deps` hash by hash.
pub fn validate_upgrade_tx(
    tx: &L2CanonicalTransaction,
    new_version: ProtocolVersionId,
    current_version: ProtocolVersionId,
    factory_deps: &[Vec<u8>],
) -> Result<(), UpgradeTxError> {
    validate_upgrade_tx_shape(tx)?;
    // The transaction nonce doubles as the protocol version it upgrades to.
    if tx.nonce != U256::from(new_version.0) {
        return Err(UpgradeTxError::ProtocolVersionNotInNonce {
            nonce: tx.nonce,
            version: new_version,
        });
    }
    if new_version <= current_version {
        return Err(UpgradeTxError::ProtocolVersionNotIncreasing {
            current: current_version,
            proposed: new_version,
        });
    }
    validate_factory_deps(&tx.factory_deps, factory_deps)
}

/// Checks the transaction fields that can be validated without chain state:
/// the transaction type, the gas and pubdata bounds and the fields that must
/// stay unset in an upgrade transaction.
pub fn validate_upgrade_tx_shape(tx: &L2CanonicalTransaction) -> Result<(), UpgradeTxError> {
    if tx.tx_type != U256::from(PROTOCOL_UPGRADE_TX_TYPE) {
        return Err(UpgradeTxError::WrongUpgradeTxType(tx.tx_type));
    }

    // A zero pubdata price would make the pubdata allowance unbounded.
    if tx.gas_per_pubdata_byte_limit.is_zero() {
        return Err(UpgradeTxError::PubdataLimitExceeded {
            pubdata: U256::max_value(),
            max: PRIORITY_TX_MAX_PUBDATA,
        });
    }
    if tx.gas_limit > U256::from(PRIORITY_TX_MAX_GAS_LIMIT) {
        return Err(UpgradeTxError::GasLimitTooLarge {
            gas_limit: tx.gas_limit,
            max: PRIORITY_TX_MAX_GAS_LIMIT,
        });
    }
    let intrinsic_gas = U256::from(L1_TX_INTRINSIC_PUBDATA)
        .checked_mul(tx.gas_per_pubdata_byte_limit)
        .and_then(|gas| gas.checked_add(L1_TX_INTRINSIC_L2_GAS.into()))
        .unwrap_or_else(U256::max_value);
    if tx.gas_limit < intrinsic_gas {
        return Err(UpgradeTxError::InsufficientOverhead {
            gas_limit: tx.gas_limit,
            required: intrinsic_gas,
        });
    }
    let pubdata_allowance = (tx.gas_limit - intrinsic_gas) / tx.gas_per_pubdata_byte_limit;
    if pubdata_allowance > U256::from(PRIORITY_TX_MAX_PUBDATA) {
        return Err(UpgradeTxError::PubdataLimitExceeded {
            pubdata: pubdata_allowance,
            max: PRIORITY_TX_MAX_PUBDATA,
        });
    }

    if !tx.paymaster.is_zero() {
        return Err(UpgradeTxError::NonZeroPaymaster);
    }
    if !tx.value.is_zero() {
        return Err(UpgradeTxError::NonZeroValue);
    }
    // `reserved[0]` keeps the minted-value convention of priority transactions;
    // the remaining slots must stay untouched.
    for (index, reserved) in tx.reserved.iter().enumerate().skip(1) {
        if !reserved.is_zero() {
            return Err(UpgradeTxError::NonZeroReservedField(index));
        }
    }
    if !tx.signature.is_empty() {
        return Err(UpgradeTxError::NonEmptySignature);
    }
    if !tx.paymaster_input.is_empty() {
        return Err(UpgradeTxError::NonEmptyPaymasterInput);
    }
    if !tx.reserved_dynamic.is_empty() {
        return Err(UpgradeTxError::NonEmptyReservedDynamic);
    }

    if tx.factory_deps.len() > MAX_NEW_FACTORY_DEPS {
        return Err(UpgradeTxError::TooManyFactoryDeps(tx.factory_deps.len()));
    }
    Ok(())
}

/// Checks that the submitted bytecodes match the factory dependency hashes
/// declared in the transaction, pairwise and in order.
pub fn validate_factory_deps(
    declared: &[U256],
    provided: &[Vec<u8>],
) -> Result<(), UpgradeTxError> {
    if declared.len() != provided.len() {
        return Err(UpgradeTxError::FactoryDepCountMismatch {
            declared: declared.len(),
            provided: provided.len(),
        });
    }
    for (index, (&declared, bytecode)) in declared.iter().zip(provided).enumerate() {
        let computed = hash_bytecode(bytecode)
            .map_err(|source| UpgradeTxError::MalformedFactoryDep { index, source })?;
        let declared = u256_to_h256(declared);
        if computed != declared {
            return Err(UpgradeTxError::FactoryDepHashMismatch {
                index,
                declared,
                computed,
            });
        }
    }
    Ok(())
}
