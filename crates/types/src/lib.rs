//! The most primitive types used across the ZK chain deployment toolkit:
//! thin newtypes over, and re-exports of, `web3` primitives.

#[macro_use]
mod macros;

pub mod abi;
pub mod address;
pub mod bytecode;
pub mod convert;
pub mod protocol_version;

pub use crate::protocol_version::ProtocolVersionId;

use std::{
    fmt,
    num::ParseIntError,
    ops::{Add, Deref, DerefMut, Sub},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
pub use web3;
pub use web3::{
    ethabi,
    types::{Address, Bytes, Log, TransactionReceipt, H160, H256, U256, U64},
};

/// Transaction type of an L1->L2 priority operation inside the L2 transaction format.
pub const PRIORITY_OPERATION_L2_TX_TYPE: u8 = 0xff;

/// Transaction type of a protocol upgrade transaction inside the L2 transaction format.
pub const PROTOCOL_UPGRADE_TX_TYPE: u8 = 0xfe;

basic_type!(
    /// Sequential index of an L1 block.
    L1BlockNumber,
    u32
);

basic_type!(
    /// Unique identifier of a priority operation in the rollup network.
    PriorityOpId,
    u64
);

basic_type!(
    /// Sequential identifier of a diamond upgrade proposal.
    ProposalId,
    u64
);

basic_type!(
    /// ChainId of the settlement (L1) network.
    L1ChainId,
    u64
);

basic_type!(
    /// ChainId of the rollup (L2) network.
    L2ChainId,
    u64
);

#[allow(clippy::derivable_impls)]
impl Default for L1BlockNumber {
    fn default() -> Self {
        Self(0)
    }
}

#[allow(clippy::derivable_impls)]
impl Default for PriorityOpId {
    fn default() -> Self {
        Self(0)
    }
}

#[allow(clippy::derivable_impls)]
impl Default for ProposalId {
    fn default() -> Self {
        Self(0)
    }
}

impl Default for L2ChainId {
    fn default() -> Self {
        Self(270)
    }
}
