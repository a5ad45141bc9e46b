//! Deterministic address derivation and cross-layer address aliasing.

use crate::{
    bytecode::{hash_bytecode, InvalidBytecodeError},
    convert::{address_to_h256, address_to_u256, u256_to_address},
    web3::signing::keccak256,
    Address, H160, H256, U256,
};

/// Offset applied to an L1 contract address when it acts as the origin of an L2-bound
/// message, so that it can never collide with an L2 account at the same numeric address.
pub const L1_TO_L2_ALIAS_OFFSET: Address = H160([
    0x11, 0x11, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x11, 0x11,
]);

/// Pre-calculates the address of a contract deployed on L2 via CREATE2.
///
/// The scheme is deliberately distinct from standard EVM CREATE2: the hash chain is
/// domain-separated with `keccak256("zksyncCreate2")` and commits to the versioned
/// bytecode hash rather than to the init code.
pub fn deployed_address_create2(
    sender: Address,
    bytecode_hash: H256,
    salt: H256,
    constructor_input: &[u8],
) -> Address {
    // 5 words: domain separator, padded sender, salt, bytecode hash, input hash.
    let mut preimage = Vec::with_capacity(160);
    preimage.extend_from_slice(&keccak256(b"zksyncCreate2"));
    preimage.extend_from_slice(address_to_h256(&sender).as_bytes());
    preimage.extend_from_slice(salt.as_bytes());
    preimage.extend_from_slice(bytecode_hash.as_bytes());
    preimage.extend_from_slice(&keccak256(constructor_input));
    Address::from_slice(&keccak256(&preimage)[12..])
}

/// Hashes the bytecode and derives the CREATE2 address in one go.
/// Fails if the bytecode violates the format invariants.
pub fn derive_address(
    sender: Address,
    bytecode: &[u8],
    constructor_input: &[u8],
    salt: H256,
) -> Result<Address, InvalidBytecodeError> {
    let bytecode_hash = hash_bytecode(bytecode)?;
    Ok(deployed_address_create2(
        sender,
        bytecode_hash,
        salt,
        constructor_input,
    ))
}

/// Pre-calculates the address of an EVM contract created with an ordinary deployment
/// transaction (CREATE semantics keyed by sender and nonce).
pub fn deployed_address_evm_create(sender: Address, deploy_nonce: U256) -> Address {
    let mut rlp = rlp::RlpStream::new_list(2);
    rlp.append(&sender);
    rlp.append(&deploy_nonce);
    Address::from_slice(&keccak256(&rlp.out())[12..])
}

/// Applies the L1->L2 alias to an address, wrapping around the 160-bit boundary.
pub fn apply_l1_to_l2_alias(address: Address) -> Address {
    let aliased = address_to_u256(&address) + address_to_u256(&L1_TO_L2_ALIAS_OFFSET);
    u256_to_address(&aliased)
}

/// Exact inverse of [`apply_l1_to_l2_alias`]. The modulus is added before
/// subtracting so the intermediate value never underflows.
pub fn undo_l1_to_l2_alias(address: Address) -> Address {
    let modulus = U256::one() << 160;
    let unaliased = address_to_u256(&address) + modulus - address_to_u256(&L1_TO_L2_ALIAS_OFFSET);
    u256_to_address(&unaliased)
}
