//! Conversions between the fixed-size chain types.

use crate::{Address, H256, U256};

pub fn address_to_h256(address: &Address) -> H256 {
    let mut padded = [0_u8; 32];
    padded[12..].copy_from_slice(address.as_bytes());
    H256(padded)
}

pub fn address_to_u256(address: &Address) -> U256 {
    h256_to_u256(address_to_h256(address))
}

pub fn h256_to_address(hash: &H256) -> Address {
    Address::from_slice(&hash.as_bytes()[12..])
}

pub fn h256_to_u256(value: H256) -> U256 {
    U256::from_big_endian(value.as_bytes())
}

pub fn u256_to_h256(value: U256) -> H256 {
    let mut bytes = [0_u8; 32];
    value.to_big_endian(&mut bytes);
    H256(bytes)
}

/// Converts a `U256` value into an address, truncating it to the low 160 bits.
pub fn u256_to_address(value: &U256) -> Address {
    h256_to_address(&u256_to_h256(*value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converting_between_addresses_and_words() {
        let address = Address::repeat_byte(0x42);
        let word = address_to_h256(&address);
        assert_eq!(word.as_bytes()[..12], [0; 12]);
        assert_eq!(h256_to_address(&word), address);

        let value = address_to_u256(&address);
        assert_eq!(u256_to_address(&value), address);
    }
}
