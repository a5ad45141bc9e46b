//! Accounts the toolkit acts as, together with their credential sources.

use rand::Rng;
use serde::{Deserialize, Serialize};
use zkchain_types::{
    web3::signing::{Key, SecretKey, SecretKeyRef},
    Address, H256,
};

/// Source of credentials for an account.
///
/// The set is intentionally closed: config validation reasons about what a wallet
/// is able to do based on the variant alone.
#[derive(Debug, Clone, PartialEq)]
pub enum WalletSource {
    /// A raw private key; the address is derived from it.
    PrivateKey(H256),
    /// A bare address. Such wallets can be observed but cannot sign anything.
    AddressOnly(Address),
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum WalletSourceError {
    #[error("no credential source is set")]
    Empty,
    #[error("both a private key and a bare address are set; remove one of them")]
    Ambiguous,
    #[error("private key is not a valid secp256k1 scalar")]
    MalformedPrivateKey,
    #[error("private key does not correspond to address {expected:?}; derived {actual:?}")]
    AddressMismatch { expected: Address, actual: Address },
}

/// An account identified by its address, optionally carrying the signing key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub address: Address,
    pub private_key: Option<H256>,
}

impl Wallet {
    pub fn from_source(source: WalletSource) -> Result<Self, WalletSourceError> {
        Ok(match source {
            WalletSource::PrivateKey(key) => Self {
                address: derive_address(key)?,
                private_key: Some(key),
            },
            WalletSource::AddressOnly(address) => Self {
                address,
                private_key: None,
            },
        })
    }

    pub fn random(rng: &mut impl Rng) -> Self {
        // A random 32-byte string is a valid secp256k1 scalar with overwhelming probability.
        Self::from_source(WalletSource::PrivateKey(H256(rng.gen()))).unwrap()
    }

    pub fn can_sign(&self) -> bool {
        self.private_key.is_some()
    }

    /// Checks that the private key, if present, actually corresponds to the address.
    ///
    /// Wallets deserialized from config files bypass [`Self::from_source()`], so this
    /// check runs as part of config validation.
    pub fn verify(&self) -> Result<(), WalletSourceError> {
        if let Some(key) = self.private_key {
            let actual = derive_address(key)?;
            if actual != self.address {
                return Err(WalletSourceError::AddressMismatch {
                    expected: self.address,
                    actual,
                });
            }
        }
        Ok(())
    }
}

/// Builder resolving a wallet from at most one credential source.
///
/// The sources are mutually exclusive. A config that specifies both a private key
/// and a bare address is rejected instead of guessing which one wins.
#[derive(Debug, Default)]
#[must_use = "call `build()` to obtain a wallet"]
pub struct WalletBuilder {
    private_key: Option<H256>,
    address: Option<Address>,
}

impl WalletBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn private_key(mut self, key: H256) -> Self {
        self.private_key = Some(key);
        self
    }

    pub fn address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    pub fn build(self) -> Result<Wallet, WalletSourceError> {
        let source = match (self.private_key, self.address) {
            (Some(_), Some(_)) => return Err(WalletSourceError::Ambiguous),
            (Some(key), None) => WalletSource::PrivateKey(key),
            (None, Some(address)) => WalletSource::AddressOnly(address),
            (None, None) => return Err(WalletSourceError::Empty),
        };
        Wallet::from_source(source)
    }
}

fn derive_address(private_key: H256) -> Result<Address, WalletSourceError> {
    let secret = SecretKey::from_slice(private_key.as_bytes())
        .map_err(|_| WalletSourceError::MalformedPrivateKey)?;
    Ok(SecretKeyRef::new(&secret).address())
}
