//! Startup configuration for the ZK chain deployment toolkit: the validated deploy
//! config, wallet credential sources and the persistent deployed-address store.

mod deploy;
pub mod deployed_addresses;
pub mod wallets;

pub use crate::{
    deploy::{DeployConfig, DeployConfigError},
    deployed_addresses::{AddressStoreError, DeployedAddresses},
    wallets::{Wallet, WalletBuilder, WalletSource, WalletSourceError},
};
