use std::{fs, path::Path, time::Duration};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use zkchain_types::{Address, L1ChainId, L2ChainId, H256};

use crate::wallets::{Wallet, WalletSourceError};

/// Validation errors for [`DeployConfig`].
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DeployConfigError {
    #[error("{0} chain ID must not be zero")]
    ZeroChainId(&'static str),
    #[error("invalid {0} wallet: {1}")]
    Wallet(&'static str, #[source] WalletSourceError),
    #[error("deployer wallet has no private key, so deployment transactions cannot be signed")]
    UnsignableDeployer,
    #[error("polling interval must be positive")]
    ZeroPollInterval,
    #[error("maximum polling attempt count must be positive")]
    ZeroPollAttempts,
}

/// Startup configuration of the deployment toolkit.
///
/// The config is validated once, right after it is built or read from a file;
/// the rest of the toolkit assumes a valid config and does not re-check it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    pub l1_chain_id: L1ChainId,
    pub l2_chain_id: L2ChainId,
    /// Account submitting deployment transactions. Must be able to sign.
    pub deployer: Wallet,
    /// Account governing the diamond proxy. May be address-only, e.g. when the
    /// governor is a multisig and transactions are merely prepared for it.
    pub governor: Wallet,
    /// Address of the diamond proxy, if it is already deployed.
    #[serde(default)]
    pub diamond_proxy_addr: Option<Address>,
    /// Salt for CREATE2 address derivation on the L2 side.
    #[serde(default)]
    pub create2_salt: H256,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: usize,
}

impl DeployConfig {
    /// Reads the config from a JSON file and validates it.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading deploy config from {path:?}"))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing deploy config at {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DeployConfigError> {
        if self.l1_chain_id.0 == 0 {
            return Err(DeployConfigError::ZeroChainId("L1"));
        }
        if self.l2_chain_id.0 == 0 {
            return Err(DeployConfigError::ZeroChainId("L2"));
        }
        self.deployer
            .verify()
            .map_err(|err| DeployConfigError::Wallet("deployer", err))?;
        self.governor
            .verify()
            .map_err(|err| DeployConfigError::Wallet("governor", err))?;
        if !self.deployer.can_sign() {
            return Err(DeployConfigError::UnsignableDeployer);
        }
        if self.poll_interval_ms == 0 {
            return Err(DeployConfigError::ZeroPollInterval);
        }
        if self.max_poll_attempts == 0 {
            return Err(DeployConfigError::ZeroPollAttempts);
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::wallets::WalletBuilder;

    fn valid_config() -> DeployConfig {
        let mut rng = StdRng::seed_from_u64(42);
        DeployConfig {
            l1_chain_id: L1ChainId(9),
            l2_chain_id: L2ChainId(270),
            deployer: Wallet::random(&mut rng),
            governor: WalletBuilder::new().address(Address::repeat_byte(0x42)).build().unwrap(),
            diamond_proxy_addr: None,
            create2_salt: H256::zero(),
            poll_interval_ms: 100,
            max_poll_attempts: 10,
        }
    }

    #[test]
    fn validating_config() {
        valid_config().validate().unwrap();

        let mut config = valid_config();
        config.l1_chain_id = L1ChainId(0);
        assert_matches!(
            config.validate().unwrap_err(),
            DeployConfigError::ZeroChainId("L1")
        );

        let mut config = valid_config();
        config.deployer = config.governor.clone();
        assert_matches!(
            config.validate().unwrap_err(),
            DeployConfigError::UnsignableDeployer
        );

        let mut config = valid_config();
        config.poll_interval_ms = 0;
        assert_matches!(
            config.validate().unwrap_err(),
            DeployConfigError::ZeroPollInterval
        );

        let mut config = valid_config();
        config.max_poll_attempts = 0;
        assert_matches!(
            config.validate().unwrap_err(),
            DeployConfigError::ZeroPollAttempts
        );
    }

    #[test]
    fn detecting_tampered_wallets() {
        let mut config = valid_config();
        config.deployer.address = Address::repeat_byte(0x66);
        assert_matches!(
            config.validate().unwrap_err(),
            DeployConfigError::Wallet("deployer", WalletSourceError::AddressMismatch { .. })
        );
    }

    #[test]
    fn reading_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.json");
        let config = valid_config();
        fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let read = DeployConfig::from_file(&path).unwrap();
        assert_eq!(read.l2_chain_id, config.l2_chain_id);
        assert_eq!(read.deployer.address, config.deployer.address);
        assert_eq!(read.governor.private_key, None);
    }
}
