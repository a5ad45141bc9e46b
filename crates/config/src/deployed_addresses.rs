//! Persistent registry of deployed contract addresses.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use zkchain_types::Address;

/// Format version written to new address files.
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AddressStoreError {
    #[error("address for `{0}` is already recorded; use `record_overwrite()` to replace it")]
    AlreadyRecorded(String),
    #[error("unsupported address file format version {0} (expected {FORMAT_VERSION})")]
    UnsupportedVersion(u32),
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredAddresses {
    format_version: u32,
    #[serde(default)]
    addresses: BTreeMap<String, Address>,
}

/// File-backed registry of deployed contract addresses keyed by dotted logical names,
/// e.g. `Bridgehub.DiamondProxy`.
///
/// Every mutation is persisted immediately, so an interrupted deployment leaves behind
/// the addresses of everything that did reach the chain. Whether to reuse or redeploy
/// on a restart is the caller's decision; the store never skips or drops entries on
/// its own.
#[derive(Debug)]
pub struct DeployedAddresses {
    path: PathBuf,
    addresses: BTreeMap<String, Address>,
}

impl DeployedAddresses {
    /// Creates an empty store that will be persisted at `path` on the first mutation.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            addresses: BTreeMap::new(),
        }
    }

    /// Loads the store from `path`. A missing file yields an empty store.
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self::new(path));
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed reading deployed addresses from {path:?}"))?;
        let stored: StoredAddresses = serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing deployed addresses at {path:?}"))?;
        if stored.format_version != FORMAT_VERSION {
            return Err(AddressStoreError::UnsupportedVersion(stored.format_version).into());
        }
        Ok(Self {
            path,
            addresses: stored.addresses,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, name: &str) -> Option<Address> {
        self.addresses.get(name).copied()
    }

    pub fn is_recorded(&self, name: &str) -> bool {
        self.addresses.contains_key(name)
    }

    /// Iterates over recorded `(name, address)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Address)> + '_ {
        self.addresses
            .iter()
            .map(|(name, address)| (name.as_str(), *address))
    }

    /// Records a new address and persists the store. Refuses to overwrite an existing
    /// record; overwriting must be requested explicitly via [`Self::record_overwrite()`].
    pub fn record(&mut self, name: &str, address: Address) -> anyhow::Result<()> {
        if self.addresses.contains_key(name) {
            return Err(AddressStoreError::AlreadyRecorded(name.to_owned()).into());
        }
        self.addresses.insert(name.to_owned(), address);
        self.save()
    }

    /// Records an address, replacing the existing record if there is one, and persists
    /// the store.
    pub fn record_overwrite(&mut self, name: &str, address: Address) -> anyhow::Result<()> {
        self.addresses.insert(name.to_owned(), address);
        self.save()
    }

    fn save(&self) -> anyhow::Result<()> {
        let stored = StoredAddresses {
            format_version: FORMAT_VERSION,
            addresses: self.addresses.clone(),
        };
        let json = serde_json::to_string_pretty(&stored).context("failed serializing addresses")?;
        // Write to a temporary file first, then rename, so that a crash mid-write
        // cannot corrupt the store.
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .with_context(|| format!("failed writing addresses to {tmp_path:?}"))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("failed moving {tmp_path:?} to {:?}", self.path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn recording_and_reloading_addresses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("addresses.json");

        let mut store = DeployedAddresses::load(&path).unwrap();
        assert_eq!(store.iter().count(), 0);
        store
            .record("Bridgehub.DiamondProxy", Address::repeat_byte(1))
            .unwrap();
        store
            .record("Bridgehub.GettersFacet", Address::repeat_byte(2))
            .unwrap();

        let reloaded = DeployedAddresses::load(&path).unwrap();
        assert_eq!(
            reloaded.get("Bridgehub.DiamondProxy"),
            Some(Address::repeat_byte(1))
        );
        assert_eq!(
            reloaded.get("Bridgehub.GettersFacet"),
            Some(Address::repeat_byte(2))
        );
        assert!(reloaded.is_recorded("Bridgehub.DiamondProxy"));
        assert!(!reloaded.is_recorded("Bridgehub.Mailbox"));
    }

    #[test]
    fn refusing_silent_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("addresses.json");

        let mut store = DeployedAddresses::new(&path);
        store.record("Facet", Address::repeat_byte(1)).unwrap();
        let err = store.record("Facet", Address::repeat_byte(2)).unwrap_err();
        assert_matches!(
            err.downcast_ref::<AddressStoreError>(),
            Some(AddressStoreError::AlreadyRecorded(name)) if name == "Facet"
        );
        // The old record is intact.
        assert_eq!(store.get("Facet"), Some(Address::repeat_byte(1)));

        store.record_overwrite("Facet", Address::repeat_byte(2)).unwrap();
        assert_eq!(store.get("Facet"), Some(Address::repeat_byte(2)));
    }

    #[test]
    fn rejecting_unsupported_format_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("addresses.json");
        fs::write(&path, r#"{"format_version": 99, "addresses": {}}"#).unwrap();

        let err = DeployedAddresses::load(&path).unwrap_err();
        assert_matches!(
            err.downcast_ref::<AddressStoreError>(),
            Some(AddressStoreError::UnsupportedVersion(99))
        );
    }

    #[test]
    fn mutations_persist_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("addresses.json");

        let mut store = DeployedAddresses::new(&path);
        store.record("First", Address::repeat_byte(1)).unwrap();
        // Drop the store without any explicit flush; the file must already be complete.
        drop(store);
        let reloaded = DeployedAddresses::load(&path).unwrap();
        assert_eq!(reloaded.get("First"), Some(Address::repeat_byte(1)));
    }
}
