//! Protocol version identifiers gating system-contract upgrades.

use std::{
    fmt,
    num::ParseIntError,
    ops::{Add, Deref, DerefMut, Sub},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::U256;

pub const PACKED_SEMVER_MINOR_OFFSET: u32 = 32;
pub const PACKED_SEMVER_MINOR_MASK: u32 = 0xFFFF;

basic_type!(
    /// Minor protocol version. Unlike the on-chain counter it is open-ended: the
    /// toolkit must accept versions that did not exist when it was built.
    ProtocolVersionId,
    u16
);

basic_type!(
    /// Patch part of the protocol semantic version. Patch bumps do not require an
    /// upgrade transaction on L2.
    VersionPatch,
    u32
);

/// Semantic protocol version of the form `0.minor.patch`, packed on-chain into a
/// single word as `minor << 32 | patch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProtocolSemanticVersion {
    pub minor: ProtocolVersionId,
    pub patch: VersionPatch,
}

impl ProtocolSemanticVersion {
    const MAJOR_VERSION: u8 = 0;

    pub fn new(minor: ProtocolVersionId, patch: VersionPatch) -> Self {
        Self { minor, patch }
    }

    pub fn try_from_packed(packed: U256) -> Result<Self, String> {
        if !(packed >> (PACKED_SEMVER_MINOR_OFFSET + 16)).is_zero() {
            return Err("packed protocol version has bits beyond the minor component".into());
        }
        let minor = (packed >> PACKED_SEMVER_MINOR_OFFSET).low_u64() as u16;
        Ok(Self {
            minor: ProtocolVersionId(minor),
            patch: VersionPatch(packed.low_u32()),
        })
    }

    pub fn pack(&self) -> U256 {
        (U256::from(self.minor.0) << PACKED_SEMVER_MINOR_OFFSET) | U256::from(self.patch.0)
    }
}

impl fmt::Display for ProtocolSemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", Self::MAJOR_VERSION, self.minor.0, self.patch)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseProtocolSemanticVersionError {
    #[error("invalid format")]
    InvalidFormat,
    #[error("non-zero major version")]
    NonZeroMajorVersion,
    #[error("{0}")]
    ParseIntError(ParseIntError),
}

impl FromStr for ProtocolSemanticVersion {
    type Err = ParseProtocolSemanticVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let int_err = ParseProtocolSemanticVersionError::ParseIntError;
        let mut parts = s.split('.');
        let (Some(major), Some(minor), Some(patch), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseProtocolSemanticVersionError::InvalidFormat);
        };

        if major.parse::<u16>().map_err(int_err)? != 0 {
            return Err(ParseProtocolSemanticVersionError::NonZeroMajorVersion);
        }
        let minor = ProtocolVersionId(minor.parse().map_err(int_err)?);
        let patch = VersionPatch(patch.parse().map_err(int_err)?);
        Ok(Self { minor, patch })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn packing_round_trips() {
        let version = ProtocolSemanticVersion::new(ProtocolVersionId(26), VersionPatch(3));
        let packed = version.pack();
        assert_eq!(packed, (U256::from(26u64) << 32) | U256::from(3u64));
        assert_eq!(
            ProtocolSemanticVersion::try_from_packed(packed).unwrap(),
            version
        );
    }

    #[test]
    fn unpacking_rejects_junk_beyond_the_minor_component() {
        let junk = U256::one() << 48;
        assert!(ProtocolSemanticVersion::try_from_packed(junk).is_err());
    }

    #[test]
    fn parsing_and_display() {
        let version: ProtocolSemanticVersion = "0.26.0".parse().unwrap();
        assert_eq!(version.minor, ProtocolVersionId(26));
        assert_eq!(version.patch, VersionPatch(0));
        assert_eq!(version.to_string(), "0.26.0");

        assert_matches!(
            "1.26.0".parse::<ProtocolSemanticVersion>(),
            Err(ParseProtocolSemanticVersionError::NonZeroMajorVersion)
        );
        assert_matches!(
            "26.0".parse::<ProtocolSemanticVersion>(),
            Err(ParseProtocolSemanticVersionError::InvalidFormat)
        );
    }
}
