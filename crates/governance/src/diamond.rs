//! Wire types for EIP-2535 diamond cuts, mirroring the tuple layout expected by
//! the diamond cut facet on L1.

use anyhow::Context as _;
use zkchain_types::{
    ethabi::{self, Token},
    web3::signing::keccak256,
    Address, ProposalId, H256, U256,
};

/// A 4-byte function selector.
pub type Selector = [u8; 4];

/// Formats a selector as `0x`-prefixed hex for error messages and logs.
pub(crate) fn format_selector(selector: &Selector) -> String {
    format!("0x{}", hex::encode(selector))
}

/// The kind of change a [`FacetCut`] applies to the selector registry.
///
/// Discriminant values match the on-chain `Diamond.Action` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacetCutAction {
    Add = 0,
    Replace = 1,
    Remove = 2,
}

impl FacetCutAction {
    fn from_u8(raw: u8) -> anyhow::Result<Self> {
        Ok(match raw {
            0 => Self::Add,
            1 => Self::Replace,
            2 => Self::Remove,
            _ => anyhow::bail!("unknown facet cut action: {raw}"),
        })
    }
}

/// A single facet change within a diamond cut.
///
/// `facet` must be zero for [`FacetCutAction::Remove`] and non-zero otherwise;
/// the planner upholds this and [`DiamondCutData::validate`] re-checks it on
/// externally supplied payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetCut {
    pub facet: Address,
    pub action: FacetCutAction,
    pub is_freezable: bool,
    pub selectors: Vec<Selector>,
}

impl FacetCut {
    /// Encodes the cut to the `(address, uint8, bool, bytes4[])` ABI tuple.
    pub fn encode(&self) -> Token {
        Token::Tuple(vec![
            Token::Address(self.facet),
            Token::Uint((self.action as u8).into()),
            Token::Bool(self.is_freezable),
            Token::Array(
                self.selectors
                    .iter()
                    .map(|selector| Token::FixedBytes(selector.to_vec()))
                    .collect(),
            ),
        ])
    }

    /// Decodes the cut from an ABI token.
    pub fn decode(token: Token) -> anyhow::Result<Self> {
        let tokens = token.into_tuple().context("not a tuple")?;
        anyhow::ensure!(tokens.len() == 4);
        let mut t = tokens.into_iter();
        let mut next = || t.next().unwrap();
        Ok(Self {
            facet: next().into_address().context("facet")?,
            action: {
                let raw = next().into_uint().context("action")?;
                anyhow::ensure!(raw <= U256::from(u8::MAX), "action out of range");
                FacetCutAction::from_u8(raw.as_u32() as u8).context("action")?
            },
            is_freezable: next().into_bool().context("is_freezable")?,
            selectors: next()
                .into_array()
                .context("selectors")?
                .into_iter()
                .enumerate()
                .map(|(i, token)| {
                    let bytes = token.into_fixed_bytes().context(i)?;
                    Selector::try_from(bytes.as_slice()).ok().context(i)
                })
                .collect::<Result<_, _>>()
                .context("selectors")?,
        })
    }
}

/// The full diamond cut payload: facet changes plus an optional initializer call
/// delegate-called by the proxy after the cuts are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiamondCutData {
    pub facet_cuts: Vec<FacetCut>,
    pub init_address: Address,
    pub init_calldata: Vec<u8>,
}

impl DiamondCutData {
    /// Encodes the payload to the ABI tuple accepted by `proposeTransparentUpgrade`
    /// and `executeUpgrade`.
    pub fn encode(&self) -> Token {
        Token::Tuple(vec![
            Token::Array(self.facet_cuts.iter().map(FacetCut::encode).collect()),
            Token::Address(self.init_address),
            Token::Bytes(self.init_calldata.clone()),
        ])
    }

    /// Decodes the payload from an ABI token.
    pub fn decode(token: Token) -> anyhow::Result<Self> {
        let tokens = token.into_tuple().context("not a tuple")?;
        anyhow::ensure!(tokens.len() == 3);
        let mut t = tokens.into_iter();
        let mut next = || t.next().unwrap();
        Ok(Self {
            facet_cuts: next()
                .into_array()
                .context("facet_cuts")?
                .into_iter()
                .map(FacetCut::decode)
                .collect::<Result<_, _>>()
                .context("facet_cuts")?,
            init_address: next().into_address().context("init_address")?,
            init_calldata: next().into_bytes().context("init_calldata")?,
        })
    }

    /// Checks the structural invariants of the payload:
    ///
    /// * a zero initializer address means a no-op initializer, so the calldata
    ///   must be empty;
    /// * `Remove` cuts must carry a zero facet address, `Add` and `Replace` cuts
    ///   a non-zero one.
    pub fn validate(&self) -> Result<(), DiamondCutValidationError> {
        if self.init_address == Address::zero() && !self.init_calldata.is_empty() {
            return Err(DiamondCutValidationError::CalldataWithoutInitializer);
        }
        for cut in &self.facet_cuts {
            let facet_is_zero = cut.facet == Address::zero();
            let facet_must_be_zero = cut.action == FacetCutAction::Remove;
            if facet_is_zero != facet_must_be_zero {
                return Err(DiamondCutValidationError::InvalidFacetAddress {
                    facet: cut.facet,
                    action: cut.action,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DiamondCutValidationError {
    #[error("init calldata is not empty although no initializer address is set")]
    CalldataWithoutInitializer,
    #[error("facet address {facet:?} is invalid for a {action:?} cut")]
    InvalidFacetAddress {
        facet: Address,
        action: FacetCutAction,
    },
}

impl DiamondCutValidationError {
    /// Short stable code mirroring the on-chain revert reason.
    pub fn code(&self) -> &'static str {
        match self {
            Self::CalldataWithoutInitializer => "CALLDATA_WITHOUT_INITIALIZER",
            Self::InvalidFacetAddress { .. } => "INVALID_FACET_ADDRESS",
        }
    }
}

/// Computes the commitment hash of an upgrade proposal.
///
/// The hash binds the full cut payload to the proposal id and salt, so that the
/// later `executeUpgrade` call can be checked against the earlier proposal. It
/// is `keccak256(abi.encode(diamondCut, proposalId, salt))`, exactly as the
/// diamond cut facet computes it on L1.
pub fn proposal_hash(cut: &DiamondCutData, proposal_id: ProposalId, salt: H256) -> H256 {
    let encoded = ethabi::encode(&[
        cut.encode(),
        Token::Uint(proposal_id.0.into()),
        Token::FixedBytes(salt.as_bytes().to_vec()),
    ]);
    H256(keccak256(&encoded))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn sample_cut() -> DiamondCutData {
        DiamondCutData {
            facet_cuts: vec![
                FacetCut {
                    facet: Address::repeat_byte(0x01),
                    action: FacetCutAction::Add,
                    is_freezable: true,
                    selectors: vec![[0xde, 0xad, 0xbe, 0xef], [0x01, 0x02, 0x03, 0x04]],
                },
                FacetCut {
                    facet: Address::zero(),
                    action: FacetCutAction::Remove,
                    is_freezable: false,
                    selectors: vec![[0xca, 0xfe, 0xba, 0xbe]],
                },
            ],
            init_address: Address::repeat_byte(0x42),
            init_calldata: vec![0x11, 0x22, 0x33],
        }
    }

    #[test]
    fn encoding_cut_data_roundtrip() {
        let cut = sample_cut();
        let restored = DiamondCutData::decode(cut.encode()).unwrap();
        assert_eq!(restored, cut);
    }

    #[test]
    fn decoding_rejects_malformed_action() {
        let mut tokens = match sample_cut().facet_cuts[0].encode() {
            Token::Tuple(tokens) => tokens,
            _ => unreachable!(),
        };
        tokens[1] = Token::Uint(3.into());
        let err = FacetCut::decode(Token::Tuple(tokens)).unwrap_err();
        assert!(err.to_string().contains("action"), "{err}");
    }

    #[test]
    fn validating_cut_shape() {
        let mut cut = sample_cut();
        cut.validate().unwrap();

        // No-op initializer cannot carry calldata.
        cut.init_address = Address::zero();
        assert_matches!(
            cut.validate(),
            Err(DiamondCutValidationError::CalldataWithoutInitializer)
        );
        cut.init_calldata = vec![];
        cut.validate().unwrap();

        // Remove cuts must not name a facet.
        cut.facet_cuts[1].facet = Address::repeat_byte(0x05);
        assert_matches!(
            cut.validate(),
            Err(DiamondCutValidationError::InvalidFacetAddress {
                action: FacetCutAction::Remove,
                ..
            })
        );
        cut.facet_cuts[1].facet = Address::zero();

        // Add cuts must name one.
        cut.facet_cuts[0].facet = Address::zero();
        assert_matches!(
            cut.validate(),
            Err(DiamondCutValidationError::InvalidFacetAddress {
                action: FacetCutAction::Add,
                ..
            })
        );
    }

    #[test]
    fn proposal_hash_is_sensitive_to_all_inputs() {
        let cut = sample_cut();
        let base = proposal_hash(&cut, ProposalId(1), H256::zero());
        assert_eq!(proposal_hash(&cut, ProposalId(1), H256::zero()), base);

        assert_ne!(proposal_hash(&cut, ProposalId(2), H256::zero()), base);
        assert_ne!(
            proposal_hash(&cut, ProposalId(1), H256::repeat_byte(0x01)),
            base
        );
        let mut other_cut = cut.clone();
        other_cut.init_calldata.push(0x00);
        assert_ne!(proposal_hash(&other_cut, ProposalId(1), H256::zero()), base);
    }
}
