//! Calldata builders for the governance functions exposed by the diamond cut
//! facet.

use zkchain_types::{ethabi::Token, ProposalId, H256};

use crate::diamond::DiamondCutData;

fn encode_call(function: &str, tokens: &[Token]) -> Vec<u8> {
    let contract = zkchain_contracts::diamond_cut_facet_contract();
    contract
        .function(function)
        .expect("failed to get function parameters")
        .encode_input(tokens)
        .expect("failed to encode parameters")
}

pub fn propose_transparent_upgrade_calldata(
    cut: &DiamondCutData,
    proposal_id: ProposalId,
) -> Vec<u8> {
    encode_call(
        "proposeTransparentUpgrade",
        &[cut.encode(), Token::Uint(proposal_id.0.into())],
    )
}

pub fn propose_shadow_upgrade_calldata(proposal_hash: H256, proposal_id: ProposalId) -> Vec<u8> {
    encode_call(
        "proposeShadowUpgrade",
        &[
            Token::FixedBytes(proposal_hash.as_bytes().to_vec()),
            Token::Uint(proposal_id.0.into()),
        ],
    )
}

/// Calldata executing a transparent upgrade; such upgrades are committed with
/// an empty salt.
pub fn execute_upgrade_calldata(cut: &DiamondCutData) -> Vec<u8> {
    execute_upgrade_with_salt_calldata(cut, H256::zero())
}

pub fn execute_upgrade_with_salt_calldata(cut: &DiamondCutData, salt: H256) -> Vec<u8> {
    encode_call(
        "executeUpgrade",
        &[cut.encode(), Token::FixedBytes(salt.as_bytes().to_vec())],
    )
}

pub fn cancel_upgrade_proposal_calldata(proposal_hash: H256) -> Vec<u8> {
    encode_call(
        "cancelUpgradeProposal",
        &[Token::FixedBytes(proposal_hash.as_bytes().to_vec())],
    )
}

pub fn freeze_diamond_calldata() -> Vec<u8> {
    encode_call("freezeDiamond", &[])
}

pub fn unfreeze_diamond_calldata() -> Vec<u8> {
    encode_call("unfreezeDiamond", &[])
}

#[cfg(test)]
mod tests {
    use zkchain_types::{Address, U256};

    use super::*;
    use crate::diamond::{FacetCut, FacetCutAction};

    fn sample_cut() -> DiamondCutData {
        DiamondCutData {
            facet_cuts: vec![FacetCut {
                facet: Address::repeat_byte(0x01),
                action: FacetCutAction::Add,
                is_freezable: true,
                selectors: vec![[0xde, 0xad, 0xbe, 0xef]],
            }],
            init_address: Address::repeat_byte(0x42),
            init_calldata: vec![0x11, 0x22],
        }
    }

    #[test]
    fn building_proposal_calldata() {
        let cut = sample_cut();
        let calldata = propose_transparent_upgrade_calldata(&cut, ProposalId(7));

        let contract = zkchain_contracts::diamond_cut_facet_contract();
        let function = contract.function("proposeTransparentUpgrade").unwrap();
        assert_eq!(calldata[..4], function.short_signature());

        let tokens = function.decode_input(&calldata[4..]).unwrap();
        assert_eq!(DiamondCutData::decode(tokens[0].clone()).unwrap(), cut);
        assert_eq!(tokens[1], Token::Uint(7.into()));
    }

    #[test]
    fn building_execution_calldata() {
        let cut = sample_cut();
        let salt = H256::repeat_byte(0x5a);
        let calldata = execute_upgrade_with_salt_calldata(&cut, salt);

        let contract = zkchain_contracts::diamond_cut_facet_contract();
        let function = contract.function("executeUpgrade").unwrap();
        let tokens = function.decode_input(&calldata[4..]).unwrap();
        assert_eq!(DiamondCutData::decode(tokens[0].clone()).unwrap(), cut);
        assert_eq!(tokens[1], Token::FixedBytes(salt.as_bytes().to_vec()));

        // The transparent flavor just pins the salt to zero.
        let transparent = execute_upgrade_calldata(&cut);
        let tokens = function.decode_input(&transparent[4..]).unwrap();
        assert_eq!(tokens[1], Token::FixedBytes(vec![0; 32]));
    }

    #[test]
    fn building_management_calldata() {
        let contract = zkchain_contracts::diamond_cut_facet_contract();
        let hash = H256::repeat_byte(0x33);

        let calldata = propose_shadow_upgrade_calldata(hash, ProposalId(2));
        let function = contract.function("proposeShadowUpgrade").unwrap();
        let tokens = function.decode_input(&calldata[4..]).unwrap();
        assert_eq!(tokens[0], Token::FixedBytes(hash.as_bytes().to_vec()));
        assert_eq!(tokens[1], Token::Uint(U256::from(2)));

        let calldata = cancel_upgrade_proposal_calldata(hash);
        let function = contract.function("cancelUpgradeProposal").unwrap();
        let tokens = function.decode_input(&calldata[4..]).unwrap();
        assert_eq!(tokens[0], Token::FixedBytes(hash.as_bytes().to_vec()));

        let freeze = freeze_diamond_calldata();
        let function = contract.function("freezeDiamond").unwrap();
        assert_eq!(freeze, function.short_signature().to_vec());

        let unfreeze = unfreeze_diamond_calldata();
        let function = contract.function("unfreezeDiamond").unwrap();
        assert_eq!(unfreeze, function.short_signature().to_vec());
    }
}
