//! ABI definitions for the L1 diamond proxy facets and the L2 system contracts
//! that the deployment toolkit interacts with.
//!
//! The ABIs are embedded so that the toolkit does not depend on compiled contract
//! artifacts being present at run time. Bytecode, on the other hand, is always read
//! from an explicitly provided artifact path.

use std::{fs::File, path::Path};

use ethabi::{ethereum_types::H160, Contract, Function};
use once_cell::sync::Lazy;
use serde_json::Value;

/// Address of the contract deployer system contract on the L2 side.
pub const L2_DEPLOYER_SYSTEM_CONTRACT_ADDR: H160 = H160([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x80, 0x06,
]);

/// ABI of the facet responsible for proposing, executing and cancelling
/// diamond upgrades, and for freezing the diamond proxy.
pub const DIAMOND_CUT_FACET_ABI: &str = r#"
[
    {
        "inputs": [
            {
                "components": [
                    {
                        "components": [
                            {
                                "internalType": "address",
                                "name": "facet",
                                "type": "address"
                            },
                            {
                                "internalType": "enum Diamond.Action",
                                "name": "action",
                                "type": "uint8"
                            },
                            {
                                "internalType": "bool",
                                "name": "isFreezable",
                                "type": "bool"
                            },
                            {
                                "internalType": "bytes4[]",
                                "name": "selectors",
                                "type": "bytes4[]"
                            }
                        ],
                        "internalType": "struct Diamond.FacetCut[]",
                        "name": "facetCuts",
                        "type": "tuple[]"
                    },
                    {
                        "internalType": "address",
                        "name": "initAddress",
                        "type": "address"
                    },
                    {
                        "internalType": "bytes",
                        "name": "initCalldata",
                        "type": "bytes"
                    }
                ],
                "internalType": "struct Diamond.DiamondCutData",
                "name": "_diamondCut",
                "type": "tuple"
            },
            {
                "internalType": "uint40",
                "name": "_proposalId",
                "type": "uint40"
            }
        ],
        "name": "proposeTransparentUpgrade",
        "outputs": [],
        "stateMutability": "nonpayable",
        "type": "function"
    },
    {
        "inputs": [
            {
                "internalType": "bytes32",
                "name": "_proposalHash",
                "type": "bytes32"
            },
            {
                "internalType": "uint40",
                "name": "_proposalId",
                "type": "uint40"
            }
        ],
        "name": "proposeShadowUpgrade",
        "outputs": [],
        "stateMutability": "nonpayable",
        "type": "function"
    },
    {
        "inputs": [
            {
                "internalType": "bytes32",
                "name": "_proposedUpgradeHash",
                "type": "bytes32"
            }
        ],
        "name": "cancelUpgradeProposal",
        "outputs": [],
        "stateMutability": "nonpayable",
        "type": "function"
    },
    {
        "inputs": [
            {
                "components": [
                    {
                        "components": [
                            {
                                "internalType": "address",
                                "name": "facet",
                                "type": "address"
                            },
                            {
                                "internalType": "enum Diamond.Action",
                                "name": "action",
                                "type": "uint8"
                            },
                            {
                                "internalType": "bool",
                                "name": "isFreezable",
                                "type": "bool"
                            },
                            {
                                "internalType": "bytes4[]",
                                "name": "selectors",
                                "type": "bytes4[]"
                            }
                        ],
                        "internalType": "struct Diamond.FacetCut[]",
                        "name": "facetCuts",
                        "type": "tuple[]"
                    },
                    {
                        "internalType": "address",
                        "name": "initAddress",
                        "type": "address"
                    },
                    {
                        "internalType": "bytes",
                        "name": "initCalldata",
                        "type": "bytes"
                    }
                ],
                "internalType": "struct Diamond.DiamondCutData",
                "name": "_diamondCut",
                "type": "tuple"
            },
            {
                "internalType": "bytes32",
                "name": "_proposalSalt",
                "type": "bytes32"
            }
        ],
        "name": "executeUpgrade",
        "outputs": [],
        "stateMutability": "nonpayable",
        "type": "function"
    },
    {
        "inputs": [],
        "name": "freezeDiamond",
        "outputs": [],
        "stateMutability": "nonpayable",
        "type": "function"
    },
    {
        "inputs": [],
        "name": "unfreezeDiamond",
        "outputs": [],
        "stateMutability": "nonpayable",
        "type": "function"
    },
    {
        "inputs": [],
        "name": "getName",
        "outputs": [
            {
                "internalType": "string",
                "name": "",
                "type": "string"
            }
        ],
        "stateMutability": "view",
        "type": "function"
    },
    {
        "anonymous": false,
        "inputs": [
            {
                "components": [
                    {
                        "components": [
                            {
                                "internalType": "address",
                                "name": "facet",
                                "type": "address"
                            },
                            {
                                "internalType": "enum Diamond.Action",
                                "name": "action",
                                "type": "uint8"
                            },
                            {
                                "internalType": "bool",
                                "name": "isFreezable",
                                "type": "bool"
                            },
                            {
                                "internalType": "bytes4[]",
                                "name": "selectors",
                                "type": "bytes4[]"
                            }
                        ],
                        "internalType": "struct Diamond.FacetCut[]",
                        "name": "facetCuts",
                        "type": "tuple[]"
                    },
                    {
                        "internalType": "address",
                        "name": "initAddress",
                        "type": "address"
                    },
                    {
                        "internalType": "bytes",
                        "name": "initCalldata",
                        "type": "bytes"
                    }
                ],
                "indexed": false,
                "internalType": "struct Diamond.DiamondCutData",
                "name": "diamondCut",
                "type": "tuple"
            },
            {
                "indexed": true,
                "internalType": "uint256",
                "name": "proposalId",
                "type": "uint256"
            },
            {
                "indexed": false,
                "internalType": "bytes32",
                "name": "proposalSalt",
                "type": "bytes32"
            }
        ],
        "name": "ProposeTransparentUpgrade",
        "type": "event"
    },
    {
        "anonymous": false,
        "inputs": [
            {
                "indexed": true,
                "internalType": "uint256",
                "name": "proposalId",
                "type": "uint256"
            },
            {
                "indexed": false,
                "internalType": "bytes32",
                "name": "proposalHash",
                "type": "bytes32"
            }
        ],
        "name": "ProposeShadowUpgrade",
        "type": "event"
    },
    {
        "anonymous": false,
        "inputs": [
            {
                "indexed": true,
                "internalType": "uint256",
                "name": "proposalId",
                "type": "uint256"
            },
            {
                "indexed": false,
                "internalType": "bytes32",
                "name": "proposalHash",
                "type": "bytes32"
            }
        ],
        "name": "CancelUpgradeProposal",
        "type": "event"
    },
    {
        "anonymous": false,
        "inputs": [
            {
                "components": [
                    {
                        "components": [
                            {
                                "internalType": "address",
                                "name": "facet",
                                "type": "address"
                            },
                            {
                                "internalType": "enum Diamond.Action",
                                "name": "action",
                                "type": "uint8"
                            },
                            {
                                "internalType": "bool",
                                "name": "isFreezable",
                                "type": "bool"
                            },
                            {
                                "internalType": "bytes4[]",
                                "name": "selectors",
                                "type": "bytes4[]"
                            }
                        ],
                        "internalType": "struct Diamond.FacetCut[]",
                        "name": "facetCuts",
                        "type": "tuple[]"
                    },
                    {
                        "internalType": "address",
                        "name": "initAddress",
                        "type": "address"
                    },
                    {
                        "internalType": "bytes",
                        "name": "initCalldata",
                        "type": "bytes"
                    }
                ],
                "indexed": false,
                "internalType": "struct Diamond.DiamondCutData",
                "name": "diamondCut",
                "type": "tuple"
            },
            {
                "indexed": true,
                "internalType": "uint256",
                "name": "proposalId",
                "type": "uint256"
            },
            {
                "indexed": false,
                "internalType": "bytes32",
                "name": "proposalSalt",
                "type": "bytes32"
            }
        ],
        "name": "ExecuteUpgrade",
        "type": "event"
    },
    {
        "anonymous": false,
        "inputs": [],
        "name": "Freeze",
        "type": "event"
    },
    {
        "anonymous": false,
        "inputs": [],
        "name": "Unfreeze",
        "type": "event"
    }
]
"#;

/// ABI of the read-only facet exposing the diamond introspection methods.
pub const GETTERS_FACET_ABI: &str = r#"
[
    {
        "inputs": [],
        "name": "facets",
        "outputs": [
            {
                "components": [
                    {
                        "internalType": "address",
                        "name": "addr",
                        "type": "address"
                    },
                    {
                        "internalType": "bytes4[]",
                        "name": "selectors",
                        "type": "bytes4[]"
                    }
                ],
                "internalType": "struct IGetters.Facet[]",
                "name": "",
                "type": "tuple[]"
            }
        ],
        "stateMutability": "view",
        "type": "function"
    },
    {
        "inputs": [],
        "name": "isDiamondStorageFrozen",
        "outputs": [
            {
                "internalType": "bool",
                "name": "",
                "type": "bool"
            }
        ],
        "stateMutability": "view",
        "type": "function"
    },
    {
        "inputs": [],
        "name": "getProposedUpgradeHash",
        "outputs": [
            {
                "internalType": "bytes32",
                "name": "",
                "type": "bytes32"
            }
        ],
        "stateMutability": "view",
        "type": "function"
    },
    {
        "inputs": [],
        "name": "getProtocolVersion",
        "outputs": [
            {
                "internalType": "uint256",
                "name": "",
                "type": "uint256"
            }
        ],
        "stateMutability": "view",
        "type": "function"
    },
    {
        "inputs": [
            {
                "internalType": "address",
                "name": "_facet",
                "type": "address"
            }
        ],
        "name": "isFacetFreezable",
        "outputs": [
            {
                "internalType": "bool",
                "name": "isFreezable",
                "type": "bool"
            }
        ],
        "stateMutability": "view",
        "type": "function"
    },
    {
        "inputs": [
            {
                "internalType": "bytes4",
                "name": "_selector",
                "type": "bytes4"
            }
        ],
        "name": "isFunctionFreezable",
        "outputs": [
            {
                "internalType": "bool",
                "name": "",
                "type": "bool"
            }
        ],
        "stateMutability": "view",
        "type": "function"
    },
    {
        "inputs": [],
        "name": "getName",
        "outputs": [
            {
                "internalType": "string",
                "name": "",
                "type": "string"
            }
        ],
        "stateMutability": "view",
        "type": "function"
    }
]
"#;

/// ABI of the facet accepting L1 -> L2 priority transactions.
pub const MAILBOX_FACET_ABI: &str = r#"
[
    {
        "inputs": [
            {
                "internalType": "address",
                "name": "_contractL2",
                "type": "address"
            },
            {
                "internalType": "uint256",
                "name": "_l2Value",
                "type": "uint256"
            },
            {
                "internalType": "bytes",
                "name": "_calldata",
                "type": "bytes"
            },
            {
                "internalType": "uint256",
                "name": "_l2GasLimit",
                "type": "uint256"
            },
            {
                "internalType": "uint256",
                "name": "_l2GasPerPubdataByteLimit",
                "type": "uint256"
            },
            {
                "internalType": "bytes[]",
                "name": "_factoryDeps",
                "type": "bytes[]"
            },
            {
                "internalType": "address",
                "name": "_refundRecipient",
                "type": "address"
            }
        ],
        "name": "requestL2Transaction",
        "outputs": [
            {
                "internalType": "bytes32",
                "name": "canonicalTxHash",
                "type": "bytes32"
            }
        ],
        "stateMutability": "payable",
        "type": "function"
    },
    {
        "inputs": [
            {
                "internalType": "uint256",
                "name": "_gasPrice",
                "type": "uint256"
            },
            {
                "internalType": "uint256",
                "name": "_l2GasLimit",
                "type": "uint256"
            },
            {
                "internalType": "uint256",
                "name": "_l2GasPerPubdataByteLimit",
                "type": "uint256"
            }
        ],
        "name": "l2TransactionBaseCost",
        "outputs": [
            {
                "internalType": "uint256",
                "name": "",
                "type": "uint256"
            }
        ],
        "stateMutability": "view",
        "type": "function"
    },
    {
        "inputs": [],
        "name": "getName",
        "outputs": [
            {
                "internalType": "string",
                "name": "",
                "type": "string"
            }
        ],
        "stateMutability": "view",
        "type": "function"
    },
    {
        "anonymous": false,
        "inputs": [
            {
                "indexed": false,
                "internalType": "uint256",
                "name": "txId",
                "type": "uint256"
            },
            {
                "indexed": false,
                "internalType": "bytes32",
                "name": "txHash",
                "type": "bytes32"
            },
            {
                "indexed": false,
                "internalType": "uint64",
                "name": "expirationTimestamp",
                "type": "uint64"
            },
            {
                "components": [
                    {
                        "internalType": "uint256",
                        "name": "txType",
                        "type": "uint256"
                    },
                    {
                        "internalType": "uint256",
                        "name": "from",
                        "type": "uint256"
                    },
                    {
                        "internalType": "uint256",
                        "name": "to",
                        "type": "uint256"
                    },
                    {
                        "internalType": "uint256",
                        "name": "gasLimit",
                        "type": "uint256"
                    },
                    {
                        "internalType": "uint256",
                        "name": "gasPerPubdataByteLimit",
                        "type": "uint256"
                    },
                    {
                        "internalType": "uint256",
                        "name": "maxFeePerGas",
                        "type": "uint256"
                    },
                    {
                        "internalType": "uint256",
                        "name": "maxPriorityFeePerGas",
                        "type": "uint256"
                    },
                    {
                        "internalType": "uint256",
                        "name": "paymaster",
                        "type": "uint256"
                    },
                    {
                        "internalType": "uint256",
                        "name": "nonce",
                        "type": "uint256"
                    },
                    {
                        "internalType": "uint256",
                        "name": "value",
                        "type": "uint256"
                    },
                    {
                        "internalType": "uint256[4]",
                        "name": "reserved",
                        "type": "uint256[4]"
                    },
                    {
                        "internalType": "bytes",
                        "name": "data",
                        "type": "bytes"
                    },
                    {
                        "internalType": "bytes",
                        "name": "signature",
                        "type": "bytes"
                    },
                    {
                        "internalType": "uint256[]",
                        "name": "factoryDeps",
                        "type": "uint256[]"
                    },
                    {
                        "internalType": "bytes",
                        "name": "paymasterInput",
                        "type": "bytes"
                    },
                    {
                        "internalType": "bytes",
                        "name": "reservedDynamic",
                        "type": "bytes"
                    }
                ],
                "indexed": false,
                "internalType": "struct IMailbox.L2CanonicalTransaction",
                "name": "transaction",
                "type": "tuple"
            },
            {
                "indexed": false,
                "internalType": "bytes[]",
                "name": "factoryDeps",
                "type": "bytes[]"
            }
        ],
        "name": "NewPriorityRequest",
        "type": "event"
    }
]
"#;

/// ABI of the L2 contract deployer system contract, reduced to the entry point
/// used by L1 -> L2 deployment transactions.
pub const L2_DEPLOYER_ABI: &str = r#"
[
    {
        "inputs": [
            {
                "internalType": "bytes32",
                "name": "_salt",
                "type": "bytes32"
            },
            {
                "internalType": "bytes32",
                "name": "_bytecodeHash",
                "type": "bytes32"
            },
            {
                "internalType": "bytes",
                "name": "_input",
                "type": "bytes"
            }
        ],
        "name": "create2",
        "outputs": [
            {
                "internalType": "address",
                "name": "",
                "type": "address"
            }
        ],
        "stateMutability": "payable",
        "type": "function"
    }
]
"#;

static DIAMOND_CUT_FACET: Lazy<Contract> = Lazy::new(|| load_contract(DIAMOND_CUT_FACET_ABI));
static GETTERS_FACET: Lazy<Contract> = Lazy::new(|| load_contract(GETTERS_FACET_ABI));
static MAILBOX_FACET: Lazy<Contract> = Lazy::new(|| load_contract(MAILBOX_FACET_ABI));
static L2_DEPLOYER: Lazy<Contract> = Lazy::new(|| load_contract(L2_DEPLOYER_ABI));

/// Parses a contract from its raw JSON ABI.
///
/// Panics on malformed input since the ABIs passed here are embedded in the binary.
pub fn load_contract(raw_abi: &str) -> Contract {
    serde_json::from_str(raw_abi).unwrap()
}

pub fn diamond_cut_facet_contract() -> Contract {
    DIAMOND_CUT_FACET.clone()
}

pub fn getters_facet_contract() -> Contract {
    GETTERS_FACET.clone()
}

pub fn mailbox_facet_contract() -> Contract {
    MAILBOX_FACET.clone()
}

pub fn l2_deployer_contract() -> Contract {
    L2_DEPLOYER.clone()
}

/// Returns the functions of a raw JSON ABI in their declaration order.
///
/// `ethabi::Contract` keeps functions in a hash map, so iterating over it yields
/// an unspecified order. Facet cuts must be reproducible between runs, hence the
/// order is recovered from the raw JSON. Assumes the ABI does not overload
/// function names, which holds for all facet ABIs.
pub fn ordered_functions(raw_abi: &str) -> Vec<Function> {
    let contract = load_contract(raw_abi);
    let entries: Vec<Value> = serde_json::from_str(raw_abi).unwrap();
    entries
        .iter()
        .filter(|entry| entry["type"] == "function")
        .map(|entry| {
            let name = entry["name"].as_str().unwrap();
            contract.function(name).unwrap().clone()
        })
        .collect()
}

fn read_file_to_json_value(path: &Path) -> Value {
    serde_json::from_reader(
        File::open(path).unwrap_or_else(|err| panic!("Failed to open file {path:?}: {err}")),
    )
    .unwrap_or_else(|err| panic!("Failed to parse file {path:?}: {err}"))
}

/// Reads the deployed bytecode from a compiler artifact at an explicit path.
pub fn read_bytecode(artifact_path: impl AsRef<Path>) -> Vec<u8> {
    let artifact_path = artifact_path.as_ref();
    let artifact = read_file_to_json_value(artifact_path);
    let raw = artifact["bytecode"]
        .as_str()
        .unwrap_or_else(|| panic!("Bytecode not found in {artifact_path:?}"))
        .strip_prefix("0x")
        .unwrap_or_else(|| panic!("Bytecode in {artifact_path:?} is not hex"));
    hex::decode(raw)
        .unwrap_or_else(|err| panic!("Failed to decode bytecode in {artifact_path:?}: {err}"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn embedded_abis_parse() {
        assert!(diamond_cut_facet_contract().function("proposeTransparentUpgrade").is_ok());
        assert!(diamond_cut_facet_contract().function("executeUpgrade").is_ok());
        assert!(getters_facet_contract().function("facets").is_ok());
        assert!(mailbox_facet_contract().function("requestL2Transaction").is_ok());
        assert!(mailbox_facet_contract().event("NewPriorityRequest").is_ok());
        assert!(l2_deployer_contract().function("create2").is_ok());
    }

    #[test]
    fn getters_selectors_match_known_values() {
        // `facets()` is the standard EIP-2535 loupe function; its selector is fixed.
        let facets = getters_facet_contract().function("facets").unwrap().clone();
        assert_eq!(facets.short_signature(), [0x7a, 0x0e, 0xd6, 0x27]);
    }

    #[test]
    fn ordered_functions_follow_declaration_order() {
        let names: Vec<_> = ordered_functions(GETTERS_FACET_ABI)
            .into_iter()
            .map(|function| function.name)
            .collect();
        assert_eq!(
            names,
            [
                "facets",
                "isDiamondStorageFrozen",
                "getProposedUpgradeHash",
                "getProtocolVersion",
                "isFacetFreezable",
                "isFunctionFreezable",
                "getName",
            ]
        );
    }

    #[test]
    fn reading_bytecode_from_artifact() {
        let mut artifact = tempfile::NamedTempFile::new().unwrap();
        write!(artifact, r#"{{"abi": [], "bytecode": "0xdeadbeef"}}"#).unwrap();
        let bytecode = read_bytecode(artifact.path());
        assert_eq!(bytecode, [0xde, 0xad, 0xbe, 0xef]);
    }
}
