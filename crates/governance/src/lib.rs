//! Client-side governance logic for a diamond proxy rollup: planning facet
//! cuts, mirroring the upgrade proposal lifecycle enforced on L1 and validating
//! protocol upgrade transactions.

pub mod calls;
pub mod diamond;
pub mod planner;
pub mod proposal;
pub mod upgrade_tx;

pub use self::{
    diamond::{proposal_hash, DiamondCutData, FacetCut, FacetCutAction, Selector},
    planner::{plan_additions, plan_diff, DeployedFacetRegistry, FacetDescriptor, PlannerError},
    proposal::{DiamondProxyState, ProposalError, UpgradeKind, UpgradeProposal},
    upgrade_tx::UpgradeTxError,
};
