//! The upgrade proposal lifecycle of a diamond proxy.
//!
//! [`DiamondProxyState`] is a client-side mirror of the governance state stored
//! by the proxy on L1. Transitions are checked exactly the way the diamond cut
//! facet checks them on-chain, so a transition rejected here would also revert
//! there.

use zkchain_types::{abi::L2CanonicalTransaction, Address, ProposalId, ProtocolVersionId, H256};

use crate::{
    diamond::{
        format_selector, proposal_hash, DiamondCutData, DiamondCutValidationError, FacetCutAction,
        Selector,
    },
    planner::{DeployedFacetRegistry, RegistryUpdateError},
    upgrade_tx::{validate_upgrade_tx, UpgradeTxError},
};

/// How an upgrade was proposed: with the full cut payload published upfront, or
/// as a bare commitment hash revealed only at execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeKind {
    Transparent,
    Shadow,
}

/// An upgrade proposal accepted by the diamond.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeProposal {
    pub id: ProposalId,
    pub hash: H256,
    pub kind: UpgradeKind,
}

#[derive(Debug, Clone)]
enum ProposalPhase {
    None,
    Pending(UpgradeProposal),
    Executed(UpgradeProposal),
    Cancelled(UpgradeProposal),
}

#[derive(Debug, Clone, Copy)]
struct PendingUpgradeTx {
    hash: H256,
    version: ProtocolVersionId,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ProposalError {
    #[error("proposal #{id} is still pending; execute or cancel it first")]
    ProposalPending { id: ProposalId },
    #[error("expected proposal id #{expected}, got #{provided}")]
    StaleProposalId {
        expected: ProposalId,
        provided: ProposalId,
    },
    #[error("a shadow upgrade cannot commit to an empty hash")]
    EmptyShadowHash,
    #[error("no upgrade proposal is currently awaiting execution")]
    NoActiveProposal,
    #[error("the proposed upgrade was already executed")]
    AlreadyExecuted,
    #[error("a transparent upgrade must be executed with an empty salt")]
    UnexpectedSalt,
    #[error("the diamond is frozen and the cut touches a freezable facet")]
    FrozenDiamond,
    #[error("payload hashes to {computed:?}, the proposal committed to {expected:?}")]
    PayloadMismatch { expected: H256, computed: H256 },
    #[error("proposal hash {provided:?} does not match the pending {expected:?}")]
    HashMismatch { expected: H256, provided: H256 },
    #[error("the diamond is already frozen")]
    AlreadyFrozen,
    #[error("the diamond is not frozen")]
    NotFrozen,
    #[error(
        "selector {} belongs to a freezable facet and the diamond is frozen",
        format_selector(.selector)
    )]
    FrozenFacetCall { selector: Selector },
    #[error("selector {} is not served by any facet", format_selector(.selector))]
    UnknownSelector { selector: Selector },
    #[error(transparent)]
    InvalidPayload(#[from] DiamondCutValidationError),
    #[error(transparent)]
    Registry(#[from] RegistryUpdateError),
}

impl ProposalError {
    /// Short stable code mirroring the on-chain revert reason.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ProposalPending { .. } => "PROPOSAL_PENDING",
            Self::StaleProposalId { .. } => "STALE_PROPOSAL_ID",
            Self::EmptyShadowHash => "EMPTY_SHADOW_HASH",
            Self::NoActiveProposal => "NO_ACTIVE_PROPOSAL",
            Self::AlreadyExecuted => "ALREADY_EXECUTED",
            Self::UnexpectedSalt => "UNEXPECTED_SALT",
            Self::FrozenDiamond => "FROZEN_DIAMOND",
            Self::PayloadMismatch { .. } => "PAYLOAD_MISMATCH",
            Self::HashMismatch { .. } => "HASH_MISMATCH",
            Self::AlreadyFrozen => "ALREADY_FROZEN",
            Self::NotFrozen => "NOT_FROZEN",
            Self::FrozenFacetCall { .. } => "FROZEN_FACET_CALL",
            Self::UnknownSelector { .. } => "UNKNOWN_SELECTOR",
            Self::InvalidPayload(err) => err.code(),
            Self::Registry(err) => err.code(),
        }
    }
}

/// Mirror of the upgrade governance state stored by a diamond proxy: the
/// selector routing table, the freeze flag, the proposal lifecycle and the
/// protocol version together with its in-flight upgrade transaction.
#[derive(Debug, Clone)]
pub struct DiamondProxyState {
    registry: DeployedFacetRegistry,
    frozen: bool,
    current_proposal_id: ProposalId,
    proposal: ProposalPhase,
    protocol_version: ProtocolVersionId,
    pending_upgrade: Option<PendingUpgradeTx>,
}

impl Default for DiamondProxyState {
    fn default() -> Self {
        Self::new(DeployedFacetRegistry::new(), ProtocolVersionId(0))
    }
}

impl DiamondProxyState {
    pub fn new(registry: DeployedFacetRegistry, protocol_version: ProtocolVersionId) -> Self {
        Self {
            registry,
            frozen: false,
            current_proposal_id: ProposalId(0),
            proposal: ProposalPhase::None,
            protocol_version,
            pending_upgrade: None,
        }
    }

    pub fn registry(&self) -> &DeployedFacetRegistry {
        &self.registry
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn protocol_version(&self) -> ProtocolVersionId {
        self.protocol_version
    }

    /// Id of the most recently accepted proposal. The next proposal must use
    /// the subsequent id.
    pub fn current_proposal_id(&self) -> ProposalId {
        self.current_proposal_id
    }

    /// Commitment hash of the proposal currently awaiting execution.
    pub fn proposed_upgrade_hash(&self) -> Option<H256> {
        match &self.proposal {
            ProposalPhase::Pending(proposal) => Some(proposal.hash),
            _ => None,
        }
    }

    /// The most recently accepted proposal, whatever phase it has reached.
    pub fn last_proposal(&self) -> Option<&UpgradeProposal> {
        match &self.proposal {
            ProposalPhase::None => None,
            ProposalPhase::Pending(proposal)
            | ProposalPhase::Executed(proposal)
            | ProposalPhase::Cancelled(proposal) => Some(proposal),
        }
    }

    /// Hash of the upgrade transaction that was started but not yet observed on
    /// the destination layer.
    pub fn pending_upgrade_tx_hash(&self) -> Option<H256> {
        self.pending_upgrade.map(|pending| pending.hash)
    }

    /// Proposes an upgrade with the full cut payload published upfront.
    /// Returns the commitment hash the diamond stores for it.
    pub fn propose_transparent_upgrade(
        &mut self,
        cut: &DiamondCutData,
        proposal_id: ProposalId,
    ) -> Result<H256, ProposalError> {
        cut.validate()?;
        self.accept_proposal(proposal_id)?;
        let hash = proposal_hash(cut, proposal_id, H256::zero());
        self.proposal = ProposalPhase::Pending(UpgradeProposal {
            id: proposal_id,
            hash,
            kind: UpgradeKind::Transparent,
        });
        self.current_proposal_id = proposal_id;
        tracing::info!("Proposed transparent upgrade #{proposal_id} with hash {hash:?}");
        Ok(hash)
    }

    /// Proposes an upgrade revealing nothing but its commitment hash. The
    /// payload (and the salt blinding it) only surfaces at execution time.
    pub fn propose_shadow_upgrade(
        &mut self,
        proposal_hash: H256,
        proposal_id: ProposalId,
    ) -> Result<(), ProposalError> {
        if proposal_hash.is_zero() {
            return Err(ProposalError::EmptyShadowHash);
        }
        self.accept_proposal(proposal_id)?;
        self.proposal = ProposalPhase::Pending(UpgradeProposal {
            id: proposal_id,
            hash: proposal_hash,
            kind: UpgradeKind::Shadow,
        });
        self.current_proposal_id = proposal_id;
        tracing::info!("Proposed shadow upgrade #{proposal_id} with hash {proposal_hash:?}");
        Ok(())
    }

    fn accept_proposal(&self, proposal_id: ProposalId) -> Result<(), ProposalError> {
        if let ProposalPhase::Pending(pending) = &self.proposal {
            return Err(ProposalError::ProposalPending { id: pending.id });
        }
        let expected = self.current_proposal_id.next();
        if proposal_id != expected {
            return Err(ProposalError::StaleProposalId {
                expected,
                provided: proposal_id,
            });
        }
        Ok(())
    }

    /// Executes the pending proposal with an empty salt.
    pub fn execute_upgrade(&mut self, cut: &DiamondCutData) -> Result<(), ProposalError> {
        self.execute_upgrade_with_salt(cut, H256::zero())
    }

    /// Executes the pending proposal, checking the revealed payload and salt
    /// against the stored commitment hash and applying the cuts to the selector
    /// registry. The registry update is all-or-nothing.
    pub fn execute_upgrade_with_salt(
        &mut self,
        cut: &DiamondCutData,
        salt: H256,
    ) -> Result<(), ProposalError> {
        let pending = match &self.proposal {
            ProposalPhase::Pending(pending) => *pending,
            ProposalPhase::Executed(_) => return Err(ProposalError::AlreadyExecuted),
            ProposalPhase::None | ProposalPhase::Cancelled(_) => {
                return Err(ProposalError::NoActiveProposal)
            }
        };
        cut.validate()?;
        // Only shadow upgrades are salted: the salt blinds the commitment hash
        // against dictionary attacks on the proposal payload.
        if pending.kind == UpgradeKind::Transparent && !salt.is_zero() {
            return Err(ProposalError::UnexpectedSalt);
        }
        if self.frozen && self.touches_freezable(cut) {
            return Err(ProposalError::FrozenDiamond);
        }
        let computed = proposal_hash(cut, pending.id, salt);
        if computed != pending.hash {
            return Err(ProposalError::PayloadMismatch {
                expected: pending.hash,
                computed,
            });
        }
        self.registry = self.registry.apply(&cut.facet_cuts)?;
        self.proposal = ProposalPhase::Executed(pending);
        tracing::info!(
            "Executed upgrade #{} with {} facet cuts",
            pending.id,
            cut.facet_cuts.len()
        );
        Ok(())
    }

    /// Cancels the pending proposal. The caller must present the stored
    /// commitment hash to rule out cancelling a proposal it has not seen.
    pub fn cancel_upgrade_proposal(&mut self, proposal_hash: H256) -> Result<(), ProposalError> {
        let pending = match &self.proposal {
            ProposalPhase::Pending(pending) => *pending,
            _ => return Err(ProposalError::NoActiveProposal),
        };
        if pending.hash != proposal_hash {
            return Err(ProposalError::HashMismatch {
                expected: pending.hash,
                provided: proposal_hash,
            });
        }
        self.proposal = ProposalPhase::Cancelled(pending);
        tracing::info!("Cancelled upgrade proposal #{}", pending.id);
        Ok(())
    }

    /// Blocks calls to freezable facets until [`Self::unfreeze_diamond`].
    pub fn freeze_diamond(&mut self) -> Result<(), ProposalError> {
        if self.frozen {
            return Err(ProposalError::AlreadyFrozen);
        }
        self.frozen = true;
        tracing::info!("Froze the diamond");
        Ok(())
    }

    pub fn unfreeze_diamond(&mut self) -> Result<(), ProposalError> {
        if !self.frozen {
            return Err(ProposalError::NotFrozen);
        }
        self.frozen = false;
        tracing::info!("Unfroze the diamond");
        Ok(())
    }

    /// Resolves `selector` the way the proxy fallback would: to the serving
    /// facet, unless the diamond is frozen and the facet is freezable.
    pub fn ensure_callable(&self, selector: Selector) -> Result<Address, ProposalError> {
        let entry = self
            .registry
            .entry(selector)
            .ok_or(ProposalError::UnknownSelector { selector })?;
        if self.frozen && entry.is_freezable {
            return Err(ProposalError::FrozenFacetCall { selector });
        }
        Ok(entry.facet)
    }

    fn touches_freezable(&self, cut: &DiamondCutData) -> bool {
        cut.facet_cuts.iter().any(|cut| {
            let currently_freezable = || {
                cut.selectors
                    .iter()
                    .any(|&selector| self.registry.is_freezable(selector).unwrap_or(false))
            };
            match cut.action {
                FacetCutAction::Add => cut.is_freezable,
                FacetCutAction::Replace => cut.is_freezable || currently_freezable(),
                FacetCutAction::Remove => currently_freezable(),
            }
        })
    }

    /// Validates and registers the L2 upgrade transaction of a system-contract
    /// upgrade. Returns its canonical hash, to be matched against the
    /// destination layer once the transaction is included.
    pub fn start_upgrade_tx(
        &mut self,
        tx: &L2CanonicalTransaction,
        new_version: ProtocolVersionId,
        factory_deps: &[Vec<u8>],
    ) -> Result<H256, UpgradeTxError> {
        if let Some(pending) = &self.pending_upgrade {
            return Err(UpgradeTxError::PreviousUpgradeNotFinalized {
                pending_hash: pending.hash,
            });
        }
        validate_upgrade_tx(tx, new_version, self.protocol_version, factory_deps)?;
        let hash = tx.hash();
        self.pending_upgrade = Some(PendingUpgradeTx {
            hash,
            version: new_version,
        });
        tracing::info!("Started upgrade tx {hash:?} targeting protocol version {new_version}");
        Ok(hash)
    }

    /// Finalizes the in-flight upgrade transaction after observing its hash in
    /// the committed batch logs, bumping the stored protocol version.
    pub fn finalize_upgrade_tx(
        &mut self,
        observed_hash: H256,
    ) -> Result<ProtocolVersionId, UpgradeTxError> {
        let pending = self.pending_upgrade.ok_or(UpgradeTxError::NoPendingUpgrade)?;
        if pending.hash != observed_hash {
            return Err(UpgradeTxError::UpgradeTxHashMismatch {
                expected: pending.hash,
                observed: observed_hash,
            });
        }
        self.protocol_version = pending.version;
        self.pending_upgrade = None;
        tracing::info!("Finalized upgrade to protocol version {}", pending.version);
        Ok(pending.version)
    }
}
