//! Facet cut planning: turns descriptions of deployed facets into the minimal
//! sequence of [`FacetCut`]s migrating a diamond from its current selector
//! registry to a target one.

use std::collections::BTreeMap;

use anyhow::Context as _;
use zkchain_types::{ethabi::Token, Address};

use crate::diamond::{format_selector, FacetCut, FacetCutAction, Selector};

/// Every facet exposes `getName()` for off-chain introspection; it must never be
/// routed through the diamond proxy, so the planner leaves it out of all cuts.
const RESERVED_INTROSPECTION_FUNCTION: &str = "getName";

/// A deployed facet as the planner sees it: a human-readable name (only used in
/// error messages), its address, the selectors it serves and whether the diamond
/// is allowed to freeze it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetDescriptor {
    pub name: String,
    pub address: Address,
    pub selectors: Vec<Selector>,
    pub is_freezable: bool,
}

impl FacetDescriptor {
    /// Builds a descriptor from a raw JSON ABI, deriving the selector list with
    /// [`selectors_for`].
    pub fn from_abi(
        name: impl Into<String>,
        address: Address,
        raw_abi: &str,
        is_freezable: bool,
    ) -> Self {
        Self {
            name: name.into(),
            address,
            selectors: selectors_for(raw_abi),
            is_freezable,
        }
    }
}

/// Returns the selectors of all functions in the given raw JSON ABI in their
/// declaration order, excluding the reserved `getName()` function.
pub fn selectors_for(raw_abi: &str) -> Vec<Selector> {
    zkchain_contracts::ordered_functions(raw_abi)
        .into_iter()
        .filter(|function| function.name != RESERVED_INTROSPECTION_FUNCTION)
        .map(|function| function.short_signature())
        .collect()
}

/// Selectors of several interfaces concatenated in the caller-provided order.
pub fn selectors_for_interfaces<'a>(raw_abis: impl IntoIterator<Item = &'a str>) -> Vec<Selector> {
    raw_abis.into_iter().flat_map(selectors_for).collect()
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PlannerError {
    #[error(
        "facets `{first}` and `{second}` both claim selector {}",
        format_selector(.selector)
    )]
    DuplicateSelectorInTarget {
        selector: Selector,
        first: String,
        second: String,
    },
    #[error(
        "replacing selector {} would change its freezability from {current} to {target}; \
         remove and re-add the function instead",
        format_selector(.selector)
    )]
    ReplaceFreezabilityMismatch {
        selector: Selector,
        current: bool,
        target: bool,
    },
}

impl PlannerError {
    /// Short stable code mirroring the on-chain revert reason.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateSelectorInTarget { .. } => "DUPLICATE_SELECTOR_IN_TARGET",
            Self::ReplaceFreezabilityMismatch { .. } => "REPLACE_FREEZABILITY_MISMATCH",
        }
    }
}

/// Plans the initial population of an empty diamond: one `Add` cut per facet
/// covering all of its selectors, in the caller-provided facet order.
pub fn plan_additions(target: &[FacetDescriptor]) -> Result<Vec<FacetCut>, PlannerError> {
    check_unique_selectors(target)?;
    Ok(target
        .iter()
        // A facet without selectors would produce an empty cut, which the
        // diamond rejects.
        .filter(|facet| !facet.selectors.is_empty())
        .map(|facet| FacetCut {
            facet: facet.address,
            action: FacetCutAction::Add,
            is_freezable: facet.is_freezable,
            selectors: facet.selectors.clone(),
        })
        .collect())
}

/// Plans the migration of `current` to the registry described by `target`.
///
/// Selectors missing from `current` become `Add` cuts and selectors served by a
/// different facet become `Replace` cuts, both grouped per target facet in the
/// caller-provided order. Selectors absent from `target` become `Remove` cuts
/// grouped by the facet currently serving them, with a zeroed facet address and
/// freezability.
///
/// Replacing a selector may not change its freezability; the diamond would
/// reject such a cut on L1, so the planner surfaces
/// [`PlannerError::ReplaceFreezabilityMismatch`] instead of emitting it.
pub fn plan_diff(
    current: &DeployedFacetRegistry,
    target: &[FacetDescriptor],
) -> Result<Vec<FacetCut>, PlannerError> {
    let target_selectors = check_unique_selectors(target)?;

    let mut cuts = Vec::new();
    for facet in target {
        let mut added = Vec::new();
        let mut replaced = Vec::new();
        for &selector in &facet.selectors {
            match current.entry(selector) {
                None => added.push(selector),
                Some(entry) if entry.facet != facet.address => {
                    if entry.is_freezable != facet.is_freezable {
                        return Err(PlannerError::ReplaceFreezabilityMismatch {
                            selector,
                            current: entry.is_freezable,
                            target: facet.is_freezable,
                        });
                    }
                    replaced.push(selector);
                }
                // Already served by this very facet, nothing to do.
                Some(_) => {}
            }
        }
        if !added.is_empty() {
            cuts.push(FacetCut {
                facet: facet.address,
                action: FacetCutAction::Add,
                is_freezable: facet.is_freezable,
                selectors: added,
            });
        }
        if !replaced.is_empty() {
            cuts.push(FacetCut {
                facet: facet.address,
                action: FacetCutAction::Replace,
                is_freezable: facet.is_freezable,
                selectors: replaced,
            });
        }
    }

    let mut removals: BTreeMap<Address, Vec<Selector>> = BTreeMap::new();
    for (selector, entry) in current.entries() {
        if !target_selectors.contains_key(&selector) {
            removals.entry(entry.facet).or_default().push(selector);
        }
    }
    for selectors in removals.into_values() {
        cuts.push(FacetCut {
            facet: Address::zero(),
            action: FacetCutAction::Remove,
            is_freezable: false,
            selectors,
        });
    }
    Ok(cuts)
}

fn check_unique_selectors(
    target: &[FacetDescriptor],
) -> Result<BTreeMap<Selector, &FacetDescriptor>, PlannerError> {
    let mut seen = BTreeMap::new();
    for facet in target {
        for &selector in &facet.selectors {
            if let Some(first) = seen.insert(selector, facet) {
                return Err(PlannerError::DuplicateSelectorInTarget {
                    selector,
                    first: first.name.clone(),
                    second: facet.name.clone(),
                });
            }
        }
    }
    Ok(seen)
}

/// An entry of [`DeployedFacetRegistry`]: the facet serving a selector and
/// whether calls to it are blocked while the diamond is frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FacetEntry {
    pub facet: Address,
    pub is_freezable: bool,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryUpdateError {
    #[error(
        "cannot add selector {}: already served by facet {facet:?}",
        format_selector(.selector)
    )]
    AddingExistingSelector { selector: Selector, facet: Address },
    #[error(
        "cannot replace selector {}: not present in the registry",
        format_selector(.selector)
    )]
    ReplacingMissingSelector { selector: Selector },
    #[error(
        "replacing selector {} with facet {facet:?} already serving it",
        format_selector(.selector)
    )]
    ReplacingWithSameFacet { selector: Selector, facet: Address },
    #[error(
        "cannot remove selector {}: not present in the registry",
        format_selector(.selector)
    )]
    RemovingMissingSelector { selector: Selector },
}

impl RegistryUpdateError {
    /// Short stable code mirroring the on-chain revert reason.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AddingExistingSelector { .. } => "ADDING_EXISTING_SELECTOR",
            Self::ReplacingMissingSelector { .. } => "REPLACING_MISSING_SELECTOR",
            Self::ReplacingWithSameFacet { .. } => "REPLACING_WITH_SAME_FACET",
            Self::RemovingMissingSelector { .. } => "REMOVING_MISSING_SELECTOR",
        }
    }
}

/// Client-side mirror of the selector routing table stored by the diamond proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployedFacetRegistry {
    entries: BTreeMap<Selector, FacetEntry>,
}

impl DeployedFacetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry routing every selector of every facet to its address.
    ///
    /// Unlike the planner entry points this does not check selector uniqueness;
    /// a later facet silently wins a contested selector.
    pub fn from_facets(facets: &[FacetDescriptor]) -> Self {
        let mut this = Self::new();
        for facet in facets {
            this.register_facet(facet.address, facet.is_freezable, &facet.selectors);
        }
        this
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, selector: Selector) -> Option<FacetEntry> {
        self.entries.get(&selector).copied()
    }

    /// The facet currently serving `selector`, if any.
    pub fn facet_for(&self, selector: Selector) -> Option<Address> {
        self.entry(selector).map(|entry| entry.facet)
    }

    pub fn is_freezable(&self, selector: Selector) -> Option<bool> {
        self.entry(selector).map(|entry| entry.is_freezable)
    }

    /// Entries in selector order.
    pub fn entries(&self) -> impl Iterator<Item = (Selector, FacetEntry)> + '_ {
        self.entries.iter().map(|(selector, entry)| (*selector, *entry))
    }

    /// Routes `selectors` to `facet`, overwriting existing routes.
    pub fn register_facet(&mut self, facet: Address, is_freezable: bool, selectors: &[Selector]) {
        for &selector in selectors {
            self.entries.insert(selector, FacetEntry { facet, is_freezable });
        }
    }

    /// Returns the registry resulting from applying `cuts` to this one. The
    /// update is all-or-nothing: on an error, `self` is left untouched and no
    /// partial result escapes.
    pub fn apply(&self, cuts: &[FacetCut]) -> Result<Self, RegistryUpdateError> {
        let mut next = self.clone();
        for cut in cuts {
            next.apply_cut(cut)?;
        }
        Ok(next)
    }

    fn apply_cut(&mut self, cut: &FacetCut) -> Result<(), RegistryUpdateError> {
        for &selector in &cut.selectors {
            match cut.action {
                FacetCutAction::Add => {
                    if let Some(entry) = self.entries.get(&selector) {
                        return Err(RegistryUpdateError::AddingExistingSelector {
                            selector,
                            facet: entry.facet,
                        });
                    }
                    self.entries.insert(
                        selector,
                        FacetEntry {
                            facet: cut.facet,
                            is_freezable: cut.is_freezable,
                        },
                    );
                }
                FacetCutAction::Replace => {
                    let entry = self
                        .entries
                        .get_mut(&selector)
                        .ok_or(RegistryUpdateError::ReplacingMissingSelector { selector })?;
                    if entry.facet == cut.facet {
                        return Err(RegistryUpdateError::ReplacingWithSameFacet {
                            selector,
                            facet: cut.facet,
                        });
                    }
                    *entry = FacetEntry {
                        facet: cut.facet,
                        is_freezable: cut.is_freezable,
                    };
                }
                FacetCutAction::Remove => {
                    self.entries
                        .remove(&selector)
                        .ok_or(RegistryUpdateError::RemovingMissingSelector { selector })?;
                }
            }
        }
        Ok(())
    }
}

/// Decodes the output of the getters facet `facets()` call into
/// `(facet address, selectors)` pairs.
pub fn decode_facets(token: Token) -> anyhow::Result<Vec<(Address, Vec<Selector>)>> {
    token
        .into_array()
        .context("not an array")?
        .into_iter()
        .map(|facet| {
            let tokens = facet.into_tuple().context("facet is not a tuple")?;
            anyhow::ensure!(tokens.len() == 2);
            let mut t = tokens.into_iter();
            let mut next = || t.next().unwrap();
            let address = next().into_address().context("facet address")?;
            let selectors = next()
                .into_array()
                .context("facet selectors")?
                .into_iter()
                .enumerate()
                .map(|(i, token)| {
                    let bytes = token.into_fixed_bytes().context(i)?;
                    Selector::try_from(bytes.as_slice()).ok().context(i)
                })
                .collect::<Result<_, _>>()
                .context("facet selectors")?;
            Ok((address, selectors))
        })
        .collect()
}
