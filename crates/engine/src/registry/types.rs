//! Per-type registrations and the type registry
//!
//! A [`TypeRegistry`] maps type names to [`TypeRegistration`]s. Each
//! registration holds the type's parent, its own feature declarations, its
//! registered contract data, an optional bound [`ContractSpec`], its checked
//! mode handle, and two caches filled once: the ancestry list and the dispatch
//! table.
//!
//! The registry itself is not synchronized; [`ContractRegistry`] wraps it in a
//! lock.
//!
//! [`ContractRegistry`]: super::ContractRegistry

use crate::config::{EngineConfig, OverrideStrictness};
use crate::dispatch::DispatchTable;
use crate::instance::InstanceState;
use crate::verify;
use covenant_core::{
    CheckedMode, ContractSpec, DeclarationError, Demand, Ensure, Error, FeatureImpl, FeatureKind,
    Invariant, Rescue, Result,
};
use once_cell::sync::OnceCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

// ============================================================================
// Feature registration
// ============================================================================

/// One feature declared by one type, with the contract data that level adds
pub struct FeatureRegistration<S> {
    name: Arc<str>,
    implementation: FeatureImpl<S>,
    overrides: bool,
    demands: Vec<Demand<S>>,
    ensures: Vec<Ensure<S>>,
    rescue: Option<Rescue<S>>,
}

impl<S> FeatureRegistration<S> {
    fn new(name: &str, implementation: FeatureImpl<S>) -> Self {
        FeatureRegistration {
            name: Arc::from(name),
            implementation,
            overrides: false,
            demands: Vec::new(),
            ensures: Vec::new(),
            rescue: None,
        }
    }

    /// Feature name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared implementation
    pub fn implementation(&self) -> &FeatureImpl<S> {
        &self.implementation
    }

    /// Kind of the declared implementation
    pub fn kind(&self) -> FeatureKind {
        self.implementation.kind()
    }

    /// Whether the feature carries an override marker
    pub fn is_override(&self) -> bool {
        self.overrides
    }

    /// Registered preconditions of this level
    pub fn demands(&self) -> &[Demand<S>] {
        &self.demands
    }

    /// Registered postconditions of this level
    pub fn ensures(&self) -> &[Ensure<S>] {
        &self.ensures
    }

    /// Registered rescue handler of this level
    pub fn rescue(&self) -> Option<&Rescue<S>> {
        self.rescue.as_ref()
    }
}

impl<S> fmt::Debug for FeatureRegistration<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureRegistration")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("overrides", &self.overrides)
            .field("demands", &self.demands.len())
            .field("ensures", &self.ensures.len())
            .field("rescue", &self.rescue.is_some())
            .finish()
    }
}

/// Contract data one level contributes to one feature, with the bound spec
/// merged in
pub(crate) struct LevelContract<S> {
    pub(crate) demands: Vec<Demand<S>>,
    pub(crate) ensures: Vec<Ensure<S>>,
    pub(crate) rescue: Option<Rescue<S>>,
}

// ============================================================================
// Type registration
// ============================================================================

/// Everything the engine knows about one type
pub struct TypeRegistration<S> {
    name: Arc<str>,
    parent: Option<String>,
    contracted: bool,
    features: BTreeMap<String, FeatureRegistration<S>>,
    invariants: Vec<Invariant<S>>,
    contract: Option<Arc<ContractSpec<S>>>,
    checked: CheckedMode,
    verified: bool,
    ancestry: OnceCell<Vec<String>>,
    dispatch: OnceCell<Arc<DispatchTable<S>>>,
}

impl<S> TypeRegistration<S> {
    fn new(name: &str, parent: Option<String>, checked: bool) -> Self {
        TypeRegistration {
            name: Arc::from(name),
            parent,
            contracted: false,
            features: BTreeMap::new(),
            invariants: Vec::new(),
            contract: None,
            checked: CheckedMode::new(checked),
            verified: false,
            ancestry: OnceCell::new(),
            dispatch: OnceCell::new(),
        }
    }

    /// Type name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// Direct supertype, if any
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Whether this type itself opted into enforcement
    pub fn is_declared_contracted(&self) -> bool {
        self.contracted
    }

    /// Whether override verification has run for this type
    pub fn is_verified(&self) -> bool {
        self.verified
    }

    /// Whether the dispatch table has been built
    pub fn is_finalized(&self) -> bool {
        self.dispatch.get().is_some()
    }

    /// A feature this type declares itself
    pub fn feature(&self, name: &str) -> Option<&FeatureRegistration<S>> {
        self.features.get(name)
    }

    /// Own features, sorted by name
    pub fn features(&self) -> impl Iterator<Item = &FeatureRegistration<S>> {
        self.features.values()
    }

    /// Registered invariants of this type, without the bound spec
    pub fn invariants(&self) -> &[Invariant<S>] {
        &self.invariants
    }

    /// The bound contract spec, if any
    pub fn contract(&self) -> Option<&Arc<ContractSpec<S>>> {
        self.contract.as_ref()
    }

    /// Shared checked-mode handle of this type
    pub fn checked_mode(&self) -> &CheckedMode {
        &self.checked
    }

    /// Registered invariants followed by those of the bound spec
    pub(crate) fn merged_invariants(&self) -> Vec<Invariant<S>> {
        let mut merged = self.invariants.clone();
        if let Some(spec) = &self.contract {
            merged.extend(spec.invariants().iter().cloned());
        }
        merged
    }

    /// Registered and bound contract data for one own feature
    pub(crate) fn level_contract(&self, feature: &str) -> LevelContract<S> {
        let mut level = match self.features.get(feature) {
            Some(registration) => LevelContract {
                demands: registration.demands.clone(),
                ensures: registration.ensures.clone(),
                rescue: registration.rescue.clone(),
            },
            None => LevelContract {
                demands: Vec::new(),
                ensures: Vec::new(),
                rescue: None,
            },
        };
        if let Some(bound) = self.contract.as_ref().and_then(|spec| spec.feature(feature)) {
            level.demands.extend(bound.demands().iter().cloned());
            level.ensures.extend(bound.ensures().iter().cloned());
            if level.rescue.is_none() {
                level.rescue = bound.rescue().cloned();
            }
        }
        level
    }

    fn is_closed(&self) -> bool {
        self.verified || self.is_finalized()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(DeclarationError::AlreadyFinalized {
                type_name: self.name.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Check the bound spec against the own feature set
    fn validate_contract(&self) -> Result<()> {
        let Some(spec) = &self.contract else {
            return Ok(());
        };
        for (name, bound) in spec.features() {
            let Some(registration) = self.features.get(name) else {
                return Err(DeclarationError::UnknownFeature {
                    type_name: self.name.to_string(),
                    feature: name.to_string(),
                }
                .into());
            };
            if !registration.kind().can_carry_contracts() {
                return Err(DeclarationError::PropertyContract {
                    type_name: self.name.to_string(),
                    feature: name.to_string(),
                }
                .into());
            }
            if registration.rescue.is_some() && bound.rescue().is_some() {
                return Err(DeclarationError::DuplicateRescue {
                    type_name: self.name.to_string(),
                    feature: name.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

impl<S> fmt::Debug for TypeRegistration<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistration")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("contracted", &self.contracted)
            .field("features", &self.features)
            .field("invariants", &self.invariants.len())
            .field("contract", &self.contract.is_some())
            .field("checked", &self.checked)
            .field("verified", &self.verified)
            .field("finalized", &self.is_finalized())
            .finish()
    }
}

// ============================================================================
// Type registry
// ============================================================================

/// Name-keyed store of type registrations
///
/// Registration methods take `&mut self`; lookups and ancestry take `&self`.
/// Ancestry lists and dispatch tables are cached on the registration the
/// first time they are computed. Parents never change after a type is
/// created, so neither cache is ever invalidated.
pub struct TypeRegistry<S> {
    config: EngineConfig,
    types: HashMap<String, TypeRegistration<S>>,
}

impl<S: InstanceState> TypeRegistry<S> {
    /// Empty registry using `config`
    pub fn new(config: EngineConfig) -> Self {
        TypeRegistry {
            config,
            types: HashMap::new(),
        }
    }

    /// Configuration the registry was created with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// True when no type is registered
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Registration for `name`, if any
    pub fn get(&self, name: &str) -> Option<&TypeRegistration<S>> {
        self.types.get(name)
    }

    /// Registration for `name`, creating a root type on first use
    pub fn get_or_create(&mut self, name: &str) -> &mut TypeRegistration<S> {
        let checked = self.config.checked;
        self.types
            .entry(name.to_string())
            .or_insert_with(|| TypeRegistration::new(name, None, checked))
    }

    fn lookup(&self, name: &str) -> Result<&TypeRegistration<S>> {
        self.types
            .get(name)
            .ok_or_else(|| Error::UnknownType(name.to_string()))
    }

    fn lookup_mut(&mut self, name: &str) -> Result<&mut TypeRegistration<S>> {
        self.types
            .get_mut(name)
            .ok_or_else(|| Error::UnknownType(name.to_string()))
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    /// Declare `name` with an optional parent
    ///
    /// Declaring an existing type again is accepted when the parent matches.
    /// `contracted` opts the type into enforcement; once set it stays set.
    ///
    /// # Errors
    ///
    /// - `InvalidName` for an empty name
    /// - `ParentMismatch` when the type exists with another parent
    pub fn declare_type(&mut self, name: &str, parent: Option<&str>, contracted: bool) -> Result<()> {
        if name.is_empty() || parent == Some("") {
            return Err(DeclarationError::InvalidName(name.to_string()).into());
        }
        if let Some(existing) = self.types.get_mut(name) {
            if existing.parent.as_deref() != parent {
                return Err(DeclarationError::ParentMismatch {
                    type_name: name.to_string(),
                    existing: existing.parent.clone(),
                    requested: parent.map(str::to_string),
                }
                .into());
            }
            if contracted && !existing.contracted {
                existing.ensure_open()?;
                existing.contracted = true;
            }
            return Ok(());
        }

        let checked = self.config.checked;
        let mut registration = TypeRegistration::new(name, parent.map(str::to_string), checked);
        registration.contracted = contracted;
        self.types.insert(name.to_string(), registration);
        debug!(
            target: "covenant::registry",
            type_name = %name,
            parent = ?parent,
            contracted,
            "Type declared"
        );
        Ok(())
    }

    /// Declare a feature on `type_name`
    ///
    /// # Errors
    ///
    /// - `UnknownType` when the type was never declared
    /// - `AlreadyFinalized` after finalization
    /// - `InvalidName`, `DuplicateFeature`, `EmptyAccessor`
    pub fn declare_feature(
        &mut self,
        type_name: &str,
        feature: &str,
        implementation: FeatureImpl<S>,
    ) -> Result<()> {
        let registration = self.lookup_mut(type_name)?;
        registration.ensure_open()?;
        if feature.is_empty() {
            return Err(DeclarationError::InvalidName(feature.to_string()).into());
        }
        if registration.features.contains_key(feature) {
            return Err(DeclarationError::DuplicateFeature {
                type_name: type_name.to_string(),
                feature: feature.to_string(),
            }
            .into());
        }
        if let FeatureImpl::Accessor {
            getter: None,
            setter: None,
        } = implementation
        {
            return Err(DeclarationError::EmptyAccessor {
                type_name: type_name.to_string(),
                feature: feature.to_string(),
            }
            .into());
        }

        let kind = implementation.kind();
        registration
            .features
            .insert(feature.to_string(), FeatureRegistration::new(feature, implementation));
        debug!(
            target: "covenant::registry",
            type_name = %type_name,
            feature = %feature,
            kind = %kind,
            "Feature declared"
        );
        Ok(())
    }

    /// Attach an override marker to an own feature
    ///
    /// # Errors
    ///
    /// - `UnknownFeature` when the type does not declare the feature itself
    /// - `DuplicateOverride` when the marker is already present
    /// - `AlreadyFinalized` after finalization
    pub fn mark_override(&mut self, type_name: &str, feature: &str) -> Result<()> {
        let registration = self.lookup_mut(type_name)?;
        registration.ensure_open()?;
        let entry = registration.features.get_mut(feature).ok_or_else(|| {
            Error::from(DeclarationError::UnknownFeature {
                type_name: type_name.to_string(),
                feature: feature.to_string(),
            })
        })?;
        if entry.overrides {
            return Err(DeclarationError::DuplicateOverride {
                type_name: type_name.to_string(),
                feature: feature.to_string(),
            }
            .into());
        }
        entry.overrides = true;
        Ok(())
    }

    // ========================================================================
    // Contract data
    // ========================================================================

    /// Add an invariant to a contracted type
    pub fn register_invariant(&mut self, type_name: &str, invariant: Invariant<S>) -> Result<()> {
        let registration = self.contracted_mut(type_name)?;
        debug!(
            target: "covenant::registry",
            type_name = %type_name,
            predicate = %invariant.label(),
            "Invariant registered"
        );
        registration.invariants.push(invariant);
        Ok(())
    }

    /// Add a precondition to an own feature of a contracted type
    pub fn register_demand(&mut self, type_name: &str, feature: &str, demand: Demand<S>) -> Result<()> {
        self.contract_target(type_name, feature)?.demands.push(demand);
        Ok(())
    }

    /// Add a postcondition to an own feature of a contracted type
    pub fn register_ensure(&mut self, type_name: &str, feature: &str, ensure: Ensure<S>) -> Result<()> {
        self.contract_target(type_name, feature)?.ensures.push(ensure);
        Ok(())
    }

    /// Set the rescue handler of an own feature of a contracted type
    ///
    /// # Errors
    ///
    /// `DuplicateRescue` when this level already has one.
    pub fn register_rescue(&mut self, type_name: &str, feature: &str, rescue: Rescue<S>) -> Result<()> {
        let entry = self.contract_target(type_name, feature)?;
        if entry.rescue.is_some() {
            return Err(DeclarationError::DuplicateRescue {
                type_name: type_name.to_string(),
                feature: feature.to_string(),
            }
            .into());
        }
        entry.rescue = Some(rescue);
        Ok(())
    }

    /// Attach a contract spec to a contracted type, replacing any earlier one
    pub fn bind_contract(&mut self, type_name: &str, spec: Arc<ContractSpec<S>>) -> Result<()> {
        let registration = self.contracted_mut(type_name)?;
        if registration.contract.replace(spec).is_some() {
            debug!(target: "covenant::registry", type_name = %type_name, "Contract spec replaced");
        }
        Ok(())
    }

    /// Turn enforcement on or off for one type
    ///
    /// Takes effect immediately, for existing instances too.
    pub fn set_checked_mode(&self, type_name: &str, enabled: bool) -> Result<()> {
        let registration = self.lookup(type_name)?;
        registration.checked.set(enabled);
        info!(
            target: "covenant::registry",
            type_name = %type_name,
            checked = enabled,
            "Checked mode changed"
        );
        Ok(())
    }

    fn contracted_mut(&mut self, type_name: &str) -> Result<&mut TypeRegistration<S>> {
        if !self.is_contracted(type_name)? {
            return Err(DeclarationError::NotContracted {
                type_name: type_name.to_string(),
            }
            .into());
        }
        let registration = self.lookup_mut(type_name)?;
        registration.ensure_open()?;
        Ok(registration)
    }

    fn contract_target(&mut self, type_name: &str, feature: &str) -> Result<&mut FeatureRegistration<S>> {
        let registration = self.contracted_mut(type_name)?;
        let entry = registration.features.get_mut(feature).ok_or_else(|| {
            Error::from(DeclarationError::UnknownFeature {
                type_name: type_name.to_string(),
                feature: feature.to_string(),
            })
        })?;
        if !entry.kind().can_carry_contracts() {
            return Err(DeclarationError::PropertyContract {
                type_name: type_name.to_string(),
                feature: feature.to_string(),
            }
            .into());
        }
        Ok(entry)
    }

    // ========================================================================
    // Ancestry
    // ========================================================================

    /// Proper ancestors of `type_name`, nearest first
    ///
    /// # Errors
    ///
    /// - `UnknownType` when the type or any ancestor is not declared
    /// - `CyclicAncestry` when the parent chain loops
    pub fn ancestry(&self, type_name: &str) -> Result<&[String]> {
        let registration = self.lookup(type_name)?;
        registration
            .ancestry
            .get_or_try_init(|| self.walk_parents(registration))
            .map(Vec::as_slice)
    }

    fn walk_parents(&self, start: &TypeRegistration<S>) -> Result<Vec<String>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(start.name());

        let mut current = start;
        while let Some(parent) = current.parent.as_deref() {
            if !seen.insert(parent) {
                return Err(Error::CyclicAncestry {
                    type_name: parent.to_string(),
                });
            }
            current = self.lookup(parent)?;
            chain.push(parent.to_string());
        }
        Ok(chain)
    }

    /// The type followed by its ancestors, nearest first
    pub fn lineage(&self, type_name: &str) -> Result<Vec<&TypeRegistration<S>>> {
        let mut lineage = vec![self.lookup(type_name)?];
        for ancestor in self.ancestry(type_name)? {
            lineage.push(self.lookup(ancestor)?);
        }
        Ok(lineage)
    }

    /// Whether the type or any ancestor opted into enforcement
    pub fn is_contracted(&self, type_name: &str) -> Result<bool> {
        if self.lookup(type_name)?.contracted {
            return Ok(true);
        }
        for ancestor in self.ancestry(type_name)? {
            if self.lookup(ancestor)?.contracted {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // ========================================================================
    // Finalization
    // ========================================================================

    /// Dispatch table of `type_name` if it has been built
    pub fn dispatch_table(&self, type_name: &str) -> Option<Arc<DispatchTable<S>>> {
        self.types
            .get(type_name)
            .and_then(|registration| registration.dispatch.get())
            .cloned()
    }

    /// Verify and build the dispatch table for `type_name`
    ///
    /// For a contracted type, every not-yet-verified type in its lineage is
    /// checked root-first: the bound spec is validated against the type's
    /// features and overrides are verified. Verified types accept no further
    /// registrations. The dispatch table is built once; later calls return
    /// the cached table.
    ///
    /// Override verification is skipped when the engine is unchecked or the
    /// type's checked mode is off at this point. Bound specs are validated
    /// regardless.
    pub fn finalize(&mut self, type_name: &str) -> Result<Arc<DispatchTable<S>>> {
        if let Some(table) = self.dispatch_table(type_name) {
            return Ok(table);
        }

        let contracted = self.is_contracted(type_name)?;
        let enforce = self.config.checked && contracted;

        if contracted {
            let mut chain: Vec<String> = self.ancestry(type_name)?.iter().rev().cloned().collect();
            chain.push(type_name.to_string());
            for name in &chain {
                self.verify_type(name)?;
            }
        }

        let table = {
            let lineage = self.lineage(type_name)?;
            let checked = enforce.then(|| lineage[0].checked.clone());
            Arc::new(DispatchTable::build(&lineage, checked))
        };
        let registration = self.lookup(type_name)?;
        let table = Arc::clone(registration.dispatch.get_or_init(|| table));

        info!(
            target: "covenant::registry",
            type_name = %type_name,
            features = table.feature_count(),
            invariants = table.invariant_count(),
            checked = enforce,
            "Type finalized"
        );
        Ok(table)
    }

    fn verify_type(&mut self, name: &str) -> Result<()> {
        let registration = self.lookup(name)?;
        if registration.verified {
            return Ok(());
        }
        registration.validate_contract()?;

        if self.config.checked && registration.checked.is_enabled() {
            let strict = self.config.override_strictness == OverrideStrictness::Strict;
            verify::verify_overrides(self, name, strict)?;
        } else {
            debug!(
                target: "covenant::verify",
                type_name = %name,
                "Override verification skipped (unchecked)"
            );
        }

        self.lookup_mut(name)?.verified = true;
        Ok(())
    }
}

impl<S: InstanceState> Default for TypeRegistry<S> {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl<S> fmt::Debug for TypeRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("config", &self.config)
            .field("types", &self.types.len())
            .finish()
    }
}
