//! Contract specification
//!
//! A `ContractSpec` is the immutable, per-type description of an invariant
//! set plus, per feature name, demand and ensure sets and an optional rescue
//! handler. It is assembled with [`ContractSpecBuilder`] and shared behind an
//! `Arc` once built; nothing can mutate it afterwards. Binding a new spec to a
//! type replaces the old one rather than editing it.
//!
//! ## Normalization
//!
//! Unset demand or ensure entries become empty sets. An empty set is a
//! vacuously true conjunction, and the precondition combinator skips empty
//! levels so a level that demands nothing never widens admissibility.

use super::predicate::{Demand, Ensure, Invariant, Rescue};
use crate::error::{DeclarationError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Contract data for one feature name
pub struct FeatureContract<S> {
    demands: Vec<Demand<S>>,
    ensures: Vec<Ensure<S>>,
    rescue: Option<Rescue<S>>,
}

impl<S> FeatureContract<S> {
    /// Preconditions, conjunctive within this level
    pub fn demands(&self) -> &[Demand<S>] {
        &self.demands
    }

    /// Postconditions, conjunctive within this level
    pub fn ensures(&self) -> &[Ensure<S>] {
        &self.ensures
    }

    /// Rescue handler, if any
    pub fn rescue(&self) -> Option<&Rescue<S>> {
        self.rescue.as_ref()
    }
}

impl<S> Default for FeatureContract<S> {
    fn default() -> Self {
        FeatureContract {
            demands: Vec::new(),
            ensures: Vec::new(),
            rescue: None,
        }
    }
}

impl<S> fmt::Debug for FeatureContract<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureContract")
            .field("demands", &self.demands)
            .field("ensures", &self.ensures)
            .field("rescue", &self.rescue.is_some())
            .finish()
    }
}

/// Immutable contract description for one type
pub struct ContractSpec<S> {
    invariants: Vec<Invariant<S>>,
    features: BTreeMap<String, FeatureContract<S>>,
}

impl<S> ContractSpec<S> {
    /// Start assembling a spec
    pub fn builder() -> ContractSpecBuilder<S> {
        ContractSpecBuilder::new()
    }

    /// A spec with no invariants and no feature contracts
    pub fn empty() -> Arc<Self> {
        Arc::new(ContractSpec {
            invariants: Vec::new(),
            features: BTreeMap::new(),
        })
    }

    /// Invariant predicates in declaration order
    pub fn invariants(&self) -> &[Invariant<S>] {
        &self.invariants
    }

    /// Contract data for `feature`, if the spec mentions it
    pub fn feature(&self, feature: &str) -> Option<&FeatureContract<S>> {
        self.features.get(feature)
    }

    /// All feature names the spec mentions, sorted
    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }

    /// Iterate over (feature name, contract) pairs
    pub fn features(&self) -> impl Iterator<Item = (&str, &FeatureContract<S>)> {
        self.features.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<S> fmt::Debug for ContractSpec<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractSpec")
            .field("invariants", &self.invariants)
            .field("features", &self.features)
            .finish()
    }
}

/// Builder for [`ContractSpec`]
///
/// Declaration mistakes are collected while chaining and reported by
/// [`ContractSpecBuilder::build`], so the builder stays fluent.
///
/// # Example
///
/// ```
/// use covenant_core::contract::{ContractSpec, Demand, Ensure, Invariant};
/// use covenant_core::Value;
///
/// let spec = ContractSpec::<i64>::builder()
///     .invariant(Invariant::new("non-negative", |n| *n >= 0))
///     .demands("dec", Demand::new("positive", |n, _| *n > 0))
///     .ensures("inc", Ensure::new("grew by one", |n, old, _| *n == *old + 1))
///     .build()
///     .unwrap();
///
/// assert_eq!(spec.invariants().len(), 1);
/// assert_eq!(spec.feature("dec").unwrap().demands().len(), 1);
/// ```
pub struct ContractSpecBuilder<S> {
    invariants: Vec<Invariant<S>>,
    features: BTreeMap<String, FeatureContract<S>>,
    error: Option<DeclarationError>,
}

impl<S> ContractSpecBuilder<S> {
    /// Create an empty builder
    pub fn new() -> Self {
        ContractSpecBuilder {
            invariants: Vec::new(),
            features: BTreeMap::new(),
            error: None,
        }
    }

    /// Append an invariant
    pub fn invariant(mut self, invariant: Invariant<S>) -> Self {
        self.invariants.push(invariant);
        self
    }

    /// Append a precondition to `feature`
    pub fn demands(mut self, feature: impl Into<String>, demand: Demand<S>) -> Self {
        if let Some(entry) = self.entry(feature.into()) {
            entry.demands.push(demand);
        }
        self
    }

    /// Append a postcondition to `feature`
    pub fn ensures(mut self, feature: impl Into<String>, ensure: Ensure<S>) -> Self {
        if let Some(entry) = self.entry(feature.into()) {
            entry.ensures.push(ensure);
        }
        self
    }

    /// Set the rescue handler of `feature`; at most one per feature
    pub fn rescue(mut self, feature: impl Into<String>, rescue: Rescue<S>) -> Self {
        let feature = feature.into();
        let name = feature.clone();
        let duplicate = match self.entry(feature) {
            Some(entry) if entry.rescue.is_some() => true,
            Some(entry) => {
                entry.rescue = Some(rescue);
                false
            }
            None => false,
        };
        if duplicate {
            self.record(DeclarationError::DuplicateSpecRescue { feature: name });
        }
        self
    }

    /// Freeze the spec
    ///
    /// # Errors
    ///
    /// Returns the first declaration mistake recorded while building.
    pub fn build(self) -> Result<Arc<ContractSpec<S>>> {
        if let Some(err) = self.error {
            return Err(err.into());
        }
        Ok(Arc::new(ContractSpec {
            invariants: self.invariants,
            features: self.features,
        }))
    }

    fn entry(&mut self, feature: String) -> Option<&mut FeatureContract<S>> {
        if feature.is_empty() {
            self.record(DeclarationError::InvalidName(feature));
            return None;
        }
        Some(self.features.entry(feature).or_default())
    }

    fn record(&mut self, error: DeclarationError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}

impl<S> Default for ContractSpecBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}
