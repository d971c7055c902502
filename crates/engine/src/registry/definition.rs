//! Fluent type definitions
//!
//! [`TypeDefinition`] collects a type declaration, its features, override
//! markers and contract data, then installs them under a single write lock.

use super::ContractRegistry;
use crate::instance::InstanceState;
use covenant_core::{
    BodyResult, ContractSpec, Demand, Ensure, FeatureImpl, Invariant, Rescue, Result, Value,
};
use std::sync::Arc;

enum Step<S> {
    Feature(String, FeatureImpl<S>),
    Override(String),
    Invariant(Invariant<S>),
    Demand(String, Demand<S>),
    Ensure(String, Ensure<S>),
    Rescue(String, Rescue<S>),
    Contract(Arc<ContractSpec<S>>),
}

/// Builder for one type definition
///
/// Nothing reaches the registry until [`install`](Self::install). Steps are
/// applied in the order they were added, so declare a feature before
/// attaching contract data to it.
///
/// ```
/// use covenant_engine::ContractRegistry;
/// use covenant_core::{Ensure, Value};
///
/// let registry = ContractRegistry::<Vec<i64>>::new();
/// registry
///     .define("Stack")
///     .contracted()
///     .method("push", 1, |items, args| {
///         items.push(Value::int_arg(args, 0).unwrap_or_default());
///         Ok(Value::Null)
///     })
///     .ensure("push", Ensure::new("one more item", |items: &Vec<i64>, old: &Vec<i64>, _: &[Value]| items.len() == old.len() + 1))
///     .getter("len", |items| Ok(Value::Int(items.len() as i64)))
///     .install()
///     .unwrap();
///
/// registry
///     .define("BoundedStack")
///     .extends("Stack")
///     .override_method("push", 1, |items, args| {
///         items.push(Value::int_arg(args, 0).unwrap_or_default());
///         Ok(Value::Null)
///     })
///     .install()
///     .unwrap();
///
/// assert_eq!(registry.ancestry("BoundedStack").unwrap(), vec!["Stack".to_string()]);
/// ```
#[must_use = "a type definition does nothing until installed"]
pub struct TypeDefinition<'r, S> {
    registry: &'r ContractRegistry<S>,
    name: String,
    parent: Option<String>,
    contracted: bool,
    steps: Vec<Step<S>>,
}

impl<'r, S: InstanceState> TypeDefinition<'r, S> {
    pub(super) fn new(registry: &'r ContractRegistry<S>, name: String) -> Self {
        TypeDefinition {
            registry,
            name,
            parent: None,
            contracted: false,
            steps: Vec::new(),
        }
    }

    /// Set the supertype
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Opt this type into contract enforcement
    pub fn contracted(mut self) -> Self {
        self.contracted = true;
        self
    }

    /// Declare a feature from a prepared implementation
    pub fn feature(mut self, name: impl Into<String>, implementation: FeatureImpl<S>) -> Self {
        self.steps.push(Step::Feature(name.into(), implementation));
        self
    }

    /// Declare a method
    pub fn method<F>(self, name: impl Into<String>, arity: usize, body: F) -> Self
    where
        F: Fn(&mut S, &[Value]) -> BodyResult<Value> + Send + Sync + 'static,
    {
        self.feature(name, FeatureImpl::method(arity, body))
    }

    /// Declare a method that overrides an ancestor method
    pub fn override_method<F>(self, name: impl Into<String>, arity: usize, body: F) -> Self
    where
        F: Fn(&mut S, &[Value]) -> BodyResult<Value> + Send + Sync + 'static,
    {
        let name = name.into();
        self.method(name.clone(), arity, body).overrides(name)
    }

    /// Declare a read-only accessor
    pub fn getter<G>(self, name: impl Into<String>, getter: G) -> Self
    where
        G: Fn(&S) -> BodyResult<Value> + Send + Sync + 'static,
    {
        self.feature(name, FeatureImpl::getter(getter))
    }

    /// Declare a read-write accessor
    pub fn accessor<G, W>(self, name: impl Into<String>, getter: G, setter: W) -> Self
    where
        G: Fn(&S) -> BodyResult<Value> + Send + Sync + 'static,
        W: Fn(&mut S, Value) -> BodyResult<()> + Send + Sync + 'static,
    {
        self.feature(name, FeatureImpl::accessor(getter, setter))
    }

    /// Declare a plain property
    pub fn property(self, name: impl Into<String>) -> Self {
        self.feature(name, FeatureImpl::property())
    }

    /// Mark a feature declared earlier in this definition as an override
    pub fn overrides(mut self, feature: impl Into<String>) -> Self {
        self.steps.push(Step::Override(feature.into()));
        self
    }

    /// Add an invariant
    pub fn invariant(mut self, invariant: Invariant<S>) -> Self {
        self.steps.push(Step::Invariant(invariant));
        self
    }

    /// Add a precondition to a feature of this type
    pub fn demand(mut self, feature: impl Into<String>, demand: Demand<S>) -> Self {
        self.steps.push(Step::Demand(feature.into(), demand));
        self
    }

    /// Add a postcondition to a feature of this type
    pub fn ensure(mut self, feature: impl Into<String>, ensure: Ensure<S>) -> Self {
        self.steps.push(Step::Ensure(feature.into(), ensure));
        self
    }

    /// Set the rescue handler of a feature of this type
    pub fn rescue(mut self, feature: impl Into<String>, rescue: Rescue<S>) -> Self {
        self.steps.push(Step::Rescue(feature.into(), rescue));
        self
    }

    /// Bind a contract spec
    pub fn contract(mut self, spec: Arc<ContractSpec<S>>) -> Self {
        self.steps.push(Step::Contract(spec));
        self
    }

    /// Apply the definition to the registry
    ///
    /// Stops at the first failing step. Steps applied before it stay
    /// registered.
    pub fn install(self) -> Result<()> {
        let TypeDefinition {
            registry,
            name,
            parent,
            contracted,
            steps,
        } = self;

        registry.update(|types| {
            types.declare_type(&name, parent.as_deref(), contracted)?;
            for step in steps {
                match step {
                    Step::Feature(feature, implementation) => {
                        types.declare_feature(&name, &feature, implementation)?
                    }
                    Step::Override(feature) => types.mark_override(&name, &feature)?,
                    Step::Invariant(invariant) => types.register_invariant(&name, invariant)?,
                    Step::Demand(feature, demand) => types.register_demand(&name, &feature, demand)?,
                    Step::Ensure(feature, ensure) => types.register_ensure(&name, &feature, ensure)?,
                    Step::Rescue(feature, rescue) => types.register_rescue(&name, &feature, rescue)?,
                    Step::Contract(spec) => types.bind_contract(&name, spec)?,
                }
            }
            Ok(())
        })
    }
}
