//! Contract registry
//!
//! [`ContractRegistry`] is the entry point of the engine. It owns a
//! [`TypeRegistry`] behind a `parking_lot::RwLock` and exposes the
//! registration API, finalization, and instantiation.
//!
//! Registration takes the write lock. Instantiating an already finalized type
//! only takes the read lock to clone the cached dispatch table. Calls on
//! instances never touch the registry.
//!
//! # Example
//!
//! ```
//! use covenant_engine::ContractRegistry;
//! use covenant_core::{Demand, Value};
//!
//! let registry = ContractRegistry::<i64>::new();
//! registry
//!     .define("Counter")
//!     .contracted()
//!     .method("add", 1, |n, args| {
//!         *n += Value::int_arg(args, 0).unwrap_or(0);
//!         Ok(Value::Int(*n))
//!     })
//!     .demand("add", Demand::new("positive step", |_, args| {
//!         Value::int_arg(args, 0).map_or(false, |step| step > 0)
//!     }))
//!     .install()
//!     .unwrap();
//!
//! let mut counter = registry.instantiate("Counter", 0).unwrap();
//! assert_eq!(counter.call("add", &[Value::Int(2)]).unwrap(), Value::Int(2));
//! assert!(counter.call("add", &[Value::Int(-1)]).is_err());
//! ```

mod definition;
mod types;

pub use definition::TypeDefinition;
pub use types::{FeatureRegistration, TypeRegistration, TypeRegistry};

use crate::config::EngineConfig;
use crate::dispatch::DispatchTable;
use crate::instance::{Instance, InstanceState};
use covenant_core::{ContractSpec, Demand, Ensure, FeatureImpl, Invariant, Rescue, Result};
use parking_lot::RwLock;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

// Uses parking_lot::RwLock so a panicking predicate cannot poison the registry.

/// Thread-safe registry of contracted types
pub struct ContractRegistry<S> {
    inner: RwLock<TypeRegistry<S>>,
}

impl<S: InstanceState> ContractRegistry<S> {
    /// Registry with the default configuration (checked, strict overrides)
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Registry with an explicit configuration
    pub fn with_config(config: EngineConfig) -> Self {
        ContractRegistry {
            inner: RwLock::new(TypeRegistry::new(config)),
        }
    }

    /// Registry configured from a `covenant.toml` file
    pub fn from_config_file(path: &Path) -> Result<Self> {
        Ok(Self::with_config(EngineConfig::from_file(path)?))
    }

    /// Configuration in effect
    pub fn config(&self) -> EngineConfig {
        self.inner.read().config().clone()
    }

    /// Start a fluent definition of `name`
    pub fn define(&self, name: impl Into<String>) -> TypeDefinition<'_, S> {
        TypeDefinition::new(self, name.into())
    }

    /// Run `f` with read access to the underlying type registry
    pub fn inspect<R>(&self, f: impl FnOnce(&TypeRegistry<S>) -> R) -> R {
        f(&self.inner.read())
    }

    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut TypeRegistry<S>) -> R) -> R {
        f(&mut self.inner.write())
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    /// Declare a type that does not opt into enforcement itself
    pub fn declare_type(&self, name: &str, parent: Option<&str>) -> Result<()> {
        self.inner.write().declare_type(name, parent, false)
    }

    /// Declare a type that opts into enforcement
    pub fn declare_contracted(&self, name: &str, parent: Option<&str>) -> Result<()> {
        self.inner.write().declare_type(name, parent, true)
    }

    /// Declare a feature on a type
    pub fn declare_feature(&self, type_name: &str, feature: &str, implementation: FeatureImpl<S>) -> Result<()> {
        self.inner.write().declare_feature(type_name, feature, implementation)
    }

    /// Mark an own feature as overriding an ancestor feature
    pub fn mark_override(&self, type_name: &str, feature: &str) -> Result<()> {
        self.inner.write().mark_override(type_name, feature)
    }

    // ========================================================================
    // Contract data
    // ========================================================================

    /// Add an invariant
    pub fn register_invariant(&self, type_name: &str, invariant: Invariant<S>) -> Result<()> {
        self.inner.write().register_invariant(type_name, invariant)
    }

    /// Add a precondition to an own feature
    pub fn register_demand(&self, type_name: &str, feature: &str, demand: Demand<S>) -> Result<()> {
        self.inner.write().register_demand(type_name, feature, demand)
    }

    /// Add a postcondition to an own feature
    pub fn register_ensure(&self, type_name: &str, feature: &str, ensure: Ensure<S>) -> Result<()> {
        self.inner.write().register_ensure(type_name, feature, ensure)
    }

    /// Set the rescue handler of an own feature
    pub fn register_rescue(&self, type_name: &str, feature: &str, rescue: Rescue<S>) -> Result<()> {
        self.inner.write().register_rescue(type_name, feature, rescue)
    }

    /// Attach a contract spec, replacing any earlier one
    pub fn bind_contract(&self, type_name: &str, spec: Arc<ContractSpec<S>>) -> Result<()> {
        self.inner.write().bind_contract(type_name, spec)
    }

    /// Turn enforcement on or off for one type
    pub fn set_checked_mode(&self, type_name: &str, enabled: bool) -> Result<()> {
        self.inner.read().set_checked_mode(type_name, enabled)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Proper ancestors of a type, nearest first
    pub fn ancestry(&self, type_name: &str) -> Result<Vec<String>> {
        self.inner.read().ancestry(type_name).map(<[String]>::to_vec)
    }

    /// Whether the type or any ancestor opted into enforcement
    pub fn is_contracted(&self, type_name: &str) -> Result<bool> {
        self.inner.read().is_contracted(type_name)
    }

    /// Whether override verification has run for the type
    pub fn is_verified(&self, type_name: &str) -> bool {
        self.inner
            .read()
            .get(type_name)
            .map_or(false, TypeRegistration::is_verified)
    }

    // ========================================================================
    // Finalization
    // ========================================================================

    /// Verify the type and its ancestors and build its dispatch table
    ///
    /// Idempotent: later calls return the same table.
    pub fn finalize(&self, type_name: &str) -> Result<Arc<DispatchTable<S>>> {
        let cached = self.inner.read().dispatch_table(type_name);
        match cached {
            Some(table) => Ok(table),
            None => self.inner.write().finalize(type_name),
        }
    }

    /// Create an instance of `type_name` owning `state`
    ///
    /// Finalizes the type on first use. In checked mode the fresh state must
    /// satisfy every invariant of the type and its ancestors.
    pub fn instantiate(&self, type_name: &str, state: S) -> Result<Instance<S>> {
        let table = self.finalize(type_name)?;
        Instance::new(table, state)
    }
}

impl<S: InstanceState> Default for ContractRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for ContractRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractRegistry")
            .field("inner", &*self.inner.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_core::{DeclarationError, Error, Value};

    #[derive(Debug, Clone, PartialEq)]
    struct Account {
        balance: i64,
    }

    fn accounts() -> ContractRegistry<Account> {
        let registry = ContractRegistry::new();
        registry.declare_contracted("Account", None).unwrap();
        registry
            .declare_feature(
                "Account",
                "deposit",
                FeatureImpl::method(1, |a: &mut Account, args| {
                    a.balance += Value::int_arg(args, 0).unwrap_or(0);
                    Ok(Value::Int(a.balance))
                }),
            )
            .unwrap();
        registry
            .register_invariant("Account", Invariant::new("balance >= 0", |a: &Account| a.balance >= 0))
            .unwrap();
        registry
    }

    #[test]
    fn test_instantiate_finalizes_once() {
        let registry = accounts();
        assert!(!registry.is_verified("Account"));

        let first = registry.instantiate("Account", Account { balance: 0 }).unwrap();
        let table = registry.finalize("Account").unwrap();
        assert!(registry.is_verified("Account"));
        assert!(Arc::ptr_eq(first.dispatch_table(), &table));
    }

    #[test]
    fn test_instantiate_checks_invariants() {
        let registry = accounts();
        let result = registry.instantiate("Account", Account { balance: -5 });
        assert!(matches!(result, Err(Error::InvariantViolation { .. })));
    }

    #[test]
    fn test_unchecked_registry_skips_construction_check() {
        let registry = ContractRegistry::with_config(EngineConfig::unchecked());
        registry.declare_contracted("Account", None).unwrap();
        registry
            .register_invariant("Account", Invariant::new("never", |_: &Account| false))
            .unwrap();
        assert!(registry.instantiate("Account", Account { balance: 0 }).is_ok());
    }

    #[test]
    fn test_registration_after_instantiation_rejected() {
        let registry = accounts();
        registry.instantiate("Account", Account { balance: 1 }).unwrap();
        let result = registry.register_invariant("Account", Invariant::new("late", |_: &Account| true));
        assert!(matches!(
            result,
            Err(Error::Declaration(DeclarationError::AlreadyFinalized { .. }))
        ));
    }

    #[test]
    fn test_ancestry_query() {
        let registry = accounts();
        registry.declare_type("Savings", Some("Account")).unwrap();
        assert_eq!(registry.ancestry("Savings").unwrap(), vec!["Account".to_string()]);
        assert!(registry.is_contracted("Savings").unwrap());
    }

    #[test]
    fn test_registry_is_shareable_across_threads() {
        let registry = Arc::new(accounts());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let mut account = registry.instantiate("Account", Account { balance: 0 }).unwrap();
                    account.call("deposit", &[Value::Int(i)]).unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().is_ok());
        }
    }
}
