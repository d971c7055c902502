//! Contracted instances
//!
//! An [`Instance`] owns its state and shares its type's dispatch table.
//! Features are reached only through [`call`](Instance::call),
//! [`get`](Instance::get) and [`set`](Instance::set); the state is otherwise
//! read-only from outside.

use crate::dispatch::{DispatchMetrics, DispatchTable};
use covenant_core::{Result, Value};
use std::fmt;
use std::sync::Arc;

/// Bound on instance state
///
/// `Clone` provides the old-state snapshot for postconditions.
pub trait InstanceState: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> InstanceState for T {}

/// An instance of a finalized type
pub struct Instance<S> {
    table: Arc<DispatchTable<S>>,
    state: S,
}

impl<S: InstanceState> Instance<S> {
    /// Wrap `state`, checking invariants when the table enforces them
    pub(crate) fn new(table: Arc<DispatchTable<S>>, state: S) -> Result<Self> {
        if table.is_enforcing() {
            table.check_invariants(&state)?;
        }
        Ok(Instance { table, state })
    }

    /// Name of the instance's type
    pub fn type_name(&self) -> &str {
        self.table.type_name()
    }

    /// Read-only view of the state
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Give up the instance and keep the state
    pub fn into_state(self) -> S {
        self.state
    }

    /// Invoke a method
    pub fn call(&mut self, feature: &str, args: &[Value]) -> Result<Value> {
        self.table.call(&mut self.state, feature, args)
    }

    /// Read an accessor
    pub fn get(&mut self, feature: &str) -> Result<Value> {
        self.table.get(&mut self.state, feature)
    }

    /// Write an accessor
    pub fn set(&mut self, feature: &str, value: impl Into<Value>) -> Result<()> {
        self.table.set(&mut self.state, feature, value.into())
    }

    /// Evaluate the invariants of the type and its ancestors now
    pub fn check_invariants(&self) -> Result<()> {
        self.table.check_invariants(&self.state)
    }

    /// The shared dispatch table
    pub fn dispatch_table(&self) -> &Arc<DispatchTable<S>> {
        &self.table
    }

    /// Dispatch counters of the instance's type
    pub fn metrics(&self) -> DispatchMetrics {
        self.table.metrics()
    }
}

impl<S: InstanceState> Clone for Instance<S> {
    fn clone(&self) -> Self {
        Instance {
            table: Arc::clone(&self.table),
            state: self.state.clone(),
        }
    }
}

impl<S: InstanceState + fmt::Debug> fmt::Debug for Instance<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type_name", &self.type_name())
            .field("state", &self.state)
            .finish()
    }
}
