//! Predicates and rescue handlers
//!
//! Each predicate pairs a closure with a textual label. The label is what
//! shows up in violation errors, so the `invariant!`, `demand!` and `ensure!`
//! macros fill it in from the closure's source text.

use crate::error::{BusinessError, Error, Result};
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

type InvariantFn<S> = dyn Fn(&S) -> bool + Send + Sync;
type DemandFn<S> = dyn Fn(&S, &[Value]) -> bool + Send + Sync;
type EnsureFn<S> = dyn Fn(&S, &S, &[Value]) -> bool + Send + Sync;
type RescueFn<S> = dyn Fn(&mut S, &BusinessError, &[Value], &mut Retry) + Send + Sync;

/// Class invariant: `(instance) -> bool`
pub struct Invariant<S> {
    label: Arc<str>,
    check: Arc<InvariantFn<S>>,
}

impl<S> Invariant<S> {
    /// Create a labelled invariant
    pub fn new<F>(label: impl Into<String>, check: F) -> Self
    where
        F: Fn(&S) -> bool + Send + Sync + 'static,
    {
        Invariant {
            label: label.into().into(),
            check: Arc::new(check),
        }
    }

    /// Textual form of the predicate
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Evaluate against an instance
    #[inline]
    pub fn holds(&self, state: &S) -> bool {
        (self.check)(state)
    }
}

/// Precondition: `(instance, args) -> bool`
pub struct Demand<S> {
    label: Arc<str>,
    check: Arc<DemandFn<S>>,
}

impl<S> Demand<S> {
    /// Create a labelled precondition
    pub fn new<F>(label: impl Into<String>, check: F) -> Self
    where
        F: Fn(&S, &[Value]) -> bool + Send + Sync + 'static,
    {
        Demand {
            label: label.into().into(),
            check: Arc::new(check),
        }
    }

    /// Textual form of the predicate
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Evaluate against an instance and the call arguments
    #[inline]
    pub fn holds(&self, state: &S, args: &[Value]) -> bool {
        (self.check)(state, args)
    }
}

/// Postcondition: `(instance, old, args) -> bool`
///
/// `old` is a snapshot of the instance taken before the body ran.
pub struct Ensure<S> {
    label: Arc<str>,
    check: Arc<EnsureFn<S>>,
}

impl<S> Ensure<S> {
    /// Create a labelled postcondition
    pub fn new<F>(label: impl Into<String>, check: F) -> Self
    where
        F: Fn(&S, &S, &[Value]) -> bool + Send + Sync + 'static,
    {
        Ensure {
            label: label.into().into(),
            check: Arc::new(check),
        }
    }

    /// Textual form of the predicate
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Evaluate against the instance, its pre-call snapshot and the arguments
    #[inline]
    pub fn holds(&self, state: &S, old: &S, args: &[Value]) -> bool {
        (self.check)(state, old, args)
    }
}

/// Rescue handler: `(instance, error, original args, retry)`
///
/// The handler may repair the instance and request one retry with new
/// arguments. If it never calls [`Retry::retry`], the original error
/// propagates.
pub struct Rescue<S> {
    handler: Arc<RescueFn<S>>,
}

impl<S> Rescue<S> {
    /// Wrap a handler closure
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&mut S, &BusinessError, &[Value], &mut Retry) + Send + Sync + 'static,
    {
        Rescue {
            handler: Arc::new(handler),
        }
    }

    /// Run the handler
    pub fn handle(&self, state: &mut S, error: &BusinessError, args: &[Value], retry: &mut Retry) {
        (self.handler)(state, error, args, retry)
    }
}

// Manual Clone impls: the closures live behind Arc, so no `S: Clone` bound.

impl<S> Clone for Invariant<S> {
    fn clone(&self) -> Self {
        Invariant {
            label: Arc::clone(&self.label),
            check: Arc::clone(&self.check),
        }
    }
}

impl<S> Clone for Demand<S> {
    fn clone(&self) -> Self {
        Demand {
            label: Arc::clone(&self.label),
            check: Arc::clone(&self.check),
        }
    }
}

impl<S> Clone for Ensure<S> {
    fn clone(&self) -> Self {
        Ensure {
            label: Arc::clone(&self.label),
            check: Arc::clone(&self.check),
        }
    }
}

impl<S> Clone for Rescue<S> {
    fn clone(&self) -> Self {
        Rescue {
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<S> fmt::Debug for Invariant<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invariant({})", self.label)
    }
}

impl<S> fmt::Debug for Demand<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Demand({})", self.label)
    }
}

impl<S> fmt::Debug for Ensure<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ensure({})", self.label)
    }
}

impl<S> fmt::Debug for Rescue<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Rescue(..)")
    }
}

/// Retry token handed to a rescue handler
///
/// One token exists per intercepted invocation. The first call to
/// [`Retry::retry`] records the new arguments; the engine re-runs the
/// feature with them once the handler returns. A second call is a
/// retry-protocol violation and fails the invocation even if the handler
/// ignores the returned error.
#[derive(Debug)]
pub struct Retry {
    type_name: Arc<str>,
    feature: Arc<str>,
    calls: u32,
    args: Option<Vec<Value>>,
}

impl Retry {
    /// Fresh token for one invocation of `type_name.feature`
    pub fn new(type_name: Arc<str>, feature: Arc<str>) -> Self {
        Retry {
            type_name,
            feature,
            calls: 0,
            args: None,
        }
    }

    /// Request a retry of the rescued feature with `args`
    pub fn retry(&mut self, args: Vec<Value>) -> Result<()> {
        self.calls += 1;
        if self.calls > 1 {
            return Err(self.violation());
        }
        self.args = Some(args);
        Ok(())
    }

    /// Whether `retry` has been called at least once
    pub fn has_retried(&self) -> bool {
        self.calls > 0
    }

    /// Consume the token: `Ok(Some(args))` to retry, `Ok(None)` to rethrow
    pub fn into_outcome(self) -> Result<Option<Vec<Value>>> {
        if self.calls > 1 {
            return Err(self.violation());
        }
        Ok(self.args)
    }

    fn violation(&self) -> Error {
        Error::RetryViolation {
            type_name: self.type_name.to_string(),
            feature: self.feature.to_string(),
        }
    }
}

/// Build an [`Invariant`] labelled with the closure's source text
///
/// ```
/// use covenant_core::invariant;
///
/// let inv = invariant!(|n: &i64| *n >= 0);
/// assert!(inv.holds(&3));
/// assert!(inv.label().contains("n >= 0"));
/// ```
#[macro_export]
macro_rules! invariant {
    ($check:expr) => {
        $crate::contract::Invariant::new(stringify!($check), $check)
    };
}

/// Build a [`Demand`] labelled with the closure's source text
#[macro_export]
macro_rules! demand {
    ($check:expr) => {
        $crate::contract::Demand::new(stringify!($check), $check)
    };
}

/// Build an [`Ensure`] labelled with the closure's source text
#[macro_export]
macro_rules! ensure {
    ($check:expr) => {
        $crate::contract::Ensure::new(stringify!($check), $check)
    };
}
