//! Feature interception
//!
//! A [`DispatchTable`] is built once per type at finalization. It maps every
//! feature visible on the type (own and inherited) to the nearest
//! implementation and to the contract levels collected from the lineage.
//!
//! # Combination rules
//!
//! - Preconditions: a call is admissible when the demands of at least one
//!   level all hold. Levels that demand nothing are skipped; with no demand
//!   levels at all every call is admissible.
//! - Postconditions: every ensure of every level must hold.
//! - Rescue: the nearest level with a handler supplies it.
//! - Invariants: those of the type and all ancestors, nearest first. The
//!   first failing one is reported.
//!
//! # Call protocol
//!
//! 1. Entry invariants
//! 2. Demands
//! 3. Old-state snapshot (only when some level has ensures)
//! 4. Body
//! 5. On success, ensures. On a business error, rescue and possibly retry
//!    from step 2 with the new arguments.
//! 6. Exit invariants, on success and on error. An exit violation replaces
//!    whatever error was propagating.
//!
//! Contract evaluation and rescue handlers run with the reentrancy guard
//! raised. Precondition and postcondition failures never reach a rescue
//! handler.

use crate::guard::{self, Suspension};
use crate::instance::InstanceState;
use crate::registry::{FeatureRegistration, TypeRegistration};
use covenant_core::{
    BodyResult, BusinessError, CheckedMode, Demand, Ensure, Error, FeatureImpl, FeatureKind,
    GetterBody, Invariant, MethodBody, Rescue, Result, Retry, SetterBody, Value,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

// ============================================================================
// Levels
// ============================================================================

/// Predicates contributed by one type in the lineage
struct Level<P> {
    declared_in: Arc<str>,
    predicates: Vec<P>,
}

/// Precondition weakening: admissible when any level is fully satisfied.
///
/// On failure returns the first failing demand of every level, nearest level
/// first, formatted as `Type: label`.
fn require_any_level<S>(
    levels: &[Level<Demand<S>>],
    state: &S,
    args: &[Value],
) -> std::result::Result<(), Vec<String>> {
    if levels.is_empty() {
        return Ok(());
    }
    let mut unsatisfied = Vec::with_capacity(levels.len());
    for level in levels {
        match level.predicates.iter().find(|demand| !demand.holds(state, args)) {
            None => return Ok(()),
            Some(failed) => unsatisfied.push(format!("{}: {}", level.declared_in, failed.label())),
        }
    }
    Err(unsatisfied)
}

/// Postcondition strengthening: every ensure of every level must hold.
///
/// On failure returns the declaring type and label of the first failing
/// ensure, nearest level first.
fn ensure_every_level<'a, S>(
    levels: &'a [Level<Ensure<S>>],
    state: &S,
    old: &S,
    args: &[Value],
) -> std::result::Result<(), (&'a str, &'a str)> {
    for level in levels {
        if let Some(failed) = level
            .predicates
            .iter()
            .find(|ensure| !ensure.holds(state, old, args))
        {
            return Err((&*level.declared_in, failed.label()));
        }
    }
    Ok(())
}

// ============================================================================
// Entries
// ============================================================================

/// Dispatch entry for one feature name
pub struct FeatureEntry<S> {
    name: Arc<str>,
    declared_in: Arc<str>,
    implementation: FeatureImpl<S>,
    demand_levels: Vec<Level<Demand<S>>>,
    ensure_levels: Vec<Level<Ensure<S>>>,
    rescue: Option<Rescue<S>>,
}

impl<S> FeatureEntry<S> {
    fn new(feature: &FeatureRegistration<S>, declared_in: Arc<str>) -> Self {
        FeatureEntry {
            name: Arc::from(feature.name()),
            declared_in,
            implementation: feature.implementation().clone(),
            demand_levels: Vec::new(),
            ensure_levels: Vec::new(),
            rescue: None,
        }
    }

    fn add_level(&mut self, registration: &TypeRegistration<S>) {
        let level = registration.level_contract(&self.name);
        if !level.demands.is_empty() {
            self.demand_levels.push(Level {
                declared_in: registration.name_arc(),
                predicates: level.demands,
            });
        }
        if !level.ensures.is_empty() {
            self.ensure_levels.push(Level {
                declared_in: registration.name_arc(),
                predicates: level.ensures,
            });
        }
        if self.rescue.is_none() {
            self.rescue = level.rescue;
        }
    }

    /// Feature name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type whose implementation is dispatched to
    pub fn declared_in(&self) -> &str {
        &self.declared_in
    }

    /// Kind of the dispatched implementation
    pub fn kind(&self) -> FeatureKind {
        self.implementation.kind()
    }

    /// Number of ancestry levels with a non-empty demand set
    pub fn demand_level_count(&self) -> usize {
        self.demand_levels.len()
    }

    /// Number of ancestry levels with a non-empty ensure set
    pub fn ensure_level_count(&self) -> usize {
        self.ensure_levels.len()
    }

    /// Whether some level supplies a rescue handler
    pub fn has_rescue(&self) -> bool {
        self.rescue.is_some()
    }
}

impl<S> fmt::Debug for FeatureEntry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureEntry")
            .field("name", &self.name)
            .field("declared_in", &self.declared_in)
            .field("kind", &self.kind())
            .field("demand_levels", &self.demand_levels.len())
            .field("ensure_levels", &self.ensure_levels.len())
            .field("rescue", &self.rescue.is_some())
            .finish()
    }
}

/// The body reached by one access form
enum Target<'a, S> {
    Method(&'a MethodBody<S>),
    Getter(&'a GetterBody<S>),
    Setter(&'a SetterBody<S>),
}

impl<S> Target<'_, S> {
    fn run(&self, state: &mut S, args: &[Value]) -> BodyResult<Value> {
        match self {
            Target::Method(body) => body(state, args),
            Target::Getter(getter) => getter(&*state),
            Target::Setter(setter) => {
                let value = args.first().cloned().unwrap_or_default();
                setter(state, value).map(|()| Value::Null)
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Access {
    Call,
    Get,
    Set,
}

// ============================================================================
// Statistics
// ============================================================================

/// Per-type dispatch counters
#[derive(Debug, Default)]
struct DispatchStats {
    checked_calls: AtomicU64,
    violations: AtomicU64,
    rescues: AtomicU64,
    retries: AtomicU64,
}

/// Snapshot of a type's dispatch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchMetrics {
    /// Calls that went through the checked protocol
    pub checked_calls: u64,
    /// Calls that ended in a contract violation
    pub violations: u64,
    /// Business errors handed to a rescue handler
    pub rescues: u64,
    /// Retries requested by rescue handlers
    pub retries: u64,
}

impl DispatchMetrics {
    /// Fraction of checked calls that ended in a violation
    pub fn violation_rate(&self) -> f64 {
        if self.checked_calls > 0 {
            self.violations as f64 / self.checked_calls as f64
        } else {
            0.0
        }
    }
}

// ============================================================================
// Dispatch table
// ============================================================================

struct ScopedInvariant<S> {
    declared_in: Arc<str>,
    invariant: Invariant<S>,
}

/// Per-type dispatch table, shared by every instance of the type
pub struct DispatchTable<S> {
    type_name: Arc<str>,
    checked: Option<CheckedMode>,
    invariants: Vec<ScopedInvariant<S>>,
    entries: HashMap<String, FeatureEntry<S>>,
    stats: DispatchStats,
}

impl<S: InstanceState> DispatchTable<S> {
    /// Build from a lineage, the type itself first and its root last.
    ///
    /// With `checked` absent the table dispatches straight to the original
    /// bodies and carries no contract data.
    pub(crate) fn build(lineage: &[&TypeRegistration<S>], checked: Option<CheckedMode>) -> Self {
        let type_name = lineage
            .first()
            .map_or_else(|| Arc::from(""), |owner| owner.name_arc());

        let mut entries: HashMap<String, FeatureEntry<S>> = HashMap::new();
        for registration in lineage {
            for feature in registration.features() {
                let entry = entries
                    .entry(feature.name().to_string())
                    .or_insert_with(|| FeatureEntry::new(feature, registration.name_arc()));
                if checked.is_some() {
                    entry.add_level(registration);
                }
            }
        }

        let invariants = if checked.is_some() {
            lineage
                .iter()
                .flat_map(|registration| {
                    let declared_in = registration.name_arc();
                    registration
                        .merged_invariants()
                        .into_iter()
                        .map(move |invariant| ScopedInvariant {
                            declared_in: Arc::clone(&declared_in),
                            invariant,
                        })
                })
                .collect()
        } else {
            Vec::new()
        };

        DispatchTable {
            type_name,
            checked,
            invariants,
            entries,
            stats: DispatchStats::default(),
        }
    }

    /// Type this table dispatches for
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Number of visible features
    pub fn feature_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of invariants checked around each call
    pub fn invariant_count(&self) -> usize {
        self.invariants.len()
    }

    /// Entry for a visible feature
    pub fn entry(&self, feature: &str) -> Option<&FeatureEntry<S>> {
        self.entries.get(feature)
    }

    /// Whether the table wraps anything at all
    pub fn is_checked(&self) -> bool {
        self.checked.is_some()
    }

    /// Whether a call made now on this thread would be checked
    pub fn is_enforcing(&self) -> bool {
        self.checked.as_ref().map_or(false, CheckedMode::is_enabled) && !guard::is_suspended()
    }

    /// Current dispatch counters
    pub fn metrics(&self) -> DispatchMetrics {
        DispatchMetrics {
            checked_calls: self.stats.checked_calls.load(Ordering::Relaxed),
            violations: self.stats.violations.load(Ordering::Relaxed),
            rescues: self.stats.rescues.load(Ordering::Relaxed),
            retries: self.stats.retries.load(Ordering::Relaxed),
        }
    }

    /// Evaluate every invariant of the type and its ancestors on `state`
    pub fn check_invariants(&self, state: &S) -> Result<()> {
        let _guard = Suspension::raise();
        for scoped in &self.invariants {
            if !scoped.invariant.holds(state) {
                return Err(Error::InvariantViolation {
                    type_name: self.type_name.to_string(),
                    declared_in: scoped.declared_in.to_string(),
                    predicate: scoped.invariant.label().to_string(),
                });
            }
        }
        Ok(())
    }

    // ========================================================================
    // Access forms
    // ========================================================================

    /// Call a method
    pub fn call(&self, state: &mut S, feature: &str, args: &[Value]) -> Result<Value> {
        let (entry, target) = self.resolve(feature, Access::Call)?;
        self.check_arguments(entry, &target, args)?;
        self.dispatch(entry, &target, state, args)
    }

    /// Read an accessor
    pub fn get(&self, state: &mut S, feature: &str) -> Result<Value> {
        let (entry, target) = self.resolve(feature, Access::Get)?;
        self.dispatch(entry, &target, state, &[])
    }

    /// Write an accessor
    pub fn set(&self, state: &mut S, feature: &str, value: Value) -> Result<()> {
        let (entry, target) = self.resolve(feature, Access::Set)?;
        self.dispatch(entry, &target, state, &[value]).map(|_| ())
    }

    fn resolve(&self, feature: &str, access: Access) -> Result<(&FeatureEntry<S>, Target<'_, S>)> {
        let entry = self.entries.get(feature).ok_or_else(|| Error::NoSuchFeature {
            type_name: self.type_name.to_string(),
            feature: feature.to_string(),
        })?;

        let target = match (&entry.implementation, access) {
            (FeatureImpl::Method { body, .. }, Access::Call) => Target::Method(body),
            (FeatureImpl::Method { .. }, _) => {
                return Err(self.invalid_access(feature, "methods are invoked with call"));
            }
            (FeatureImpl::Accessor { getter: Some(getter), .. }, Access::Get) => Target::Getter(getter),
            (FeatureImpl::Accessor { setter: Some(setter), .. }, Access::Set) => Target::Setter(setter),
            (FeatureImpl::Accessor { .. }, Access::Get) => {
                return Err(self.invalid_access(feature, "accessor has no getter"));
            }
            (FeatureImpl::Accessor { .. }, Access::Set) => {
                return Err(self.invalid_access(feature, "accessor has no setter"));
            }
            (FeatureImpl::Accessor { .. }, Access::Call) => {
                return Err(self.invalid_access(feature, "accessors are read with get and written with set"));
            }
            (FeatureImpl::Property, _) => {
                return Err(self.invalid_access(feature, "properties have no body"));
            }
        };
        Ok((entry, target))
    }

    /// Argument count must match the method arity; getters take none and
    /// setters exactly one.
    fn check_arguments(&self, entry: &FeatureEntry<S>, target: &Target<'_, S>, args: &[Value]) -> Result<()> {
        let expected = match (target, &entry.implementation) {
            (Target::Method(_), FeatureImpl::Method { arity, .. }) => *arity,
            (Target::Getter(_), _) => 0,
            (Target::Setter(_), _) => 1,
            (Target::Method(_), _) => return Ok(()),
        };
        if expected == args.len() {
            return Ok(());
        }
        Err(self.invalid_access(
            &entry.name,
            format!("expected {} argument(s), got {}", expected, args.len()),
        ))
    }

    fn invalid_access(&self, feature: &str, reason: impl Into<String>) -> Error {
        Error::InvalidAccess {
            type_name: self.type_name.to_string(),
            feature: feature.to_string(),
            reason: reason.into(),
        }
    }

    // ========================================================================
    // Protocol
    // ========================================================================

    fn dispatch(&self, entry: &FeatureEntry<S>, target: &Target<'_, S>, state: &mut S, args: &[Value]) -> Result<Value> {
        if !self.is_enforcing() {
            return target.run(state, args).map_err(Error::Business);
        }
        self.stats.checked_calls.fetch_add(1, Ordering::Relaxed);

        let result = self
            .check_invariants(state)
            .and_then(|()| self.invoke_checked(entry, target, state, args));
        // exit violation supersedes
        let result = self.check_invariants(state).and(result);

        if let Err(error) = &result {
            if error.is_contract_violation() {
                self.stats.violations.fetch_add(1, Ordering::Relaxed);
                warn!(
                    target: "covenant::dispatch",
                    type_name = %self.type_name,
                    feature = %entry.name,
                    error = %error,
                    "Contract violation"
                );
            }
        }
        result
    }

    fn invoke_checked(&self, entry: &FeatureEntry<S>, target: &Target<'_, S>, state: &mut S, args: &[Value]) -> Result<Value> {
        guard::suspended(|| require_any_level(&entry.demand_levels, state, args)).map_err(|unsatisfied| {
            Error::PreconditionFailed {
                type_name: self.type_name.to_string(),
                feature: entry.name.to_string(),
                unsatisfied,
            }
        })?;

        let old = if entry.ensure_levels.is_empty() {
            None
        } else {
            Some(guard::suspended(|| state.clone()))
        };

        match target.run(state, args) {
            Ok(value) => {
                if let Some(old) = &old {
                    self.check_ensures(entry, state, old, args)?;
                }
                Ok(value)
            }
            Err(error) => self.rescue(entry, target, state, args, error),
        }
    }

    fn check_ensures(&self, entry: &FeatureEntry<S>, state: &S, old: &S, args: &[Value]) -> Result<()> {
        guard::suspended(|| ensure_every_level(&entry.ensure_levels, state, old, args)).map_err(
            |(declared_in, predicate)| Error::PostconditionFailed {
                type_name: self.type_name.to_string(),
                feature: entry.name.to_string(),
                declared_in: declared_in.to_string(),
                predicate: predicate.to_string(),
            },
        )
    }

    fn rescue(
        &self,
        entry: &FeatureEntry<S>,
        target: &Target<'_, S>,
        state: &mut S,
        args: &[Value],
        error: BusinessError,
    ) -> Result<Value> {
        let Some(handler) = &entry.rescue else {
            return Err(Error::Business(error));
        };
        self.stats.rescues.fetch_add(1, Ordering::Relaxed);

        let mut retry = Retry::new(Arc::clone(&self.type_name), Arc::clone(&entry.name));
        guard::suspended(|| handler.handle(state, &error, args, &mut retry));

        match retry.into_outcome()? {
            Some(new_args) => {
                self.check_arguments(entry, target, &new_args)?;
                self.stats.retries.fetch_add(1, Ordering::Relaxed);
                debug!(
                    target: "covenant::dispatch",
                    type_name = %self.type_name,
                    feature = %entry.name,
                    error = %error,
                    "Rescue requested retry"
                );
                self.invoke_checked(entry, target, state, &new_args)
            }
            None => {
                debug!(
                    target: "covenant::dispatch",
                    type_name = %self.type_name,
                    feature = %entry.name,
                    error = %error,
                    "Rescue declined, rethrowing"
                );
                Err(Error::Business(error))
            }
        }
    }
}

impl<S> fmt::Debug for DispatchTable<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTable")
            .field("type_name", &self.type_name)
            .field("checked", &self.checked)
            .field("invariants", &self.invariants.len())
            .field("entries", &self.entries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demand_level(name: &str, labels: &[(&'static str, bool)]) -> Level<Demand<i64>> {
        Level {
            declared_in: Arc::from(name),
            predicates: labels
                .iter()
                .map(|&(label, result)| Demand::new(label, move |_, _| result))
                .collect(),
        }
    }

    fn ensure_level(name: &str, labels: &[(&'static str, bool)]) -> Level<Ensure<i64>> {
        Level {
            declared_in: Arc::from(name),
            predicates: labels
                .iter()
                .map(|&(label, result)| Ensure::new(label, move |_, _, _| result))
                .collect(),
        }
    }

    #[test]
    fn test_no_demand_levels_admits() {
        assert_eq!(require_any_level::<i64>(&[], &0, &[]), Ok(()));
    }

    #[test]
    fn test_one_satisfied_level_admits() {
        let levels = vec![
            demand_level("Sub", &[("a", true), ("b", false)]),
            demand_level("Base", &[("c", true)]),
        ];
        assert_eq!(require_any_level(&levels, &0, &[]), Ok(()));
    }

    #[test]
    fn test_all_levels_failing_reports_each() {
        let levels = vec![
            demand_level("Sub", &[("a", true), ("b", false)]),
            demand_level("Base", &[("c", false)]),
        ];
        assert_eq!(
            require_any_level(&levels, &0, &[]),
            Err(vec!["Sub: b".to_string(), "Base: c".to_string()])
        );
    }

    #[test]
    fn test_every_ensure_must_hold() {
        let passing = vec![ensure_level("Sub", &[("a", true)]), ensure_level("Base", &[("b", true)])];
        assert_eq!(ensure_every_level(&passing, &0, &0, &[]), Ok(()));

        let failing = vec![ensure_level("Sub", &[("a", true)]), ensure_level("Base", &[("b", false)])];
        assert_eq!(ensure_every_level(&failing, &0, &0, &[]), Err(("Base", "b")));
    }

    #[test]
    fn test_metrics_violation_rate() {
        let metrics = DispatchMetrics {
            checked_calls: 4,
            violations: 1,
            ..Default::default()
        };
        assert!((metrics.violation_rate() - 0.25).abs() < f64::EPSILON);
        assert_eq!(DispatchMetrics::default().violation_rate(), 0.0);
    }
}
