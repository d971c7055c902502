//! Rescue and Retry Tests
//!
//! Business errors raised by a body go to the nearest rescue handler. The
//! handler may repair state, request one retry with new arguments, or decline
//! so the original error propagates. Contract violations never reach it.

mod common;

use common::{arg, store, within, Cell};
use covenant_core::{BusinessError, Ensure, Error, Invariant, Rescue, Value};
use covenant_engine::ContractRegistry;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct Negative(i64);

impl fmt::Display for Negative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "negative input: {}", self.0)
    }
}

impl std::error::Error for Negative {}

/// Stores its argument; fails with `Negative` for x < 0
fn store_non_negative(cell: &mut Cell, args: &[Value]) -> Result<Value, BusinessError> {
    cell.writes += 1;
    let x = arg(args);
    if x < 0 {
        return Err(BusinessError::new(Negative(x)));
    }
    cell.value = x;
    Ok(Value::Int(x))
}

fn registry_with_rescue(rescue: Rescue<Cell>) -> ContractRegistry<Cell> {
    let registry = ContractRegistry::new();
    registry
        .define("Store")
        .contracted()
        .method("store", 1, store_non_negative)
        .rescue("store", rescue)
        .install()
        .unwrap();
    registry
}

// ============================================================================
// Retry protocol
// ============================================================================

#[test]
fn test_single_retry_result_becomes_call_result() {
    let registry = registry_with_rescue(Rescue::new(|_, _, args, retry| {
        retry.retry(vec![Value::Int(arg(args).abs())]).unwrap();
    }));
    let mut cell = registry.instantiate("Store", Cell::default()).unwrap();

    assert_eq!(cell.call("store", &[Value::Int(-4)]).unwrap(), Value::Int(4));
    assert_eq!(cell.state().writes, 2);

    let metrics = cell.metrics();
    assert_eq!(metrics.rescues, 1);
    assert_eq!(metrics.retries, 1);
}

#[test]
fn test_second_retry_is_a_violation() {
    let registry = registry_with_rescue(Rescue::new(|_, _, _, retry| {
        let _ = retry.retry(vec![Value::Int(1)]);
        let second = retry.retry(vec![Value::Int(2)]);
        assert!(matches!(second, Err(Error::RetryViolation { .. })));
    }));
    let mut cell = registry.instantiate("Store", Cell::default()).unwrap();

    assert!(matches!(
        cell.call("store", &[Value::Int(-1)]),
        Err(Error::RetryViolation { .. })
    ));
    assert_eq!(cell.state().writes, 1);
    assert_eq!(cell.metrics().violations, 1);
}

#[test]
fn test_declined_rescue_rethrows_original_error() {
    let seen: Arc<Mutex<Option<BusinessError>>> = Arc::new(Mutex::new(None));
    let observed = Arc::clone(&seen);
    let registry = registry_with_rescue(Rescue::new(move |cell: &mut Cell, error, _, _| {
        *observed.lock() = Some(error.clone());
        cell.value = -1;
    }));
    let mut cell = registry.instantiate("Store", Cell::with_value(3)).unwrap();

    match cell.call("store", &[Value::Int(-9)]) {
        Err(Error::Business(error)) => {
            assert_eq!(error.downcast_ref::<Negative>().map(|n| n.0), Some(-9));
            let handled = seen.lock().clone().expect("rescue handler ran");
            assert!(error.same_as(&handled));
        }
        other => panic!("expected business error, got {:?}", other),
    }
    assert_eq!(cell.state().value, -1);
}

#[test]
fn test_retried_call_runs_the_full_checked_protocol() {
    let registry = ContractRegistry::new();
    registry
        .define("Store")
        .contracted()
        .method("store", 1, store_non_negative)
        .demand("store", within("x < 100", i64::MIN, 99))
        .rescue("store", Rescue::new(|_, _, _, retry| {
            retry.retry(vec![Value::Int(500)]).unwrap();
        }))
        .install()
        .unwrap();
    let mut cell = registry.instantiate("Store", Cell::default()).unwrap();

    assert!(matches!(
        cell.call("store", &[Value::Int(-1)]),
        Err(Error::PreconditionFailed { .. })
    ));
    assert_eq!(cell.state().writes, 1);
}

#[test]
fn test_retry_that_fails_again_reaches_the_handler_again() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let registry = registry_with_rescue(Rescue::new(move |_: &mut Cell, _, args, retry| {
        counter.fetch_add(1, Ordering::SeqCst);
        let x = arg(args);
        if x < -1 {
            retry.retry(vec![Value::Int(x + 1)]).unwrap();
        }
    }));
    let mut cell = registry.instantiate("Store", Cell::default()).unwrap();

    assert!(matches!(
        cell.call("store", &[Value::Int(-3)]),
        Err(Error::Business(_))
    ));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(cell.state().writes, 3);
}

#[test]
fn test_retry_with_wrong_argument_count_is_rejected() {
    let registry = registry_with_rescue(Rescue::new(|_, _, _, retry| {
        retry
            .retry(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
            .unwrap();
    }));
    let mut cell = registry.instantiate("Store", Cell::default()).unwrap();

    match cell.call("store", &[Value::Int(-1)]) {
        Err(Error::InvalidAccess { feature, reason, .. }) => {
            assert_eq!(feature, "store");
            assert_eq!(reason, "expected 1 argument(s), got 3");
        }
        other => panic!("expected invalid access, got {:?}", other),
    }
    assert_eq!(cell.state().writes, 1);
    assert_eq!(cell.metrics().retries, 0);
}

#[test]
fn test_setter_retry_without_value_is_rejected() {
    let written = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&written);
    let registry = ContractRegistry::new();
    registry
        .define("Gauge")
        .contracted()
        .accessor(
            "level",
            |cell: &Cell| Ok(Value::Int(cell.value)),
            move |cell: &mut Cell, value: Value| {
                counter.fetch_add(1, Ordering::SeqCst);
                match value.as_int() {
                    Some(level) => {
                        cell.value = level;
                        Ok(())
                    }
                    None => Err(BusinessError::msg("level must be an integer")),
                }
            },
        )
        .rescue("level", Rescue::new(|_, _, _, retry| {
            retry.retry(Vec::new()).unwrap();
        }))
        .install()
        .unwrap();
    let mut gauge = registry.instantiate("Gauge", Cell::with_value(4)).unwrap();

    assert!(matches!(
        gauge.set("level", "high"),
        Err(Error::InvalidAccess { .. })
    ));
    assert_eq!(written.load(Ordering::SeqCst), 1);
    assert_eq!(gauge.state().value, 4);
}

// ============================================================================
// What rescue does not see
// ============================================================================

fn flagging_rescue(flag: &Arc<AtomicUsize>) -> Rescue<Cell> {
    let flag = Arc::clone(flag);
    Rescue::new(move |_, _, _, _| {
        flag.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn test_precondition_failure_is_not_rescued() {
    let rescued = Arc::new(AtomicUsize::new(0));
    let registry = ContractRegistry::new();
    registry
        .define("Store")
        .contracted()
        .method("store", 1, store)
        .demand("store", within("positive", 1, i64::MAX))
        .rescue("store", flagging_rescue(&rescued))
        .install()
        .unwrap();
    let mut cell = registry.instantiate("Store", Cell::default()).unwrap();

    assert!(matches!(
        cell.call("store", &[Value::Int(0)]),
        Err(Error::PreconditionFailed { .. })
    ));
    assert_eq!(rescued.load(Ordering::SeqCst), 0);
}

#[test]
fn test_postcondition_failure_is_not_rescued() {
    let rescued = Arc::new(AtomicUsize::new(0));
    let registry = ContractRegistry::new();
    registry
        .define("Store")
        .contracted()
        .method("store", 1, store)
        .ensure("store", Ensure::new("never", |_: &Cell, _: &Cell, _| false))
        .rescue("store", flagging_rescue(&rescued))
        .install()
        .unwrap();
    let mut cell = registry.instantiate("Store", Cell::default()).unwrap();

    assert!(matches!(
        cell.call("store", &[Value::Int(1)]),
        Err(Error::PostconditionFailed { .. })
    ));
    assert_eq!(rescued.load(Ordering::SeqCst), 0);
}

#[test]
fn test_business_error_without_rescue_propagates() {
    let registry = ContractRegistry::new();
    registry
        .define("Store")
        .contracted()
        .method("store", 1, store_non_negative)
        .install()
        .unwrap();
    let mut cell = registry.instantiate("Store", Cell::default()).unwrap();

    let error = cell.call("store", &[Value::Int(-2)]).unwrap_err();
    assert!(error.is_business());
    assert!(!error.is_contract_violation());
    assert_eq!(error.to_string(), "negative input: -2");
}

#[test]
fn test_exit_invariant_supersedes_business_error() {
    let registry = ContractRegistry::new();
    registry
        .define("Store")
        .contracted()
        .invariant(Invariant::new("value >= 0", |cell: &Cell| cell.value >= 0))
        .method("store", 1, |cell: &mut Cell, args: &[Value]| {
            cell.value = arg(args);
            Err(BusinessError::msg("stored, then failed"))
        })
        .install()
        .unwrap();
    let mut cell = registry.instantiate("Store", Cell::default()).unwrap();

    assert!(matches!(
        cell.call("store", &[Value::Int(-5)]),
        Err(Error::InvariantViolation { .. })
    ));
    assert!(matches!(
        registry
            .instantiate("Store", Cell::default())
            .unwrap()
            .call("store", &[Value::Int(5)]),
        Err(Error::Business(_))
    ));
}

// ============================================================================
// Handler selection
// ============================================================================

#[test]
fn test_nearest_rescue_wins() {
    let base_hits = Arc::new(AtomicUsize::new(0));
    let sub_hits = Arc::new(AtomicUsize::new(0));

    let registry = ContractRegistry::new();
    registry
        .define("Base")
        .contracted()
        .method("store", 1, store_non_negative)
        .rescue("store", flagging_rescue(&base_hits))
        .install()
        .unwrap();
    registry
        .define("Sub")
        .extends("Base")
        .override_method("store", 1, store_non_negative)
        .rescue("store", flagging_rescue(&sub_hits))
        .install()
        .unwrap();
    registry.define("Leaf").extends("Base").install().unwrap();

    let mut sub = registry.instantiate("Sub", Cell::default()).unwrap();
    let _ = sub.call("store", &[Value::Int(-1)]);
    assert_eq!(sub_hits.load(Ordering::SeqCst), 1);
    assert_eq!(base_hits.load(Ordering::SeqCst), 0);

    let mut leaf = registry.instantiate("Leaf", Cell::default()).unwrap();
    let _ = leaf.call("store", &[Value::Int(-1)]);
    assert_eq!(base_hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_rescue_on_accessor_setter() {
    let registry = ContractRegistry::new();
    registry
        .define("Gauge")
        .contracted()
        .accessor(
            "level",
            |cell: &Cell| Ok(Value::Int(cell.value)),
            |cell: &mut Cell, value: Value| match value.as_int() {
                Some(level) if level >= 0 => {
                    cell.value = level;
                    Ok(())
                }
                _ => Err(BusinessError::msg("level must be a non-negative integer")),
            },
        )
        .rescue("level", Rescue::new(|_, _, _, retry| {
            retry.retry(vec![Value::Int(0)]).unwrap();
        }))
        .install()
        .unwrap();
    let mut gauge = registry.instantiate("Gauge", Cell::with_value(9)).unwrap();

    gauge.set("level", "high").unwrap();
    assert_eq!(gauge.get("level").unwrap(), Value::Int(0));
}
