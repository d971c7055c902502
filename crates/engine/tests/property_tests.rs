//! Property-based tests for contract combination.
//!
//! For randomly generated ranges and arguments, an override's precondition is
//! the disjunction of every level's demands, and its postcondition the
//! conjunction of every level's ensures.

mod common;

use common::{arg, store, within, Cell};
use covenant_core::{Ensure, Error, Value};
use covenant_engine::ContractRegistry;
use proptest::prelude::*;

// ============================================================================
// STRATEGIES
// ============================================================================

/// Inclusive range with lo <= hi
fn range_strategy() -> impl Strategy<Value = (i64, i64)> {
    (-100i64..100, 0i64..100).prop_map(|(lo, width)| (lo, lo + width))
}

fn two_level_registry(base: (i64, i64), sub: (i64, i64)) -> ContractRegistry<Cell> {
    let registry = ContractRegistry::new();
    registry
        .define("Base")
        .contracted()
        .method("store", 1, store)
        .demand("store", within("base range", base.0, base.1))
        .install()
        .unwrap();
    registry
        .define("Sub")
        .extends("Base")
        .override_method("store", 1, store)
        .demand("store", within("sub range", sub.0, sub.1))
        .install()
        .unwrap();
    registry
}

// ============================================================================
// PRECONDITION PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn prop_override_precondition_is_disjunction(
        base in range_strategy(),
        sub in range_strategy(),
        x in -250i64..250,
    ) {
        let registry = two_level_registry(base, sub);
        let mut instance = registry.instantiate("Sub", Cell::default()).unwrap();

        let admissible = (base.0..=base.1).contains(&x) || (sub.0..=sub.1).contains(&x);
        let result = instance.call("store", &[Value::Int(x)]);

        prop_assert_eq!(result.is_ok(), admissible);
        if !admissible {
            let is_precondition_failure = matches!(result, Err(Error::PreconditionFailed { .. }));
            prop_assert!(is_precondition_failure);
        }
    }

    #[test]
    fn prop_base_precondition_ignores_subtype(
        base in range_strategy(),
        sub in range_strategy(),
        x in -250i64..250,
    ) {
        let registry = two_level_registry(base, sub);
        let mut instance = registry.instantiate("Base", Cell::default()).unwrap();

        let result = instance.call("store", &[Value::Int(x)]);
        prop_assert_eq!(result.is_ok(), (base.0..=base.1).contains(&x));
    }
}

// ============================================================================
// POSTCONDITION PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn prop_override_postcondition_is_conjunction(
        base_limit in -50i64..50,
        sub_limit in -50i64..50,
        x in -100i64..100,
    ) {
        let registry = ContractRegistry::new();
        registry
            .define("Base")
            .contracted()
            .method("store", 1, store)
            .ensure("store", Ensure::new("below base limit", move |cell: &Cell, _: &Cell, _| cell.value <= base_limit))
            .install()
            .unwrap();
        registry
            .define("Sub")
            .extends("Base")
            .override_method("store", 1, store)
            .ensure("store", Ensure::new("below sub limit", move |_: &Cell, _: &Cell, args: &[Value]| arg(args) <= sub_limit))
            .install()
            .unwrap();

        let mut instance = registry.instantiate("Sub", Cell::default()).unwrap();
        let result = instance.call("store", &[Value::Int(x)]);
        prop_assert_eq!(result.is_ok(), x <= base_limit && x <= sub_limit);
    }
}
