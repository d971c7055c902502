//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use covenant_core::{BodyResult, Demand, Ensure, Value};

/// Instance state used across the integration tests
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    pub value: i64,
    pub writes: u32,
}

impl Cell {
    pub fn with_value(value: i64) -> Self {
        Cell { value, writes: 0 }
    }
}

/// Route engine events to the test harness output
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// First argument as an integer, 0 when absent
pub fn arg(args: &[Value]) -> i64 {
    Value::int_arg(args, 0).unwrap_or_default()
}

/// Body of a one-argument `store` method
pub fn store(cell: &mut Cell, args: &[Value]) -> BodyResult<Value> {
    cell.value = arg(args);
    cell.writes += 1;
    Ok(Value::Int(cell.value))
}

/// Demand that the first argument lies in `lo..=hi`
pub fn within(label: &'static str, lo: i64, hi: i64) -> Demand<Cell> {
    Demand::new(label, move |_, args| {
        Value::int_arg(args, 0).map_or(false, |x| (lo..=hi).contains(&x))
    })
}

/// Ensure that the stored value equals the first argument
pub fn stored_argument() -> Ensure<Cell> {
    Ensure::new("value == x", |cell: &Cell, _, args| cell.value == arg(args))
}
