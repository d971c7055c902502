//! Checked-mode switch
//!
//! `CheckedMode` is a shared flag. Every handle cloned from the same switch
//! sees the same value, so a registry can hand one to each type's dispatch
//! table and still flip enforcement later.
//!
//! When the flag is off, intercepted features run their original body with no
//! predicate evaluation and no old-state capture.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared on/off switch for contract enforcement
///
/// # Memory Ordering
///
/// The flag uses Relaxed ordering. It guards no other memory: a call that
/// races with a toggle runs either fully checked or fully unchecked.
#[derive(Clone)]
pub struct CheckedMode(Arc<AtomicBool>);

impl CheckedMode {
    /// New switch with the given initial state
    pub fn new(enabled: bool) -> Self {
        CheckedMode(Arc::new(AtomicBool::new(enabled)))
    }

    /// New switch, enforcement on
    pub fn checked() -> Self {
        Self::new(true)
    }

    /// New switch, enforcement off
    pub fn unchecked() -> Self {
        Self::new(false)
    }

    /// Is enforcement currently on?
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Turn enforcement on or off for every holder of this switch
    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Relaxed);
    }
}

impl Default for CheckedMode {
    fn default() -> Self {
        Self::checked()
    }
}

impl fmt::Debug for CheckedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CheckedMode({})", self.is_enabled())
    }
}
