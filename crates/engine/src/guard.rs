//! Thread-local reentrancy guard
//!
//! Contract code (invariants, demands, ensures, the old-state snapshot, rescue
//! handlers) may itself reach contracted features. Those nested calls must not
//! be checked again, or evaluation would recurse without end. While the guard is
//! raised on a thread, every dispatch on that thread runs the original body.
//!
//! The guard is a per-thread depth counter. Nested suspensions restore the
//! outer level when they end.

use std::cell::Cell;

thread_local! {
    /// Number of live suspension tokens on this thread
    static SUSPENDED: Cell<usize> = Cell::new(0);
}

/// RAII token: checking is suspended on this thread until it drops.
#[must_use = "checking resumes as soon as the token is dropped"]
pub struct Suspension {
    _private: (),
}

impl Suspension {
    /// Raise the guard.
    pub fn raise() -> Self {
        SUSPENDED.with(|depth| depth.set(depth.get() + 1));
        Suspension { _private: () }
    }
}

impl Drop for Suspension {
    fn drop(&mut self) {
        SUSPENDED.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Is checking suspended on this thread?
#[inline]
pub fn is_suspended() -> bool {
    SUSPENDED.with(|depth| depth.get() > 0)
}

/// Run `f` with checking suspended.
///
/// The guard is lowered again even if `f` panics.
pub fn suspended<R>(f: impl FnOnce() -> R) -> R {
    let _token = Suspension::raise();
    f()
}
