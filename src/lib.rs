//! Covenant: runtime Design-by-Contract
//!
//! Declare types with invariants, preconditions, postconditions and rescue
//! handlers; the engine enforces them on every feature call, combines them
//! across inheritance (preconditions weaken, postconditions strengthen) and
//! verifies overrides before the first instance exists.
//!
//! # Quick Start
//!
//! ```
//! use covenant::{ContractRegistry, Demand, Ensure, Error, Invariant, Value};
//!
//! #[derive(Clone)]
//! struct Stack {
//!     items: Vec<i64>,
//!     limit: usize,
//! }
//!
//! let registry = ContractRegistry::<Stack>::new();
//! registry
//!     .define("Stack")
//!     .contracted()
//!     .invariant(Invariant::new("within limit", |s: &Stack| s.items.len() <= s.limit))
//!     .method("push", 1, |s, args| {
//!         s.items.push(Value::int_arg(args, 0).unwrap_or_default());
//!         Ok(Value::Null)
//!     })
//!     .demand("push", Demand::new("not full", |s: &Stack, _| s.items.len() < s.limit))
//!     .ensure("push", Ensure::new("grew", |s: &Stack, old: &Stack, _| s.items.len() == old.items.len() + 1))
//!     .install()
//!     .unwrap();
//!
//! let mut stack = registry
//!     .instantiate("Stack", Stack { items: Vec::new(), limit: 1 })
//!     .unwrap();
//! stack.call("push", &[Value::Int(1)]).unwrap();
//! assert!(matches!(
//!     stack.call("push", &[Value::Int(2)]),
//!     Err(Error::PreconditionFailed { .. })
//! ));
//! ```

pub use covenant_core::*;
pub use covenant_engine::*;
