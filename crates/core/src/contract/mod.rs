//! Contract types
//!
//! The leaf data model the engine consumes:
//!
//! - `predicate`: labelled invariant, demand and ensure predicates, rescue
//!   handlers, and the single-use `Retry` token
//! - `spec`: the immutable per-type `ContractSpec` and its builder
//!
//! ## Usage
//!
//! ```
//! use covenant_core::contract::{ContractSpec, Invariant};
//!
//! let spec = ContractSpec::<u32>::builder()
//!     .invariant(Invariant::new("bounded", |n| *n < 100))
//!     .build()
//!     .unwrap();
//! assert!(spec.invariants()[0].holds(&7));
//! ```

pub mod predicate;
pub mod spec;

// Re-exports
pub use predicate::{Demand, Ensure, Invariant, Rescue, Retry};
pub use spec::{ContractSpec, ContractSpecBuilder, FeatureContract};
