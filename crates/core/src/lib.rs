//! Core types for Covenant
//!
//! This crate defines the leaf data model of the contract engine:
//! - Value: dynamic argument and return value of contracted features
//! - Error: error taxonomy (contract violations, declaration and override
//!   errors, business errors)
//! - Feature kinds and feature bodies (method, accessor, property)
//! - Contract types: predicates, rescue handlers, `Retry`, `ContractSpec`
//! - CheckedMode: shared enforcement switch

#![warn(missing_docs)]
#![warn(clippy::all)]

// Module declarations
pub mod contract;
pub mod error;
pub mod feature;
pub mod mode;
pub mod value;

// Re-export commonly used types
pub use error::{BusinessError, DeclarationError, Error, OverrideError, Result};
pub use feature::{BodyResult, FeatureImpl, FeatureKind, GetterBody, MethodBody, SetterBody};
pub use mode::CheckedMode;
pub use value::Value;

// Re-export contract types at crate root for convenience
pub use contract::{
    ContractSpec, ContractSpecBuilder, Demand, Ensure, FeatureContract, Invariant, Rescue, Retry,
};
