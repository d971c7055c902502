//! Error types for contract enforcement
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! ## Taxonomy
//!
//! - Contract violations: invariant, precondition, postcondition, retry protocol.
//!   Always fatal to the call, never handed to a rescue handler.
//! - [`DeclarationError`]: misuse detected while registering contract data.
//! - [`OverrideError`]: structural problems found by override verification.
//! - [`BusinessError`]: anything the wrapped body itself raised. The only kind a
//!   rescue handler may intercept.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for contract operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for contract enforcement
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// An invariant predicate returned false
    #[error("Invariant violated on {type_name} (declared by {declared_in}): {predicate}")]
    InvariantViolation {
        /// Type of the instance being checked
        type_name: String,
        /// Type that registered the invariant
        declared_in: String,
        /// Textual form of the failing predicate
        predicate: String,
    },

    /// No ancestry level had its demand set fully satisfied
    #[error("Precondition failed on {type_name}.{feature} (unsatisfied: {})", .unsatisfied.join(" | "))]
    PreconditionFailed {
        /// Type the call was dispatched on
        type_name: String,
        /// Feature name
        feature: String,
        /// First failing predicate of every level, nearest level first
        unsatisfied: Vec<String>,
    },

    /// Some ancestry level's ensure predicate returned false
    #[error("Postcondition failed on {type_name}.{feature} (declared by {declared_in}): {predicate}")]
    PostconditionFailed {
        /// Type the call was dispatched on
        type_name: String,
        /// Feature name
        feature: String,
        /// Type whose ensure set failed
        declared_in: String,
        /// Textual form of the failing predicate
        predicate: String,
    },

    /// A rescue handler called `retry` more than once in one invocation
    #[error("retry can only be called once per invocation ({type_name}.{feature})")]
    RetryViolation {
        /// Type the call was dispatched on
        type_name: String,
        /// Feature name
        feature: String,
    },

    /// Misuse detected at registration time
    #[error("Contract declaration error: {0}")]
    Declaration(#[from] DeclarationError),

    /// Override verification failed for a type
    #[error("Override verification failed: {0}")]
    Override(#[from] OverrideError),

    /// The supertype chain loops back on itself
    #[error("Cyclic ancestry detected at {type_name}")]
    CyclicAncestry {
        /// Type at which the walk revisited a node
        type_name: String,
    },

    /// Type name not present in the registry
    #[error("Unknown type: {0}")]
    UnknownType(String),

    /// Feature name not visible on the type
    #[error("No feature '{feature}' on {type_name}")]
    NoSuchFeature {
        /// Type the lookup was made on
        type_name: String,
        /// Feature name
        feature: String,
    },

    /// Feature exists but was reached through the wrong access form
    #[error("Invalid access to {type_name}.{feature}: {reason}")]
    InvalidAccess {
        /// Type the lookup was made on
        type_name: String,
        /// Feature name
        feature: String,
        /// Why the access was rejected
        reason: String,
    },

    /// Engine configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error raised by the wrapped body itself
    #[error(transparent)]
    Business(#[from] BusinessError),
}

impl Error {
    /// Returns true for runtime contract violations (invariant, precondition,
    /// postcondition, retry protocol).
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Error::InvariantViolation { .. }
                | Error::PreconditionFailed { .. }
                | Error::PostconditionFailed { .. }
                | Error::RetryViolation { .. }
        )
    }

    /// Returns true if this error came from a feature body
    pub fn is_business(&self) -> bool {
        matches!(self, Error::Business(_))
    }

    /// Returns the business error if this is one
    pub fn as_business(&self) -> Option<&BusinessError> {
        match self {
            Error::Business(e) => Some(e),
            _ => None,
        }
    }
}

/// Misuse detected while declaring types, features, or contract data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclarationError {
    /// Neither the type nor any ancestor opted into contract enforcement
    #[error("{type_name}: the type or one of its ancestors must be declared contracted")]
    NotContracted {
        /// Offending type
        type_name: String,
    },

    /// Contract data targets a feature the type does not declare itself
    #[error("{type_name} does not declare feature '{feature}'")]
    UnknownFeature {
        /// Offending type
        type_name: String,
        /// Feature name
        feature: String,
    },

    /// The same feature was declared twice on one type
    #[error("feature '{feature}' is already declared on {type_name}")]
    DuplicateFeature {
        /// Offending type
        type_name: String,
        /// Feature name
        feature: String,
    },

    /// Only methods and accessors can carry contracts
    #[error("only methods and accessors can carry contracts: {type_name}.{feature} is a property")]
    PropertyContract {
        /// Offending type
        type_name: String,
        /// Feature name
        feature: String,
    },

    /// An accessor needs at least one of getter or setter
    #[error("accessor {type_name}.{feature} has neither getter nor setter")]
    EmptyAccessor {
        /// Offending type
        type_name: String,
        /// Feature name
        feature: String,
    },

    /// Only a single override marker can be attached to a declaration
    #[error("only a single override marker can be assigned to {type_name}.{feature}")]
    DuplicateOverride {
        /// Offending type
        type_name: String,
        /// Feature name
        feature: String,
    },

    /// Only a single rescue handler can be assigned per declaring level
    #[error("only a single rescue handler can be assigned to {type_name}.{feature}")]
    DuplicateRescue {
        /// Offending type
        type_name: String,
        /// Feature name
        feature: String,
    },

    /// A contract spec names the same feature's rescue handler twice
    #[error("only a single rescue handler can be assigned to feature '{feature}' in one contract")]
    DuplicateSpecRescue {
        /// Feature name
        feature: String,
    },

    /// A type was declared again with a different supertype
    #[error("{type_name} was declared with parent {existing:?}, not {requested:?}")]
    ParentMismatch {
        /// Offending type
        type_name: String,
        /// Parent recorded by the first declaration
        existing: Option<String>,
        /// Parent requested now
        requested: Option<String>,
    },

    /// Registrations are closed once the dispatch table is built
    #[error("{type_name} is already finalized")]
    AlreadyFinalized {
        /// Offending type
        type_name: String,
    },

    /// Type and feature names must be non-empty
    #[error("invalid name: {0:?}")]
    InvalidName(String),
}

/// Structural problems found while verifying overrides
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverrideError {
    /// Feature shadows an ancestor feature without an override marker
    #[error("override declaration missing on {type_name}.{feature}")]
    MissingOverride {
        /// Subtype
        type_name: String,
        /// Feature name
        feature: String,
    },

    /// Feature is marked override but no ancestor declares it (strict mode)
    #[error("unnecessary override declaration on {type_name}.{feature}")]
    UnnecessaryOverride {
        /// Subtype
        type_name: String,
        /// Feature name
        feature: String,
    },

    /// The nearest ancestor feature cannot be overridden
    #[error("{type_name}.{feature} does not override an ancestor feature: {reason}")]
    NoMatchingFeature {
        /// Subtype
        type_name: String,
        /// Feature name
        feature: String,
        /// Why the ancestor entry does not match
        reason: String,
    },

    /// Override and ancestor feature are of different kinds
    #[error("{type_name}.{feature} is a {found} but overrides a {expected} declared by {ancestor}")]
    KindMismatch {
        /// Subtype
        type_name: String,
        /// Feature name
        feature: String,
        /// Type declaring the overridden feature
        ancestor: String,
        /// Kind of the ancestor feature
        expected: String,
        /// Kind of the overriding feature
        found: String,
    },

    /// Overriding method takes a different number of parameters
    #[error("{type_name}.{feature} takes {found} parameter(s) but the method it overrides on {ancestor} takes {expected}")]
    ArityMismatch {
        /// Subtype
        type_name: String,
        /// Feature name
        feature: String,
        /// Type declaring the overridden method
        ancestor: String,
        /// Arity of the ancestor method
        expected: usize,
        /// Arity of the overriding method
        found: usize,
    },
}

/// Error raised by a feature body
///
/// Wraps any error type behind an `Arc` so the same error can be lent to a
/// rescue handler and then propagated unchanged.
#[derive(Clone)]
pub struct BusinessError(Arc<dyn std::error::Error + Send + Sync + 'static>);

impl BusinessError {
    /// Wrap an existing error
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        BusinessError(Arc::new(error))
    }

    /// Create a business error from a plain message
    pub fn msg(message: impl Into<String>) -> Self {
        BusinessError(Arc::new(MessageError(message.into())))
    }

    /// Attempt to view the wrapped error as a concrete type
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// True if both handles wrap the very same error value
    pub fn same_as(&self, other: &BusinessError) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for BusinessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BusinessError").field(&self.0).finish()
    }
}

impl fmt::Display for BusinessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for BusinessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

#[derive(Debug)]
struct MessageError(String);

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for MessageError {}
