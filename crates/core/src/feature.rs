//! Feature kinds and feature bodies
//!
//! A feature is a named member a type declares: a method, an accessor
//! (getter and/or setter), or a plain property. Bodies are shared closures
//! over the instance state `S`; the engine wraps them at the type level.

use crate::error::BusinessError;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Result returned by a feature body
pub type BodyResult<T> = std::result::Result<T, BusinessError>;

/// Method body: `(state, args) -> value`
pub type MethodBody<S> = Arc<dyn Fn(&mut S, &[Value]) -> BodyResult<Value> + Send + Sync>;

/// Accessor getter body
pub type GetterBody<S> = Arc<dyn Fn(&S) -> BodyResult<Value> + Send + Sync>;

/// Accessor setter body
pub type SetterBody<S> = Arc<dyn Fn(&mut S, Value) -> BodyResult<()> + Send + Sync>;

/// Kind of a declared feature
///
/// Used by override verification: an override must match the kind of the
/// ancestor feature, and methods must match its arity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    /// Callable member with a fixed parameter count
    Method {
        /// Declared number of parameters
        arity: usize,
    },
    /// Getter and/or setter pair
    Accessor,
    /// Plain data slot; cannot be called, overridden, or carry contracts
    Property,
}

impl FeatureKind {
    /// Short name used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            FeatureKind::Method { .. } => "method",
            FeatureKind::Accessor => "accessor",
            FeatureKind::Property => "property",
        }
    }

    /// Same kind, ignoring method arity
    pub fn same_kind(&self, other: &FeatureKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Methods and accessors may carry contracts; properties may not
    pub fn can_carry_contracts(&self) -> bool {
        !matches!(self, FeatureKind::Property)
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureKind::Method { arity } => write!(f, "method/{}", arity),
            other => f.write_str(other.name()),
        }
    }
}

/// The implementation half of a feature declaration
pub enum FeatureImpl<S> {
    /// Method with its arity and body
    Method {
        /// Declared number of parameters
        arity: usize,
        /// Original behavior
        body: MethodBody<S>,
    },
    /// Accessor with optional getter and setter
    Accessor {
        /// Getter, if readable
        getter: Option<GetterBody<S>>,
        /// Setter, if writable
        setter: Option<SetterBody<S>>,
    },
    /// Plain property
    Property,
}

impl<S> FeatureImpl<S> {
    /// Declare a method taking `arity` arguments
    pub fn method<F>(arity: usize, body: F) -> Self
    where
        F: Fn(&mut S, &[Value]) -> BodyResult<Value> + Send + Sync + 'static,
    {
        FeatureImpl::Method {
            arity,
            body: Arc::new(body),
        }
    }

    /// Declare a read-only accessor
    pub fn getter<G>(getter: G) -> Self
    where
        G: Fn(&S) -> BodyResult<Value> + Send + Sync + 'static,
    {
        FeatureImpl::Accessor {
            getter: Some(Arc::new(getter)),
            setter: None,
        }
    }

    /// Declare a read-write accessor
    pub fn accessor<G, W>(getter: G, setter: W) -> Self
    where
        G: Fn(&S) -> BodyResult<Value> + Send + Sync + 'static,
        W: Fn(&mut S, Value) -> BodyResult<()> + Send + Sync + 'static,
    {
        FeatureImpl::Accessor {
            getter: Some(Arc::new(getter)),
            setter: Some(Arc::new(setter)),
        }
    }

    /// Declare a write-only accessor
    pub fn setter<W>(setter: W) -> Self
    where
        W: Fn(&mut S, Value) -> BodyResult<()> + Send + Sync + 'static,
    {
        FeatureImpl::Accessor {
            getter: None,
            setter: Some(Arc::new(setter)),
        }
    }

    /// Declare a plain property
    pub fn property() -> Self {
        FeatureImpl::Property
    }

    /// Kind of this implementation
    pub fn kind(&self) -> FeatureKind {
        match self {
            FeatureImpl::Method { arity, .. } => FeatureKind::Method { arity: *arity },
            FeatureImpl::Accessor { .. } => FeatureKind::Accessor,
            FeatureImpl::Property => FeatureKind::Property,
        }
    }
}

impl<S> Clone for FeatureImpl<S> {
    fn clone(&self) -> Self {
        match self {
            FeatureImpl::Method { arity, body } => FeatureImpl::Method {
                arity: *arity,
                body: Arc::clone(body),
            },
            FeatureImpl::Accessor { getter, setter } => FeatureImpl::Accessor {
                getter: getter.clone(),
                setter: setter.clone(),
            },
            FeatureImpl::Property => FeatureImpl::Property,
        }
    }
}

impl<S> fmt::Debug for FeatureImpl<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureImpl::Accessor { getter, setter } => f
                .debug_struct("Accessor")
                .field("getter", &getter.is_some())
                .field("setter", &setter.is_some())
                .finish(),
            other => write!(f, "{}", other.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_of_impls() {
        let m: FeatureImpl<i64> = FeatureImpl::method(2, |_, _| Ok(Value::Null));
        assert_eq!(m.kind(), FeatureKind::Method { arity: 2 });

        let a: FeatureImpl<i64> = FeatureImpl::getter(|s| Ok(Value::Int(*s)));
        assert_eq!(a.kind(), FeatureKind::Accessor);

        let p: FeatureImpl<i64> = FeatureImpl::property();
        assert_eq!(p.kind(), FeatureKind::Property);
    }

    #[test]
    fn test_same_kind_ignores_arity() {
        let one = FeatureKind::Method { arity: 1 };
        let two = FeatureKind::Method { arity: 2 };
        assert!(one.same_kind(&two));
        assert!(!one.same_kind(&FeatureKind::Accessor));
    }

    #[test]
    fn test_property_cannot_carry_contracts() {
        assert!(!FeatureKind::Property.can_carry_contracts());
        assert!(FeatureKind::Accessor.can_carry_contracts());
        assert!(FeatureKind::Method { arity: 0 }.can_carry_contracts());
    }

    #[test]
    fn test_display() {
        assert_eq!(FeatureKind::Method { arity: 3 }.to_string(), "method/3");
        assert_eq!(FeatureKind::Accessor.to_string(), "accessor");
    }
}
