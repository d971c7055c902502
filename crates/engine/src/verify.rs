//! Override verification
//!
//! Runs once per type at finalization. For every feature the type declares
//! itself, the nearest ancestor declaring the same name decides the outcome:
//!
//! | marker | ancestor entry          | result                        |
//! |--------|-------------------------|-------------------------------|
//! | no     | none                    | ok                            |
//! | no     | any                     | `MissingOverride`             |
//! | yes    | none                    | `UnnecessaryOverride` (strict) |
//! | yes    | property                | `NoMatchingFeature`           |
//! | yes    | different kind          | `KindMismatch`                |
//! | yes    | method, other arity     | `ArityMismatch`               |

use crate::instance::InstanceState;
use crate::registry::{FeatureRegistration, TypeRegistration, TypeRegistry};
use covenant_core::{FeatureKind, OverrideError, Result};
use tracing::{debug, warn};

/// Verify the override markers of `type_name` against its ancestors.
///
/// `strict` rejects markers that override nothing.
pub(crate) fn verify_overrides<S: InstanceState>(
    registry: &TypeRegistry<S>,
    type_name: &str,
    strict: bool,
) -> Result<()> {
    let lineage = registry.lineage(type_name)?;
    let (owner, ancestors) = match lineage.split_first() {
        Some(split) => split,
        None => return Ok(()),
    };

    for feature in owner.features() {
        let inherited = nearest_declaration(ancestors, feature.name());
        if let Err(error) = check_feature(owner, feature, inherited, strict) {
            warn!(
                target: "covenant::verify",
                type_name = %type_name,
                feature = %feature.name(),
                error = %error,
                "Override verification failed"
            );
            return Err(error.into());
        }
    }

    debug!(
        target: "covenant::verify",
        type_name = %type_name,
        ancestors = ancestors.len(),
        "Overrides verified"
    );
    Ok(())
}

/// The nearest ancestor declaring `feature`, with its registration
fn nearest_declaration<'a, S>(
    ancestors: &[&'a TypeRegistration<S>],
    feature: &str,
) -> Option<(&'a TypeRegistration<S>, &'a FeatureRegistration<S>)> {
    ancestors
        .iter()
        .find_map(|ancestor| ancestor.feature(feature).map(|found| (*ancestor, found)))
}

fn check_feature<S>(
    owner: &TypeRegistration<S>,
    feature: &FeatureRegistration<S>,
    inherited: Option<(&TypeRegistration<S>, &FeatureRegistration<S>)>,
    strict: bool,
) -> std::result::Result<(), OverrideError> {
    let type_name = owner.name().to_string();
    let name = feature.name().to_string();

    let Some((ancestor, overridden)) = inherited else {
        if feature.is_override() {
            if strict {
                return Err(OverrideError::UnnecessaryOverride {
                    type_name,
                    feature: name,
                });
            }
            debug!(
                target: "covenant::verify",
                type_name = %type_name,
                feature = %name,
                "Override marker with no ancestor feature accepted (lenient)"
            );
        }
        return Ok(());
    };

    if !feature.is_override() {
        return Err(OverrideError::MissingOverride {
            type_name,
            feature: name,
        });
    }

    let expected = overridden.kind();
    let found = feature.kind();
    match (expected, found) {
        (FeatureKind::Property, _) => Err(OverrideError::NoMatchingFeature {
            type_name,
            feature: name,
            reason: format!("{} declares it as a property", ancestor.name()),
        }),
        (FeatureKind::Method { arity: expected }, FeatureKind::Method { arity: found })
            if expected != found =>
        {
            Err(OverrideError::ArityMismatch {
                type_name,
                feature: name,
                ancestor: ancestor.name().to_string(),
                expected,
                found,
            })
        }
        (expected, found) if !expected.same_kind(&found) => Err(OverrideError::KindMismatch {
            type_name,
            feature: name,
            ancestor: ancestor.name().to_string(),
            expected: expected.name().to_string(),
            found: found.name().to_string(),
        }),
        _ => Ok(()),
    }
}
