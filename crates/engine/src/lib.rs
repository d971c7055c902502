//! Contract enforcement engine for Covenant
//!
//! This crate turns declarations into enforced behavior:
//! - Registry: type declarations, ancestry, contract data (`registry`)
//! - Override verification at finalization (`verify`)
//! - Feature interception and combination rules (`dispatch`)
//! - Reentrancy guard for contract code (`guard`)
//! - Instances and their access forms (`instance`)
//! - Engine configuration via `covenant.toml` (`config`)
//!
//! Nothing here installs a tracing subscriber. Events are emitted under the
//! targets `covenant::registry`, `covenant::verify` and `covenant::dispatch`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod dispatch;
pub mod guard;
pub mod instance;
pub mod registry;
mod verify;

pub use config::{EngineConfig, OverrideStrictness, CONFIG_FILE_NAME};
pub use dispatch::{DispatchMetrics, DispatchTable, FeatureEntry};
pub use instance::{Instance, InstanceState};
pub use registry::{
    ContractRegistry, FeatureRegistration, TypeDefinition, TypeRegistration, TypeRegistry,
};
