//! Generation strategies, repair and the task lifecycle.
//!
//! Everything that talks to a model, a repository host or a CI service goes
//! through the ports in `fxforge_core::ports`; the adapters crate supplies
//! the live implementations and tests supply fakes.

pub mod cancel;
pub mod machine;
pub mod monitor;
pub mod prompts;
pub mod registry;
pub mod repair;
pub mod router;
pub mod selector;
pub mod strategy;

#[cfg(test)]
mod testing;

pub use cancel::CancellationFlag;
pub use machine::{MachineConfig, Ports, TaskMachine};
pub use monitor::{BuildMonitor, BuildOutcome};
pub use registry::{RegistryStats, TaskRegistry};
pub use repair::{RepairContext, RepairFailure, Repairer};
pub use router::{ModelChoice, ModelRouter};
pub use selector::{GenerationFailure, Selector};
pub use strategy::{Strategy, StrategyFailure, StrategyFailureKind};
