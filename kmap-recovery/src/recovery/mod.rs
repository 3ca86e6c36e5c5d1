//! Recovery strategy selection and execution
//!
//! The strategist turns a failed validation into a [`crate::RecoveryAction`]
//! using an ordered rule table and the recovery history. The executor applies
//! actions under a concurrency ceiling and per-resource locks, appending one
//! record per completed execution to the history store.

pub mod admission;
pub mod context;
pub mod executor;
pub mod locks;
pub mod rules;
pub mod store;
pub mod strategist;

pub use admission::{AdmissionGate, Permit};
pub use context::{DefaultHandler, RecoveryContext, ResourceHandle, StrategyHandler};
pub use executor::RecoveryExecutor;
pub use locks::{LocalResourceLocks, ResourceGuard, ResourceLocks};
pub use rules::{FailureContext, RULES, RecoveryRule};
pub use store::{InMemoryRecoveryHistory, RecoveryHistory};
pub use strategist::RecoveryStrategist;
