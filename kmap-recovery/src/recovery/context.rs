//! Execution context and pluggable strategy handlers

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{RecoveryAction, RecoveryStrategy};

/// Opaque handle to an external resource
pub type ResourceHandle = Arc<dyn Any + Send + Sync>;

/// Named resource handles available to a recovery
#[derive(Clone, Default)]
pub struct RecoveryContext {
    resources: HashMap<String, ResourceHandle>,
}

impl RecoveryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource handle
    #[must_use]
    pub fn with_resource(mut self, name: impl Into<String>, handle: ResourceHandle) -> Self {
        self.insert(name, handle);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, handle: ResourceHandle) {
        self.resources.insert(name.into(), handle);
    }

    pub fn get(&self, name: &str) -> Option<&ResourceHandle> {
        self.resources.get(name)
    }

    /// Downcast a resource to a concrete type
    pub fn get_as<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.resources
            .get(name)
            .cloned()
            .and_then(|handle| handle.downcast::<T>().ok())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    /// First required resource of `action` that is absent, in name order
    pub fn first_missing<'a>(&self, action: &'a RecoveryAction) -> Option<&'a str> {
        action
            .required_resources
            .iter()
            .map(String::as_str)
            .find(|name| !self.contains(name))
    }
}

impl std::fmt::Debug for RecoveryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.resources.keys().collect();
        names.sort();
        f.debug_struct("RecoveryContext")
            .field("resources", &names)
            .finish()
    }
}

/// Performs the remediation for an action.
///
/// Called with the action's resource locks held. `Ok(true)` means the
/// recovery succeeded; `Ok(false)` or an error is recorded as a failure.
#[async_trait]
pub trait StrategyHandler: Send + Sync {
    async fn apply(&self, action: &RecoveryAction, context: &RecoveryContext) -> Result<bool>;
}

/// Succeeds whenever the action's resources are present.
///
/// Manual intervention needs no resources and counts as filed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHandler;

#[async_trait]
impl StrategyHandler for DefaultHandler {
    async fn apply(&self, action: &RecoveryAction, context: &RecoveryContext) -> Result<bool> {
        if action.strategy == RecoveryStrategy::ManualIntervention {
            return Ok(true);
        }
        Ok(context.first_missing(action).is_none())
    }
}
