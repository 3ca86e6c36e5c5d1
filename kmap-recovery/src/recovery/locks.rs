//! Per-resource exclusive locks

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::{KmapError, Result};

/// Held locks; dropping the guard releases every resource
pub struct ResourceGuard {
    resources: Vec<String>,
    _held: Vec<Box<dyn Send + Sync>>,
}

impl ResourceGuard {
    pub fn new(resources: Vec<String>, held: Vec<Box<dyn Send + Sync>>) -> Self {
        Self {
            resources,
            _held: held,
        }
    }

    /// Locked resource names in acquisition order
    pub fn resources(&self) -> &[String] {
        &self.resources
    }
}

impl std::fmt::Debug for ResourceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceGuard")
            .field("resources", &self.resources)
            .finish()
    }
}

/// Lock service for recovery resources.
///
/// A multi-instance deployment implements this over an external lock service.
#[async_trait]
pub trait ResourceLocks: Send + Sync {
    /// Wait for exclusive access to every named resource.
    ///
    /// Implementations acquire in name order. Dropping the returned future
    /// before it resolves must release anything already acquired.
    async fn acquire(&self, resources: &BTreeSet<String>) -> Result<ResourceGuard>;
}

/// In-process locks, one async mutex per resource name
#[derive(Debug, Default)]
pub struct LocalResourceLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl LocalResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, name: &str) -> Result<Arc<AsyncMutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| KmapError::Lock("lock table poisoned".into()))?;
        Ok(Arc::clone(locks.entry(name.to_string()).or_default()))
    }

    /// Whether a resource is currently held
    pub fn is_locked(&self, name: &str) -> bool {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .get(name)
            .is_some_and(|lock| lock.try_lock().is_err())
    }
}

#[async_trait]
impl ResourceLocks for LocalResourceLocks {
    async fn acquire(&self, resources: &BTreeSet<String>) -> Result<ResourceGuard> {
        let mut held: Vec<Box<dyn Send + Sync>> = Vec::with_capacity(resources.len());
        for name in resources {
            let lock = self.lock_for(name)?;
            held.push(Box::new(lock.lock_owned().await));
        }
        Ok(ResourceGuard::new(resources.iter().cloned().collect(), held))
    }
}
