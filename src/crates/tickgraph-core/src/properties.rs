//! Runtime properties: the shared blackboard
//!
//! [`RuntimeProperties`] is a string-keyed map shared by every state of every
//! run an [`Engine`](crate::Engine) executes. It is meant for cross-cutting
//! values a node wants to consult: counters, queues, budgets.
//!
//! Each individual `get` / `set` is atomic, but the engine imposes no
//! ordering between concurrently dispatched states: if two states touch the
//! same key in the same round, last writer wins. Use [`RuntimeProperties::update`]
//! for read-modify-write, or store an `Arc<Mutex<_>>` and lock it yourself.
//!
//! # Example
//!
//! ```rust
//! use tickgraph_core::RuntimeProperties;
//!
//! let props = RuntimeProperties::new();
//! props.set("attempts", 0u32);
//! props.update("attempts", 0u32, |n| *n += 1);
//!
//! assert_eq!(props.get::<u32>("attempts").unwrap(), 1);
//! assert_eq!(props.try_get::<u32>("missing"), None);
//! ```

use crate::error::{GraphError, Result};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type PropertyValue = Arc<dyn Any + Send + Sync>;

/// Shared key/value blackboard
#[derive(Clone, Default)]
pub struct RuntimeProperties {
    values: Arc<RwLock<HashMap<String, PropertyValue>>>,
}

impl RuntimeProperties {
    /// Create an empty blackboard
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, returning whether a previous value was replaced
    pub fn set<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T) -> bool {
        self.values
            .write()
            .insert(key.into(), Arc::new(value))
            .is_some()
    }

    /// Read a clone of the value under `key`
    ///
    /// Fails if the key is missing or holds a value of another type.
    pub fn get<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Result<T> {
        let values = self.values.read();
        let value = values.get(key).ok_or_else(|| GraphError::Property {
            key: key.to_string(),
            reason: "not set".to_string(),
        })?;
        value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| GraphError::Property {
                key: key.to_string(),
                reason: format!("not a `{}`", std::any::type_name::<T>()),
            })
    }

    /// Read a clone of the value under `key` if present with type `T`
    pub fn try_get<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        self.values
            .read()
            .get(key)
            .and_then(|value| value.downcast_ref::<T>().cloned())
    }

    /// Share the stored value itself, e.g. an `Arc<Mutex<VecDeque<_>>>` work queue
    pub fn get_shared<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        let value = self.values.read().get(key).cloned()?;
        value.downcast::<T>().ok()
    }

    /// Atomically modify the value under `key`, inserting `default` first if absent
    ///
    /// A value of another type under the same key is replaced by `default`.
    /// Returns the value after modification.
    pub fn update<T, F>(&self, key: impl Into<String>, default: T, f: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(&mut T),
    {
        let key = key.into();
        let mut values = self.values.write();
        let mut current = values
            .get(&key)
            .and_then(|value| value.downcast_ref::<T>().cloned())
            .unwrap_or(default);
        f(&mut current);
        values.insert(key, Arc::new(current.clone()));
        current
    }

    /// Whether `key` is set
    pub fn contains(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }

    /// Remove `key`, returning whether it was set
    pub fn remove(&self, key: &str) -> bool {
        self.values.write().remove(key).is_some()
    }

    /// All keys currently set
    pub fn keys(&self) -> Vec<String> {
        self.values.read().keys().cloned().collect()
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Whether no key is set
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl fmt::Debug for RuntimeProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeProperties")
            .field("keys", &self.keys())
            .finish()
    }
}
