//! Utility functions for the container
//!
//! This module provides small helpers shared by the container and the weaving
//! layer: creation tracking for circular dependency detection and value
//! downcasting.

/// Dependency resolution utilities
pub mod dependency {
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::thread::ThreadId;

    /// Tracks components currently being created to detect circular dependencies.
    ///
    /// Creation chains are tracked per thread, so two threads creating the same
    /// lazy singleton are not mistaken for a cycle.
    #[derive(Debug, Default)]
    pub struct CreationTracker {
        creating: Mutex<HashMap<ThreadId, Vec<String>>>,
    }

    impl CreationTracker {
        /// Creates a new empty creation tracker.
        pub fn new() -> Self {
            Self::default()
        }

        /// Marks a component as being created on the current thread.
        ///
        /// Returns `Err` with the offending chain (ending in `name`) when the
        /// component is already being created on this thread.
        pub fn start_creating(&self, name: &str) -> Result<(), Vec<String>> {
            let mut creating = self.creating.lock();
            let chain = creating.entry(std::thread::current().id()).or_default();
            if let Some(start) = chain.iter().position(|n| n == name) {
                let mut cycle = chain[start..].to_vec();
                cycle.push(name.to_string());
                return Err(cycle);
            }
            chain.push(name.to_string());
            Ok(())
        }

        /// Marks a component as finished being created on the current thread.
        pub fn finish_creating(&self, name: &str) {
            let mut creating = self.creating.lock();
            let id = std::thread::current().id();
            if let Some(chain) = creating.get_mut(&id) {
                if let Some(pos) = chain.iter().rposition(|n| n == name) {
                    chain.remove(pos);
                }
                if chain.is_empty() {
                    creating.remove(&id);
                }
            }
        }

        /// Gets a snapshot of the creation chain of the current thread.
        ///
        /// This is useful for debugging and error messages.
        pub fn current_creating(&self) -> Vec<String> {
            self.creating
                .lock()
                .get(&std::thread::current().id())
                .cloned()
                .unwrap_or_default()
        }
    }

}

/// Value helpers
pub mod values {
    use std::any::Any;
    use std::sync::Arc;

    use crate::component::Value;
    use crate::container::ComponentRef;
    use crate::error::ContainerError;

    /// Wraps any value into a [`Value`].
    pub fn value<T: Any + Send + Sync>(v: T) -> Value {
        Arc::new(v)
    }

    /// The unit value returned by methods without a result.
    pub fn unit() -> Value {
        Arc::new(())
    }

    /// Downcasts a [`Value`] to a concrete type.
    ///
    /// Component handles are looked through: a [`ComponentRef`] whose target is
    /// a `T` yields that target.
    pub fn downcast_value<T: Any + Send + Sync>(value: &Value) -> Result<Arc<T>, ContainerError> {
        if let Ok(typed) = Arc::clone(value).downcast::<T>() {
            return Ok(typed);
        }
        if let Some(component) = value.downcast_ref::<ComponentRef>() {
            return component.target::<T>();
        }
        Err(ContainerError::TypeMismatch(std::any::type_name::<T>().to_string()))
    }

}
