//! Named lookup of prebuilt policies and pipelines.
//!
//! Registering one policy instance and pulling it into several pipelines is
//! how call sites share state, e.g. a single circuit breaker guarding every
//! request to the same upstream.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

use crate::resilience::pipeline::Policy;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("a policy named '{0}' is already registered")]
    DuplicateKey(String),
    #[error("no policy named '{0}' is registered")]
    NotFound(String),
}

/// Thread-safe registry of policies keyed by name.
pub struct PolicyRegistry<T> {
    policies: DashMap<String, Arc<dyn Policy<T>>>,
}

impl<T> PolicyRegistry<T> {
    pub fn new() -> Self {
        Self {
            policies: DashMap::new(),
        }
    }

    /// Register a policy; fails if the name is taken.
    pub fn add<P>(&self, name: impl Into<String>, policy: P) -> Result<(), RegistryError>
    where
        P: Policy<T> + 'static,
    {
        self.add_shared(name, Arc::new(policy))
    }

    pub fn add_shared(
        &self,
        name: impl Into<String>,
        policy: Arc<dyn Policy<T>>,
    ) -> Result<(), RegistryError> {
        match self.policies.entry(name.into()) {
            Entry::Occupied(entry) => Err(RegistryError::DuplicateKey(entry.key().clone())),
            Entry::Vacant(entry) => {
                tracing::debug!(name = %entry.key(), policy = policy.name(), "Policy registered");
                entry.insert(policy);
                Ok(())
            }
        }
    }

    /// Register or replace; returns the previous policy under that name.
    pub fn insert(
        &self,
        name: impl Into<String>,
        policy: Arc<dyn Policy<T>>,
    ) -> Option<Arc<dyn Policy<T>>> {
        self.policies.insert(name.into(), policy)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Policy<T>>> {
        self.policies.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn require(&self, name: &str) -> Result<Arc<dyn Policy<T>>, RegistryError> {
        self.get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn Policy<T>>> {
        self.policies.remove(name).map(|(_, policy)| policy)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.policies.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.policies.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl<T> Default for PolicyRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
