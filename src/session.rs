//! Session storage for artifact chains.
//!
//! The engine owns no global state: chains live in a [`SessionStore`]
//! injected into it. Stores hand out shared immutable chains and replace
//! them wholesale on commit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::core::ArtifactChain;

/// Backing store for per-session chains
pub trait SessionStore: Send + Sync {
    fn get(&self, session_id: &str) -> Option<Arc<ArtifactChain>>;

    /// Insert or replace the chain for a session
    fn put(&self, session_id: &str, chain: ArtifactChain);

    /// Returns true if a chain was removed
    fn delete(&self, session_id: &str) -> bool;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    chains: Mutex<HashMap<String, Arc<ArtifactChain>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chains.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, session_id: &str) -> Option<Arc<ArtifactChain>> {
        let chains = self.chains.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        chains.get(session_id).cloned()
    }

    fn put(&self, session_id: &str, chain: ArtifactChain) {
        let mut chains = self.chains.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        chains.insert(session_id.to_string(), Arc::new(chain));
    }

    fn delete(&self, session_id: &str) -> bool {
        let mut chains = self.chains.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        chains.remove(session_id).is_some()
    }
}

impl<S: SessionStore + ?Sized> SessionStore for Arc<S> {
    fn get(&self, session_id: &str) -> Option<Arc<ArtifactChain>> {
        (**self).get(session_id)
    }

    fn put(&self, session_id: &str, chain: ArtifactChain) {
        (**self).put(session_id, chain)
    }

    fn delete(&self, session_id: &str) -> bool {
        (**self).delete(session_id)
    }
}
