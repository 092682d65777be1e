// # Memory Parameter Store
//
// In-memory implementation of ParameterStore.
//
// ## Crash Behavior
//
// - All markers are lost on restart
// - A delivery re-sent after a restart is processed again
//
// ## When to Use
//
// - Tests
// - Single-process local runs where a repeated delivery is harmless

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::traits::parameter_store::{MarkerRecord, ParameterStore};
use crate::{Error, Removal};

/// In-memory parameter store
///
/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryParameterStore {
    inner: Arc<RwLock<HashMap<String, MarkerRecord>>>,
}

impl MemoryParameterStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored parameters
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Names of every stored parameter
    pub async fn names(&self) -> Vec<String> {
        self.inner.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl ParameterStore for MemoryParameterStore {
    async fn get_parameter(&self, name: &str) -> Result<Option<String>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.get(name).map(|record| record.value.clone()))
    }

    async fn put_parameter(&self, name: &str, value: &str, description: &str) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.insert(name.to_string(), MarkerRecord::new(value, description));
        Ok(())
    }

    async fn delete_parameter(&self, name: &str) -> Result<Removal, Error> {
        let mut guard = self.inner.write().await;
        Ok(match guard.remove(name) {
            Some(_) => Removal::Removed,
            None => Removal::AlreadyAbsent,
        })
    }
}
