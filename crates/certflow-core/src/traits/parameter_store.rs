// # Parameter Store Trait
//
// Defines the interface for the small key/value store holding dedup markers.
//
// ## Purpose
//
// Lifecycle events arrive at least once. The parameter store remembers the
// last accepted delivery id per resource scope so a re-delivery can be
// recognised and skipped before any side effect.
//
// ## Implementations
//
// - SSM Parameter Store: `certflow-provider-aws` crate
// - In-memory: `state::MemoryParameterStore`
// - File-based JSON: `state::FileParameterStore`

use async_trait::async_trait;

/// A stored parameter value with bookkeeping
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MarkerRecord {
    /// Stored value (the delivery id)
    pub value: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Timestamp of the last write
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

impl MarkerRecord {
    /// Create a new record stamped with the current time
    pub fn new(value: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            description: description.into(),
            last_updated: chrono::Utc::now(),
        }
    }
}

/// Trait for parameter store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks. The
/// store gives no compare-and-set guarantee; serialising access per scope
/// is the caller's environment's job.
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O for persistent storage (files, remote parameter service)
/// - ✅ Cache values in memory (with explicit flush)
///
/// ## Forbidden Capabilities
/// - ❌ Decide whether a delivery is a duplicate (owned by `EventDeduplicator`)
/// - ❌ Spawn background tasks
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Read a parameter
    ///
    /// # Returns
    ///
    /// - `Ok(Some(value))`: The stored value
    /// - `Ok(None)`: No such parameter
    /// - `Err(Error)`: Storage error
    async fn get_parameter(&self, name: &str) -> Result<Option<String>, crate::Error>;

    /// Create or overwrite a parameter
    ///
    /// # Parameters
    ///
    /// - `name`: Hierarchical parameter name, e.g. `/certflow/...`
    /// - `value`: New value
    /// - `description`: Description stored alongside the value
    async fn put_parameter(
        &self,
        name: &str,
        value: &str,
        description: &str,
    ) -> Result<(), crate::Error>;

    /// Delete a parameter
    ///
    /// # Returns
    ///
    /// - `Ok(Removal::Removed)`: The parameter existed and was deleted
    /// - `Ok(Removal::AlreadyAbsent)`: There was no such parameter
    /// - `Err(Error)`: Storage error
    async fn delete_parameter(&self, name: &str) -> Result<crate::Removal, crate::Error>;

    /// Persist any pending changes
    ///
    /// Remote stores write through; the default is a no-op.
    async fn flush(&self) -> Result<(), crate::Error> {
        Ok(())
    }
}
