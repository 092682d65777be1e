// # DNS Zone Provider Trait
//
// Defines the interface for resolving hosted zones and submitting record
// change batches to an authoritative DNS service.
//
// ## Implementations
//
// - Route 53: `certflow-provider-aws` crate
// - Test doubles: `crates/certflow-core/tests/common`
//
// ## Usage
//
// ```rust,ignore
// use certflow_core::traits::{ChangeAction, DnsChange, DnsZoneProvider};
//
// async fn publish(provider: &dyn DnsZoneProvider) -> certflow_core::Result<()> {
//     let zone = provider.zone_by_name("example.com.").await?;
//     let change = DnsChange::new(ChangeAction::Create, "example.com.", "CAA", "0 issue \"amazon.com\"", 300);
//     let info = provider.submit_changes(&zone.id, &[change], "by certflow").await?;
//     let status = provider.get_change(&info.id).await?;
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::fmt;

/// A hosted zone as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedZone {
    /// Provider-assigned zone id
    pub id: String,
    /// Zone name, fully qualified with trailing dot
    pub name: String,
}

/// Action of a single record change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeAction {
    /// Create a record that must not already exist
    Create,
    /// Delete a record that must exist with identical contents
    Delete,
    /// Create or overwrite
    Upsert,
}

impl ChangeAction {
    /// Wire name of the action
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Delete => "DELETE",
            Self::Upsert => "UPSERT",
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record change inside a change set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsChange {
    /// What to do with the record
    pub action: ChangeAction,
    /// Fully qualified record name
    pub name: String,
    /// Record type (CNAME, CAA, ...)
    pub record_type: String,
    /// Single record value
    pub value: String,
    /// Time-to-live in seconds
    pub ttl: u32,
}

impl DnsChange {
    /// Create a new record change
    pub fn new(
        action: ChangeAction,
        name: impl Into<String>,
        record_type: impl Into<String>,
        value: impl Into<String>,
        ttl: u32,
    ) -> Self {
        Self {
            action,
            name: name.into(),
            record_type: record_type.into(),
            value: value.into(),
            ttl,
        }
    }
}

impl fmt::Display for DnsChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.action, self.name, self.record_type, self.value
        )
    }
}

/// Propagation status of a submitted change batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    /// Accepted but not yet applied to every authoritative server
    Pending,
    /// Applied everywhere
    InSync,
}

/// Handle to a submitted change batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeInfo {
    /// Provider-assigned change id
    pub id: String,
    /// Status at the time of the call
    pub status: ChangeStatus,
}

/// Trait for DNS zone provider implementations
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Single-shot
///
/// Each method performs one API call. Waiting for `ChangeStatus::InSync` and
/// the per-record fallback on a rejected batch are owned by
/// `DnsRecordReconciler`.
///
/// # Error Mapping
///
/// Implementations must report:
/// - an unknown zone as `Error::NotFound`
/// - a batch rejected because a record to delete does not exist as
///   `Error::NotFound`, so callers can tolerate it on teardown
/// - any other rejected batch as `Error::BatchRejected`
/// - transport and service failures as `Error::ExternalService`
#[async_trait]
pub trait DnsZoneProvider: Send + Sync {
    /// Look up a hosted zone by its fully qualified name
    ///
    /// # Parameters
    ///
    /// - `name`: Zone name; a trailing dot is optional
    async fn zone_by_name(&self, name: &str) -> Result<HostedZone, crate::Error>;

    /// Look up a hosted zone by its provider id
    async fn zone_by_id(&self, id: &str) -> Result<HostedZone, crate::Error>;

    /// Submit a change set as one atomic batch
    ///
    /// # Parameters
    ///
    /// - `zone_id`: Target hosted zone
    /// - `changes`: Non-empty, ordered change set
    /// - `comment`: Free-form comment stored with the batch
    ///
    /// # Returns
    ///
    /// - `Ok(ChangeInfo)`: The batch was accepted
    /// - `Err(Error)`: The batch was rejected as a whole or the call failed
    async fn submit_changes(
        &self,
        zone_id: &str,
        changes: &[DnsChange],
        comment: &str,
    ) -> Result<ChangeInfo, crate::Error>;

    /// Query the status of a previously submitted batch
    async fn get_change(&self, change_id: &str) -> Result<ChangeInfo, crate::Error>;

    /// Provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
