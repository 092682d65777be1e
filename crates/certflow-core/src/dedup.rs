//! Delivery deduplication
//!
//! The notification bus delivers at least once. Before any side effect, the
//! engine asks the `EventDeduplicator` whether this delivery was already
//! accepted for the resource.
//!
//! The check-then-set sequence is not atomic. It is correct only while a
//! single consumer processes the deliveries of one resource scope in order
//! (a reserved concurrency of one on the consuming function).

use std::sync::Arc;
use tracing::{debug, info};

use crate::arn;
use crate::config::DedupConfig;
use crate::traits::ParameterStore;
use crate::{Removal, Result};

/// Remembers the last accepted delivery id per resource scope
pub struct EventDeduplicator {
    store: Arc<dyn ParameterStore>,
    config: DedupConfig,
}

impl EventDeduplicator {
    /// Create a new deduplicator over `store`
    pub fn new(store: Arc<dyn ParameterStore>, config: DedupConfig) -> Self {
        Self { store, config }
    }

    /// Parameter name holding the marker of one resource instance
    ///
    /// `<prefix>/DnsCertificateSnsMessageId/<stack-name>/<stack-uuid>/<logical-id>`
    pub fn parameter_name(&self, stack_id: &str, logical_id: &str) -> String {
        format!(
            "{}/DnsCertificateSnsMessageId/{}/{}",
            self.config.parameter_prefix,
            arn::stack_path(stack_id),
            logical_id
        )
    }

    /// Whether this delivery was already accepted for the scope
    ///
    /// Returns `true` when the stored marker equals `delivery_id`. Otherwise
    /// records `delivery_id` as the new marker and returns `false`.
    pub async fn should_skip(&self, scope_key: &str, delivery_id: &str) -> Result<bool> {
        debug!(scope = %scope_key, delivery_id = %delivery_id, "Checking delivery marker");

        let last = self.store.get_parameter(scope_key).await?;
        if last.as_deref() == Some(delivery_id) {
            info!(scope = %scope_key, delivery_id = %delivery_id, "Delivery already processed, skipping");
            return Ok(true);
        }

        self.store
            .put_parameter(scope_key, delivery_id, &self.config.parameter_description)
            .await?;
        self.store.flush().await?;
        Ok(false)
    }

    /// Remove the marker of a deleted resource
    pub async fn delete_marker(&self, scope_key: &str) -> Result<()> {
        match self.store.delete_parameter(scope_key).await? {
            Removal::Removed => debug!(scope = %scope_key, "Deleted delivery marker"),
            Removal::AlreadyAbsent => {
                debug!(scope = %scope_key, "Delivery marker does not exist, skipping")
            }
        }
        self.store.flush().await
    }
}
