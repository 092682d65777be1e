// # Orchestration Collaborators
//
// The three thin boundaries the lifecycle engine talks to besides the
// certificate authority, the DNS provider and the parameter store:
//
// - `CompletionSink`: reports the final outcome to the callback address
// - `WorkflowDriver`: starts the externally paced issuance wait
// - `StackInspector`: tells whether a deleted resource is being replaced

use async_trait::async_trait;
use serde_json::Value;

use crate::event::CompletionResponse;

/// Outcome of starting a workflow execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new execution was started
    Started,
    /// An execution with the same name already exists
    AlreadyRunning,
}

/// Delivers completion signals
///
/// Implementations perform one delivery attempt. The callback address is a
/// pre-signed credential and must never be logged.
#[async_trait]
pub trait CompletionSink: Send + Sync {
    /// Send `response` to `url`
    async fn send(&self, url: &str, response: &CompletionResponse) -> Result<(), crate::Error>;
}

/// Starts executions of the external stepwise driver
#[async_trait]
pub trait WorkflowDriver: Send + Sync {
    /// Start an execution named `name` with `input` as its first event
    ///
    /// # Returns
    ///
    /// - `Ok(StartOutcome::Started)`: A new execution is running
    /// - `Ok(StartOutcome::AlreadyRunning)`: The name was taken, nothing started
    /// - `Err(Error)`: The driver call failed
    async fn start_execution(&self, name: &str, input: &Value)
    -> Result<StartOutcome, crate::Error>;
}

/// Reads the owning stack's view of a resource
#[async_trait]
pub trait StackInspector: Send + Sync {
    /// Physical id the stack currently records for `logical_id`
    ///
    /// # Returns
    ///
    /// - `Ok(Some(id))`: The recorded physical id
    /// - `Ok(None)`: The stack records no physical id for the resource
    /// - `Err(Error)`: The lookup failed
    async fn current_physical_id(
        &self,
        stack_id: &str,
        logical_id: &str,
    ) -> Result<Option<String>, crate::Error>;
}
