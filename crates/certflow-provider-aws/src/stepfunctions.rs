//! Step Functions workflow driver

use async_trait::async_trait;
use certflow_core::traits::{StartOutcome, WorkflowDriver};
use certflow_core::Result;
use serde_json::Value;
use tracing::debug;

use crate::sdk_failure;

/// Starts executions of one state machine
///
/// Execution names are unique per state machine, so naming an execution
/// after the delivery id turns a second start for the same delivery into
/// `StartOutcome::AlreadyRunning`.
#[derive(Debug, Clone)]
pub struct StepFunctionsDriver {
    client: aws_sdk_sfn::Client,
    state_machine_arn: String,
}

impl StepFunctionsDriver {
    /// Create a driver for `state_machine_arn`
    pub fn new(client: aws_sdk_sfn::Client, state_machine_arn: impl Into<String>) -> Self {
        Self {
            client,
            state_machine_arn: state_machine_arn.into(),
        }
    }
}

#[async_trait]
impl WorkflowDriver for StepFunctionsDriver {
    async fn start_execution(&self, name: &str, input: &Value) -> Result<StartOutcome> {
        let input = serde_json::to_string(input)?;
        match self
            .client
            .start_execution()
            .state_machine_arn(&self.state_machine_arn)
            .name(name)
            .input(input)
            .send()
            .await
        {
            Ok(output) => {
                debug!(execution_arn = %output.execution_arn(), "Execution started");
                Ok(StartOutcome::Started)
            }
            Err(e)
                if e.as_service_error()
                    .is_some_and(|s| s.is_execution_already_exists()) =>
            {
                Ok(StartOutcome::AlreadyRunning)
            }
            Err(e) => Err(sdk_failure(format!("start execution {}", name), e)),
        }
    }
}
