//! CloudFormation stack inspector

use async_trait::async_trait;
use certflow_core::traits::StackInspector;
use certflow_core::Result;

use crate::sdk_failure;

/// Reads resource state of the owning stack
#[derive(Debug, Clone)]
pub struct CloudFormationStacks {
    client: aws_sdk_cloudformation::Client,
}

impl CloudFormationStacks {
    /// Create an inspector over an existing client
    pub fn new(client: aws_sdk_cloudformation::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StackInspector for CloudFormationStacks {
    async fn current_physical_id(&self, stack_id: &str, logical_id: &str) -> Result<Option<String>> {
        let output = self
            .client
            .describe_stack_resource()
            .stack_name(stack_id)
            .logical_resource_id(logical_id)
            .send()
            .await
            .map_err(|e| sdk_failure(format!("describe stack resource {}", logical_id), e))?;

        Ok(output
            .stack_resource_detail()
            .and_then(|detail| detail.physical_resource_id())
            .map(str::to_string))
    }
}
