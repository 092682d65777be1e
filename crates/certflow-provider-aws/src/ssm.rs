//! SSM Parameter Store adapter
//!
//! Markers are plain `String` parameters in the standard tier, written with
//! overwrite. A missing parameter is `None` on read and
//! `Removal::AlreadyAbsent` on delete.

use async_trait::async_trait;
use aws_sdk_ssm::types::{ParameterTier, ParameterType};
use certflow_core::traits::ParameterStore;
use certflow_core::{Removal, Result};

use crate::sdk_failure;

/// Parameter store backed by SSM
#[derive(Debug, Clone)]
pub struct SsmParameterStore {
    client: aws_sdk_ssm::Client,
}

impl SsmParameterStore {
    /// Create a store over an existing client
    pub fn new(client: aws_sdk_ssm::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ParameterStore for SsmParameterStore {
    async fn get_parameter(&self, name: &str) -> Result<Option<String>> {
        match self
            .client
            .get_parameter()
            .name(name)
            .with_decryption(true)
            .send()
            .await
        {
            Ok(output) => Ok(output
                .parameter()
                .and_then(|parameter| parameter.value())
                .map(str::to_string)),
            Err(e) if e.as_service_error().is_some_and(|s| s.is_parameter_not_found()) => Ok(None),
            Err(e) => Err(sdk_failure(format!("get parameter {}", name), e)),
        }
    }

    async fn put_parameter(&self, name: &str, value: &str, description: &str) -> Result<()> {
        self.client
            .put_parameter()
            .name(name)
            .value(value)
            .description(description)
            .r#type(ParameterType::String)
            .tier(ParameterTier::Standard)
            .overwrite(true)
            .send()
            .await
            .map_err(|e| sdk_failure(format!("put parameter {}", name), e))?;
        Ok(())
    }

    async fn delete_parameter(&self, name: &str) -> Result<Removal> {
        match self.client.delete_parameter().name(name).send().await {
            Ok(_) => Ok(Removal::Removed),
            Err(e) if e.as_service_error().is_some_and(|s| s.is_parameter_not_found()) => {
                Ok(Removal::AlreadyAbsent)
            }
            Err(e) => Err(sdk_failure(format!("delete parameter {}", name), e)),
        }
    }
}
