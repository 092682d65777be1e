// # AWS Adapters
//
// This crate implements every collaborator trait of certflow-core against
// AWS:
//
// - ✅ `CertificateAuthority` / `CertificateAuthorityFactory`: ACM, one client per region
// - ✅ `DnsZoneProvider`: Route 53
// - ✅ `ParameterStore`: SSM Parameter Store
// - ✅ `WorkflowDriver`: Step Functions
// - ✅ `StackInspector`: CloudFormation
// - ✅ `CompletionSink`: HTTP PUT to the pre-signed callback URL
// - ❌ NO retry logic (the SDK's standard retries only; flow decisions are owned by LifecycleEngine)
// - ❌ NO polling (owned by CertificateLifecycleManager, DnsRecordReconciler, IssuanceWait)
// - ❌ NO background tasks
//
// ## Trust Level: Untrusted (Cloud Adapter)
//
// **Allowed Capabilities**:
// - ✅ Call their own service endpoint
// - ✅ Translate service errors into `certflow_core::Error` / `Removal` / `StartOutcome`
//
// **Forbidden Capabilities**:
// - ❌ Decide retries, waits or deduplication
// - ❌ Log the completion callback URL (it is a credential)
//
// ## Configuration
//
// Credentials and the default region come from the standard AWS environment
// chain (`aws_config::load_defaults`).

pub mod acm;
pub mod cloudformation;
pub mod completion;
pub mod route53;
pub mod ssm;
pub mod stepfunctions;

use std::sync::Arc;

use aws_config::{BehaviorVersion, SdkConfig};
use certflow_core::{Collaborators, Error, Result};

pub use acm::{AcmAuthority, AcmAuthorityFactory};
pub use cloudformation::CloudFormationStacks;
pub use completion::HttpCompletionSink;
pub use route53::Route53Zones;
pub use ssm::SsmParameterStore;
pub use stepfunctions::StepFunctionsDriver;

/// Load the shared SDK configuration from the environment
pub async fn load_sdk_config() -> SdkConfig {
    aws_config::load_defaults(BehaviorVersion::latest()).await
}

/// Wire every AWS adapter into engine collaborators
///
/// # Parameters
///
/// - `sdk_config`: Shared SDK configuration
/// - `state_machine_arn`: State machine that drives the issuance wait
///
/// # Errors
///
/// - `Error::Config` if the state machine ARN is empty
/// - `Error::Http` if the HTTP client cannot be built
pub fn collaborators(
    sdk_config: &SdkConfig,
    state_machine_arn: impl Into<String>,
) -> Result<Collaborators> {
    let state_machine_arn = state_machine_arn.into();
    if state_machine_arn.is_empty() {
        return Err(Error::config("state machine ARN is required"));
    }

    Ok(Collaborators {
        authorities: Arc::new(AcmAuthorityFactory::new(sdk_config.clone())),
        zones: Arc::new(Route53Zones::new(aws_sdk_route53::Client::new(sdk_config))),
        parameters: Arc::new(SsmParameterStore::new(aws_sdk_ssm::Client::new(sdk_config))),
        completions: Arc::new(HttpCompletionSink::new()?),
        workflow: Arc::new(StepFunctionsDriver::new(
            aws_sdk_sfn::Client::new(sdk_config),
            state_machine_arn,
        )),
        stacks: Arc::new(CloudFormationStacks::new(aws_sdk_cloudformation::Client::new(
            sdk_config,
        ))),
    })
}

/// Map an SDK failure to `Error::ExternalService`, keeping the full cause chain
pub(crate) fn sdk_failure(operation: impl Into<String>, err: impl std::error::Error) -> Error {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    Error::external(operation, message)
}
