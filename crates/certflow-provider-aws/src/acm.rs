//! ACM certificate authority
//!
//! Certificates are requested with DNS validation and certificate
//! transparency logging enabled. ACM is regional: the factory builds one
//! client per requested region from the shared SDK configuration.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_acm::config::Region;
use aws_sdk_acm::types::{
    CertificateOptions, CertificateTransparencyLoggingPreference, Tag as AcmTag,
    ValidationMethod,
};
use certflow_core::traits::{
    CertificateAuthority, CertificateAuthorityFactory, CertificateRecord, CertificateRequest,
    CertificateStatus, ChallengeRecord, Tag, ValidationOption,
};
use certflow_core::{Error, Removal, Result};
use tracing::debug;

use crate::sdk_failure;

/// Certificate authority backed by one regional ACM client
#[derive(Debug, Clone)]
pub struct AcmAuthority {
    client: aws_sdk_acm::Client,
}

impl AcmAuthority {
    /// Create an authority over an existing client
    pub fn new(client: aws_sdk_acm::Client) -> Self {
        Self { client }
    }

    /// Region the client talks to
    pub fn region(&self) -> Option<&str> {
        self.client.config().region().map(|region| region.as_ref())
    }
}

#[async_trait]
impl CertificateAuthority for AcmAuthority {
    async fn request_certificate(&self, request: &CertificateRequest) -> Result<String> {
        let sans = (!request.subject_alternative_names.is_empty())
            .then(|| request.subject_alternative_names.clone());

        let output = self
            .client
            .request_certificate()
            .domain_name(&request.domain_name)
            .set_subject_alternative_names(sans)
            .validation_method(ValidationMethod::Dns)
            .options(
                CertificateOptions::builder()
                    .certificate_transparency_logging_preference(
                        CertificateTransparencyLoggingPreference::Enabled,
                    )
                    .build(),
            )
            .send()
            .await
            .map_err(|e| {
                sdk_failure(format!("request certificate for {}", request.domain_name), e)
            })?;

        output
            .certificate_arn()
            .map(str::to_string)
            .ok_or_else(|| Error::external("request certificate", "response carries no certificate ARN"))
    }

    async fn describe_certificate(&self, certificate_ref: &str) -> Result<CertificateRecord> {
        let output = self
            .client
            .describe_certificate()
            .certificate_arn(certificate_ref)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .is_some_and(|s| s.is_resource_not_found_exception())
                {
                    Error::not_found(format!("certificate {}", certificate_ref))
                } else {
                    sdk_failure(format!("describe certificate {}", certificate_ref), e)
                }
            })?;

        let detail = output.certificate().ok_or_else(|| {
            Error::external(
                format!("describe certificate {}", certificate_ref),
                "response carries no certificate detail",
            )
        })?;

        let status = detail
            .status()
            .map(|status| CertificateStatus::from(status.as_str()))
            .unwrap_or_else(|| CertificateStatus::Other("UNKNOWN".to_string()));

        let validation_options = detail
            .domain_validation_options()
            .iter()
            .map(|option| ValidationOption {
                domain_name: option.domain_name().to_string(),
                challenge: option.resource_record().map(|record| ChallengeRecord {
                    name: record.name().to_string(),
                    record_type: record.r#type().as_str().to_string(),
                    value: record.value().to_string(),
                }),
            })
            .collect();

        Ok(CertificateRecord {
            certificate_ref: certificate_ref.to_string(),
            status,
            validation_options,
        })
    }

    async fn list_tags(&self, certificate_ref: &str) -> Result<Vec<Tag>> {
        let output = self
            .client
            .list_tags_for_certificate()
            .certificate_arn(certificate_ref)
            .send()
            .await
            .map_err(|e| sdk_failure(format!("list tags of {}", certificate_ref), e))?;

        Ok(output
            .tags()
            .iter()
            .map(|tag| Tag::new(tag.key(), tag.value().unwrap_or_default()))
            .collect())
    }

    async fn add_tags(&self, certificate_ref: &str, tags: &[Tag]) -> Result<()> {
        self.client
            .add_tags_to_certificate()
            .certificate_arn(certificate_ref)
            .set_tags(Some(to_acm_tags(tags)?))
            .send()
            .await
            .map_err(|e| sdk_failure(format!("add tags to {}", certificate_ref), e))?;
        Ok(())
    }

    async fn remove_tags(&self, certificate_ref: &str, tags: &[Tag]) -> Result<()> {
        self.client
            .remove_tags_from_certificate()
            .certificate_arn(certificate_ref)
            .set_tags(Some(to_acm_tags(tags)?))
            .send()
            .await
            .map_err(|e| sdk_failure(format!("remove tags from {}", certificate_ref), e))?;
        Ok(())
    }

    async fn delete_certificate(&self, certificate_ref: &str) -> Result<Removal> {
        match self
            .client
            .delete_certificate()
            .certificate_arn(certificate_ref)
            .send()
            .await
        {
            Ok(_) => Ok(Removal::Removed),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|s| s.is_resource_not_found_exception()) =>
            {
                Ok(Removal::AlreadyAbsent)
            }
            Err(e) => Err(sdk_failure(format!("delete certificate {}", certificate_ref), e)),
        }
    }

    fn authority_name(&self) -> &'static str {
        "acm"
    }
}

fn to_acm_tags(tags: &[Tag]) -> Result<Vec<AcmTag>> {
    tags.iter()
        .map(|tag| {
            AcmTag::builder()
                .key(&tag.key)
                .value(&tag.value)
                .build()
                .map_err(|e| Error::validation(format!("invalid tag '{}': {}", tag.key, e)))
        })
        .collect()
}

/// Builds ACM clients per region from one shared SDK configuration
#[derive(Debug, Clone)]
pub struct AcmAuthorityFactory {
    sdk_config: SdkConfig,
}

impl AcmAuthorityFactory {
    /// Create a factory over the shared SDK configuration
    pub fn new(sdk_config: SdkConfig) -> Self {
        Self { sdk_config }
    }

    /// Build a concrete ACM authority
    ///
    /// `None` keeps the region of the shared configuration.
    pub fn authority(&self, region: Option<&str>) -> AcmAuthority {
        let mut builder = aws_sdk_acm::config::Builder::from(&self.sdk_config);
        if let Some(region) = region {
            builder = builder.region(Region::new(region.to_string()));
        }
        let authority = AcmAuthority::new(aws_sdk_acm::Client::from_conf(builder.build()));
        debug!(region = ?authority.region(), "ACM client ready");
        authority
    }
}

impl CertificateAuthorityFactory for AcmAuthorityFactory {
    fn for_region(&self, region: Option<&str>) -> Result<Box<dyn CertificateAuthority>> {
        Ok(Box::new(self.authority(region)))
    }
}
