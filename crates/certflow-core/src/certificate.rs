//! Certificate lifecycle against the certificate authority

use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::arn;
use crate::traits::{
    CertificateAuthority, CertificateAuthorityFactory, CertificateRecord, Tag,
};
use crate::validation::ResourceProperties;
use crate::wait::BlockingPoller;
use crate::{Removal, Result};

/// Requests, describes, tags and deletes certificates
pub struct CertificateLifecycleManager {
    authority: Box<dyn CertificateAuthority>,
    poller: BlockingPoller,
}

impl CertificateLifecycleManager {
    /// Create a manager over an already selected authority endpoint
    ///
    /// `poller` bounds `describe_until_validation_ready`.
    pub fn new(authority: Box<dyn CertificateAuthority>, poller: BlockingPoller) -> Self {
        Self { authority, poller }
    }

    /// Manager for the endpoint the properties ask for
    pub fn for_properties(
        factory: &dyn CertificateAuthorityFactory,
        properties: &ResourceProperties,
        poller: BlockingPoller,
    ) -> Result<Self> {
        Ok(Self::new(acm_service_for(factory, properties)?, poller))
    }

    /// Manager for the endpoint holding an existing certificate
    pub fn for_certificate(
        factory: &dyn CertificateAuthorityFactory,
        certificate_ref: &str,
        poller: BlockingPoller,
    ) -> Result<Self> {
        Ok(Self::new(
            factory.for_region(arn::region(certificate_ref))?,
            poller,
        ))
    }

    /// Request a DNS-validated certificate and attach the tags
    ///
    /// Authority errors propagate unmodified.
    pub async fn create(&self, properties: &ResourceProperties) -> Result<String> {
        let certificate_ref = self
            .authority
            .request_certificate(&properties.certificate_request())
            .await?;
        info!(
            certificate = %certificate_ref,
            domain = %properties.domain_name,
            domains = properties.domain_count(),
            authority = self.authority.authority_name(),
            "Requested certificate"
        );

        if !properties.tags.is_empty() {
            self.authority
                .add_tags(&certificate_ref, &properties.tags)
                .await?;
        }
        Ok(certificate_ref)
    }

    /// Describe until every domain carries its challenge record
    ///
    /// Waits for exactly `san_count + 1` validation options, each with a
    /// concrete record.
    pub async fn describe_until_validation_ready(
        &self,
        certificate_ref: &str,
        san_count: usize,
    ) -> Result<CertificateRecord> {
        let authority: &dyn CertificateAuthority = self.authority.as_ref();
        let expected = san_count + 1;
        let what = format!("validation options of certificate {}", certificate_ref);

        self.poller
            .run(&what, move |round| async move {
                let record = authority.describe_certificate(certificate_ref).await?;
                if record.validation_ready(expected) {
                    Ok(Some(record))
                } else {
                    debug!(
                        certificate = %certificate_ref,
                        round,
                        options = record.validation_options.len(),
                        expected,
                        "Validation options not complete"
                    );
                    Ok(None)
                }
            })
            .await
    }

    /// Delete a certificate, tolerating its absence
    pub async fn delete(&self, certificate_ref: &str) -> Result<Removal> {
        let removal = self.authority.delete_certificate(certificate_ref).await?;
        match removal {
            Removal::Removed => info!(certificate = %certificate_ref, "Deleted certificate"),
            Removal::AlreadyAbsent => {
                debug!(certificate = %certificate_ref, "Certificate does not exist, skipping")
            }
        }
        Ok(removal)
    }

    /// Replace the tag set when it changed
    ///
    /// Full replace: every attached tag is removed, then the new set is
    /// attached. An interruption between the two calls leaves the
    /// certificate untagged until the next update.
    ///
    /// # Returns
    ///
    /// Whether any tag call was made
    pub async fn update_tags(
        &self,
        certificate_ref: &str,
        old_tags: &[Tag],
        new_tags: &[Tag],
    ) -> Result<bool> {
        let old: BTreeSet<&Tag> = old_tags.iter().collect();
        let new: BTreeSet<&Tag> = new_tags.iter().collect();
        if old == new {
            return Ok(false);
        }

        let attached = self.authority.list_tags(certificate_ref).await?;
        if !attached.is_empty() {
            self.authority.remove_tags(certificate_ref, &attached).await?;
        }
        if !new_tags.is_empty() {
            self.authority.add_tags(certificate_ref, new_tags).await?;
        }
        info!(certificate = %certificate_ref, removed = attached.len(), added = new_tags.len(), "Replaced certificate tags");
        Ok(true)
    }
}

/// Authority endpoint for a resource
///
/// An explicit region wins; otherwise the ambient default region is used.
pub fn acm_service_for(
    factory: &dyn CertificateAuthorityFactory,
    properties: &ResourceProperties,
) -> Result<Box<dyn CertificateAuthority>> {
    factory.for_region(properties.region.as_deref())
}
