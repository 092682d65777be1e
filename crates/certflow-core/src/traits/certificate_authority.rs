// # Certificate Authority Trait
//
// Defines the interface for requesting, describing, tagging and deleting
// DNS-validated certificates.
//
// ## Implementations
//
// - ACM: `certflow-provider-aws` crate
// - Test doubles: `crates/certflow-core/tests/common`
//
// ## Asynchrony
//
// Issuance is asynchronous on the authority side. The validation options
// (the CNAME challenges) show up on the certificate some time after the
// request, and the status moves from PENDING_VALIDATION to ISSUED only
// after the challenges resolve. Both are observable only by describing
// the certificate again; implementations never wait themselves.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A key/value tag attached to a certificate
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    /// Tag key
    pub key: String,
    /// Tag value
    pub value: String,
}

impl Tag {
    /// Create a new tag
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Everything the authority needs to issue a DNS-validated certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    /// Primary domain
    pub domain_name: String,
    /// Additional names covered by the certificate
    pub subject_alternative_names: Vec<String>,
}

/// Lifecycle status reported by the authority
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateStatus {
    /// Waiting for the DNS challenges to resolve
    PendingValidation,
    /// Issued and usable
    Issued,
    /// Validation or issuance failed
    Failed,
    /// Any other status (expired, revoked, inactive, ...)
    Other(String),
}

impl CertificateStatus {
    /// Wire name of the status
    pub fn as_str(&self) -> &str {
        match self {
            Self::PendingValidation => "PENDING_VALIDATION",
            Self::Issued => "ISSUED",
            Self::Failed => "FAILED",
            Self::Other(status) => status,
        }
    }
}

impl From<&str> for CertificateStatus {
    fn from(status: &str) -> Self {
        match status {
            "PENDING_VALIDATION" => Self::PendingValidation,
            "ISSUED" => Self::Issued,
            "FAILED" => Self::Failed,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The DNS record the authority expects to find for one domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeRecord {
    /// Record name, e.g. `_x1.a.example.com.`
    pub name: String,
    /// Record type, always CNAME for ACM today
    pub record_type: String,
    /// Record value
    pub value: String,
}

/// One domain of the certificate and its (possibly not yet known) challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOption {
    /// The domain being validated
    pub domain_name: String,
    /// Challenge record, `None` until the authority has generated it
    pub challenge: Option<ChallengeRecord>,
}

/// Snapshot of a certificate as returned by a describe call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRecord {
    /// Authority-assigned opaque reference
    pub certificate_ref: String,
    /// Current status
    pub status: CertificateStatus,
    /// Validation options, one per domain once fully populated
    pub validation_options: Vec<ValidationOption>,
}

impl CertificateRecord {
    /// Whether the authority has published a challenge for each of
    /// `expected` domains
    pub fn validation_ready(&self, expected: usize) -> bool {
        self.validation_options.len() == expected
            && self
                .validation_options
                .iter()
                .all(|option| option.challenge.is_some())
    }
}

/// Trait for certificate authority implementations
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Single-shot
///
/// Every method performs exactly one call against the authority. Polling,
/// waiting and retry decisions belong to `CertificateLifecycleManager` and
/// `IssuanceWait`, which is what keeps each invocation's external call
/// count bounded and predictable.
///
/// # Errors
///
/// Failures are reported as `Error::ExternalService` with the operation
/// name; "certificate does not exist" on delete is reported as
/// `Removal::AlreadyAbsent`, never as an error.
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// Request a new DNS-validated certificate
    ///
    /// # Returns
    ///
    /// The authority-assigned certificate reference
    async fn request_certificate(
        &self,
        request: &CertificateRequest,
    ) -> Result<String, crate::Error>;

    /// Describe a certificate
    async fn describe_certificate(
        &self,
        certificate_ref: &str,
    ) -> Result<CertificateRecord, crate::Error>;

    /// List the tags currently attached to a certificate
    async fn list_tags(&self, certificate_ref: &str) -> Result<Vec<Tag>, crate::Error>;

    /// Attach tags to a certificate
    async fn add_tags(&self, certificate_ref: &str, tags: &[Tag]) -> Result<(), crate::Error>;

    /// Detach tags from a certificate
    async fn remove_tags(&self, certificate_ref: &str, tags: &[Tag])
    -> Result<(), crate::Error>;

    /// Delete a certificate
    ///
    /// # Returns
    ///
    /// - `Ok(Removal::Removed)`: The certificate was deleted
    /// - `Ok(Removal::AlreadyAbsent)`: There was nothing to delete
    /// - `Err(Error)`: Any other failure
    async fn delete_certificate(
        &self,
        certificate_ref: &str,
    ) -> Result<crate::Removal, crate::Error>;

    /// Authority name (for logging/debugging)
    fn authority_name(&self) -> &'static str;
}

/// Selects the regional endpoint of the certificate authority
///
/// Certificates live in one region. A resource may pin its certificate to an
/// explicit region (CloudFront only accepts `us-east-1` certificates), so
/// the authority client is built per call rather than held as a singleton.
pub trait CertificateAuthorityFactory: Send + Sync {
    /// Create an authority client for `region`, or for the ambient default
    /// region when `None`
    fn for_region(
        &self,
        region: Option<&str>,
    ) -> Result<Box<dyn CertificateAuthority>, crate::Error>;
}
