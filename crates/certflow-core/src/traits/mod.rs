//! Core traits for the certificate lifecycle orchestrator
//!
//! This module defines the abstract interfaces every external collaborator
//! implements.
//!
//! - [`CertificateAuthority`]: Request, describe, tag and delete certificates
//! - [`DnsZoneProvider`]: Resolve zones and submit record change batches
//! - [`ParameterStore`]: Persist dedup markers
//! - [`CompletionSink`], [`WorkflowDriver`], [`StackInspector`]: Orchestration boundaries

pub mod certificate_authority;
pub mod collaborators;
pub mod dns_zone;
pub mod parameter_store;

pub use certificate_authority::{
    CertificateAuthority, CertificateAuthorityFactory, CertificateRecord, CertificateRequest,
    CertificateStatus, ChallengeRecord, Tag, ValidationOption,
};
pub use collaborators::{CompletionSink, StackInspector, StartOutcome, WorkflowDriver};
pub use dns_zone::{ChangeAction, ChangeInfo, ChangeStatus, DnsChange, DnsZoneProvider, HostedZone};
pub use parameter_store::{MarkerRecord, ParameterStore};
