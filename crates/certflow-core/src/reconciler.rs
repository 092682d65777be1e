//! DNS record reconciliation
//!
//! Renders the validation (CNAME) and CAA records implied by a certificate
//! into change sets, submits them as one atomic batch and waits until the
//! provider reports the batch as in sync.
//!
//! Deletes degrade gracefully: when the atomic batch is rejected (usually
//! because some record is already gone), each change is retried alone and
//! "record does not exist" answers are skipped.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::RecordConfig;
use crate::traits::{
    CertificateRecord, ChangeAction, ChangeInfo, ChangeStatus, DnsChange, DnsZoneProvider,
};
use crate::wait::BlockingPoller;
use crate::Result;

/// Which record kinds a change set covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationSpec {
    /// Emit the CNAME challenge records
    pub with_validation_records: bool,
    /// Emit one CAA record per domain
    pub with_caa_records: bool,
}

impl GenerationSpec {
    /// CAA records only (toggling the CAA flag on update)
    pub const CAA_ONLY: Self = Self {
        with_validation_records: false,
        with_caa_records: true,
    };

    /// Challenge records only
    pub const VALIDATION_ONLY: Self = Self {
        with_validation_records: true,
        with_caa_records: false,
    };

    /// The whole record set group of a resource
    pub fn full(with_caa_records: bool) -> Self {
        Self {
            with_validation_records: true,
            with_caa_records,
        }
    }
}

/// Computes and applies DNS change sets for certificates
pub struct DnsRecordReconciler {
    zones: Arc<dyn DnsZoneProvider>,
    records: RecordConfig,
    poller: BlockingPoller,
}

impl DnsRecordReconciler {
    /// Create a new reconciler
    ///
    /// `poller` bounds the wait for each submitted batch to be in sync.
    pub fn new(zones: Arc<dyn DnsZoneProvider>, records: RecordConfig, poller: BlockingPoller) -> Self {
        Self {
            zones,
            records,
            poller,
        }
    }

    /// Change set for a certificate
    ///
    /// Per validation option, in order: the CNAME challenge (when enabled
    /// and known) then the CAA record named after the domain.
    pub fn generate_changes(
        &self,
        certificate: &CertificateRecord,
        action: ChangeAction,
        spec: GenerationSpec,
    ) -> Vec<DnsChange> {
        let mut changes = Vec::new();
        for option in &certificate.validation_options {
            if spec.with_validation_records {
                match &option.challenge {
                    Some(challenge) => changes.push(DnsChange::new(
                        action,
                        &challenge.name,
                        &challenge.record_type,
                        &challenge.value,
                        self.records.ttl,
                    )),
                    None => warn!(domain = %option.domain_name, "Validation option has no challenge record"),
                }
            }
            if spec.with_caa_records {
                changes.push(DnsChange::new(
                    action,
                    format!("{}.", option.domain_name.trim_end_matches('.')),
                    "CAA",
                    &self.records.caa_value,
                    self.records.ttl,
                ));
            }
        }
        changes
    }

    /// Submit `changes` atomically and wait until they are in sync
    ///
    /// An empty change set submits nothing.
    pub async fn execute_batch(&self, zone_id: &str, changes: &[DnsChange]) -> Result<()> {
        if changes.is_empty() {
            debug!(zone_id = %zone_id, "Empty change set, nothing to submit");
            return Ok(());
        }

        let info = self
            .zones
            .submit_changes(zone_id, changes, &self.records.change_comment)
            .await?;
        info!(
            zone_id = %zone_id,
            change_id = %info.id,
            changes = changes.len(),
            provider = self.zones.provider_name(),
            "Submitted DNS change batch"
        );
        self.wait_in_sync(&info).await
    }

    /// Delete `changes` as a batch, falling back to one change at a time
    ///
    /// In the fallback, "record does not exist" answers are skipped and
    /// every other error is returned.
    pub async fn execute_delete_with_fallback(
        &self,
        zone_id: &str,
        changes: &[DnsChange],
    ) -> Result<()> {
        let batch_error = match self.execute_batch(zone_id, changes).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        warn!(
            zone_id = %zone_id,
            error = %batch_error,
            "Could not delete the records in batch, deleting one by one"
        );

        for change in changes {
            match self.execute_batch(zone_id, std::slice::from_ref(change)).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    info!(change = %change, "Record does not exist, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Create the challenge records, plus CAA records when `with_caa`
    pub async fn create_record_set_group(
        &self,
        zone_id: &str,
        certificate: &CertificateRecord,
        with_caa: bool,
    ) -> Result<()> {
        self.create(zone_id, certificate, GenerationSpec::full(with_caa))
            .await
    }

    /// Delete the challenge records, plus CAA records when `with_caa`
    pub async fn delete_record_set_group(
        &self,
        zone_id: &str,
        certificate: &CertificateRecord,
        with_caa: bool,
    ) -> Result<()> {
        self.delete(zone_id, certificate, GenerationSpec::full(with_caa))
            .await
    }

    /// Create the challenge records only
    pub async fn create_validation_records(
        &self,
        zone_id: &str,
        certificate: &CertificateRecord,
    ) -> Result<()> {
        self.create(zone_id, certificate, GenerationSpec::VALIDATION_ONLY)
            .await
    }

    /// Delete the challenge records only
    pub async fn delete_validation_records(
        &self,
        zone_id: &str,
        certificate: &CertificateRecord,
    ) -> Result<()> {
        self.delete(zone_id, certificate, GenerationSpec::VALIDATION_ONLY)
            .await
    }

    /// Create the CAA records only
    pub async fn create_caa_records(
        &self,
        zone_id: &str,
        certificate: &CertificateRecord,
    ) -> Result<()> {
        self.create(zone_id, certificate, GenerationSpec::CAA_ONLY)
            .await
    }

    /// Delete the CAA records only
    pub async fn delete_caa_records(
        &self,
        zone_id: &str,
        certificate: &CertificateRecord,
    ) -> Result<()> {
        self.delete(zone_id, certificate, GenerationSpec::CAA_ONLY)
            .await
    }

    async fn create(
        &self,
        zone_id: &str,
        certificate: &CertificateRecord,
        spec: GenerationSpec,
    ) -> Result<()> {
        let changes = self.generate_changes(certificate, ChangeAction::Create, spec);
        self.execute_batch(zone_id, &changes).await
    }

    async fn delete(
        &self,
        zone_id: &str,
        certificate: &CertificateRecord,
        spec: GenerationSpec,
    ) -> Result<()> {
        let changes = self.generate_changes(certificate, ChangeAction::Delete, spec);
        self.execute_delete_with_fallback(zone_id, &changes).await
    }

    async fn wait_in_sync(&self, submitted: &ChangeInfo) -> Result<()> {
        let zones: &dyn DnsZoneProvider = self.zones.as_ref();
        let change_id = submitted.id.as_str();
        let initial = submitted.status;
        let what = format!("DNS change {}", change_id);

        self.poller
            .run(&what, move |round| async move {
                let status = if round == 0 {
                    initial
                } else {
                    zones.get_change(change_id).await?.status
                };
                Ok((status == ChangeStatus::InSync).then_some(()))
            })
            .await?;
        debug!(change_id = %change_id, "DNS change in sync");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{CertificateStatus, ChallengeRecord, ValidationOption};
    use std::time::Duration;

    struct NoZones;

    #[async_trait::async_trait]
    impl DnsZoneProvider for NoZones {
        async fn zone_by_name(&self, name: &str) -> Result<crate::traits::HostedZone> {
            Err(crate::Error::not_found(name))
        }
        async fn zone_by_id(&self, id: &str) -> Result<crate::traits::HostedZone> {
            Err(crate::Error::not_found(id))
        }
        async fn submit_changes(&self, _: &str, _: &[DnsChange], _: &str) -> Result<ChangeInfo> {
            unreachable!("generation never submits")
        }
        async fn get_change(&self, _: &str) -> Result<ChangeInfo> {
            unreachable!("generation never polls")
        }
        fn provider_name(&self) -> &'static str {
            "none"
        }
    }

    fn certificate(domains: &[&str]) -> CertificateRecord {
        CertificateRecord {
            certificate_ref: "arn:aws:acm:eu-west-1:1:certificate/x".to_string(),
            status: CertificateStatus::PendingValidation,
            validation_options: domains
                .iter()
                .map(|domain| ValidationOption {
                    domain_name: domain.to_string(),
                    challenge: Some(ChallengeRecord {
                        name: format!("_x.{}.", domain),
                        record_type: "CNAME".to_string(),
                        value: format!("_y.{}.acm-validations.aws.", domain),
                    }),
                })
                .collect(),
        }
    }

    fn reconciler() -> DnsRecordReconciler {
        DnsRecordReconciler::new(
            Arc::new(NoZones),
            RecordConfig::default(),
            BlockingPoller::new(1, Duration::ZERO),
        )
    }

    #[test]
    fn test_change_counts() {
        let reconciler = reconciler();
        let cert = certificate(&["a.example.com", "b.example.com", "c.example.com"]);

        let full = reconciler.generate_changes(&cert, ChangeAction::Create, GenerationSpec::full(true));
        assert_eq!(full.len(), 6);

        let caa = reconciler.generate_changes(&cert, ChangeAction::Delete, GenerationSpec::CAA_ONLY);
        assert_eq!(caa.len(), 3);
        assert!(caa.iter().all(|c| c.record_type == "CAA" && c.action == ChangeAction::Delete));

        let validation = reconciler.generate_changes(&cert, ChangeAction::Create, GenerationSpec::full(false));
        assert_eq!(validation.len(), 3);
        assert!(validation.iter().all(|c| c.record_type == "CNAME"));
    }

    #[test]
    fn test_record_contents() {
        let reconciler = reconciler();
        let cert = certificate(&["a.example.com"]);
        let changes = reconciler.generate_changes(&cert, ChangeAction::Create, GenerationSpec::full(true));

        assert_eq!(
            changes[0],
            DnsChange::new(
                ChangeAction::Create,
                "_x.a.example.com.",
                "CNAME",
                "_y.a.example.com.acm-validations.aws.",
                300
            )
        );
        assert_eq!(
            changes[1],
            DnsChange::new(
                ChangeAction::Create,
                "a.example.com.",
                "CAA",
                "0 issue \"amazon.com\"",
                300
            )
        );
    }

    #[test]
    fn test_nothing_enabled_yields_nothing() {
        let reconciler = reconciler();
        let cert = certificate(&["a.example.com"]);
        let spec = GenerationSpec {
            with_validation_records: false,
            with_caa_records: false,
        };
        assert!(reconciler.generate_changes(&cert, ChangeAction::Create, spec).is_empty());
    }

    #[tokio::test]
    async fn test_empty_change_set_is_noop() {
        let reconciler = reconciler();
        reconciler.execute_batch("Z1", &[]).await.unwrap();
        reconciler.execute_delete_with_fallback("Z1", &[]).await.unwrap();
    }
}
