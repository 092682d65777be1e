//! Route 53 DNS zone provider
//!
//! Zone and change ids are returned without their `/hostedzone/` and
//! `/change/` prefixes. A rejected batch is classified from the
//! `InvalidChangeBatch` messages: a delete of a record that does not exist
//! is `Error::NotFound`, anything else `Error::BatchRejected`.

use async_trait::async_trait;
use aws_sdk_route53::operation::change_resource_record_sets::ChangeResourceRecordSetsError;
use aws_sdk_route53::types::{
    Change, ChangeAction as Route53Action, ChangeBatch, ChangeStatus as Route53Status,
    ResourceRecord, ResourceRecordSet, RrType,
};
use certflow_core::traits::{
    ChangeAction, ChangeInfo, ChangeStatus, DnsChange, DnsZoneProvider, HostedZone,
};
use certflow_core::{Error, Result};

use crate::sdk_failure;

const HOSTED_ZONE_PREFIX: &str = "/hostedzone/";
const CHANGE_PREFIX: &str = "/change/";

/// Marker Route 53 puts in the rejection of a delete whose record is gone
const RECORD_NOT_FOUND_MARKER: &str = "Tried to delete resource record set";

/// DNS zone provider backed by Route 53
#[derive(Debug, Clone)]
pub struct Route53Zones {
    client: aws_sdk_route53::Client,
}

impl Route53Zones {
    /// Create a provider over an existing client
    pub fn new(client: aws_sdk_route53::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DnsZoneProvider for Route53Zones {
    async fn zone_by_name(&self, name: &str) -> Result<HostedZone> {
        let fqdn = format!("{}.", name.trim_end_matches('.'));
        let output = self
            .client
            .list_hosted_zones_by_name()
            .dns_name(&fqdn)
            .send()
            .await
            .map_err(|e| sdk_failure(format!("look up hosted zone {}", fqdn), e))?;

        // results start at the first zone >= the name, which may be another zone
        output
            .hosted_zones()
            .first()
            .filter(|zone| zone.name().eq_ignore_ascii_case(&fqdn))
            .map(|zone| HostedZone {
                id: strip_zone_prefix(zone.id()).to_string(),
                name: zone.name().to_string(),
            })
            .ok_or_else(|| Error::not_found(format!("hosted zone {}", fqdn)))
    }

    async fn zone_by_id(&self, id: &str) -> Result<HostedZone> {
        let output = self
            .client
            .get_hosted_zone()
            .id(strip_zone_prefix(id))
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|s| s.is_no_such_hosted_zone()) {
                    Error::not_found(format!("hosted zone {}", id))
                } else {
                    sdk_failure(format!("get hosted zone {}", id), e)
                }
            })?;

        let zone = output
            .hosted_zone()
            .ok_or_else(|| Error::not_found(format!("hosted zone {}", id)))?;
        Ok(HostedZone {
            id: strip_zone_prefix(zone.id()).to_string(),
            name: zone.name().to_string(),
        })
    }

    async fn submit_changes(
        &self,
        zone_id: &str,
        changes: &[DnsChange],
        comment: &str,
    ) -> Result<ChangeInfo> {
        let batch = ChangeBatch::builder()
            .comment(comment)
            .set_changes(Some(
                changes
                    .iter()
                    .map(to_route53_change)
                    .collect::<Result<Vec<_>>>()?,
            ))
            .build()
            .map_err(|e| Error::validation(format!("invalid change batch: {}", e)))?;

        let output = self
            .client
            .change_resource_record_sets()
            .hosted_zone_id(strip_zone_prefix(zone_id))
            .change_batch(batch)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(ChangeResourceRecordSetsError::InvalidChangeBatch(rejection)) => {
                    let mut messages: Vec<&str> =
                        rejection.messages().iter().map(String::as_str).collect();
                    messages.extend(rejection.message());
                    classify_rejection(&messages)
                }
                Some(ChangeResourceRecordSetsError::NoSuchHostedZone(_)) => {
                    Error::not_found(format!("hosted zone {}", zone_id))
                }
                _ => sdk_failure(format!("change record sets in {}", zone_id), e),
            })?;

        let info = output.change_info().ok_or_else(|| {
            Error::external("change record sets", "response carries no change info")
        })?;
        Ok(ChangeInfo {
            id: strip_change_prefix(info.id()).to_string(),
            status: from_route53_status(info.status()),
        })
    }

    async fn get_change(&self, change_id: &str) -> Result<ChangeInfo> {
        let output = self
            .client
            .get_change()
            .id(change_id)
            .send()
            .await
            .map_err(|e| sdk_failure(format!("get change {}", change_id), e))?;

        let info = output
            .change_info()
            .ok_or_else(|| Error::external("get change", "response carries no change info"))?;
        Ok(ChangeInfo {
            id: strip_change_prefix(info.id()).to_string(),
            status: from_route53_status(info.status()),
        })
    }

    fn provider_name(&self) -> &'static str {
        "route53"
    }
}

fn strip_zone_prefix(id: &str) -> &str {
    id.strip_prefix(HOSTED_ZONE_PREFIX).unwrap_or(id)
}

fn strip_change_prefix(id: &str) -> &str {
    id.strip_prefix(CHANGE_PREFIX).unwrap_or(id)
}

fn from_route53_status(status: &Route53Status) -> ChangeStatus {
    match status {
        Route53Status::Insync => ChangeStatus::InSync,
        _ => ChangeStatus::Pending,
    }
}

fn to_route53_action(action: ChangeAction) -> Route53Action {
    match action {
        ChangeAction::Create => Route53Action::Create,
        ChangeAction::Delete => Route53Action::Delete,
        ChangeAction::Upsert => Route53Action::Upsert,
    }
}

fn to_route53_change(change: &DnsChange) -> Result<Change> {
    let invalid = |e: aws_sdk_route53::error::BuildError| {
        Error::validation(format!("invalid change '{}': {}", change, e))
    };

    let record = ResourceRecord::builder()
        .value(&change.value)
        .build()
        .map_err(invalid)?;
    let record_set = ResourceRecordSet::builder()
        .name(&change.name)
        .r#type(RrType::from(change.record_type.as_str()))
        .ttl(i64::from(change.ttl))
        .resource_records(record)
        .build()
        .map_err(invalid)?;

    Change::builder()
        .action(to_route53_action(change.action))
        .resource_record_set(record_set)
        .build()
        .map_err(invalid)
}

/// Classify the messages of an `InvalidChangeBatch` rejection
fn classify_rejection(messages: &[&str]) -> Error {
    let joined = messages.join("; ");
    if messages
        .iter()
        .any(|message| message.contains(RECORD_NOT_FOUND_MARKER))
    {
        Error::not_found(joined)
    } else {
        Error::batch_rejected(joined)
    }
}
