//! Property validation and hosted-zone resolution
//!
//! Raw resource properties arrive as an untyped key/value object. The
//! `PropertyValidator` turns them into `ResourceProperties`, resolving the
//! hosted zone so that both its name and id are known, and rejects any
//! domain that does not live inside that zone.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::traits::{CertificateRequest, DnsZoneProvider, HostedZone, Tag};
use crate::{Error, Result};

/// Properties as supplied by the caller, before any check
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawProperties {
    #[serde(default)]
    domain_name: String,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    subject_alternative_names: Vec<String>,
    #[serde(default)]
    tags: Vec<Tag>,
    #[serde(default)]
    hosted_zone_name: Option<String>,
    #[serde(default)]
    hosted_zone_id: Option<String>,
    #[serde(default = "default_with_caa", deserialize_with = "encoded_bool")]
    with_caa_records: bool,
}

fn default_with_caa() -> bool {
    true
}

/// Accept `true`/`false` as JSON booleans or as strings
///
/// Template engines stringify every property, so `"false"` must mean false.
fn encoded_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Encoded {
        Bool(bool),
        Text(String),
    }

    match Encoded::deserialize(deserializer)? {
        Encoded::Bool(value) => Ok(value),
        Encoded::Text(text) => match text.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected true or false, got '{}'",
                other
            ))),
        },
    }
}

/// Validated, zone-resolved resource properties
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceProperties {
    /// Primary domain
    pub domain_name: String,
    /// Explicit region override
    pub region: Option<String>,
    /// Additional names, order as supplied
    pub subject_alternative_names: Vec<String>,
    /// Tags to attach to the certificate
    pub tags: Vec<Tag>,
    /// Resolved zone name
    pub hosted_zone_name: String,
    /// Resolved zone id
    pub hosted_zone_id: String,
    /// Whether CAA records are published next to the validation records
    pub with_caa_records: bool,
}

impl ResourceProperties {
    /// SANs as an unordered set
    pub fn san_set(&self) -> BTreeSet<&str> {
        self.subject_alternative_names
            .iter()
            .map(String::as_str)
            .collect()
    }

    /// Number of domains the certificate covers (primary plus SANs)
    pub fn domain_count(&self) -> usize {
        self.subject_alternative_names.len() + 1
    }

    /// Certificate request for these properties
    pub fn certificate_request(&self) -> CertificateRequest {
        CertificateRequest {
            domain_name: self.domain_name.clone(),
            subject_alternative_names: self.subject_alternative_names.clone(),
        }
    }
}

/// Validates raw properties against the DNS zone provider
pub struct PropertyValidator {
    zones: Arc<dyn DnsZoneProvider>,
}

impl PropertyValidator {
    /// Create a new validator
    pub fn new(zones: Arc<dyn DnsZoneProvider>) -> Self {
        Self { zones }
    }

    /// Validate and normalize raw properties
    ///
    /// Performs exactly one zone lookup.
    pub async fn validate(&self, raw: &Value) -> Result<ResourceProperties> {
        let raw = parse(raw)?;

        let zone = self
            .resolve_zone(raw.hosted_zone_name.as_deref(), raw.hosted_zone_id.as_deref())
            .await?;

        check_subdomain(&raw.domain_name, &zone.name)?;
        for san in &raw.subject_alternative_names {
            check_subdomain(san, &zone.name)?;
        }

        Ok(ResourceProperties {
            domain_name: raw.domain_name,
            region: raw.region,
            subject_alternative_names: raw.subject_alternative_names,
            tags: raw.tags,
            hosted_zone_name: zone.name,
            hosted_zone_id: zone.id,
            with_caa_records: raw.with_caa_records,
        })
    }

    /// Resolve the hosted zone from exactly one of name or id
    pub async fn resolve_zone(&self, name: Option<&str>, id: Option<&str>) -> Result<HostedZone> {
        let zone = match (name, id) {
            (Some(name), None) => self.zones.zone_by_name(name).await?,
            (None, Some(id)) => self.zones.zone_by_id(id).await?,
            (None, None) => {
                return Err(Error::validation(
                    "one of HostedZoneName or HostedZoneId must be defined",
                ));
            }
            (Some(_), Some(_)) => {
                return Err(Error::validation(
                    "only one of HostedZoneName or HostedZoneId may be defined",
                ));
            }
        };
        debug!(zone_id = %zone.id, zone_name = %zone.name, "Resolved hosted zone");
        Ok(zone)
    }
}

/// Structural checks that need no lookup
fn parse(raw: &Value) -> Result<RawProperties> {
    if !raw.is_object() {
        return Err(Error::validation("resource properties must be an object"));
    }
    let raw: RawProperties = serde_json::from_value(raw.clone())
        .map_err(|e| Error::validation(format!("invalid resource properties: {}", e)))?;

    non_empty("DomainName", Some(&raw.domain_name))?;
    non_empty("Region", raw.region.as_deref())?;
    non_empty("HostedZoneName", raw.hosted_zone_name.as_deref())?;
    non_empty("HostedZoneId", raw.hosted_zone_id.as_deref())?;
    for tag in &raw.tags {
        non_empty("Tags[].Key", Some(&tag.key))?;
        non_empty("Tags[].Value", Some(&tag.value))?;
    }
    match (&raw.hosted_zone_name, &raw.hosted_zone_id) {
        (None, None) => Err(Error::validation(
            "one of HostedZoneName or HostedZoneId must be defined",
        )),
        (Some(_), Some(_)) => Err(Error::validation(
            "only one of HostedZoneName or HostedZoneId may be defined",
        )),
        _ => Ok(raw),
    }
}

fn non_empty(field: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(v) if v.trim().is_empty() => {
            Err(Error::validation(format!("{} must not be empty", field)))
        }
        _ => Ok(()),
    }
}

fn check_subdomain(domain: &str, zone: &str) -> Result<()> {
    if is_subdomain(domain, zone) {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "{} not subdomain of {}",
            domain, zone
        )))
    }
}

/// Lowercase a domain name and enforce the trailing dot
pub fn normalize_domain(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with('.') {
        lower
    } else {
        lower + "."
    }
}

/// Whether `domain` equals `zone` or lies below it
///
/// Comparison is label-aligned: `badexample.com` is not inside
/// `example.com`.
pub fn is_subdomain(domain: &str, zone: &str) -> bool {
    let domain = normalize_domain(domain);
    let zone = normalize_domain(zone);
    domain == zone || domain.ends_with(&format!(".{}", zone))
}
