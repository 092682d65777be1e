//! Lifecycle event model
//!
//! A `LifecycleEvent` is owned by the external workflow driver. The core
//! reads it, annotates it (physical id, round, is-done) and hands it back;
//! unknown fields ride along in `extra` so the driver receives back exactly
//! what it sent plus the annotations.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Physical id reported when none is known yet
pub const UNKNOWN_PHYSICAL_ID: &str = "error";

/// Kind of lifecycle request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// First creation of the resource
    Create,
    /// Property change on an existing resource
    Update,
    /// Teardown
    Delete,
}

impl FromStr for RequestKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Create" => Ok(Self::Create),
            "Update" => Ok(Self::Update),
            "Delete" => Ok(Self::Delete),
            other => Err(Error::validation(format!("unknown request type '{}'", other))),
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
        })
    }
}

/// A lifecycle request for one resource instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleEvent {
    /// Raw request kind; see [`LifecycleEvent::kind`]
    pub request_type: String,

    /// Identity of the owning stack
    pub stack_id: String,

    /// Logical id of the resource inside the stack
    pub logical_resource_id: String,

    /// Physical id, absent until the first successful create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,

    /// Current raw properties
    #[serde(default)]
    pub resource_properties: Value,

    /// Prior raw properties (update only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_resource_properties: Option<Value>,

    /// Completion callback address
    #[serde(rename = "ResponseURL")]
    pub response_url: String,

    /// Request id echoed back in the completion
    pub request_id: String,

    /// Round counter threaded through repeated stepwise invocations
    #[serde(default, deserialize_with = "lenient_round")]
    pub round: u32,

    /// Is-done flag, set by the issuance-check step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_certificate_issued: Option<bool>,

    /// Delivery id of the notification that carried this event
    #[serde(skip)]
    pub delivery_id: Option<String>,

    /// Fields this core does not interpret, preserved verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LifecycleEvent {
    /// Parsed request kind
    pub fn kind(&self) -> Result<RequestKind> {
        self.request_type.parse()
    }

    /// Physical id, or the literal `"error"` when none is known
    pub fn physical_id_or_unknown(&self) -> &str {
        self.physical_resource_id
            .as_deref()
            .unwrap_or(UNKNOWN_PHYSICAL_ID)
    }

    /// Build a completion signal for this event
    pub fn completion(&self, status: CompletionStatus, reason: impl Into<String>) -> CompletionResponse {
        CompletionResponse {
            status,
            physical_resource_id: self.physical_id_or_unknown().to_string(),
            stack_id: self.stack_id.clone(),
            request_id: self.request_id.clone(),
            logical_resource_id: self.logical_resource_id.clone(),
            reason: reason.into(),
            data: Map::new(),
        }
    }
}

/// One message taken off the notification bus
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRecord {
    /// Bus-assigned unique delivery id
    pub delivery_id: String,
    /// Application payload (a JSON-encoded `LifecycleEvent`)
    pub message: String,
}

impl NotificationRecord {
    /// Decode the payload into a lifecycle event tagged with the delivery id
    pub fn decode(&self) -> Result<LifecycleEvent> {
        let mut event: LifecycleEvent = serde_json::from_str(&self.message)?;
        event.delivery_id = Some(self.delivery_id.clone());
        Ok(event)
    }
}

/// Whether a JSON payload is a notification-bus batch
pub fn is_notification_batch(payload: &Value) -> bool {
    payload
        .get("Records")
        .and_then(Value::as_array)
        .and_then(|records| records.first())
        .and_then(|record| record.get("EventSource"))
        .and_then(Value::as_str)
        == Some("aws:sns")
}

/// Extract every record of a notification-bus batch
///
/// Records without a delivery id or message are rejected; a partial batch
/// would silently drop lifecycle requests.
pub fn parse_notification_batch(payload: &Value) -> Result<Vec<NotificationRecord>> {
    let records = payload
        .get("Records")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::validation("notification batch has no Records array"))?;

    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let sns = record
                .get("Sns")
                .ok_or_else(|| Error::validation(format!("record {} has no Sns body", index)))?;
            let field = |name: &str| {
                sns.get(name)
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        Error::validation(format!("record {} has no Sns.{}", index, name))
                    })
            };
            Ok(NotificationRecord {
                delivery_id: field("MessageId")?,
                message: field("Message")?,
            })
        })
        .collect()
}

/// Outcome reported to the completion callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CompletionStatus {
    /// The request succeeded
    Success,
    /// The request failed; `reason` says why
    Failed,
}

/// Body of the completion signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CompletionResponse {
    /// Success or failure
    pub status: CompletionStatus,
    /// Physical id, `"error"` when none is known
    pub physical_resource_id: String,
    /// Owning stack
    pub stack_id: String,
    /// Request id of the originating event
    pub request_id: String,
    /// Logical id of the resource
    pub logical_resource_id: String,
    /// Failure reason, empty on success
    pub reason: String,
    /// Output attributes
    pub data: Map<String, Value>,
}

/// Read a round counter the way drivers echo it back
///
/// `null`, `0` and `""` all mean round 0; numbers may arrive as floats or
/// as numeric strings.
fn lenient_round<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Encoded {
        Integer(u32),
        Float(f64),
        Text(String),
    }

    let value = match Option::<Encoded>::deserialize(deserializer)? {
        None => return Ok(0),
        Some(Encoded::Integer(round)) => return Ok(round),
        Some(Encoded::Float(round)) => round,
        Some(Encoded::Text(text)) if text.trim().is_empty() => return Ok(0),
        Some(Encoded::Text(text)) => text.trim().parse::<f64>().map_err(|_| {
            serde::de::Error::custom(format!("expected a round number, got '{}'", text))
        })?,
    };

    if !value.is_finite() || value < 0.0 || value > f64::from(u32::MAX) {
        return Err(serde::de::Error::custom(format!(
            "round out of range: {}",
            value
        )));
    }
    Ok(value.trunc() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_event() -> Value {
        json!({
            "RequestType": "Create",
            "StackId": "arn:aws:cloudformation:eu-west-1:1:stack/app/uuid",
            "LogicalResourceId": "Cert",
            "ResourceProperties": {"DomainName": "a.example.com", "ServiceToken": "arn:x"},
            "ResponseURL": "https://callback.example/presigned?sig=abc",
            "RequestId": "req-1",
            "ResourceType": "Custom::DnsCertificate"
        })
    }

    #[test]
    fn test_event_defaults_and_extras() {
        let event: LifecycleEvent = serde_json::from_value(raw_event()).unwrap();
        assert_eq!(event.kind().unwrap(), RequestKind::Create);
        assert_eq!(event.round, 0);
        assert_eq!(event.physical_resource_id, None);
        assert_eq!(event.physical_id_or_unknown(), "error");
        assert_eq!(
            event.extra.get("ResourceType"),
            Some(&json!("Custom::DnsCertificate"))
        );

        let back = serde_json::to_value(&event).unwrap();
        assert_eq!(back["ResourceType"], "Custom::DnsCertificate");
        assert_eq!(back["ResponseURL"], "https://callback.example/presigned?sig=abc");
        assert_eq!(back["Round"], 0);
        assert!(back.get("IsCertificateIssued").is_none());
    }

    #[test]
    fn test_round_is_read_leniently() {
        for (encoded, expected) in [
            (json!(null), 0),
            (json!(7), 7),
            (json!(7.0), 7),
            (json!("12"), 12),
            (json!(""), 0),
        ] {
            let mut raw = raw_event();
            raw["Round"] = encoded.clone();
            let event: LifecycleEvent = serde_json::from_value(raw).unwrap();
            assert_eq!(event.round, expected, "Round {}", encoded);
        }

        for encoded in [json!("soon"), json!(-1)] {
            let mut raw = raw_event();
            raw["Round"] = encoded;
            assert!(serde_json::from_value::<LifecycleEvent>(raw).is_err());
        }
    }

    #[test]
    fn test_unknown_request_kind_is_validation_error() {
        let mut raw = raw_event();
        raw["RequestType"] = json!("Rollback");
        let event: LifecycleEvent = serde_json::from_value(raw).unwrap();
        assert!(matches!(event.kind(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_parse_notification_batch() {
        let payload = json!({
            "Records": [{
                "EventSource": "aws:sns",
                "Sns": {"MessageId": "m1", "Message": raw_event().to_string()}
            }]
        });
        assert!(is_notification_batch(&payload));

        let records = parse_notification_batch(&payload).unwrap();
        assert_eq!(records.len(), 1);
        let event = records[0].decode().unwrap();
        assert_eq!(event.delivery_id.as_deref(), Some("m1"));
        assert_eq!(event.logical_resource_id, "Cert");
    }

    #[test]
    fn test_non_batch_payload() {
        assert!(!is_notification_batch(&raw_event()));
        assert!(parse_notification_batch(&raw_event()).is_err());
    }

    #[test]
    fn test_completion_body() {
        let mut event: LifecycleEvent = serde_json::from_value(raw_event()).unwrap();
        let failed = event.completion(CompletionStatus::Failed, "boom");
        let body = serde_json::to_value(&failed).unwrap();
        assert_eq!(body["Status"], "FAILED");
        assert_eq!(body["PhysicalResourceId"], "error");
        assert_eq!(body["Reason"], "boom");
        assert_eq!(body["Data"], json!({}));

        event.physical_resource_id = Some("arn:aws:acm:eu-west-1:1:certificate/x".to_string());
        let ok = event.completion(CompletionStatus::Success, "");
        assert_eq!(ok.physical_resource_id, "arn:aws:acm:eu-west-1:1:certificate/x");
        assert_eq!(serde_json::to_value(&ok).unwrap()["Status"], "SUCCESS");
    }
}
