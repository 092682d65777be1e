//! Contract Test: Certificate lifecycle manager
//!
//! Constraints verified:
//! - The endpoint region comes from the properties, or from the certificate ref
//! - Tags are replaced as a whole and only when the set changed
//! - Deleting an absent certificate is not an error
//! - The wait for validation options is bounded

mod common;

use certflow_core::traits::{CertificateStatus, Tag};
use certflow_core::validation::PropertyValidator;
use certflow_core::{BlockingPoller, CertificateLifecycleManager, Error, Removal};
use common::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const CERT: &str = "arn:aws:acm:ap-southeast-2:999999999999:certificate/cert-x";

fn poller(rounds: u32) -> BlockingPoller {
    BlockingPoller::new(rounds, Duration::ZERO)
}

async fn validated(raw: serde_json::Value) -> certflow_core::ResourceProperties {
    PropertyValidator::new(Arc::new(FakeZones::new()))
        .validate(&raw)
        .await
        .expect("valid properties")
}

#[tokio::test]
async fn explicit_region_selects_endpoint() {
    let authority = FakeAuthority::new();
    let mut raw = properties("a.example.com", &[]);
    raw["Region"] = json!("us-east-1");
    let props = validated(raw).await;

    let manager = CertificateLifecycleManager::for_properties(&authority, &props, poller(1)).unwrap();
    manager.create(&props).await.unwrap();

    assert_eq!(authority.regions(), vec![Some("us-east-1".to_string())]);
}

#[tokio::test]
async fn missing_region_uses_ambient_default() {
    let authority = FakeAuthority::new();
    let props = validated(properties("a.example.com", &[])).await;

    CertificateLifecycleManager::for_properties(&authority, &props, poller(1)).unwrap();

    assert_eq!(authority.regions(), vec![None]);
}

#[tokio::test]
async fn existing_certificate_uses_its_own_region() {
    let authority = FakeAuthority::new();

    CertificateLifecycleManager::for_certificate(&authority, CERT, poller(1)).unwrap();

    assert_eq!(authority.regions(), vec![Some("ap-southeast-2".to_string())]);
}

#[tokio::test]
async fn create_attaches_tags() {
    let authority = FakeAuthority::new();
    let props = validated(properties("a.example.com", &["b.example.com"])).await;
    let manager = CertificateLifecycleManager::for_properties(&authority, &props, poller(1)).unwrap();

    let certificate_ref = manager.create(&props).await.unwrap();

    let cert = authority.certificate(&certificate_ref).unwrap();
    assert_eq!(cert.domains, vec!["a.example.com", "b.example.com"]);
    assert_eq!(cert.tags, vec![Tag::new("team", "edge")]);
}

#[tokio::test]
async fn create_without_tags_makes_no_tag_call() {
    let authority = FakeAuthority::new();
    let mut raw = properties("a.example.com", &[]);
    raw["Tags"] = json!([]);
    let props = validated(raw).await;
    let manager = CertificateLifecycleManager::for_properties(&authority, &props, poller(1)).unwrap();

    manager.create(&props).await.unwrap();

    assert_eq!(authority.calls_starting_with("add_tags"), 0);
}

#[tokio::test]
async fn equal_tag_sets_make_no_call() {
    let authority = FakeAuthority::new();
    authority.insert(CERT, &["a.example.com"], CertificateStatus::Issued, vec![Tag::new("a", "1")]);
    let manager = CertificateLifecycleManager::for_certificate(&authority, CERT, poller(1)).unwrap();

    let old = vec![Tag::new("a", "1"), Tag::new("b", "2")];
    let new = vec![Tag::new("b", "2"), Tag::new("a", "1")];
    let changed = manager.update_tags(CERT, &old, &new).await.unwrap();

    assert!(!changed, "order does not matter");
    assert!(authority.calls().is_empty());
}

#[tokio::test]
async fn changed_tags_are_replaced_as_a_whole() {
    let authority = FakeAuthority::new();
    authority.insert(
        CERT,
        &["a.example.com"],
        CertificateStatus::Issued,
        vec![Tag::new("a", "1"), Tag::new("manual", "x")],
    );
    let manager = CertificateLifecycleManager::for_certificate(&authority, CERT, poller(1)).unwrap();

    let changed = manager
        .update_tags(CERT, &[Tag::new("a", "1")], &[Tag::new("a", "2")])
        .await
        .unwrap();

    assert!(changed);
    assert_eq!(
        authority.calls(),
        vec![
            format!("list_tags {}", CERT),
            format!("remove_tags {} 2", CERT),
            format!("add_tags {} 1", CERT),
        ]
    );
    assert_eq!(authority.certificate(CERT).unwrap().tags, vec![Tag::new("a", "2")]);
}

#[tokio::test]
async fn removing_every_tag_makes_no_add_call() {
    let authority = FakeAuthority::new();
    authority.insert(CERT, &["a.example.com"], CertificateStatus::Issued, vec![Tag::new("a", "1")]);
    let manager = CertificateLifecycleManager::for_certificate(&authority, CERT, poller(1)).unwrap();

    manager.update_tags(CERT, &[Tag::new("a", "1")], &[]).await.unwrap();

    assert_eq!(authority.calls_starting_with("add_tags"), 0);
    assert!(authority.certificate(CERT).unwrap().tags.is_empty());
}

#[tokio::test]
async fn delete_tolerates_absence() {
    let authority = FakeAuthority::new();
    authority.insert(CERT, &["a.example.com"], CertificateStatus::Issued, vec![]);
    let manager = CertificateLifecycleManager::for_certificate(&authority, CERT, poller(1)).unwrap();

    assert_eq!(manager.delete(CERT).await.unwrap(), Removal::Removed);
    assert_eq!(manager.delete(CERT).await.unwrap(), Removal::AlreadyAbsent);
}

#[tokio::test]
async fn validation_options_are_awaited() {
    let authority = FakeAuthority::new();
    authority.options_after(2);
    authority.insert(CERT, &["a.example.com", "b.example.com"], CertificateStatus::PendingValidation, vec![]);
    let manager = CertificateLifecycleManager::for_certificate(&authority, CERT, poller(5)).unwrap();

    let record = manager.describe_until_validation_ready(CERT, 1).await.unwrap();

    assert_eq!(authority.describe_call_count(), 3);
    assert_eq!(record.validation_options.len(), 2);
    assert!(record.validation_options.iter().all(|o| o.challenge.is_some()));
}

#[tokio::test]
async fn validation_options_wait_is_bounded() {
    let authority = FakeAuthority::new();
    authority.options_after(10);
    authority.insert(CERT, &["a.example.com"], CertificateStatus::PendingValidation, vec![]);
    let manager = CertificateLifecycleManager::for_certificate(&authority, CERT, poller(3)).unwrap();

    let result = manager.describe_until_validation_ready(CERT, 0).await;

    assert!(matches!(result, Err(Error::Timeout { rounds: 3, .. })));
    assert_eq!(authority.describe_call_count(), 3);
}

#[tokio::test]
async fn describe_of_unknown_certificate_is_not_found() {
    let authority = FakeAuthority::new();
    let manager = CertificateLifecycleManager::for_certificate(&authority, CERT, poller(3)).unwrap();

    let result = manager.describe_until_validation_ready(CERT, 0).await;

    assert!(result.unwrap_err().is_not_found());
    assert_eq!(authority.describe_call_count(), 1);
}
