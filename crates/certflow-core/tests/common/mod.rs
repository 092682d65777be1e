//! Test doubles and common utilities for the lifecycle contract tests
//!
//! The fakes keep just enough state to behave like the real services at the
//! boundary (records that exist or not, certificates that are pending or
//! issued) and count every call so tests can assert on side effects.

#![allow(dead_code)]

use certflow_core::config::CertflowConfig;
use certflow_core::error::{Error, Result};
use certflow_core::event::{CompletionResponse, LifecycleEvent, NotificationRecord};
use certflow_core::state::MemoryParameterStore;
use certflow_core::traits::{
    CertificateAuthority, CertificateAuthorityFactory, CertificateRecord, CertificateRequest,
    CertificateStatus, ChallengeRecord, ChangeAction, ChangeInfo, ChangeStatus, CompletionSink,
    DnsChange, DnsZoneProvider, HostedZone, StackInspector, StartOutcome, Tag, ValidationOption,
    WorkflowDriver,
};
use certflow_core::{Collaborators, EngineEvent, LifecycleEngine, Removal};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub const STACK_ID: &str =
    "arn:aws:cloudformation:eu-west-1:999999999999:stack/test-stack/00000000-0000-0000-0000-000000000000";
pub const LOGICAL_ID: &str = "TestResource";
pub const RESPONSE_URL: &str = "https://callback.example/presigned?X-Amz-Signature=secret";
pub const ZONE_ID: &str = "Z1";
pub const ZONE_NAME: &str = "example.com.";
pub const MARKER: &str = "/certflow/DnsCertificateSnsMessageId/test-stack/00000000-0000-0000-0000-000000000000/TestResource";

// ---------------------------------------------------------------------------
// Certificate authority
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FakeCertificate {
    pub domains: Vec<String>,
    pub status: CertificateStatus,
    pub tags: Vec<Tag>,
    pub describes: usize,
}

#[derive(Debug, Default)]
struct AuthorityState {
    next_id: usize,
    certificates: HashMap<String, FakeCertificate>,
    /// Describe calls per certificate before validation options are complete
    options_after: usize,
    /// Error message returned by every describe call
    describe_error: Option<String>,
}

/// Fake certificate authority that doubles as its own regional factory
#[derive(Clone, Default)]
pub struct FakeAuthority {
    state: Arc<Mutex<AuthorityState>>,
    calls: Arc<Mutex<Vec<String>>>,
    regions: Arc<Mutex<Vec<Option<String>>>>,
    describe_call_count: Arc<AtomicUsize>,
}

impl FakeAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validation options appear only after `describes` incomplete answers
    pub fn options_after(&self, describes: usize) {
        self.state.lock().unwrap().options_after = describes;
    }

    pub fn fail_describe(&self, message: &str) {
        self.state.lock().unwrap().describe_error = Some(message.to_string());
    }

    /// Seed an existing certificate
    pub fn insert(&self, certificate_ref: &str, domains: &[&str], status: CertificateStatus, tags: Vec<Tag>) {
        self.state.lock().unwrap().certificates.insert(
            certificate_ref.to_string(),
            FakeCertificate {
                domains: domains.iter().map(|d| d.to_string()).collect(),
                status,
                tags,
                describes: 0,
            },
        );
    }

    pub fn set_status(&self, certificate_ref: &str, status: CertificateStatus) {
        if let Some(cert) = self.state.lock().unwrap().certificates.get_mut(certificate_ref) {
            cert.status = status;
        }
    }

    pub fn certificate(&self, certificate_ref: &str) -> Option<FakeCertificate> {
        self.state.lock().unwrap().certificates.get(certificate_ref).cloned()
    }

    pub fn certificate_refs(&self) -> Vec<String> {
        self.state.lock().unwrap().certificates.keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn describe_call_count(&self) -> usize {
        self.describe_call_count.load(Ordering::SeqCst)
    }

    pub fn regions(&self) -> Vec<Option<String>> {
        self.regions.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

/// Challenge record the fake publishes for a domain
pub fn challenge_for(domain: &str) -> ChallengeRecord {
    ChallengeRecord {
        name: format!("_x.{}.", domain),
        record_type: "CNAME".to_string(),
        value: format!("_y.{}.acm-validations.aws.", domain),
    }
}

#[async_trait::async_trait]
impl CertificateAuthority for FakeAuthority {
    async fn request_certificate(&self, request: &CertificateRequest) -> Result<String> {
        self.record(format!("request {}", request.domain_name));
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let certificate_ref = format!(
            "arn:aws:acm:eu-west-1:999999999999:certificate/cert-{}",
            state.next_id
        );
        let mut domains = vec![request.domain_name.clone()];
        domains.extend(request.subject_alternative_names.iter().cloned());
        state.certificates.insert(
            certificate_ref.clone(),
            FakeCertificate {
                domains,
                status: CertificateStatus::PendingValidation,
                tags: Vec::new(),
                describes: 0,
            },
        );
        Ok(certificate_ref)
    }

    async fn describe_certificate(&self, certificate_ref: &str) -> Result<CertificateRecord> {
        self.describe_call_count.fetch_add(1, Ordering::SeqCst);
        self.record(format!("describe {}", certificate_ref));
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.describe_error {
            return Err(Error::external(format!("describe certificate {}", certificate_ref), message));
        }
        let options_after = state.options_after;
        let cert = state
            .certificates
            .get_mut(certificate_ref)
            .ok_or_else(|| Error::not_found(format!("certificate {}", certificate_ref)))?;
        cert.describes += 1;

        let validation_options = if cert.describes > options_after {
            cert.domains
                .iter()
                .map(|domain| ValidationOption {
                    domain_name: domain.clone(),
                    challenge: Some(challenge_for(domain)),
                })
                .collect()
        } else {
            vec![ValidationOption {
                domain_name: cert.domains[0].clone(),
                challenge: None,
            }]
        };

        Ok(CertificateRecord {
            certificate_ref: certificate_ref.to_string(),
            status: cert.status.clone(),
            validation_options,
        })
    }

    async fn list_tags(&self, certificate_ref: &str) -> Result<Vec<Tag>> {
        self.record(format!("list_tags {}", certificate_ref));
        let state = self.state.lock().unwrap();
        Ok(state
            .certificates
            .get(certificate_ref)
            .map(|c| c.tags.clone())
            .unwrap_or_default())
    }

    async fn add_tags(&self, certificate_ref: &str, tags: &[Tag]) -> Result<()> {
        self.record(format!("add_tags {} {}", certificate_ref, tags.len()));
        if let Some(cert) = self.state.lock().unwrap().certificates.get_mut(certificate_ref) {
            cert.tags.extend(tags.iter().cloned());
        }
        Ok(())
    }

    async fn remove_tags(&self, certificate_ref: &str, tags: &[Tag]) -> Result<()> {
        self.record(format!("remove_tags {} {}", certificate_ref, tags.len()));
        if let Some(cert) = self.state.lock().unwrap().certificates.get_mut(certificate_ref) {
            cert.tags.retain(|t| !tags.contains(t));
        }
        Ok(())
    }

    async fn delete_certificate(&self, certificate_ref: &str) -> Result<Removal> {
        self.record(format!("delete {}", certificate_ref));
        Ok(
            match self.state.lock().unwrap().certificates.remove(certificate_ref) {
                Some(_) => Removal::Removed,
                None => Removal::AlreadyAbsent,
            },
        )
    }

    fn authority_name(&self) -> &'static str {
        "fake-acm"
    }
}

impl CertificateAuthorityFactory for FakeAuthority {
    fn for_region(&self, region: Option<&str>) -> Result<Box<dyn CertificateAuthority>> {
        self.regions.lock().unwrap().push(region.map(str::to_string));
        Ok(Box::new(self.clone()))
    }
}

// ---------------------------------------------------------------------------
// DNS zone provider
// ---------------------------------------------------------------------------

pub type RecordKey = (String, String, String);

#[derive(Debug, Default)]
struct ZoneState {
    records: HashSet<RecordKey>,
    batches: Vec<Vec<DnsChange>>,
    /// get_change answers PENDING this many times per change
    pending_polls: usize,
    polls: HashMap<String, usize>,
    /// Record names whose deletion fails with a non-tolerable error
    poisoned: HashSet<String>,
    zone_lookups: usize,
}

/// Fake authoritative DNS with one zone, `example.com.` (`Z1`)
#[derive(Clone, Default)]
pub struct FakeZones {
    state: Arc<Mutex<ZoneState>>,
    submit_call_count: Arc<AtomicUsize>,
    get_change_call_count: Arc<AtomicUsize>,
}

impl FakeZones {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_polls(&self, polls: usize) {
        self.state.lock().unwrap().pending_polls = polls;
    }

    pub fn poison(&self, record_name: &str) {
        self.state.lock().unwrap().poisoned.insert(record_name.to_string());
    }

    pub fn seed(&self, change: &DnsChange) {
        self.state.lock().unwrap().records.insert(key(change));
    }

    pub fn records(&self) -> HashSet<RecordKey> {
        self.state.lock().unwrap().records.clone()
    }

    pub fn record_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.records().into_iter().map(|(_, t, _)| t).collect();
        types.sort();
        types
    }

    pub fn batches(&self) -> Vec<Vec<DnsChange>> {
        self.state.lock().unwrap().batches.clone()
    }

    pub fn submit_call_count(&self) -> usize {
        self.submit_call_count.load(Ordering::SeqCst)
    }

    pub fn get_change_call_count(&self) -> usize {
        self.get_change_call_count.load(Ordering::SeqCst)
    }

    pub fn zone_lookups(&self) -> usize {
        self.state.lock().unwrap().zone_lookups
    }
}

fn key(change: &DnsChange) -> RecordKey {
    (change.name.clone(), change.record_type.clone(), change.value.clone())
}

#[async_trait::async_trait]
impl DnsZoneProvider for FakeZones {
    async fn zone_by_name(&self, name: &str) -> Result<HostedZone> {
        self.state.lock().unwrap().zone_lookups += 1;
        if name.trim_end_matches('.') == ZONE_NAME.trim_end_matches('.') {
            Ok(HostedZone {
                id: ZONE_ID.to_string(),
                name: ZONE_NAME.to_string(),
            })
        } else {
            Err(Error::not_found(format!("hosted zone {}", name)))
        }
    }

    async fn zone_by_id(&self, id: &str) -> Result<HostedZone> {
        self.state.lock().unwrap().zone_lookups += 1;
        if id == ZONE_ID || id == "Z2" {
            Ok(HostedZone {
                id: id.to_string(),
                name: ZONE_NAME.to_string(),
            })
        } else {
            Err(Error::not_found(format!("hosted zone {}", id)))
        }
    }

    async fn submit_changes(
        &self,
        _zone_id: &str,
        changes: &[DnsChange],
        _comment: &str,
    ) -> Result<ChangeInfo> {
        let id = self.submit_call_count.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.lock().unwrap();
        state.batches.push(changes.to_vec());

        for change in changes {
            let exists = state.records.contains(&key(change));
            match change.action {
                ChangeAction::Delete if state.poisoned.contains(&change.name) => {
                    return Err(Error::external("submit changes", "AccessDenied"));
                }
                ChangeAction::Delete if !exists => {
                    let message = format!(
                        "[Tried to delete resource record set [name='{}', type='{}'] but it was not found]",
                        change.name, change.record_type
                    );
                    return Err(if changes.len() == 1 {
                        Error::not_found(message)
                    } else {
                        Error::batch_rejected(message)
                    });
                }
                ChangeAction::Create if exists => {
                    return Err(Error::batch_rejected(format!(
                        "[Tried to create resource record set [name='{}'] but it already exists]",
                        change.name
                    )));
                }
                _ => {}
            }
        }

        for change in changes {
            match change.action {
                ChangeAction::Delete => {
                    state.records.remove(&key(change));
                }
                ChangeAction::Create | ChangeAction::Upsert => {
                    state.records.insert(key(change));
                }
            }
        }

        let status = if state.pending_polls == 0 {
            ChangeStatus::InSync
        } else {
            ChangeStatus::Pending
        };
        Ok(ChangeInfo {
            id: format!("C{}", id),
            status,
        })
    }

    async fn get_change(&self, change_id: &str) -> Result<ChangeInfo> {
        self.get_change_call_count.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let pending_polls = state.pending_polls;
        let polls = state.polls.entry(change_id.to_string()).or_insert(0);
        *polls += 1;
        let status = if *polls >= pending_polls {
            ChangeStatus::InSync
        } else {
            ChangeStatus::Pending
        };
        Ok(ChangeInfo {
            id: change_id.to_string(),
            status,
        })
    }

    fn provider_name(&self) -> &'static str {
        "fake-dns"
    }
}

// ---------------------------------------------------------------------------
// Orchestration collaborators
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct RecordingSink {
    sent: Arc<Mutex<Vec<(String, CompletionResponse)>>>,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<CompletionResponse> {
        self.sent.lock().unwrap().iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn urls(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(u, _)| u.clone()).collect()
    }
}

#[async_trait::async_trait]
impl CompletionSink for RecordingSink {
    async fn send(&self, url: &str, response: &CompletionResponse) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((url.to_string(), response.clone()));
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingWorkflow {
    started: Arc<Mutex<Vec<(String, Value)>>>,
}

impl RecordingWorkflow {
    pub fn started(&self) -> Vec<(String, Value)> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl WorkflowDriver for RecordingWorkflow {
    async fn start_execution(&self, name: &str, input: &Value) -> Result<StartOutcome> {
        let mut started = self.started.lock().unwrap();
        if started.iter().any(|(n, _)| n == name) {
            return Ok(StartOutcome::AlreadyRunning);
        }
        started.push((name.to_string(), input.clone()));
        Ok(StartOutcome::Started)
    }
}

/// Stack inspector answering with a fixed physical id
#[derive(Clone, Default)]
pub struct FixedStack {
    current: Arc<Mutex<Option<String>>>,
}

impl FixedStack {
    pub fn set_current(&self, physical_id: &str) {
        *self.current.lock().unwrap() = Some(physical_id.to_string());
    }
}

#[async_trait::async_trait]
impl StackInspector for FixedStack {
    async fn current_physical_id(&self, _stack_id: &str, _logical_id: &str) -> Result<Option<String>> {
        Ok(self.current.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Configuration with zero poll intervals so blocking waits do not sleep
pub fn fast_config() -> CertflowConfig {
    let mut config = CertflowConfig::new();
    config.propagation.poll_interval_secs = 0;
    config.validation_options.poll_interval_secs = 0;
    config
}

/// Engine wired to fakes, with handles to every fake
pub struct Harness {
    pub engine: LifecycleEngine,
    pub events: mpsc::Receiver<EngineEvent>,
    pub authority: FakeAuthority,
    pub zones: FakeZones,
    pub parameters: MemoryParameterStore,
    pub sink: RecordingSink,
    pub workflow: RecordingWorkflow,
    pub stack: FixedStack,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(fast_config())
    }

    pub fn with_config(config: CertflowConfig) -> Self {
        let authority = FakeAuthority::new();
        let zones = FakeZones::new();
        let parameters = MemoryParameterStore::new();
        let sink = RecordingSink::default();
        let workflow = RecordingWorkflow::default();
        let stack = FixedStack::default();

        let (engine, events) = LifecycleEngine::new(
            Collaborators {
                authorities: Arc::new(authority.clone()),
                zones: Arc::new(zones.clone()),
                parameters: Arc::new(parameters.clone()),
                completions: Arc::new(sink.clone()),
                workflow: Arc::new(workflow.clone()),
                stacks: Arc::new(stack.clone()),
            },
            config,
        )
        .expect("engine construction succeeds");

        Self {
            engine,
            events,
            authority,
            zones,
            parameters,
            sink,
            workflow,
            stack,
        }
    }

    /// Drain every engine event emitted so far
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

pub fn properties(domain: &str, sans: &[&str]) -> Value {
    json!({
        "ServiceToken": "arn:aws:sns:eu-west-1:999999999999:certflow",
        "DomainName": domain,
        "SubjectAlternativeNames": sans,
        "HostedZoneName": ZONE_NAME,
        "Tags": [{"Key": "team", "Value": "edge"}]
    })
}

pub fn event(request_type: &str, properties: Value) -> Value {
    json!({
        "RequestType": request_type,
        "StackId": STACK_ID,
        "LogicalResourceId": LOGICAL_ID,
        "ResourceProperties": properties,
        "ResponseURL": RESPONSE_URL,
        "RequestId": "req-1",
        "ResourceType": "Custom::DnsCertificate"
    })
}

pub fn notification(delivery_id: &str, event: &Value) -> NotificationRecord {
    NotificationRecord {
        delivery_id: delivery_id.to_string(),
        message: event.to_string(),
    }
}

pub fn lifecycle_event(event: Value) -> LifecycleEvent {
    serde_json::from_value(event).expect("valid lifecycle event")
}
