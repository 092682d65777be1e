// # certflow-core
//
// Core library for the DNS-validated certificate lifecycle orchestrator.
//
// ## Architecture Overview
//
// - **PropertyValidator**: Validates properties, resolves the hosted zone
// - **EventDeduplicator**: Suppresses re-delivered notifications
// - **CertificateLifecycleManager**: Requests, describes, tags, deletes certificates
// - **DnsRecordReconciler**: Publishes and removes validation/CAA records
// - **IssuanceWait / BlockingPoller**: Bounded, round-indexed waiting
// - **needs_replacement**: Replace-or-update decision on property changes
// - **LifecycleEngine**: Wires the above into the Create/Update/Delete flows
//
// ## Design Principles
//
// 1. **Injected collaborators**: Every external service is a trait object
//    handed in at construction; no process-wide clients
// 2. **Serializable continuation**: The issuance wait keeps its round in the
//    event, so any process can run the next round
// 3. **Idempotent teardown**: "Already gone" is an outcome, not an error
// 4. **Library-First**: The daemon is a thin adapter over this crate

pub mod arn;
pub mod certificate;
pub mod config;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod event;
pub mod reconciler;
pub mod replacement;
pub mod state;
pub mod traits;
pub mod validation;
pub mod wait;

// Re-export core types for convenience
pub use certificate::CertificateLifecycleManager;
pub use config::CertflowConfig;
pub use dedup::EventDeduplicator;
pub use engine::{Collaborators, EngineEvent, LifecycleEngine};
pub use error::{Error, Removal, Result};
pub use event::{CompletionResponse, CompletionStatus, LifecycleEvent, NotificationRecord, RequestKind};
pub use reconciler::{DnsRecordReconciler, GenerationSpec};
pub use replacement::needs_replacement;
pub use state::{FileParameterStore, MemoryParameterStore};
pub use traits::{
    CertificateAuthority, CertificateAuthorityFactory, CompletionSink, DnsZoneProvider,
    ParameterStore, StackInspector, StartOutcome, WorkflowDriver,
};
pub use validation::{PropertyValidator, ResourceProperties};
pub use wait::{BlockingPoller, IssuanceWait, WaitState};
