//! Lifecycle engine
//!
//! The LifecycleEngine is responsible for:
//! - Gating at-least-once deliveries through the EventDeduplicator
//! - Dispatching Create / Update / Delete requests
//! - Starting the externally paced issuance wait
//! - Running one issuance-check round per driver invocation
//! - Converting every failure into a completion signal
//!
//! ## Architecture
//!
//! ```text
//!  notification bus                      workflow driver
//!        │                                      │ round N
//!        ▼                                      ▼
//! ┌───────────────────┐   start      ┌───────────────────┐
//! │ handle_notification│────────────▶│  check_issuance   │
//! └───────────────────┘              └───────────────────┘
//!        │                                      │
//!        ├── EventDeduplicator (ParameterStore) │
//!        ├── PropertyValidator (DnsZoneProvider)│
//!        ├── CertificateLifecycleManager ───────┤ (CertificateAuthority)
//!        ├── DnsRecordReconciler                │
//!        └── CompletionSink ◀───────────────────┘
//! ```
//!
//! ## Event Flow (Create)
//!
//! 1. Skip the delivery if its id is the stored marker
//! 2. Validate properties and resolve the hosted zone
//! 3. Request the certificate
//! 4. Wait for the validation options, publish the records, wait for sync
//! 5. Start the issuance wait; the driver calls `check_issuance` per round

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::arn;
use crate::certificate::CertificateLifecycleManager;
use crate::config::CertflowConfig;
use crate::dedup::EventDeduplicator;
use crate::error::{tolerate_not_found, Error, Result};
use crate::event::{CompletionStatus, LifecycleEvent, NotificationRecord, RequestKind};
use crate::reconciler::DnsRecordReconciler;
use crate::replacement::needs_replacement;
use crate::traits::{
    CertificateAuthorityFactory, CompletionSink, DnsZoneProvider, ParameterStore, StackInspector,
    StartOutcome, WorkflowDriver,
};
use crate::validation::{PropertyValidator, ResourceProperties};
use crate::wait::{BlockingPoller, IssuanceWait, WaitState};

/// Property key under which the started workflow receives the certificate
pub const CERTIFICATE_REF_PROPERTY: &str = "CertificateArn";

/// Events emitted by the LifecycleEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A re-delivered notification was skipped
    DeliverySkipped {
        scope: String,
        delivery_id: String,
    },

    /// A new certificate was requested
    CertificateRequested { certificate_ref: String },

    /// Validation (and CAA) records were published and are in sync
    RecordsPublished {
        certificate_ref: String,
        zone_id: String,
    },

    /// A record set group was removed
    RecordsRemoved {
        certificate_ref: String,
        zone_id: String,
    },

    /// An update requires a new certificate
    ReplacementStarted { old_certificate_ref: String },

    /// The issuance wait was handed to the workflow driver
    WorkflowStarted { name: String, outcome: StartOutcome },

    /// One issuance-check round ran
    IssuanceChecked { round: u32, state: WaitState },

    /// A completion signal was delivered
    CompletionSent {
        status: CompletionStatus,
        physical_resource_id: String,
    },
}

/// External collaborators of the engine
#[derive(Clone)]
pub struct Collaborators {
    /// Regional certificate authority endpoints
    pub authorities: Arc<dyn CertificateAuthorityFactory>,
    /// Authoritative DNS
    pub zones: Arc<dyn DnsZoneProvider>,
    /// Dedup marker storage
    pub parameters: Arc<dyn ParameterStore>,
    /// Completion callback delivery
    pub completions: Arc<dyn CompletionSink>,
    /// Stepwise driver for the issuance wait
    pub workflow: Arc<dyn WorkflowDriver>,
    /// Owning-stack lookups
    pub stacks: Arc<dyn StackInspector>,
}

/// Certificate lifecycle engine
///
/// One engine serves every invocation of a process. It holds no per-event
/// state: everything that must survive between invocations lives in the
/// event (round, physical id) or in the parameter store (dedup marker).
///
/// ## Threading
///
/// All external calls of one event run sequentially on the calling task.
pub struct LifecycleEngine {
    authorities: Arc<dyn CertificateAuthorityFactory>,
    completions: Arc<dyn CompletionSink>,
    workflow: Arc<dyn WorkflowDriver>,
    stacks: Arc<dyn StackInspector>,

    validator: PropertyValidator,
    dedup: EventDeduplicator,
    reconciler: DnsRecordReconciler,
    issuance: IssuanceWait,

    /// Budget of the blocking wait for validation options
    validation_poller: BlockingPoller,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl LifecycleEngine {
    /// Create a new lifecycle engine
    ///
    /// # Parameters
    ///
    /// - `collaborators`: External service handles
    /// - `config`: Engine configuration
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        collaborators: Collaborators,
        config: CertflowConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let engine = Self {
            validator: PropertyValidator::new(collaborators.zones.clone()),
            dedup: EventDeduplicator::new(collaborators.parameters.clone(), config.dedup.clone()),
            reconciler: DnsRecordReconciler::new(
                collaborators.zones.clone(),
                config.records.clone(),
                BlockingPoller::from_config(&config.propagation),
            ),
            issuance: IssuanceWait::new(collaborators.authorities.clone(), &config.issuance),
            validation_poller: BlockingPoller::from_config(&config.validation_options),
            authorities: collaborators.authorities,
            completions: collaborators.completions,
            workflow: collaborators.workflow,
            stacks: collaborators.stacks,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Process every record of a notification batch in order
    ///
    /// Stops at the first record whose failure could not be reported.
    pub async fn handle_batch(&self, records: &[NotificationRecord]) -> Result<()> {
        for record in records {
            self.handle_notification(record).await?;
        }
        Ok(())
    }

    /// Process one notification-bus record
    ///
    /// Any processing error is logged and reported as a failed completion.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The event was processed or its failure was reported
    /// - `Err(Error)`: The payload could not be decoded or the failure
    ///   completion could not be delivered
    pub async fn handle_notification(&self, record: &NotificationRecord) -> Result<()> {
        let mut event = record.decode()?;
        info!(
            request_type = %event.request_type,
            stack = %event.stack_id,
            logical_id = %event.logical_resource_id,
            delivery_id = %record.delivery_id,
            "Processing lifecycle event"
        );

        if let Err(e) = self.dispatch(&mut event).await {
            error!(
                request_type = %event.request_type,
                stack = %event.stack_id,
                logical_id = %event.logical_resource_id,
                physical_id = %event.physical_id_or_unknown(),
                error = %e,
                "Error while processing the event"
            );
            self.complete(&event, CompletionStatus::Failed, e.to_string())
                .await?;
        }
        Ok(())
    }

    /// Run one round of the issuance wait
    ///
    /// Sends the completion when the wait reaches DONE or FAILED and returns
    /// the event with `IsCertificateIssued` set and `Round` incremented.
    pub async fn check_issuance(&self, mut event: LifecycleEvent) -> Result<LifecycleEvent> {
        let round = event.round;
        let state = match event.kind() {
            Ok(kind) => {
                self.issuance
                    .step(kind, event.physical_id_or_unknown(), round)
                    .await
            }
            Err(e) => WaitState::Failed {
                reason: e.to_string(),
            },
        };

        match &state {
            WaitState::Done => self.complete(&event, CompletionStatus::Success, "").await?,
            WaitState::Failed { reason } => {
                self.complete(&event, CompletionStatus::Failed, reason.as_str())
                    .await?
            }
            WaitState::Started | WaitState::Waiting => {
                debug!(certificate = %event.physical_id_or_unknown(), round, "Certificate not issued yet")
            }
        }

        event.is_certificate_issued = Some(state.is_terminal());
        event.round = round.saturating_add(1);
        self.emit_event(EngineEvent::IssuanceChecked { round, state });
        Ok(event)
    }

    async fn dispatch(&self, event: &mut LifecycleEvent) -> Result<()> {
        match event.kind()? {
            RequestKind::Create => self.create(event, false).await,
            RequestKind::Update => self.update(event).await,
            RequestKind::Delete => self.delete(event).await,
        }
    }

    /// Create flow
    ///
    /// `replacing` is true when called from a replacing update. Its delivery
    /// was already accepted, and a failure keeps reporting the old physical id.
    async fn create(&self, event: &mut LifecycleEvent, replacing: bool) -> Result<()> {
        if !replacing && self.should_skip(event).await? {
            return Ok(());
        }
        let previous_physical_id = event.physical_resource_id.clone();

        let properties = self.validator.validate(&event.resource_properties).await?;
        let certificates = self.certificates_for(&properties)?;
        let certificate_ref = certificates.create(&properties).await?;
        self.emit_event(EngineEvent::CertificateRequested {
            certificate_ref: certificate_ref.clone(),
        });

        if let Err(e) = self
            .publish_and_start(event, &certificates, &properties, &certificate_ref)
            .await
        {
            // a failed Create hands the new certificate to the driver's
            // follow-up Delete; a failed Update rolls back to the old one
            event.physical_resource_id = if replacing {
                previous_physical_id
            } else {
                Some(certificate_ref)
            };
            return Err(e);
        }
        Ok(())
    }

    async fn publish_and_start(
        &self,
        event: &mut LifecycleEvent,
        certificates: &CertificateLifecycleManager,
        properties: &ResourceProperties,
        certificate_ref: &str,
    ) -> Result<()> {
        let record = certificates
            .describe_until_validation_ready(
                certificate_ref,
                properties.subject_alternative_names.len(),
            )
            .await?;

        info!(certificate = %certificate_ref, zone_id = %properties.hosted_zone_id, "Creating DNS records for the certificate");
        self.reconciler
            .create_record_set_group(
                &properties.hosted_zone_id,
                &record,
                properties.with_caa_records,
            )
            .await?;
        self.emit_event(EngineEvent::RecordsPublished {
            certificate_ref: certificate_ref.to_string(),
            zone_id: properties.hosted_zone_id.clone(),
        });

        self.start_issuance_wait(event, certificate_ref).await
    }

    async fn start_issuance_wait(
        &self,
        event: &mut LifecycleEvent,
        certificate_ref: &str,
    ) -> Result<()> {
        event.physical_resource_id = Some(certificate_ref.to_string());
        if let Some(properties) = event.resource_properties.as_object_mut() {
            properties.insert(
                CERTIFICATE_REF_PROPERTY.to_string(),
                certificate_ref.into(),
            );
        }

        let name = event
            .delivery_id
            .clone()
            .unwrap_or_else(|| event.request_id.clone());
        let input = serde_json::to_value(&*event)?;

        let outcome = self.workflow.start_execution(&name, &input).await?;
        match outcome {
            StartOutcome::Started => {
                info!(execution = %name, certificate = %certificate_ref, "Issuance wait started")
            }
            StartOutcome::AlreadyRunning => {
                warn!(execution = %name, "Issuance wait already running for this delivery")
            }
        }
        self.emit_event(EngineEvent::WorkflowStarted { name, outcome });
        Ok(())
    }

    /// Update flow
    async fn update(&self, event: &mut LifecycleEvent) -> Result<()> {
        if self.should_skip(event).await? {
            return Ok(());
        }

        let new = self.validator.validate(&event.resource_properties).await?;
        let old_raw = event
            .old_resource_properties
            .as_ref()
            .ok_or_else(|| Error::validation("update request without OldResourceProperties"))?;
        let old = self.validator.validate(old_raw).await?;
        let certificate_ref = event
            .physical_resource_id
            .clone()
            .ok_or_else(|| Error::validation("update request without PhysicalResourceId"))?;

        if needs_replacement(&event.stack_id, &old, &new) {
            info!(
                stack = %event.stack_id,
                logical_id = %event.logical_resource_id,
                certificate = %certificate_ref,
                "New certificate needed"
            );
            self.emit_event(EngineEvent::ReplacementStarted {
                old_certificate_ref: certificate_ref.clone(),
            });
            self.delete_record_set_group(&old, &certificate_ref).await?;
            return self.create(event, true).await;
        }

        let certificates = self.certificates_for(&new)?;
        certificates
            .update_tags(&certificate_ref, &old.tags, &new.tags)
            .await?;

        if old.with_caa_records != new.with_caa_records {
            let record = certificates
                .describe_until_validation_ready(
                    &certificate_ref,
                    new.subject_alternative_names.len(),
                )
                .await?;
            if new.with_caa_records {
                self.reconciler
                    .create_caa_records(&new.hosted_zone_id, &record)
                    .await?;
            } else {
                self.reconciler
                    .delete_caa_records(&new.hosted_zone_id, &record)
                    .await?;
            }
        }

        self.complete(event, CompletionStatus::Success, "").await
    }

    /// Delete flow
    async fn delete(&self, event: &LifecycleEvent) -> Result<()> {
        let certificate_ref = match event.physical_resource_id.as_deref() {
            Some(id) if arn::is_certificate_ref(id) => id.to_string(),
            other => {
                info!(physical_id = ?other, "No certificate was created, nothing to delete");
                return self.complete(event, CompletionStatus::Success, "").await;
            }
        };
        info!(certificate = %certificate_ref, "Deleting certificate");

        let properties = self.validator.validate(&event.resource_properties).await?;

        if self.is_being_replaced(event).await? {
            debug!(certificate = %certificate_ref, "Resource is being replaced, keeping DNS records and marker");
        } else {
            self.delete_record_set_group(&properties, &certificate_ref)
                .await?;
            let scope = self
                .dedup
                .parameter_name(&event.stack_id, &event.logical_resource_id);
            self.dedup.delete_marker(&scope).await?;
        }

        self.certificates_for(&properties)?
            .delete(&certificate_ref)
            .await?;
        self.complete(event, CompletionStatus::Success, "").await
    }

    /// Remove the records a certificate published, if it still exists
    async fn delete_record_set_group(
        &self,
        properties: &ResourceProperties,
        certificate_ref: &str,
    ) -> Result<()> {
        let certificates = self.certificates_for(properties)?;
        let described = certificates
            .describe_until_validation_ready(
                certificate_ref,
                properties.subject_alternative_names.len(),
            )
            .await;

        let Some(record) = tolerate_not_found(described)? else {
            debug!(certificate = %certificate_ref, "Certificate does not exist, no records to delete");
            return Ok(());
        };

        info!(certificate = %certificate_ref, zone_id = %properties.hosted_zone_id, "Deleting DNS records of the certificate");
        self.reconciler
            .delete_record_set_group(
                &properties.hosted_zone_id,
                &record,
                properties.with_caa_records,
            )
            .await?;
        self.emit_event(EngineEvent::RecordsRemoved {
            certificate_ref: certificate_ref.to_string(),
            zone_id: properties.hosted_zone_id.clone(),
        });
        Ok(())
    }

    async fn should_skip(&self, event: &LifecycleEvent) -> Result<bool> {
        let Some(delivery_id) = event.delivery_id.as_deref() else {
            debug!("Event carries no delivery id, dedup not applicable");
            return Ok(false);
        };
        let scope = self
            .dedup
            .parameter_name(&event.stack_id, &event.logical_resource_id);

        let skip = self.dedup.should_skip(&scope, delivery_id).await?;
        if skip {
            self.emit_event(EngineEvent::DeliverySkipped {
                scope,
                delivery_id: delivery_id.to_string(),
            });
        }
        Ok(skip)
    }

    /// Whether the stack already points at a different physical id
    async fn is_being_replaced(&self, event: &LifecycleEvent) -> Result<bool> {
        let current = self
            .stacks
            .current_physical_id(&event.stack_id, &event.logical_resource_id)
            .await?;
        Ok(match current {
            Some(current) => event.physical_resource_id.as_deref() != Some(current.as_str()),
            None => false,
        })
    }

    fn certificates_for(
        &self,
        properties: &ResourceProperties,
    ) -> Result<CertificateLifecycleManager> {
        CertificateLifecycleManager::for_properties(
            self.authorities.as_ref(),
            properties,
            self.validation_poller.clone(),
        )
    }

    /// Deliver the completion signal for `event`
    async fn complete(
        &self,
        event: &LifecycleEvent,
        status: CompletionStatus,
        reason: impl Into<String>,
    ) -> Result<()> {
        let response = event.completion(status, reason);
        self.completions.send(&event.response_url, &response).await?;
        info!(
            status = ?status,
            physical_id = %response.physical_resource_id,
            logical_id = %response.logical_resource_id,
            "Completion sent"
        );
        self.emit_event(EngineEvent::CompletionSent {
            status,
            physical_resource_id: response.physical_resource_id,
        });
        Ok(())
    }

    /// Emit an engine event
    ///
    /// A full channel drops the event with a warning; a closed channel
    /// means nobody is listening.
    fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.")
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
