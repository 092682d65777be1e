//! Bounded, round-indexed waiting
//!
//! Two variants share the same round semantics:
//!
//! - `IssuanceWait` is stepwise: one call per round, the external driver
//!   does the pacing and re-invokes with `round + 1`. Nothing blocks
//!   between rounds and the round lives in the event, not in memory.
//! - `BlockingPoller` does the waiting itself with a fixed sleep, bounded
//!   by the same kind of round ceiling. Used inside one invocation for DNS
//!   propagation and for validation options to appear.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::arn;
use crate::config::{IssuanceConfig, PollConfig};
use crate::event::RequestKind;
use crate::traits::{CertificateAuthorityFactory, CertificateStatus};
use crate::{Error, Result};

/// State of a stepwise wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitState {
    /// The wait was started and no round has run yet
    Started,
    /// Not there yet; re-invoke with the next round
    Waiting,
    /// The awaited condition holds
    Done,
    /// The wait ended unsuccessfully
    Failed {
        /// Why it failed
        reason: String,
    },
}

impl WaitState {
    /// Whether the driver must stop re-invoking (DONE or FAILED)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed { .. })
    }
}

/// Stepwise wait for certificate issuance
pub struct IssuanceWait {
    authorities: Arc<dyn CertificateAuthorityFactory>,
    max_rounds: u32,
}

impl IssuanceWait {
    /// Create a new issuance wait
    pub fn new(authorities: Arc<dyn CertificateAuthorityFactory>, config: &IssuanceConfig) -> Self {
        Self {
            authorities,
            max_rounds: config.max_rounds,
        }
    }

    /// Run one round
    ///
    /// Performs at most one describe call and never fails: every error is
    /// folded into `WaitState::Failed`. Running the same round twice gives
    /// the same answer for the same certificate status.
    pub async fn step(&self, kind: RequestKind, certificate_ref: &str, round: u32) -> WaitState {
        if kind == RequestKind::Delete {
            return WaitState::Done;
        }

        if round >= self.max_rounds {
            warn!(certificate = %certificate_ref, round, "Certificate did not stabilize in time");
            return WaitState::Failed {
                reason: format!("certificate {} did not stabilize in time", certificate_ref),
            };
        }

        let record = match self.describe(certificate_ref).await {
            Ok(record) => record,
            Err(e) => {
                warn!(certificate = %certificate_ref, round, error = %e, "Describe failed during issuance check");
                return WaitState::Failed {
                    reason: format!("exception during checking: {}", e),
                };
            }
        };

        debug!(certificate = %certificate_ref, round, status = %record.status, "Checked certificate status");
        match record.status {
            CertificateStatus::Issued => {
                info!(certificate = %certificate_ref, round, "Certificate issued");
                WaitState::Done
            }
            CertificateStatus::PendingValidation => WaitState::Waiting,
            other => WaitState::Failed {
                reason: format!(
                    "the certificate {} is in invalid status {}",
                    certificate_ref, other
                ),
            },
        }
    }

    async fn describe(&self, certificate_ref: &str) -> Result<crate::traits::CertificateRecord> {
        let authority = self.authorities.for_region(arn::region(certificate_ref))?;
        authority.describe_certificate(certificate_ref).await
    }
}

/// Blocking poll with a fixed sleep between probes
#[derive(Debug, Clone)]
pub struct BlockingPoller {
    max_rounds: u32,
    interval: Duration,
}

impl BlockingPoller {
    /// Create a poller with an explicit budget
    pub fn new(max_rounds: u32, interval: Duration) -> Self {
        Self {
            max_rounds,
            interval,
        }
    }

    /// Create a poller from configuration
    pub fn from_config(config: &PollConfig) -> Self {
        Self::new(config.max_rounds, config.interval())
    }

    /// Probe until it yields a value, at most `max_rounds` times
    ///
    /// The probe receives the zero-based round. `Ok(None)` means "not yet"
    /// and sleeps for one interval before the next round; `Err` ends the
    /// poll immediately.
    ///
    /// # Errors
    ///
    /// - `Error::Timeout` when every round answered "not yet"
    /// - Any error returned by the probe
    pub async fn run<T, F, Fut>(&self, what: &str, mut probe: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        for round in 0..self.max_rounds {
            if let Some(value) = probe(round).await? {
                return Ok(value);
            }
            debug!(what = %what, round, "Not ready yet");
            if round + 1 < self.max_rounds {
                tokio::time::sleep(self.interval).await;
            }
        }
        Err(Error::timeout(what, self.max_rounds))
    }
}
