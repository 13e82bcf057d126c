//! Scripted presence prover for tests and demos.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{
    DenialReason, PresenceKind, PresenceOutcome, PresenceProver, PresenceRequest,
    SensorCapability,
};
use crate::keystore::SimulatedDevice;

/// One scripted user reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceStep {
    /// Answer with `outcome` after waiting `after`.
    Respond {
        outcome: PresenceOutcome,
        after: Duration,
    },
    /// Never answer; only cancellation ends the request.
    Hang,
}

impl PresenceStep {
    /// Immediate grant.
    pub fn grant() -> Self {
        Self::Respond {
            outcome: PresenceOutcome::Granted,
            after: Duration::ZERO,
        }
    }

    /// Immediate denial for `reason`.
    pub fn deny(reason: DenialReason) -> Self {
        Self::Respond {
            outcome: PresenceOutcome::Denied(reason),
            after: Duration::ZERO,
        }
    }
}

/// A [`PresenceProver`] that replays queued steps against a
/// [`SimulatedDevice`].
///
/// A granted step records a device unlock and grants one operation on the
/// requested alias. When the queue is empty every request is granted.
pub struct ScriptedPresence {
    device: Arc<SimulatedDevice>,
    steps: Mutex<VecDeque<PresenceStep>>,
}

impl ScriptedPresence {
    /// An empty script: every request is granted on `device`.
    pub fn new(device: Arc<SimulatedDevice>) -> Self {
        Self {
            device,
            steps: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue the reaction to the next unanswered request.
    pub fn push(&self, step: PresenceStep) {
        self.lock().push_back(step);
    }

    /// Number of steps not yet consumed.
    pub fn remaining(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<PresenceStep>> {
        self.steps.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_step(&self) -> PresenceStep {
        self.lock().pop_front().unwrap_or_else(PresenceStep::grant)
    }
}

#[async_trait]
impl PresenceProver for ScriptedPresence {
    fn capability(&self) -> SensorCapability {
        self.device.sensor()
    }

    async fn request(
        &self,
        request: &PresenceRequest,
        cancel: &CancellationToken,
    ) -> PresenceOutcome {
        if request.kind == PresenceKind::Biometric && !self.capability().is_available() {
            return PresenceOutcome::Denied(DenialReason::HardwareUnavailable);
        }

        let outcome = match self.next_step() {
            PresenceStep::Respond { outcome, after } => {
                tokio::select! {
                    _ = cancel.cancelled() => PresenceOutcome::Cancelled,
                    _ = tokio::time::sleep(after) => outcome,
                }
            }
            PresenceStep::Hang => {
                cancel.cancelled().await;
                PresenceOutcome::Cancelled
            }
        };

        if outcome == PresenceOutcome::Granted {
            self.device.record_unlock();
            self.device.grant_presence(&request.alias);
        }
        outcome
    }
}
