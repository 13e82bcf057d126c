//! CLI commands.
//!
//! Every command builds a fresh simulation: one device (software key
//! authority + scripted sensor) and one in-memory backend, enrolled with the
//! configured user before the command runs.

mod purchase;
mod recency;
mod replay;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::ValueEnum;
use paygate_auth::presence::{DenialReason, PresenceStep};
use paygate_auth::{
    AuthConfig, AuthController, Fingerprint, InMemoryBackend, ScriptedPresence, SimulatedDevice,
    SoftwareKeyAuthority,
};

pub use purchase::{purchase, PurchaseOptions};
pub use recency::recency;
pub use replay::replay;

/// A scripted sensor response.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PresenceArg {
    Grant,
    NotRecognized,
    Lockout,
    Timeout,
    Unavailable,
    /// Never answer (combine with --cancel-after)
    Hang,
}

impl From<PresenceArg> for PresenceStep {
    fn from(arg: PresenceArg) -> Self {
        match arg {
            PresenceArg::Grant => PresenceStep::grant(),
            PresenceArg::NotRecognized => PresenceStep::deny(DenialReason::NotRecognized),
            PresenceArg::Lockout => PresenceStep::deny(DenialReason::Lockout),
            PresenceArg::Timeout => PresenceStep::deny(DenialReason::Timeout),
            PresenceArg::Unavailable => PresenceStep::deny(DenialReason::HardwareUnavailable),
            PresenceArg::Hang => PresenceStep::Hang,
        }
    }
}

/// One simulated phone talking to one in-process backend.
pub(crate) struct Simulation {
    pub device: Arc<SimulatedDevice>,
    pub presence: Arc<ScriptedPresence>,
    pub backend: Arc<InMemoryBackend>,
    pub controller: AuthController,
    pub fingerprint: Fingerprint,
}

impl Simulation {
    /// Build the simulation and enroll the device with `password`.
    pub async fn enrolled(config: AuthConfig, password: &str) -> Result<Self> {
        let device = Arc::new(SimulatedDevice::new());
        let presence = Arc::new(ScriptedPresence::new(Arc::clone(&device)));
        let keys = Arc::new(SoftwareKeyAuthority::new(Arc::clone(&device)));
        let backend = Arc::new(InMemoryBackend::new());

        let mut controller = AuthController::new(
            config,
            keys,
            presence.clone(),
            backend.clone(),
        );
        let fingerprint = controller
            .enroll_device(password)
            .await
            .context("Device enrollment failed")?;

        Ok(Self {
            device,
            presence,
            backend,
            controller,
            fingerprint,
        })
    }

    pub fn script(&self, steps: &[PresenceArg]) {
        for step in steps {
            self.presence.push((*step).into());
        }
    }
}
