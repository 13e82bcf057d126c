//! User-presence proofs.
//!
//! A [`PresenceProver`] stands between the controller and the platform
//! sensor (fingerprint reader, face unlock, lock-screen prompt). Callback
//! based sensor APIs are expressed as a single awaitable request that ends
//! in a [`PresenceOutcome`]. The pending request can be aborted through a
//! [`CancellationToken`].
//!
//! A granted request unlocks exactly one presence-gated key operation on
//! the requested alias.

mod scripted;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use scripted::{PresenceStep, ScriptedPresence};

/// Whether a biometric sensor can be used at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorCapability {
    /// A sensor is present on the device.
    pub hardware_detected: bool,
    /// At least one biometric is enrolled on it.
    pub enrolled: bool,
}

impl SensorCapability {
    /// Both detected and enrolled.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.hardware_detected && self.enrolled
    }
}

/// Which kind of presence proof to ask the user for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceKind {
    /// Fingerprint or other biometric.
    Biometric,
    /// PIN, pattern or passcode of the device lock screen.
    DeviceCredential,
}

/// A request for one presence proof bound to a key alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceRequest {
    /// Key the proof unlocks.
    pub alias: String,
    pub kind: PresenceKind,
}

impl PresenceRequest {
    /// Fingerprint (or other biometric) prompt for `alias`.
    pub fn biometric(alias: &str) -> Self {
        Self {
            alias: alias.to_string(),
            kind: PresenceKind::Biometric,
        }
    }

    /// Lock-screen credential prompt for `alias`.
    pub fn device_credential(alias: &str) -> Self {
        Self {
            alias: alias.to_string(),
            kind: PresenceKind::DeviceCredential,
        }
    }
}

/// Why the sensor refused a proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// The biometric was read but did not match. The user may try again.
    NotRecognized,
    /// Too many failed attempts; the sensor is locked.
    Lockout,
    /// The user did not respond in time.
    Timeout,
    /// The sensor failed or went away.
    HardwareUnavailable,
}

impl DenialReason {
    /// Whether the same channel may be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotRecognized)
    }
}

/// Result of a presence request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceOutcome {
    /// Presence proven; the key authority will honor one operation.
    Granted,
    Denied(DenialReason),
    /// Cancelled by the user or through the cancellation token.
    Cancelled,
}

/// Source of user-presence proofs.
#[async_trait]
pub trait PresenceProver: Send + Sync {
    /// Current biometric sensor capability.
    fn capability(&self) -> SensorCapability;

    /// Ask the user to prove presence for `request.alias`.
    ///
    /// Must resolve to [`PresenceOutcome::Cancelled`] promptly once `cancel`
    /// fires.
    async fn request(
        &self,
        request: &PresenceRequest,
        cancel: &CancellationToken,
    ) -> PresenceOutcome;
}
