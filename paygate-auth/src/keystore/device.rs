//! Simulated device security state.
//!
//! Stands in for the parts of a phone the key store and the presence sensor
//! share: the device credential (lock screen / enrolled biometrics), the
//! time of the last unlock, and per-key presence grants. Both
//! [`SoftwareKeyAuthority`](super::SoftwareKeyAuthority) and
//! [`ScriptedPresence`](crate::presence::ScriptedPresence) hold the same
//! `Arc<SimulatedDevice>`.
//!
//! **NOT SUITABLE FOR PRODUCTION USE.** Nothing here is hardware-protected.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::presence::SensorCapability;

#[derive(Debug)]
struct DeviceState {
    secure: bool,
    keystore_available: bool,
    sensor: SensorCapability,
    /// Bumped whenever the device credential changes. Keys remember the
    /// epoch they were created in.
    credential_epoch: u64,
    last_unlock: Option<Instant>,
    /// Aliases holding a single-use presence grant.
    grants: HashSet<String>,
}

/// Shared, mutable device security state for the software key authority.
#[derive(Debug)]
pub struct SimulatedDevice {
    state: Mutex<DeviceState>,
}

impl SimulatedDevice {
    /// A secure device with an enrolled biometric sensor and a working key store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DeviceState {
                secure: true,
                keystore_available: true,
                sensor: SensorCapability {
                    hardware_detected: true,
                    enrolled: true,
                },
                credential_epoch: 0,
                last_unlock: None,
                grants: HashSet::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set whether a secure lock screen is configured.
    pub fn set_secure(&self, secure: bool) {
        self.lock().secure = secure;
    }

    /// Simulate the key store becoming (un)available.
    pub fn set_keystore_available(&self, available: bool) {
        self.lock().keystore_available = available;
    }

    /// Replace the biometric sensor state.
    pub fn set_sensor(&self, sensor: SensorCapability) {
        self.lock().sensor = sensor;
    }

    /// Simulate the device credential being reset, removed, or a new
    /// biometric being enrolled.
    ///
    /// Every presence-bound key created before this call becomes
    /// permanently invalid. Outstanding grants and the unlock record are
    /// discarded.
    pub fn reset_credential(&self) {
        let mut state = self.lock();
        state.credential_epoch += 1;
        state.grants.clear();
        state.last_unlock = None;
    }

    /// Record a device unlock now.
    pub fn record_unlock(&self) {
        self.record_unlock_at(Instant::now());
    }

    /// Record a device unlock at a specific instant.
    pub fn record_unlock_at(&self, at: Instant) {
        self.lock().last_unlock = Some(at);
    }

    /// Grant one presence-gated operation on `alias`.
    pub fn grant_presence(&self, alias: &str) {
        self.lock().grants.insert(alias.to_string());
    }

    pub(crate) fn sensor(&self) -> SensorCapability {
        self.lock().sensor
    }

    pub(crate) fn is_secure(&self) -> bool {
        self.lock().secure
    }

    pub(crate) fn keystore_available(&self) -> bool {
        self.lock().keystore_available
    }

    pub(crate) fn credential_epoch(&self) -> u64 {
        self.lock().credential_epoch
    }

    /// Consume the presence grant for `alias`, if any.
    pub(crate) fn take_grant(&self, alias: &str) -> bool {
        self.lock().grants.remove(alias)
    }

    pub(crate) fn clear_grant(&self, alias: &str) {
        self.lock().grants.remove(alias);
    }

    /// Whether the last unlock happened within `window` of now.
    pub(crate) fn unlocked_within(&self, window: Duration) -> bool {
        self.lock()
            .last_unlock
            .is_some_and(|at| at.elapsed() <= window)
    }
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_is_single_use() {
        let device = SimulatedDevice::new();
        device.grant_presence("k");

        assert!(device.take_grant("k"));
        assert!(!device.take_grant("k"));
    }

    #[test]
    fn test_grant_is_per_alias() {
        let device = SimulatedDevice::new();
        device.grant_presence("a");

        assert!(!device.take_grant("b"));
        assert!(device.take_grant("a"));
    }

    #[test]
    fn test_reset_clears_grants_and_unlock() {
        let device = SimulatedDevice::new();
        device.grant_presence("k");
        device.record_unlock();

        device.reset_credential();

        assert_eq!(device.credential_epoch(), 1);
        assert!(!device.take_grant("k"));
        assert!(!device.unlocked_within(Duration::from_secs(60)));
    }

    #[test]
    fn test_unlock_window() {
        let device = SimulatedDevice::new();
        assert!(!device.unlocked_within(Duration::from_secs(5)));

        device.record_unlock();
        assert!(device.unlocked_within(Duration::from_secs(5)));

        let six_seconds_ago = Instant::now().checked_sub(Duration::from_secs(6)).unwrap();
        device.record_unlock_at(six_seconds_ago);
        assert!(!device.unlocked_within(Duration::from_secs(5)));
    }
}
