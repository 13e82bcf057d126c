//! Test harness wiring a controller to software doubles.
//!
//! Everything runs in process: the software key authority, the scripted
//! presence prover and the in-memory backend share one simulated device.

use std::sync::Arc;

use argon2::{Algorithm, Argon2, Params, Version};
use paygate_auth::presence::PresenceStep;
use paygate_auth::{
    AttemptResult, AuthConfig, AuthController, Authorization, InMemoryBackend, ScriptedPresence,
    SimulatedDevice, SoftwareKeyAuthority,
};
use tokio_util::sync::CancellationToken;

pub const USER: &str = "alice";
pub const PASSWORD: &str = "correct horse battery staple";

/// One device plus one backend.
pub struct TestEnv {
    pub device: Arc<SimulatedDevice>,
    pub presence: Arc<ScriptedPresence>,
    pub keys: Arc<SoftwareKeyAuthority>,
    pub backend: Arc<InMemoryBackend>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_backend(Arc::new(fast_backend()))
    }

    /// A second device talking to an existing backend.
    pub fn with_backend(backend: Arc<InMemoryBackend>) -> Self {
        let device = Arc::new(SimulatedDevice::new());
        Self {
            presence: Arc::new(ScriptedPresence::new(Arc::clone(&device))),
            keys: Arc::new(SoftwareKeyAuthority::new(Arc::clone(&device))),
            backend,
            device,
        }
    }

    pub fn config() -> AuthConfig {
        AuthConfig {
            user_id: USER.to_string(),
            ..AuthConfig::default()
        }
    }

    pub fn controller(&self) -> AuthController {
        self.controller_with(Self::config())
    }

    pub fn controller_with(&self, config: AuthConfig) -> AuthController {
        AuthController::new(
            config,
            self.keys.clone(),
            self.presence.clone(),
            self.backend.clone(),
        )
    }

    /// A controller whose device is already enrolled with [`PASSWORD`].
    pub async fn enrolled_controller(&self) -> AuthController {
        let mut controller = self.controller();
        controller
            .enroll_device(PASSWORD)
            .await
            .expect("enrollment failed");
        controller
    }

    pub fn script(&self, steps: impl IntoIterator<Item = PresenceStep>) {
        for step in steps {
            self.presence.push(step);
        }
    }
}

/// Backend with cheap Argon2 parameters so tests stay fast.
pub fn fast_backend() -> InMemoryBackend {
    let params = Params::new(8, 1, 1, None).expect("valid argon2 params");
    InMemoryBackend::new().with_password_hasher(Argon2::new(
        Algorithm::Argon2id,
        Version::V0x13,
        params,
    ))
}

pub fn token() -> CancellationToken {
    CancellationToken::new()
}

/// Unwrap an accepted result.
#[track_caller]
pub fn expect_accepted(result: AttemptResult) -> Authorization {
    match result {
        AttemptResult::Accepted(authorization) => authorization,
        other => panic!("expected acceptance, got {other:?}"),
    }
}
