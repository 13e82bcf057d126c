//! Authentication controller.
//!
//! Chooses the proof channel for each purchase and cascades failures:
//!
//! ```text
//!            lockout / timeout / hardware error / user choice
//! Biometric ─────────────────────────────────────────────► PasswordFallback
//!     │                                                          │
//!     │ KeyInvalidated (from any stage)                          │
//!     ▼                                                          │
//! ReEnrollPrompt ── password ok + opt-in: new key enrolled ──► Biometric
//!                └─ password ok, no opt-in ───────────────────► PasswordFallback
//! ```
//!
//! Each attempt builds a fresh [`Transaction`] and ends in one
//! [`AttemptResult`]. Rejections are never retried automatically. The only
//! automatic retry is a single re-run of the presence proof after the key
//! authority reports `NotAuthenticated`.

mod error;
mod stage;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::backend::VerificationBackend;
use crate::config::AuthConfig;
use crate::identity::{Fingerprint, Signature};
use crate::keystore::{KeyAuthority, KeyError, KeyMode};
use crate::presence::{DenialReason, PresenceOutcome, PresenceProver, PresenceRequest};
use crate::transaction::Transaction;

pub use error::SessionError;
pub use stage::{AuthStage, Disposition};

/// The proof that authorized a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Proof {
    /// Device signature, verified by the backend.
    Signature(Signature),
    /// Password, verified by the backend.
    Password,
    /// Symmetric operation inside the recency window, authorized on the
    /// device. `sealed` is the encrypted canonical transaction.
    Recency { sealed: Vec<u8> },
}

/// An accepted transaction and how it was proven.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    /// The transaction the backend (or the device, for recency) accepted.
    pub transaction: Transaction,
    /// How it was proven.
    pub proof: Proof,
}

/// How one attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult {
    /// The purchase is authorized.
    Accepted(Authorization),
    /// The proof was checked and refused. Which check failed is not
    /// disclosed.
    Rejected,
    /// The user or the caller cancelled the presence prompt.
    Cancelled,
    /// Presence was not recognized; the same channel may be tried again.
    TryAgain,
    /// The controller moved to [`AuthStage::PasswordFallback`].
    FellBack(Option<DenialReason>),
    /// The controller moved to [`AuthStage::ReEnrollPrompt`].
    ReEnrollRequired,
}

/// Result of gating a key operation behind presence.
enum Gate<T> {
    Ready(T),
    Done(AttemptResult),
}

/// Drives purchase authentication for the single principal of a device
/// session.
///
/// One attempt at a time: every action takes `&mut self`.
pub struct AuthController {
    config: AuthConfig,
    keys: Arc<dyn KeyAuthority>,
    presence: Arc<dyn PresenceProver>,
    backend: Arc<dyn VerificationBackend>,
    stage: AuthStage,
}

impl AuthController {
    /// Wire a controller to its key authority, presence prover and backend.
    ///
    /// Starts in [`AuthStage::Biometric`] when the sensor is usable and
    /// `config.prefer_biometric` is set, otherwise in
    /// [`AuthStage::PasswordFallback`]. Does not enroll the device.
    pub fn new(
        config: AuthConfig,
        keys: Arc<dyn KeyAuthority>,
        presence: Arc<dyn PresenceProver>,
        backend: Arc<dyn VerificationBackend>,
    ) -> Self {
        let mut controller = Self {
            config,
            keys,
            presence,
            backend,
            stage: AuthStage::PasswordFallback,
        };
        controller.stage = controller.preferred_stage();
        tracing::debug!(stage = ?controller.stage, "controller ready");
        controller
    }

    /// The proof channel currently offered.
    #[must_use]
    pub fn stage(&self) -> AuthStage {
        self.stage
    }

    /// Configuration this controller was built with.
    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Biometric when the sensor is usable and the user wants it.
    fn preferred_stage(&self) -> AuthStage {
        if self.config.prefer_biometric && self.presence.capability().is_available() {
            AuthStage::Biometric
        } else {
            AuthStage::PasswordFallback
        }
    }

    fn transition(&mut self, to: AuthStage) {
        if self.stage != to {
            tracing::debug!(from = ?self.stage, to = ?to, "stage transition");
            self.stage = to;
        }
    }

    /// Re-check the sensor. Drops to the password channel if biometrics
    /// disappeared while in the biometric stage.
    pub fn refresh_capability(&mut self) -> AuthStage {
        if self.stage == AuthStage::Biometric && !self.presence.capability().is_available() {
            tracing::info!(user_id = %self.config.user_id, "biometric capability lost");
            self.transition(AuthStage::PasswordFallback);
        }
        self.stage
    }

    /// Explicit user choice to use the password instead.
    pub fn choose_password(&mut self) -> AuthStage {
        if self.stage == AuthStage::Biometric {
            self.transition(AuthStage::PasswordFallback);
        }
        self.stage
    }

    /// Generate device keys and register the signing key with the backend.
    ///
    /// Replaces any existing keys. On success the controller returns to its
    /// preferred stage.
    ///
    /// # Errors
    ///
    /// `DeviceNotSecure`, `KeyStoreUnavailable`, `BackendUnreachable`, or
    /// `EnrollmentRejected` if the backend refuses the key.
    pub async fn enroll_device(&mut self, password: &str) -> Result<Fingerprint, SessionError> {
        let fingerprint = self.enroll_keys(password).await?;
        let stage = self.preferred_stage();
        self.transition(stage);
        Ok(fingerprint)
    }

    async fn enroll_keys(&self, password: &str) -> Result<Fingerprint, SessionError> {
        let user_id = self.config.user_id.as_str();
        let signing = KeyMode::Signing {
            algorithm: self.config.signing_algorithm,
        };
        let recency = KeyMode::SymmetricRecency {
            validity: self.config.recency_window,
        };

        self.keys
            .generate_key(&self.config.signing_alias, signing)
            .map_err(sanitize)?;
        self.keys
            .generate_key(&self.config.recency_alias, recency)
            .map_err(sanitize)?;
        let public_key = self
            .keys
            .export_public_key(&self.config.signing_alias)
            .map_err(sanitize)?;

        let enrolled = self
            .backend
            .enroll(user_id, password, &public_key)
            .await
            .map_err(|e| {
                tracing::warn!(user_id, error = %e, "enrollment failed");
                SessionError::BackendUnreachable
            })?;
        if !enrolled {
            tracing::warn!(user_id, "enrollment rejected by backend");
            return Err(SessionError::EnrollmentRejected);
        }

        let fingerprint = Fingerprint::from_der(&public_key);
        tracing::info!(user_id, %fingerprint, "device enrolled");
        Ok(fingerprint)
    }

    /// Authorize a purchase of `item_id` with biometric presence and a
    /// device signature verified by the backend.
    ///
    /// # Errors
    ///
    /// `WrongStage` outside [`AuthStage::Biometric`]; `NotEnrolled` when the
    /// device has no signing key; `KeyStoreUnavailable` and
    /// `BackendUnreachable` are fatal.
    pub async fn attempt_biometric(
        &mut self,
        item_id: u64,
        cancel: &CancellationToken,
    ) -> Result<AttemptResult, SessionError> {
        self.require_stage(&[AuthStage::Biometric])?;
        if self.refresh_capability() != AuthStage::Biometric {
            return Ok(AttemptResult::FellBack(Some(DenialReason::HardwareUnavailable)));
        }

        let alias = self.config.signing_alias.clone();
        // Surface invalidation before bothering the user.
        if let Err(e) = self.keys.check_usable(&alias) {
            return self.key_failure(e);
        }

        let transaction = Transaction::new(&self.config.user_id, item_id)?;
        let payload = transaction.to_canonical_bytes();

        let request = PresenceRequest::biometric(&alias);
        let signature = match self
            .with_presence(&request, cancel, |keys| keys.sign(&alias, &payload))
            .await?
        {
            Gate::Ready(signature) => signature,
            Gate::Done(result) => return Ok(result),
        };

        let accepted = self
            .backend
            .verify_signature(&transaction, &signature)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "signature verification failed");
                SessionError::BackendUnreachable
            })?;

        Ok(self.verdict(accepted, transaction, Proof::Signature(signature)))
    }

    /// Authorize a purchase of `item_id` with the recency-window symmetric
    /// key. Prompts for the device credential only when the last unlock is
    /// too old.
    ///
    /// # Errors
    ///
    /// `WrongStage` in [`AuthStage::ReEnrollPrompt`]; `NotEnrolled` when the
    /// device has no recency key; `KeyStoreUnavailable` is fatal.
    pub async fn attempt_recency(
        &mut self,
        item_id: u64,
        cancel: &CancellationToken,
    ) -> Result<AttemptResult, SessionError> {
        self.require_stage(&[AuthStage::Biometric, AuthStage::PasswordFallback])?;

        let alias = self.config.recency_alias.clone();
        let transaction = Transaction::new(&self.config.user_id, item_id)?;
        let payload = transaction.to_canonical_bytes();

        let sealed = match self.keys.authorize_symmetric(&alias, &payload) {
            Ok(sealed) => sealed,
            Err(KeyError::NotAuthenticated) => {
                let request = PresenceRequest::device_credential(&alias);
                match self
                    .with_presence(&request, cancel, |keys| {
                        keys.authorize_symmetric(&alias, &payload)
                    })
                    .await?
                {
                    Gate::Ready(sealed) => sealed,
                    Gate::Done(result) => return Ok(result),
                }
            }
            Err(e) => return self.key_failure(e),
        };

        tracing::info!(
            user_id = %self.config.user_id,
            item_id,
            "purchase authorized within recency window"
        );
        Ok(AttemptResult::Accepted(Authorization {
            transaction,
            proof: Proof::Recency { sealed },
        }))
    }

    /// Authorize a purchase of `item_id` with the user's password.
    ///
    /// In [`AuthStage::ReEnrollPrompt`] a correct password with
    /// `enroll_biometric` set also generates and enrolls a new device key,
    /// returning the controller to the biometric stage. The purchase stands
    /// even if that re-enrollment fails: a transient failure keeps the
    /// controller in the prompt so the next purchase tries again, any other
    /// failure drops it to the password channel.
    ///
    /// # Errors
    ///
    /// `WrongStage` in [`AuthStage::Biometric`]; `BackendUnreachable` if the
    /// password cannot be checked.
    pub async fn submit_password(
        &mut self,
        item_id: u64,
        password: &str,
        enroll_biometric: bool,
    ) -> Result<AttemptResult, SessionError> {
        self.require_stage(&[AuthStage::PasswordFallback, AuthStage::ReEnrollPrompt])?;

        let transaction = Transaction::new(&self.config.user_id, item_id)?;
        let accepted = self
            .backend
            .verify_password(&transaction, password)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "password verification failed");
                SessionError::BackendUnreachable
            })?;
        if !accepted {
            return Ok(self.verdict(false, transaction, Proof::Password));
        }

        if self.stage == AuthStage::ReEnrollPrompt {
            if enroll_biometric {
                match self.enroll_keys(password).await {
                    Ok(_) => {
                        let stage = self.preferred_stage();
                        self.transition(stage);
                    }
                    Err(e @ (SessionError::KeyStoreUnavailable | SessionError::BackendUnreachable)) => {
                        tracing::warn!(
                            user_id = %self.config.user_id,
                            error = %e,
                            "re-enrollment failed, purchase stands"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "re-enrollment failed, staying on password");
                        self.transition(AuthStage::PasswordFallback);
                    }
                }
            } else {
                self.transition(AuthStage::PasswordFallback);
            }
        }

        Ok(self.verdict(true, transaction, Proof::Password))
    }

    fn require_stage(&self, allowed: &[AuthStage]) -> Result<(), SessionError> {
        if allowed.contains(&self.stage) {
            Ok(())
        } else {
            Err(SessionError::WrongStage { stage: self.stage })
        }
    }

    /// Prove presence, then run `op`. A `NotAuthenticated` from `op` earns
    /// exactly one more proof.
    async fn with_presence<T, F>(
        &mut self,
        request: &PresenceRequest,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<Gate<T>, SessionError>
    where
        F: Fn(&dyn KeyAuthority) -> Result<T, KeyError>,
    {
        for attempt in 0..2 {
            match self.presence.request(request, cancel).await {
                PresenceOutcome::Granted => {}
                PresenceOutcome::Cancelled => {
                    tracing::debug!(alias = %request.alias, "presence cancelled");
                    return Ok(Gate::Done(AttemptResult::Cancelled));
                }
                PresenceOutcome::Denied(reason) => {
                    return Ok(Gate::Done(self.presence_denied(reason)));
                }
            }

            match op(self.keys.as_ref()) {
                Ok(value) => return Ok(Gate::Ready(value)),
                Err(KeyError::NotAuthenticated) if attempt == 0 => {
                    tracing::debug!(alias = %request.alias, "not authenticated after presence, retrying once");
                }
                Err(e) => return self.key_failure(e).map(Gate::Done),
            }
        }

        // Still not authenticated after a second proof.
        tracing::warn!(alias = %request.alias, "presence proof not honored by key store");
        self.transition(AuthStage::PasswordFallback);
        Ok(Gate::Done(AttemptResult::FellBack(None)))
    }

    fn presence_denied(&mut self, reason: DenialReason) -> AttemptResult {
        match Disposition::from(reason) {
            Disposition::Retry => {
                tracing::debug!(?reason, "presence not recognized");
                AttemptResult::TryAgain
            }
            _ => {
                tracing::info!(?reason, "presence denied, falling back to password");
                self.transition(AuthStage::PasswordFallback);
                AttemptResult::FellBack(Some(reason))
            }
        }
    }

    fn key_failure(&mut self, err: KeyError) -> Result<AttemptResult, SessionError> {
        match Disposition::from(&err) {
            Disposition::Retry => Ok(AttemptResult::TryAgain),
            Disposition::Fallback => {
                tracing::info!(error = %err, "key unusable, falling back to password");
                self.transition(AuthStage::PasswordFallback);
                Ok(AttemptResult::FellBack(None))
            }
            Disposition::ReEnroll => {
                tracing::warn!(user_id = %self.config.user_id, error = %err, "device key must be re-enrolled");
                self.transition(AuthStage::ReEnrollPrompt);
                Ok(AttemptResult::ReEnrollRequired)
            }
            Disposition::Fatal => Err(sanitize(err)),
        }
    }

    fn verdict(&self, accepted: bool, transaction: Transaction, proof: Proof) -> AttemptResult {
        if accepted {
            tracing::info!(
                user_id = transaction.user_id(),
                item_id = transaction.item_id(),
                stage = ?self.stage,
                "purchase accepted"
            );
            AttemptResult::Accepted(Authorization { transaction, proof })
        } else {
            tracing::info!(
                user_id = transaction.user_id(),
                item_id = transaction.item_id(),
                "purchase rejected"
            );
            AttemptResult::Rejected
        }
    }
}

/// Collapse key store failures into session errors.
fn sanitize(err: KeyError) -> SessionError {
    match err {
        KeyError::DeviceNotSecure => SessionError::DeviceNotSecure,
        KeyError::KeyNotFound(alias) => {
            tracing::info!(%alias, "no device key, enrollment required");
            SessionError::NotEnrolled
        }
        other => {
            tracing::warn!(error = %other, "key store failure");
            SessionError::KeyStoreUnavailable
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    use argon2::{Algorithm, Argon2, Params, Version};
    use async_trait::async_trait;

    use super::*;
    use crate::backend::{BackendError, InMemoryBackend};
    use crate::identity::PublicKeyDer;
    use crate::keystore::{SimulatedDevice, SoftwareKeyAuthority};
    use crate::presence::{PresenceStep, ScriptedPresence, SensorCapability};

    struct Fixture {
        device: Arc<SimulatedDevice>,
        presence: Arc<ScriptedPresence>,
        keys: Arc<SoftwareKeyAuthority>,
        backend: Arc<InMemoryBackend>,
    }

    impl Fixture {
        fn new() -> Self {
            let device = Arc::new(SimulatedDevice::new());
            let params = Params::new(8, 1, 1, None).unwrap();
            Self {
                presence: Arc::new(ScriptedPresence::new(Arc::clone(&device))),
                keys: Arc::new(SoftwareKeyAuthority::new(Arc::clone(&device))),
                backend: Arc::new(InMemoryBackend::new().with_password_hasher(Argon2::new(
                    Algorithm::Argon2id,
                    Version::V0x13,
                    params,
                ))),
                device,
            }
        }

        fn controller(&self, config: AuthConfig) -> AuthController {
            AuthController::new(
                config,
                self.keys.clone(),
                self.presence.clone(),
                self.backend.clone(),
            )
        }

        async fn enrolled(&self) -> AuthController {
            let mut controller = self.controller(config());
            controller.enroll_device("hunter2").await.unwrap();
            controller
        }
    }

    /// Backend whose enrollment endpoint can be taken down while
    /// verification keeps working.
    struct EnrollOutage {
        inner: Arc<InMemoryBackend>,
        down: AtomicBool,
    }

    #[async_trait]
    impl VerificationBackend for EnrollOutage {
        async fn enroll(
            &self,
            user_id: &str,
            password: &str,
            public_key: &PublicKeyDer,
        ) -> Result<bool, BackendError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(BackendError::Unreachable("enroll endpoint down".into()));
            }
            VerificationBackend::enroll(self.inner.as_ref(), user_id, password, public_key).await
        }

        async fn verify_signature(
            &self,
            transaction: &Transaction,
            signature: &Signature,
        ) -> Result<bool, BackendError> {
            VerificationBackend::verify_signature(self.inner.as_ref(), transaction, signature).await
        }

        async fn verify_password(
            &self,
            transaction: &Transaction,
            password: &str,
        ) -> Result<bool, BackendError> {
            VerificationBackend::verify_password(self.inner.as_ref(), transaction, password).await
        }
    }

    fn config() -> AuthConfig {
        AuthConfig {
            user_id: "alice".to_string(),
            ..AuthConfig::default()
        }
    }

    #[test]
    fn test_initial_stage() {
        let fx = Fixture::new();
        assert_eq!(fx.controller(config()).stage(), AuthStage::Biometric);

        let no_preference = AuthConfig {
            prefer_biometric: false,
            ..config()
        };
        assert_eq!(
            fx.controller(no_preference).stage(),
            AuthStage::PasswordFallback
        );

        fx.device.set_sensor(SensorCapability {
            hardware_detected: true,
            enrolled: false,
        });
        assert_eq!(fx.controller(config()).stage(), AuthStage::PasswordFallback);
    }

    #[tokio::test]
    async fn test_biometric_accept() {
        let fx = Fixture::new();
        let mut controller = fx.enrolled().await;

        let result = controller
            .attempt_biometric(42, &CancellationToken::new())
            .await
            .unwrap();

        let AttemptResult::Accepted(auth) = result else {
            panic!("expected acceptance, got {result:?}");
        };
        assert_eq!(auth.transaction.user_id(), "alice");
        assert_eq!(auth.transaction.item_id(), 42);
        assert!(matches!(auth.proof, Proof::Signature(_)));
    }

    #[tokio::test]
    async fn test_replayed_signature_rejected() {
        let fx = Fixture::new();
        let mut controller = fx.enrolled().await;

        let AttemptResult::Accepted(auth) = controller
            .attempt_biometric(42, &CancellationToken::new())
            .await
            .unwrap()
        else {
            panic!("expected acceptance");
        };
        let Proof::Signature(signature) = auth.proof else {
            panic!("expected signature proof");
        };

        assert!(!fx.backend.verify_signature(&auth.transaction, &signature));
    }

    #[tokio::test]
    async fn test_not_recognized_stays_biometric() {
        let fx = Fixture::new();
        let mut controller = fx.enrolled().await;
        fx.presence.push(PresenceStep::deny(DenialReason::NotRecognized));

        let result = controller
            .attempt_biometric(1, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result, AttemptResult::TryAgain);
        assert_eq!(controller.stage(), AuthStage::Biometric);
    }

    #[tokio::test]
    async fn test_lockout_falls_back() {
        let fx = Fixture::new();
        let mut controller = fx.enrolled().await;
        fx.presence.push(PresenceStep::deny(DenialReason::Lockout));

        let result = controller
            .attempt_biometric(1, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result, AttemptResult::FellBack(Some(DenialReason::Lockout)));
        assert_eq!(controller.stage(), AuthStage::PasswordFallback);

        let result = controller.submit_password(1, "hunter2", false).await.unwrap();
        assert!(matches!(result, AttemptResult::Accepted(_)));
    }

    #[tokio::test]
    async fn test_invalidation_enters_reenroll_prompt() {
        let fx = Fixture::new();
        let mut controller = fx.enrolled().await;
        fx.device.reset_credential();

        let result = controller
            .attempt_biometric(1, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result, AttemptResult::ReEnrollRequired);
        assert_eq!(controller.stage(), AuthStage::ReEnrollPrompt);
        // No prompt was shown for an invalidated key.
        assert!(!fx.device.take_grant(&controller.config().signing_alias));
    }

    #[tokio::test]
    async fn test_wrong_password_stays_in_reenroll() {
        let fx = Fixture::new();
        let mut controller = fx.enrolled().await;
        fx.device.reset_credential();
        controller
            .attempt_biometric(1, &CancellationToken::new())
            .await
            .unwrap();

        let result = controller.submit_password(1, "wrong", true).await.unwrap();

        assert_eq!(result, AttemptResult::Rejected);
        assert_eq!(controller.stage(), AuthStage::ReEnrollPrompt);
    }

    #[tokio::test]
    async fn test_reenroll_without_opt_in() {
        let fx = Fixture::new();
        let mut controller = fx.enrolled().await;
        let before = fx.backend.enrolled_fingerprint("alice");
        fx.device.reset_credential();
        controller
            .attempt_biometric(1, &CancellationToken::new())
            .await
            .unwrap();

        let result = controller.submit_password(2, "hunter2", false).await.unwrap();

        assert!(matches!(result, AttemptResult::Accepted(_)));
        assert_eq!(controller.stage(), AuthStage::PasswordFallback);
        assert_eq!(fx.backend.enrolled_fingerprint("alice"), before);
    }

    #[tokio::test]
    async fn test_reenroll_opt_in_restores_biometric() {
        let fx = Fixture::new();
        let mut controller = fx.enrolled().await;
        let before = fx.backend.enrolled_fingerprint("alice");
        fx.device.reset_credential();
        controller
            .attempt_biometric(1, &CancellationToken::new())
            .await
            .unwrap();

        let result = controller.submit_password(2, "hunter2", true).await.unwrap();

        assert!(matches!(result, AttemptResult::Accepted(_)));
        assert_eq!(controller.stage(), AuthStage::Biometric);
        assert_ne!(fx.backend.enrolled_fingerprint("alice"), before);
        let result = controller
            .attempt_biometric(3, &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(result, AttemptResult::Accepted(_)));
    }

    #[tokio::test]
    async fn test_accepted_password_survives_failed_reenrollment() {
        let fx = Fixture::new();
        let backend = Arc::new(EnrollOutage {
            inner: fx.backend.clone(),
            down: AtomicBool::new(false),
        });
        let mut controller =
            AuthController::new(config(), fx.keys.clone(), fx.presence.clone(), backend.clone());
        controller.enroll_device("hunter2").await.unwrap();
        fx.device.reset_credential();
        controller
            .attempt_biometric(1, &CancellationToken::new())
            .await
            .unwrap();
        backend.down.store(true, Ordering::SeqCst);

        let result = controller.submit_password(2, "hunter2", true).await.unwrap();

        let AttemptResult::Accepted(auth) = result else {
            panic!("expected acceptance, got {result:?}");
        };
        assert_eq!(auth.proof, Proof::Password);
        assert_eq!(auth.transaction.item_id(), 2);
        assert_eq!(controller.stage(), AuthStage::ReEnrollPrompt);

        // Once the backend recovers the next purchase finishes re-enrollment.
        backend.down.store(false, Ordering::SeqCst);
        let result = controller.submit_password(3, "hunter2", true).await.unwrap();
        assert!(matches!(result, AttemptResult::Accepted(_)));
        assert_eq!(controller.stage(), AuthStage::Biometric);
    }

    #[tokio::test]
    async fn test_missing_key_requires_enrollment() {
        let fx = Fixture::new();
        let mut controller = fx.controller(config());

        assert_eq!(
            controller
                .attempt_biometric(1, &CancellationToken::new())
                .await,
            Err(SessionError::NotEnrolled)
        );
        assert_eq!(controller.stage(), AuthStage::Biometric);
        assert_eq!(
            controller
                .attempt_recency(1, &CancellationToken::new())
                .await,
            Err(SessionError::NotEnrolled)
        );
    }

    #[tokio::test]
    async fn test_stage_guards() {
        let fx = Fixture::new();
        let mut controller = fx.enrolled().await;

        assert_eq!(
            controller.submit_password(1, "hunter2", false).await,
            Err(SessionError::WrongStage {
                stage: AuthStage::Biometric
            })
        );

        controller.choose_password();
        assert_eq!(
            controller
                .attempt_biometric(1, &CancellationToken::new())
                .await,
            Err(SessionError::WrongStage {
                stage: AuthStage::PasswordFallback
            })
        );
    }

    #[tokio::test]
    async fn test_capability_loss_falls_back() {
        let fx = Fixture::new();
        let mut controller = fx.enrolled().await;
        fx.device.set_sensor(SensorCapability {
            hardware_detected: false,
            enrolled: false,
        });

        let result = controller
            .attempt_biometric(1, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            result,
            AttemptResult::FellBack(Some(DenialReason::HardwareUnavailable))
        );
        assert_eq!(controller.stage(), AuthStage::PasswordFallback);
    }

    #[tokio::test]
    async fn test_keystore_outage_is_fatal() {
        let fx = Fixture::new();
        let mut controller = fx.enrolled().await;
        fx.device.set_keystore_available(false);

        assert_eq!(
            controller
                .attempt_biometric(1, &CancellationToken::new())
                .await,
            Err(SessionError::KeyStoreUnavailable)
        );
    }

    #[tokio::test]
    async fn test_recency_within_window_needs_no_prompt() {
        let fx = Fixture::new();
        let mut controller = fx.enrolled().await;
        fx.device.record_unlock();
        fx.presence.push(PresenceStep::Hang);

        let result = controller
            .attempt_recency(7, &CancellationToken::new())
            .await
            .unwrap();

        let AttemptResult::Accepted(auth) = result else {
            panic!("expected acceptance, got {result:?}");
        };
        let Proof::Recency { sealed } = auth.proof else {
            panic!("expected recency proof");
        };
        let opened = fx
            .keys
            .open_symmetric(&controller.config().recency_alias, &sealed)
            .unwrap();
        assert_eq!(opened, auth.transaction.to_canonical_bytes());
        // The hanging step was never consumed.
        assert_eq!(fx.presence.remaining(), 1);
    }

    #[tokio::test]
    async fn test_recency_stale_unlock_prompts_once() {
        let fx = Fixture::new();
        let mut controller = fx.enrolled().await;
        let stale = Instant::now().checked_sub(Duration::from_secs(6)).unwrap();
        fx.device.record_unlock_at(stale);

        let result = controller
            .attempt_recency(7, &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(result, AttemptResult::Accepted(_)));
    }

    #[tokio::test]
    async fn test_cancelled_prompt() {
        let fx = Fixture::new();
        let mut controller = fx.enrolled().await;
        fx.presence.push(PresenceStep::Hang);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = controller.attempt_biometric(1, &cancel).await.unwrap();

        assert_eq!(result, AttemptResult::Cancelled);
        assert_eq!(controller.stage(), AuthStage::Biometric);
    }

    #[tokio::test]
    async fn test_enroll_on_insecure_device() {
        let fx = Fixture::new();
        fx.device.set_secure(false);
        let mut controller = fx.controller(config());

        assert_eq!(
            controller.enroll_device("hunter2").await,
            Err(SessionError::DeviceNotSecure)
        );
        assert!(!fx.backend.is_enrolled("alice"));
    }
}
