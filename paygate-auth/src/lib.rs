//! Presence-gated purchase authorization.
//!
//! A purchase is authorized by one of three proofs:
//! - a device signature, usable only right after a biometric presence proof
//! - a symmetric operation, usable while the last device unlock is recent
//! - the user's password
//!
//! The trusted verifier never takes the client's word for it: it checks
//! every proof itself and accepts a given transaction at most once.
//!
//! Dependencies are injected via traits:
//! - [`keystore::KeyAuthority`] - secure key store
//! - [`presence::PresenceProver`] - biometric / lock-screen prompt
//! - [`backend::VerificationBackend`] - trusted verifier
//! - [`backend::SeenTransactions`] - replay tracking
//!
//! Software implementations of each ship with the crate for tests and
//! demos.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use paygate_auth::{
//!     AttemptResult, AuthConfig, AuthController, InMemoryBackend, ScriptedPresence,
//!     SimulatedDevice, SoftwareKeyAuthority,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let device = Arc::new(SimulatedDevice::new());
//! let mut controller = AuthController::new(
//!     AuthConfig::default(),
//!     Arc::new(SoftwareKeyAuthority::new(device.clone())),
//!     Arc::new(ScriptedPresence::new(device)),
//!     Arc::new(InMemoryBackend::new()),
//! );
//!
//! controller.enroll_device("correct horse").await.unwrap();
//! let result = controller
//!     .attempt_biometric(42, &CancellationToken::new())
//!     .await
//!     .unwrap();
//! assert!(matches!(result, AttemptResult::Accepted(_)));
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod controller;
pub mod identity;
pub mod keystore;
pub mod presence;
pub mod transaction;

pub use backend::{BackendError, InMemoryBackend, LruSeenSet, SeenTransactions, VerificationBackend};
pub use config::{AuthConfig, ConfigError};
pub use controller::{AttemptResult, AuthController, AuthStage, Authorization, Proof, SessionError};
pub use identity::{Fingerprint, PublicKeyDer, Signature, SigningAlgorithm, VerificationKey};
pub use keystore::{KeyAuthority, KeyError, KeyMode, SimulatedDevice, SoftwareKeyAuthority};
pub use presence::{PresenceOutcome, PresenceProver, ScriptedPresence};
pub use transaction::{ClientNonce, Transaction, TransactionError};
