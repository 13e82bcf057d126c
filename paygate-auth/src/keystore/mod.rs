//! Key authority: presence-gated device keys.
//!
//! A [`KeyAuthority`] owns one named key per authentication mode and
//! mediates every cryptographic operation through a user-presence gate.
//! Private and symmetric key material never leaves the authority.
//!
//! ```text
//! ┌────────────────────────┐
//! │ AuthController         │
//! └──────────┬─────────────┘
//!            │
//!            ▼
//! ┌────────────────────────┐
//! │ KeyAuthority (trait)   │
//! └──────────┬─────────────┘
//!      ┌─────┴───────────┐
//!      ▼                 ▼
//!   Software          Platform keystore
//!   (this crate)      (Android Keystore, Secure Enclave, ...)
//! ```
//!
//! Failures come back as [`KeyError`]:
//! - `NotAuthenticated` - prove presence and retry once
//! - `KeyInvalidated` - terminal for the key; regenerate and re-enroll
//! - `KeyStoreUnavailable` - fatal to the session

mod device;
mod error;
mod software;

use std::time::Duration;

use crate::identity::{PublicKeyDer, Signature, SigningAlgorithm};

pub use device::SimulatedDevice;
pub use error::KeyError;
pub use software::SoftwareKeyAuthority;

/// Default recency window for symmetric keys.
///
/// Deliberately short so that every protected action needs a fresh unlock.
pub const DEFAULT_RECENCY_WINDOW: Duration = Duration::from_secs(5);

/// How a key may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    /// Asymmetric, sign-only. Every use of the private key needs its own
    /// presence proof; the public key is freely exportable.
    Signing {
        /// Signature scheme.
        algorithm: SigningAlgorithm,
    },
    /// Symmetric. Usable without an explicit prompt while the last device
    /// unlock is within `validity`.
    SymmetricRecency {
        /// Trailing window after unlock.
        validity: Duration,
    },
}

impl KeyMode {
    /// Signing mode with the default algorithm.
    #[must_use]
    pub fn signing() -> Self {
        Self::Signing {
            algorithm: SigningAlgorithm::default(),
        }
    }

    /// Symmetric mode with [`DEFAULT_RECENCY_WINDOW`].
    #[must_use]
    pub fn symmetric_recency() -> Self {
        Self::SymmetricRecency {
            validity: DEFAULT_RECENCY_WINDOW,
        }
    }
}

/// Unified interface to a secure key store.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; operations take `&self`.
///
/// # Invalidation
///
/// Once an operation on an alias has returned [`KeyError::KeyInvalidated`],
/// every later `sign`, `authorize_symmetric`, `open_symmetric`,
/// `check_usable` and `export_public_key` on that alias must return it too,
/// until `generate_key` is called for the alias again.
pub trait KeyAuthority: Send + Sync {
    /// Create (or replace) the key under `alias`.
    ///
    /// # Errors
    ///
    /// - `KeyStoreUnavailable` if secure storage cannot be opened
    /// - `DeviceNotSecure` if no device credential is configured
    fn generate_key(&self, alias: &str, mode: KeyMode) -> Result<(), KeyError>;

    /// Check that the key exists and is still valid, without needing a
    /// presence proof. Run this before prompting the user.
    ///
    /// # Errors
    ///
    /// `KeyNotFound`, `KeyInvalidated` or `KeyStoreUnavailable`.
    fn check_usable(&self, alias: &str) -> Result<(), KeyError>;

    /// Sign `payload` with the asymmetric key under `alias`.
    ///
    /// Consumes the presence proof granted for this alias.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` without a presence proof, `KeyInvalidated` after a
    /// credential change, plus the lookup errors of `check_usable`.
    fn sign(&self, alias: &str, payload: &[u8]) -> Result<Signature, KeyError>;

    /// Encrypt `payload` with the symmetric key under `alias`.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` when the last unlock is outside the recency
    /// window, otherwise as for [`KeyAuthority::sign`].
    fn authorize_symmetric(&self, alias: &str, payload: &[u8]) -> Result<Vec<u8>, KeyError>;

    /// Decrypt data produced by [`KeyAuthority::authorize_symmetric`].
    ///
    /// # Errors
    ///
    /// As for `authorize_symmetric`, plus `Crypto` for tampered input.
    fn open_symmetric(&self, alias: &str, sealed: &[u8]) -> Result<Vec<u8>, KeyError>;

    /// Export the public key under `alias` as SubjectPublicKeyInfo DER.
    ///
    /// The result is a plain value with no tie to the store.
    ///
    /// # Errors
    ///
    /// `WrongKeyMode` for symmetric keys, plus the lookup errors of
    /// `check_usable`.
    fn export_public_key(&self, alias: &str) -> Result<PublicKeyDer, KeyError>;

    /// Remove the key under `alias`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// `KeyStoreUnavailable`.
    fn delete_key(&self, alias: &str) -> Result<(), KeyError>;

    /// Whether a key (valid or not) exists under `alias`.
    ///
    /// # Errors
    ///
    /// `KeyStoreUnavailable`.
    fn contains_key(&self, alias: &str) -> Result<bool, KeyError>;
}
