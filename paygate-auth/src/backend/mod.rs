//! Verification backend: the trusted party.
//!
//! The backend never trusts a client's claim that the user authenticated.
//! It accepts a transaction only if
//! - the transaction has not been seen before (replay check first, then the
//!   transaction is recorded whatever the outcome)
//! - the user is enrolled
//! - the proof verifies against the enrolled credential
//!
//! Dependencies are injected via traits:
//! - [`SeenTransactions`] - replay tracking

mod error;
mod seen;
mod store;

use async_trait::async_trait;

use crate::identity::{PublicKeyDer, Signature};
use crate::transaction::Transaction;

pub use error::BackendError;
pub use seen::{LruSeenSet, SeenTransactions, UnboundedSeenSet};
pub use store::InMemoryBackend;

/// Boundary between the controller and the verifier.
///
/// `Ok(false)` is a normal rejection and never says which check failed.
/// `Err` is reserved for not reaching the verifier at all.
#[async_trait]
pub trait VerificationBackend: Send + Sync {
    /// Insert or replace the enrolled key and password for `user_id`.
    async fn enroll(
        &self,
        user_id: &str,
        password: &str,
        public_key: &PublicKeyDer,
    ) -> Result<bool, BackendError>;

    /// Verify a device signature over the canonical encoding of
    /// `transaction`.
    async fn verify_signature(
        &self,
        transaction: &Transaction,
        signature: &Signature,
    ) -> Result<bool, BackendError>;

    /// Verify the shared-secret password of `transaction.user_id`.
    async fn verify_password(
        &self,
        transaction: &Transaction,
        password: &str,
    ) -> Result<bool, BackendError>;
}
