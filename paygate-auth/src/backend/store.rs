//! In-memory verification backend.

use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use dashmap::DashMap;

use super::seen::{SeenTransactions, UnboundedSeenSet};
use super::{BackendError, VerificationBackend};
use crate::identity::{Fingerprint, PublicKeyDer, Signature, VerificationKey};
use crate::transaction::Transaction;

/// What the backend knows about one user. Replaced wholesale on
/// re-enrollment.
struct EnrolledUser {
    key: VerificationKey,
    /// Argon2id PHC string.
    password_hash: String,
}

/// Trusted verifier holding enrolled keys and the seen-transaction set in
/// process memory.
///
/// All methods take `&self` and are safe to call concurrently; a given
/// transaction is accepted at most once across both proof channels.
pub struct InMemoryBackend {
    enrolled: DashMap<String, EnrolledUser>,
    seen: Arc<dyn SeenTransactions>,
    argon2: Argon2<'static>,
}

impl InMemoryBackend {
    /// Backend with an unbounded seen set and default Argon2id parameters.
    pub fn new() -> Self {
        Self::with_seen_set(Arc::new(UnboundedSeenSet::new()))
    }

    /// Backend with a caller-supplied seen set.
    pub fn with_seen_set(seen: Arc<dyn SeenTransactions>) -> Self {
        Self {
            enrolled: DashMap::new(),
            seen,
            argon2: Argon2::default(),
        }
    }

    /// Replace the password hasher, e.g. with cheaper parameters in tests.
    #[must_use]
    pub fn with_password_hasher(mut self, argon2: Argon2<'static>) -> Self {
        self.argon2 = argon2;
        self
    }

    /// Register `public_key` and `password` for `user_id`, replacing any
    /// previous enrollment.
    ///
    /// Returns `false` for an empty user id, a key that is not a supported
    /// SubjectPublicKeyInfo, or a password that cannot be hashed.
    pub fn enroll(&self, user_id: &str, password: &str, public_key: &PublicKeyDer) -> bool {
        let Some(key) = check_enrollment(user_id, public_key) else {
            return false;
        };
        match hash_password(&self.argon2, password) {
            Some(password_hash) => self.store(user_id, key, password_hash, public_key),
            None => {
                tracing::warn!(user_id, "enrollment rejected: password hashing failed");
                false
            }
        }
    }

    /// Verify a presence-gated signature over `transaction`.
    ///
    /// The transaction is consumed before anything else is checked: a
    /// repeated transaction is rejected even if its first submission failed.
    pub fn verify_signature(&self, transaction: &Transaction, signature: &Signature) -> bool {
        if !self.consume(transaction) {
            return false;
        }

        let Some(user) = self.enrolled.get(transaction.user_id()) else {
            tracing::debug!(
                user_id = transaction.user_id(),
                item_id = transaction.item_id(),
                "signature rejected: user not enrolled"
            );
            return false;
        };

        let accepted = user
            .key
            .verify(&transaction.to_canonical_bytes(), signature);
        tracing::info!(
            user_id = transaction.user_id(),
            item_id = transaction.item_id(),
            accepted,
            "signature verification"
        );
        accepted
    }

    /// Verify the shared-secret password for `transaction.user_id`.
    ///
    /// Shares the seen set with [`InMemoryBackend::verify_signature`].
    pub fn verify_password(&self, transaction: &Transaction, password: &str) -> bool {
        let Some(phc) = self.password_hash_for(transaction) else {
            return false;
        };
        let accepted = check_password(&self.argon2, &phc, password);
        log_password_verdict(transaction, accepted);
        accepted
    }

    /// Whether `user_id` has an enrolled key.
    pub fn is_enrolled(&self, user_id: &str) -> bool {
        self.enrolled.contains_key(user_id)
    }

    /// Fingerprint of the key currently enrolled for `user_id`.
    pub fn enrolled_fingerprint(&self, user_id: &str) -> Option<Fingerprint> {
        self.enrolled
            .get(user_id)
            .and_then(|user| Fingerprint::from_verification_key(&user.key).ok())
    }

    /// Consume `transaction` and copy out the PHC string of its user. The
    /// map guard is released before any hashing happens.
    fn password_hash_for(&self, transaction: &Transaction) -> Option<String> {
        if !self.consume(transaction) {
            return None;
        }
        let phc = self
            .enrolled
            .get(transaction.user_id())
            .map(|user| user.password_hash.clone());
        if phc.is_none() {
            tracing::debug!(
                user_id = transaction.user_id(),
                "password rejected: user not enrolled"
            );
        }
        phc
    }

    fn store(
        &self,
        user_id: &str,
        key: VerificationKey,
        password_hash: String,
        public_key: &PublicKeyDer,
    ) -> bool {
        let fingerprint = Fingerprint::from_der(public_key);
        let replaced = self
            .enrolled
            .insert(user_id.to_string(), EnrolledUser { key, password_hash })
            .is_some();

        tracing::info!(user_id, %fingerprint, replaced, "enrolled device key");
        true
    }

    fn consume(&self, transaction: &Transaction) -> bool {
        if self.seen.check_and_insert(transaction) {
            return true;
        }
        tracing::warn!(
            user_id = transaction.user_id(),
            item_id = transaction.item_id(),
            "replayed transaction rejected"
        );
        false
    }
}

/// Validate the user id and decode the key of an enrollment request.
fn check_enrollment(user_id: &str, public_key: &PublicKeyDer) -> Option<VerificationKey> {
    if user_id.is_empty() {
        tracing::warn!("enrollment rejected: empty user id");
        return None;
    }
    match public_key.decode() {
        Ok(key) => Some(key),
        Err(e) => {
            tracing::warn!(user_id, error = %e, "enrollment rejected: bad public key");
            None
        }
    }
}

/// Argon2id PHC string of `password` under a fresh random salt.
fn hash_password(argon2: &Argon2<'_>, password: &str) -> Option<String> {
    let salt = SaltString::encode_b64(&rand::random::<[u8; 16]>()).ok()?;
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .ok()
}

fn check_password(argon2: &Argon2<'_>, phc: &str, password: &str) -> bool {
    PasswordHash::new(phc)
        .map(|hash| argon2.verify_password(password.as_bytes(), &hash).is_ok())
        .unwrap_or(false)
}

fn log_password_verdict(transaction: &Transaction, accepted: bool) {
    tracing::info!(
        user_id = transaction.user_id(),
        item_id = transaction.item_id(),
        accepted,
        "password verification"
    );
}

/// Run an Argon2 computation on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T, BackendError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| BackendError::Unreachable(format!("password worker failed: {e}")))
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VerificationBackend for InMemoryBackend {
    async fn enroll(
        &self,
        user_id: &str,
        password: &str,
        public_key: &PublicKeyDer,
    ) -> Result<bool, BackendError> {
        let Some(key) = check_enrollment(user_id, public_key) else {
            return Ok(false);
        };
        let argon2 = self.argon2.clone();
        let password = password.to_owned();
        match blocking(move || hash_password(&argon2, &password)).await? {
            Some(password_hash) => Ok(self.store(user_id, key, password_hash, public_key)),
            None => {
                tracing::warn!(user_id, "enrollment rejected: password hashing failed");
                Ok(false)
            }
        }
    }

    async fn verify_signature(
        &self,
        transaction: &Transaction,
        signature: &Signature,
    ) -> Result<bool, BackendError> {
        Ok(InMemoryBackend::verify_signature(self, transaction, signature))
    }

    async fn verify_password(
        &self,
        transaction: &Transaction,
        password: &str,
    ) -> Result<bool, BackendError> {
        let Some(phc) = self.password_hash_for(transaction) else {
            return Ok(false);
        };
        let argon2 = self.argon2.clone();
        let password = password.to_owned();
        let accepted = blocking(move || check_password(&argon2, &phc, &password)).await?;
        log_password_verdict(transaction, accepted);
        Ok(accepted)
    }
}
