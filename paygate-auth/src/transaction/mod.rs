//! Purchase transactions and their canonical encoding.
//!
//! A [`Transaction`] is one purchase intent: who buys, what, and a fresh
//! [`ClientNonce`]. It is built for a single authentication attempt and
//! never mutated. [`canonical_encoding`] produces the exact bytes that are
//! signed on the device and verified by the backend.

mod encoding;
mod nonce;

use serde::{Deserialize, Serialize};

pub use encoding::{canonical_encoding, decode_canonical, MAX_USER_ID_LEN};
pub use nonce::ClientNonce;

/// Errors that can occur when constructing or decoding a transaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum TransactionError {
    /// The user id is empty.
    #[error("user id must not be empty")]
    EmptyUserId,

    /// The user id does not fit the 16-bit length prefix.
    #[error("user id too long: {len} bytes (max {MAX_USER_ID_LEN})")]
    UserIdTooLong { len: usize },

    /// The canonical bytes could not be parsed.
    #[error("malformed transaction encoding")]
    Malformed,
}

/// A single purchase intent.
///
/// Equality covers all three fields; the verifier's seen-set relies on it.
///
/// Fields are private so a `Transaction` always satisfies the encoding
/// limits. Deserialization goes through the same validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "TransactionFields")]
pub struct Transaction {
    user_id: String,
    item_id: u64,
    client_nonce: ClientNonce,
}

impl Transaction {
    /// Create a transaction with a freshly generated nonce.
    ///
    /// # Errors
    ///
    /// Returns `TransactionError::EmptyUserId` or
    /// `TransactionError::UserIdTooLong` for an unusable user id.
    pub fn new(user_id: &str, item_id: u64) -> Result<Self, TransactionError> {
        Self::with_nonce(user_id, item_id, ClientNonce::random())
    }

    /// Create a transaction with a caller-supplied nonce.
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::new`].
    pub fn with_nonce(
        user_id: &str,
        item_id: u64,
        client_nonce: ClientNonce,
    ) -> Result<Self, TransactionError> {
        if user_id.is_empty() {
            return Err(TransactionError::EmptyUserId);
        }
        if user_id.len() > MAX_USER_ID_LEN {
            return Err(TransactionError::UserIdTooLong { len: user_id.len() });
        }

        Ok(Self {
            user_id: user_id.to_string(),
            item_id,
            client_nonce,
        })
    }

    /// The purchasing user.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The purchased item.
    #[must_use]
    pub fn item_id(&self) -> u64 {
        self.item_id
    }

    /// The per-attempt nonce.
    #[must_use]
    pub fn client_nonce(&self) -> ClientNonce {
        self.client_nonce
    }

    /// The bytes to sign or verify. Shorthand for [`canonical_encoding`].
    #[must_use]
    pub fn to_canonical_bytes(&self) -> Vec<u8> {
        canonical_encoding(self)
    }
}

/// Unvalidated wire form, used only for deserialization.
#[derive(Deserialize)]
struct TransactionFields {
    user_id: String,
    item_id: u64,
    client_nonce: ClientNonce,
}

impl TryFrom<TransactionFields> for Transaction {
    type Error = TransactionError;

    fn try_from(fields: TransactionFields) -> Result<Self, Self::Error> {
        Self::with_nonce(&fields.user_id, fields.item_id, fields.client_nonce)
    }
}
