//! Client nonce bound into every transaction.

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// A random 64-bit value that makes each purchase attempt unique.
///
/// Drawn from the OS CSPRNG. The verifier refuses a transaction whose
/// `(user_id, item_id, client_nonce)` it has already seen, so a fresh nonce
/// is required for every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientNonce(u64);

impl ClientNonce {
    /// Generate a new random nonce.
    #[must_use]
    pub fn random() -> Self {
        Self(rand::rngs::OsRng.next_u64())
    }

    /// Create a nonce from a known value.
    #[must_use]
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    /// The raw nonce value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl Default for ClientNonce {
    fn default() -> Self {
        Self::random()
    }
}
