//! Key authority error taxonomy.

/// Errors reported by a [`KeyAuthority`](super::KeyAuthority).
///
/// Platform failures are translated into these variants at the authority
/// boundary; callers never see raw keystore errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum KeyError {
    /// No presence proof covers this operation, or the last device unlock
    /// is outside the key's recency window. Recoverable: prove presence and
    /// retry once.
    #[error("user not authenticated for this key operation")]
    NotAuthenticated,

    /// The device credential was removed or changed after the key was
    /// created. Terminal for this key: it must be regenerated and
    /// re-enrolled.
    #[error("key permanently invalidated")]
    KeyInvalidated,

    /// The secure key store cannot be opened. Fatal to the session.
    #[error("key store unavailable")]
    KeyStoreUnavailable,

    /// The device has no secure lock screen, so presence-gated keys cannot
    /// be created.
    #[error("device has no secure lock screen")]
    DeviceNotSecure,

    /// No key exists under the alias.
    #[error("no key under alias {0:?}")]
    KeyNotFound(String),

    /// The key under the alias was created for a different mode.
    #[error("key {0:?} does not support this operation")]
    WrongKeyMode(String),

    /// A cryptographic primitive failed (e.g. sealed data failed to open).
    #[error("cryptographic operation failed")]
    Crypto,
}
