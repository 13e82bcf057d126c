//! Controller stages and failure dispositions.

use serde::Serialize;

use crate::backend::BackendError;
use crate::keystore::KeyError;
use crate::presence::DenialReason;

/// Which proof channel the controller is currently offering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthStage {
    /// Biometric presence + device signature.
    Biometric,
    /// Shared-secret password.
    PasswordFallback,
    /// The device key was invalidated. A password is required, after which
    /// a new key can be generated and enrolled.
    ReEnrollPrompt,
}

/// What the controller does about a failure.
///
/// Every failure maps to exactly one disposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Stay on the current channel; the user may try again.
    Retry,
    /// Move to the password channel.
    Fallback,
    /// The key is gone for good; prompt for re-enrollment.
    ReEnroll,
    /// End the session.
    Fatal,
}

impl From<&KeyError> for Disposition {
    fn from(err: &KeyError) -> Self {
        match err {
            KeyError::NotAuthenticated => Self::Retry,
            KeyError::KeyInvalidated => Self::ReEnroll,
            KeyError::DeviceNotSecure => Self::Fallback,
            // A missing key has nothing to re-enroll from; the caller must
            // enroll the device first.
            KeyError::KeyNotFound(_)
            | KeyError::KeyStoreUnavailable
            | KeyError::WrongKeyMode(_)
            | KeyError::Crypto => Self::Fatal,
        }
    }
}

impl From<DenialReason> for Disposition {
    fn from(reason: DenialReason) -> Self {
        if reason.is_retryable() {
            Self::Retry
        } else {
            Self::Fallback
        }
    }
}

impl From<&BackendError> for Disposition {
    fn from(_: &BackendError) -> Self {
        Self::Fatal
    }
}
