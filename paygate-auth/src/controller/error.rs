//! Session error types.

use super::AuthStage;
use crate::transaction::TransactionError;

/// Failures that end or refuse an authentication attempt.
///
/// Platform and transport errors are sanitized into these variants; raw
/// key store or backend errors never reach the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum SessionError {
    /// The secure key store cannot be used. Fatal to the session.
    #[error("key store unavailable")]
    KeyStoreUnavailable,

    /// The verification backend cannot be reached. Fatal to the session.
    #[error("verification backend unreachable")]
    BackendUnreachable,

    /// Keys cannot be created without a secure lock screen.
    #[error("device has no secure lock screen")]
    DeviceNotSecure,

    /// No device key exists yet. Run
    /// [`AuthController::enroll_device`](super::AuthController::enroll_device)
    /// before purchasing.
    #[error("device not enrolled")]
    NotEnrolled,

    /// The backend refused the enrollment.
    #[error("enrollment rejected")]
    EnrollmentRejected,

    /// The requested action is not offered in the current stage.
    #[error("not available in stage {stage:?}")]
    WrongStage { stage: AuthStage },

    /// The configured user id cannot form a transaction.
    #[error(transparent)]
    InvalidTransaction(#[from] TransactionError),
}
