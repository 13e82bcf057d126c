//! Verification backend error types.

/// Transport-level failures talking to a verification backend.
///
/// A negative verification is not an error; it is `Ok(false)`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum BackendError {
    /// The backend could not be reached or did not answer.
    #[error("verification backend unreachable: {0}")]
    Unreachable(String),
}
