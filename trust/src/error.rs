use crate::remote::RemoteError;

/// Failures surfaced by the credential cache and the account manager.
///
/// Values are cheap to clone: every caller attached to the same in-flight
/// generation receives its own copy of the same failure.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("Network is offline and no usable certificate is cached")]
    Offline,
    #[error("Certificate signing failed: {0}")]
    SigningFailed(String),
    #[error("No signed-in session")]
    NoSession,
    #[error("The signed-in account is not verified")]
    Unverified,
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Timed out waiting for account verification")]
    VerificationTimeout,
}

impl From<RemoteError> for Error {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Offline => Error::Offline,
            RemoteError::Rejected(msg) => Error::SigningFailed(msg),
        }
    }
}
