use std::time::Duration;

use async_trait::async_trait;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Network is offline")]
    Offline,
    #[error("Request rejected: {0}")]
    Rejected(String),
}

/// Signs a freshly generated public key, returning an opaque certificate.
#[async_trait(?Send)]
pub trait CertificateSigner: std::fmt::Debug {
    /// Checked before a regeneration is started. An offline signer is never called.
    fn is_offline(&self) -> bool {
        false
    }
    async fn sign(
        &self,
        session_token: &str,
        public_key: &str,
        lifetime: Duration,
    ) -> Result<String, RemoteError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmailStatus {
    pub verified: bool,
}

/// The account server, as far as the session lifecycle needs it.
#[async_trait(?Send)]
pub trait AccountClient: std::fmt::Debug {
    async fn recovery_email_status(&self, session_token: &str) -> Result<EmailStatus, RemoteError>;
    async fn sign_out(&self, session_token: &str) -> Result<(), RemoteError>;
}
