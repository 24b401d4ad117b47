use std::rc::Rc;

use async_io::Timer;
use log::{debug, info, warn};

use crate::config::AccountConfig;
use crate::credentials::{CredentialCache, Session};
use crate::error::Error;
use crate::events::{AccountEvent, EventSink};
use crate::remote::AccountClient;

/// Session lifecycle around a [`CredentialCache`]: sign-in, verification
/// polling and sign-out, each announced on the cache's [`EventSink`].
#[derive(Debug, Clone)]
pub struct AccountManager {
    config: AccountConfig,
    cache: CredentialCache,
    client: Rc<dyn AccountClient>,
}

impl AccountManager {
    pub fn new(config: AccountConfig, cache: CredentialCache, client: Rc<dyn AccountClient>) -> Self {
        Self {
            config,
            cache,
            client,
        }
    }

    pub fn cache(&self) -> &CredentialCache {
        &self.cache
    }

    pub fn events(&self) -> &EventSink {
        self.cache.events()
    }

    pub fn signed_in_user(&self) -> Option<Session> {
        self.cache.signed_in_user()
    }

    /// Any poll running for a previous user stops at its next check.
    pub fn set_signed_in_user(&self, session: Session) {
        let uid = session.uid.clone();
        info!("{} signed in (verified: {})", uid, session.verified);
        self.cache.sign_in(session);
        self.events().emit(AccountEvent::LoggedIn { uid });
    }

    /// Polls the account server until the signed-in user is verified.
    ///
    /// Fails with [`Error::VerificationTimeout`] once the configured timeout
    /// elapses, or [`Error::NoSession`] if the user signs out (or another user
    /// signs in) meanwhile. Transient server errors are logged and retried.
    pub async fn poll_verification(&self) -> Result<Session, Error> {
        let session = self.signed_in_user().ok_or(Error::NoSession)?;
        if session.verified {
            return Ok(session);
        }
        let epoch = self.cache.epoch();
        let deadline = self.cache.now() + self.config.poll_timeout();

        loop {
            if self.cache.epoch() != epoch {
                debug!("Verification poll for {} aborted", session.uid);
                return Err(Error::NoSession);
            }
            match self.client.recovery_email_status(&session.session_token).await {
                Ok(status) if status.verified => {
                    if self.cache.epoch() != epoch || !self.cache.mark_verified(&session.uid) {
                        return Err(Error::NoSession);
                    }
                    info!("{} verified", session.uid);
                    self.events().emit(AccountEvent::Verified {
                        uid: session.uid.clone(),
                    });
                    return Ok(Session {
                        verified: true,
                        ..session
                    });
                }
                Ok(_) => debug!("{} not verified yet", session.uid),
                Err(e) => warn!("Checking verification status failed: {}", e),
            }
            if self.cache.now() >= deadline {
                warn!("Gave up waiting for {} to verify", session.uid);
                return Err(Error::VerificationTimeout);
            }
            Timer::after(self.config.poll_interval()).await;
        }
    }

    pub async fn get_assertion(&self, audience: &str) -> Result<String, Error> {
        self.cache.get_assertion(audience).await
    }

    /// Signs out locally first, then tells the server. A failure to reach the
    /// server doesn't keep the user signed in.
    pub async fn sign_out(&self) -> Option<Session> {
        let session = self.cache.sign_out();
        if let Some(session) = &session {
            if let Err(e) = self.client.sign_out(&session.session_token).await {
                warn!("Remote sign out failed: {}", e);
            }
        }
        self.events().emit(AccountEvent::LoggedOut);
        session
    }
}
