use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::SystemTime;

use futures::future::{FutureExt, LocalBoxFuture, Shared};
use log::{debug, info, warn};

use crate::assertion;
use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::error::Error;
use crate::events::{AccountEvent, EventSink};
use crate::keys::{Certificate, Credentials, KeyPair};
use crate::remote::CertificateSigner;

#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub uid: String,
    pub email: String,
    pub session_token: String,
    pub verified: bool,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("uid", &self.uid)
            .field("email", &self.email)
            .field("verified", &self.verified)
            .finish_non_exhaustive()
    }
}

type PendingCredentials = Shared<LocalBoxFuture<'static, Result<Rc<Credentials>, Error>>>;

struct InFlight {
    generation: u64,
    pending: PendingCredentials,
}

#[derive(Default)]
struct CacheState {
    session: Option<Session>,
    // Bumped on every sign-in and sign-out. Generations started under an
    // older epoch are discarded when they settle.
    epoch: u64,
    next_generation: u64,
    credentials: Option<Rc<Credentials>>,
    in_flight: Option<InFlight>,
}

impl CacheState {
    fn reset(&mut self, session: Option<Session>) {
        self.session = session;
        self.epoch += 1;
        self.credentials = None;
        self.in_flight = None;
    }
}

/// Issues audience scoped assertions for the signed-in session.
///
/// The keypair and certificate are generated lazily and reused until either
/// expires. Callers that arrive while a generation is in flight wait on that
/// generation instead of starting another, so the signer is asked exactly once
/// per generation no matter how many assertions are requested.
///
/// The cache is single threaded; clones share state.
#[derive(Clone)]
pub struct CredentialCache {
    config: CacheConfig,
    clock: Rc<dyn Clock>,
    signer: Rc<dyn CertificateSigner>,
    events: EventSink,
    state: Rc<RefCell<CacheState>>,
}

impl fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("CredentialCache")
            .field("config", &self.config)
            .field("session", &state.session)
            .field("credentials", &state.credentials)
            .field("generating", &state.in_flight.is_some())
            .finish()
    }
}

impl CredentialCache {
    pub fn new(
        config: CacheConfig,
        clock: Rc<dyn Clock>,
        signer: Rc<dyn CertificateSigner>,
        events: EventSink,
    ) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            signer,
            events,
            state: Default::default(),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    /// Replaces the signed-in identity. Anything cached for the previous one
    /// is dropped.
    pub fn sign_in(&self, session: Session) {
        debug!("Signing in {}", session.uid);
        self.state.borrow_mut().reset(Some(session));
    }

    /// Discards the session and all cached material. A generation still in
    /// flight is abandoned: its result will be ignored.
    pub fn sign_out(&self) -> Option<Session> {
        let mut state = self.state.borrow_mut();
        let session = state.session.take();
        if state.in_flight.is_some() {
            info!("Abandoning in-flight certificate generation");
        }
        state.reset(None);
        session
    }

    pub fn signed_in_user(&self) -> Option<Session> {
        self.state.borrow().session.clone()
    }

    /// Marks the session verified if `uid` is still the signed-in user.
    pub fn mark_verified(&self, uid: &str) -> bool {
        match self.state.borrow_mut().session.as_mut() {
            Some(session) if session.uid == uid => {
                session.verified = true;
                true
            }
            _ => false,
        }
    }

    pub fn credentials(&self) -> Option<Rc<Credentials>> {
        self.state.borrow().credentials.clone()
    }

    pub fn is_generating(&self) -> bool {
        self.state.borrow().in_flight.is_some()
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.state.borrow().epoch
    }

    pub(crate) fn now(&self) -> SystemTime {
        self.clock.now()
    }

    /// Builds a fresh assertion for `audience`, expiring `assertion_lifetime`
    /// from now. Suspends only if the keypair or certificate must be regenerated.
    pub async fn get_assertion(&self, audience: &str) -> Result<String, Error> {
        assertion::validate_audience(audience)?;
        let credentials = self.ensure_credentials().await?;
        let expires_at = self.clock.now() + self.config.assertion_lifetime();
        Ok(assertion::build(&credentials, audience, expires_at))
    }

    /// Returns usable credentials, generating them (or joining a generation
    /// already in flight) when none are valid.
    pub async fn ensure_credentials(&self) -> Result<Rc<Credentials>, Error> {
        loop {
            if let Some(settled) = self.join_or_generate().await {
                return settled;
            }
        }
    }

    // One round of `ensure_credentials`. Yields `None` when the generation it
    // waited on came back already expired, in which case the caller retries.
    async fn join_or_generate(&self) -> Option<Result<Rc<Credentials>, Error>> {
        let (epoch, generation, pending) = {
            let mut state = self.state.borrow_mut();
            let (uid, session_token) = match &state.session {
                None => return Some(Err(Error::NoSession)),
                Some(session) if !session.verified => return Some(Err(Error::Unverified)),
                Some(session) => (session.uid.clone(), session.session_token.clone()),
            };

            let now = self.clock.now();
            if let Some(credentials) = &state.credentials {
                if credentials.is_valid_at(now) {
                    return Some(Ok(credentials.clone()));
                }
                debug!("Cached credentials for {} expired", uid);
            }

            let joined = state
                .in_flight
                .as_ref()
                .map(|in_flight| (in_flight.generation, in_flight.pending.clone()));
            if let Some((generation, pending)) = joined {
                debug!("Joining in-flight generation {}", generation);
                (state.epoch, generation, pending)
            } else {
                if self.signer.is_offline() {
                    warn!("Cannot refresh credentials for {}: offline", uid);
                    state.credentials = None;
                    return Some(Err(Error::Offline));
                }
                state.next_generation += 1;
                let generation = state.next_generation;
                info!("Generating keypair and certificate for {} (generation {})", uid, generation);
                let pending = generate(self.signer.clone(), self.config.clone(), session_token, now)
                    .boxed_local()
                    .shared();
                state.credentials = None;
                state.in_flight = Some(InFlight {
                    generation,
                    pending: pending.clone(),
                });
                (state.epoch, generation, pending)
            }
        };

        let outcome = pending.await;

        let generated_for = {
            let mut state = self.state.borrow_mut();
            if state.epoch != epoch {
                debug!("Discarding generation {} settled after sign-out", generation);
                return Some(Err(Error::NoSession));
            }
            // The first waiter to resume settles the generation for everyone
            let owns = state
                .in_flight
                .as_ref()
                .map_or(false, |in_flight| in_flight.generation == generation);
            if let Ok(credentials) = &outcome {
                if !credentials.is_valid_at(self.clock.now()) {
                    warn!("Generation {} settled after its certificate expired", generation);
                    if owns {
                        state.in_flight = None;
                    }
                    return None;
                }
            }
            if owns {
                state.in_flight = None;
                match &outcome {
                    Ok(credentials) => {
                        state.credentials = Some(credentials.clone());
                        state.session.as_ref().map(|s| s.uid.clone())
                    }
                    Err(e) => {
                        warn!("Generation {} failed: {}", generation, e);
                        None
                    }
                }
            } else {
                None
            }
        };

        if let Some(uid) = generated_for {
            self.events.emit(AccountEvent::AssertionGenerated { uid });
        }
        Some(outcome)
    }
}

// Both lifetimes run from the instant the generation was triggered.
async fn generate(
    signer: Rc<dyn CertificateSigner>,
    config: CacheConfig,
    session_token: String,
    triggered_at: SystemTime,
) -> Result<Rc<Credentials>, Error> {
    let key_pair = KeyPair::generate(triggered_at + config.key_lifetime());
    let blob = signer
        .sign(&session_token, &key_pair.serialized_public_key(), config.cert_lifetime())
        .await?;
    if !assertion::is_valid_certificate_blob(&blob) {
        return Err(Error::SigningFailed("signer returned a malformed certificate".into()));
    }
    Ok(Rc::new(Credentials {
        key_pair,
        certificate: Certificate {
            blob,
            valid_until: triggered_at + config.cert_lifetime(),
        },
    }))
}
