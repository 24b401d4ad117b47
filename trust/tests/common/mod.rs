#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures::channel::oneshot;
use futures::executor::LocalPool;
use futures::future::RemoteHandle;
use futures::task::LocalSpawnExt;
use trust::{
    CacheConfig, CertificateSigner, CredentialCache, Error, EventSink, ManualClock, RemoteError,
    Session,
};

pub const HOUR: Duration = Duration::from_secs(60 * 60);
pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Mon, 13 Jan 2014 21:45:06 GMT
pub fn start() -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(1_389_649_506_000)
}

pub fn millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).unwrap().as_millis() as u64
}

/// A signer whose requests stay pending until the test resolves them, oldest first.
#[derive(Debug, Default)]
pub struct DeferredSigner {
    calls: RefCell<Vec<(String, String)>>,
    waiting: RefCell<VecDeque<oneshot::Sender<Result<String, RemoteError>>>>,
}

impl DeferredSigner {
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.borrow().clone()
    }
    pub fn pending(&self) -> usize {
        self.waiting.borrow().len()
    }
    pub fn resolve(&self, result: Result<&str, RemoteError>) {
        let tx = self
            .waiting
            .borrow_mut()
            .pop_front()
            .expect("no signing request is pending");
        tx.send(result.map(str::to_string))
            .expect("signing request was dropped");
    }
}

#[async_trait(?Send)]
impl CertificateSigner for DeferredSigner {
    async fn sign(
        &self,
        session_token: &str,
        public_key: &str,
        _lifetime: Duration,
    ) -> Result<String, RemoteError> {
        self.calls
            .borrow_mut()
            .push((session_token.to_string(), public_key.to_string()));
        let (tx, rx) = oneshot::channel();
        self.waiting.borrow_mut().push_back(tx);
        rx.await.unwrap_or(Err(RemoteError::Offline))
    }
}

pub struct Harness {
    pub pool: LocalPool,
    pub cache: CredentialCache,
    pub signer: Rc<DeferredSigner>,
    pub clock: ManualClock,
    pub events: EventSink,
}

impl Harness {
    /// Key 30 days, certificate 6 hours, assertion 1 hour.
    pub fn new() -> Self {
        let config = CacheConfig {
            key_lifetime_secs: 30 * DAY.as_secs(),
            cert_lifetime_secs: 6 * HOUR.as_secs(),
            assertion_lifetime_secs: HOUR.as_secs(),
        };
        let clock = ManualClock::new(start());
        let signer = Rc::new(DeferredSigner::default());
        let events = EventSink::new();
        let cache =
            CredentialCache::new(config, Rc::new(clock.clone()), signer.clone(), events.clone())
                .unwrap();
        Self {
            pool: LocalPool::new(),
            cache,
            signer,
            clock,
            events,
        }
    }

    pub fn signed_in(self, uid: &str) -> Self {
        self.cache.sign_in(session(uid));
        self
    }

    /// Starts an assertion request and runs it as far as it can go.
    pub fn request(&mut self, audience: &str) -> RemoteHandle<Result<String, Error>> {
        let cache = self.cache.clone();
        let audience = audience.to_string();
        let handle = self
            .pool
            .spawner()
            .spawn_local_with_handle(async move { cache.get_assertion(&audience).await })
            .unwrap();
        self.pool.run_until_stalled();
        handle
    }

    pub fn finish(&mut self, handle: RemoteHandle<Result<String, Error>>) -> Result<String, Error> {
        self.pool.run_until(handle)
    }
}

pub fn session(uid: &str) -> Session {
    Session {
        uid: uid.to_string(),
        email: format!("{}@example.com", uid),
        session_token: format!("{}-sessionToken", uid),
        verified: true,
    }
}
