//! Certificate override store and credential cache.
//!
//! Two independent pieces live here:
//!
//! - [`OverrideStore`]: operator decisions to accept a certificate on a host
//!   and port despite validation errors, with port `-1` and `443` treated as
//!   one key. [`OverrideFile`] persists the permanent ones.
//! - [`CredentialCache`]: a keypair and certificate with independent expiry,
//!   used to issue short lived audience scoped assertions. Regeneration is
//!   lazy and concurrent callers share one in-flight generation.

pub mod account;
pub mod assertion;
pub mod clock;
pub mod config;
pub mod credentials;
mod error;
pub mod events;
pub mod fingerprint;
pub mod keys;
pub mod overrides;
pub mod remote;
pub mod storage;

pub use account::AccountManager;
pub use assertion::{AssertionClaims, AssertionError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AccountConfig, CacheConfig, OverrideConfig, DEFAULT_ACCOUNT_CONFIG, DEFAULT_CACHE_CONFIG};
pub use credentials::{CredentialCache, Session};
pub use error::Error;
pub use events::{AccountEvent, EventSink, SubscriptionId};
pub use fingerprint::{CertIdentity, Fingerprint};
pub use keys::{Certificate, Credentials, KeyPair};
pub use overrides::{
    canonical_port, FingerprintPolicy, MatchedOverride, OverrideBits, OverrideEntry, OverrideStore,
};
pub use remote::{AccountClient, CertificateSigner, EmailStatus, RemoteError};
pub use storage::{OverrideFile, StorageError};
