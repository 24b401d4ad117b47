use std::time::Duration;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::overrides::FingerprintPolicy;

const HOUR: u64 = 60 * 60;
const DAY: u64 = 24 * HOUR;

pub static DEFAULT_CACHE_CONFIG: Lazy<CacheConfig> = Lazy::new(|| CacheConfig {
    key_lifetime_secs: 30 * DAY,
    cert_lifetime_secs: 6 * HOUR,
    assertion_lifetime_secs: HOUR,
});

pub static DEFAULT_ACCOUNT_CONFIG: Lazy<AccountConfig> = Lazy::new(|| AccountConfig {
    poll_interval_ms: 5_000,
    poll_timeout_secs: HOUR,
});

/// Lifetimes of the cached credential material.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    pub key_lifetime_secs: u64,
    pub cert_lifetime_secs: u64,
    pub assertion_lifetime_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        DEFAULT_CACHE_CONFIG.clone()
    }
}

impl CacheConfig {
    pub fn key_lifetime(&self) -> Duration {
        Duration::from_secs(self.key_lifetime_secs)
    }
    pub fn cert_lifetime(&self) -> Duration {
        Duration::from_secs(self.cert_lifetime_secs)
    }
    pub fn assertion_lifetime(&self) -> Duration {
        Duration::from_secs(self.assertion_lifetime_secs)
    }

    /// Lifetimes must be non-zero and ordered assertion < certificate <= key.
    pub fn validate(&self) -> Result<(), Error> {
        if self.assertion_lifetime_secs == 0 {
            return Err(Error::InvalidParameter("assertion lifetime is zero".into()));
        }
        if self.assertion_lifetime_secs >= self.cert_lifetime_secs {
            return Err(Error::InvalidParameter(
                "assertion lifetime must be shorter than the certificate lifetime".into(),
            ));
        }
        if self.cert_lifetime_secs > self.key_lifetime_secs {
            return Err(Error::InvalidParameter(
                "certificate lifetime must not exceed the key lifetime".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(default)]
pub struct OverrideConfig {
    pub fingerprint_policy: FingerprintPolicy,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AccountConfig {
    pub poll_interval_ms: u64,
    pub poll_timeout_secs: u64,
}

impl Default for AccountConfig {
    fn default() -> Self {
        DEFAULT_ACCOUNT_CONFIG.clone()
    }
}

impl AccountConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}
