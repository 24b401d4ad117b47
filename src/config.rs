use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use trust::{FingerprintPolicy, OverrideConfig};

pub static DEFAULT_CONFIG: Lazy<Config> = Lazy::new(|| Config {
    overrides: OverrideConfig {
        fingerprint_policy: FingerprintPolicy::Advisory,
    },
});

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub overrides: OverrideConfig,
}
