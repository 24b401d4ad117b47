use std::path::PathBuf;

use once_cell::sync::Lazy;

pub static DEFAULT_DATA_DIR: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join(".certwarden")
});

pub const CONFIG_FILE: &str = "config.toml";
pub const OVERRIDES_FILE: &str = "cert_override.txt";
