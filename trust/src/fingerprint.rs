use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
pub enum FingerprintError {
    #[error("Fingerprint must be 32 colon separated hex bytes")]
    BadLength,
    #[error("Fingerprint contains a non hex byte")]
    BadByte,
}

/// SHA-256 digest of a DER encoded certificate.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(der: &[u8]) -> Self {
        Self(Sha256::digest(der).into())
    }
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

// AB:CD:...:EF, the form certificate viewers display
impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self)
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 32];
        let mut parts = s.split(':');
        for slot in out.iter_mut() {
            let part = parts.next().ok_or(FingerprintError::BadLength)?;
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(FingerprintError::BadByte);
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| FingerprintError::BadByte)?;
        }
        if parts.next().is_some() {
            return Err(FingerprintError::BadLength);
        }
        Ok(Self(out))
    }
}

/// Anything that can name the certificate it carries.
pub trait CertIdentity {
    fn fingerprint(&self) -> Fingerprint;
}

impl CertIdentity for [u8] {
    fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self)
    }
}

impl CertIdentity for Vec<u8> {
    fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self)
    }
}

impl CertIdentity for Fingerprint {
    fn fingerprint(&self) -> Fingerprint {
        *self
    }
}
