use std::fmt;
use std::time::SystemTime;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;

pub const KEY_ALGORITHM: &str = "Ed25519";

#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    pub valid_until: SystemTime,
}

impl KeyPair {
    pub fn generate(valid_until: SystemTime) -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng), valid_until)
    }

    pub fn from_signing_key(signing_key: SigningKey, valid_until: SystemTime) -> Self {
        Self {
            signing_key,
            valid_until,
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// The form sent to the certificate signer.
    pub fn serialized_public_key(&self) -> String {
        serde_json::json!({
            "algorithm": KEY_ALGORITHM,
            "publicKey": URL_SAFE_NO_PAD.encode(self.verifying_key().as_bytes()),
        })
        .to_string()
    }

    pub(crate) fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }
}

// Never print the secret half
impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &URL_SAFE_NO_PAD.encode(self.verifying_key().as_bytes()))
            .field("valid_until", &self.valid_until)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub blob: String,
    pub valid_until: SystemTime,
}

/// A keypair and the certificate issued for it. Replaced as a unit.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub key_pair: KeyPair,
    pub certificate: Certificate,
}

impl Credentials {
    pub fn is_valid_at(&self, now: SystemTime) -> bool {
        now < self.certificate.valid_until && now < self.key_pair.valid_until
    }
}
