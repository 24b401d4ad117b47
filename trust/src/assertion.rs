//! Audience scoped assertions.
//!
//! An assertion is `certificate~header.payload.signature`: the certificate
//! blob issued for the signing key, then a compact token whose payload carries
//! the audience and an expiry in milliseconds since the Unix epoch. Header,
//! payload and signature are unpadded url-safe base64.

use std::time::SystemTime;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::clock::unix_millis;
use crate::error::Error;
use crate::keys::{Credentials, KEY_ALGORITHM};

const CERT_SEPARATOR: char = '~';

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AssertionClaims {
    #[serde(rename = "aud")]
    pub audience: String,
    #[serde(rename = "exp")]
    pub expires_at: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
struct Header {
    alg: String,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AssertionError {
    #[error("Assertion is not structured as cert~header.payload.signature")]
    Malformed,
    #[error("Assertion segment is not valid: {0}")]
    Decode(String),
    #[error("Unsupported assertion algorithm {0:?}")]
    Algorithm(String),
    #[error("Assertion signature does not verify")]
    BadSignature,
}

pub fn validate_audience(audience: &str) -> Result<(), Error> {
    if audience.trim().is_empty() {
        return Err(Error::InvalidParameter("audience is empty".into()));
    }
    if audience.contains(CERT_SEPARATOR) || audience.chars().any(char::is_control) {
        return Err(Error::InvalidParameter(format!("audience {:?} has reserved characters", audience)));
    }
    Ok(())
}

pub(crate) fn is_valid_certificate_blob(blob: &str) -> bool {
    !blob.is_empty() && !blob.contains(CERT_SEPARATOR)
}

fn encode_json(value: &serde_json::Value) -> String {
    URL_SAFE_NO_PAD.encode(value.to_string())
}

pub fn build(credentials: &Credentials, audience: &str, expires_at: SystemTime) -> String {
    let header = encode_json(&serde_json::json!({ "alg": KEY_ALGORITHM }));
    let payload = encode_json(&serde_json::json!({
        "aud": audience,
        "exp": unix_millis(expires_at),
    }));
    let signing_input = format!("{}.{}", header, payload);
    let signature = credentials.key_pair.sign(signing_input.as_bytes());
    format!(
        "{}{}{}.{}",
        credentials.certificate.blob,
        CERT_SEPARATOR,
        signing_input,
        URL_SAFE_NO_PAD.encode(signature.to_bytes())
    )
}

fn decode_segment<T: for<'de> Deserialize<'de>>(segment: &str) -> Result<T, AssertionError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AssertionError::Decode(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| AssertionError::Decode(e.to_string()))
}

/// Splits an assertion, checks its signature against `key` and returns the
/// certificate blob with the claims. Expiry is left to the relying party.
pub fn verify(token: &str, key: &VerifyingKey) -> Result<(String, AssertionClaims), AssertionError> {
    let (certificate, signed) = token
        .split_once(CERT_SEPARATOR)
        .ok_or(AssertionError::Malformed)?;
    let (signing_input, signature) = signed.rsplit_once('.').ok_or(AssertionError::Malformed)?;
    let (header, payload) = signing_input.split_once('.').ok_or(AssertionError::Malformed)?;

    let header: Header = decode_segment(header)?;
    if header.alg != KEY_ALGORITHM {
        return Err(AssertionError::Algorithm(header.alg));
    }

    let signature: [u8; 64] = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|e| AssertionError::Decode(e.to_string()))?
        .try_into()
        .map_err(|_| AssertionError::BadSignature)?;
    key.verify(signing_input.as_bytes(), &Signature::from_bytes(&signature))
        .map_err(|_| AssertionError::BadSignature)?;

    Ok((certificate.to_string(), decode_segment(payload)?))
}
