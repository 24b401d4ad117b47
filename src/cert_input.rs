use std::path::Path;

use anyhow::{bail, Context};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use trust::{CertIdentity, Fingerprint};

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

/// The store never sees unicode hostnames: they are converted to their
/// ASCII (punycode) form here.
pub fn ascii_host(host: &str) -> anyhow::Result<String> {
    let parsed = url::Host::parse(host).with_context(|| format!("parsing host {:?}", host))?;
    Ok(parsed.to_string())
}

fn pem_to_der(pem: &str) -> anyhow::Result<Vec<u8>> {
    let start = pem.find(PEM_BEGIN).context("missing BEGIN CERTIFICATE line")? + PEM_BEGIN.len();
    let end = pem[start..].find(PEM_END).context("missing END CERTIFICATE line")? + start;
    let body: String = pem[start..end].split_whitespace().collect();
    STANDARD.decode(body).context("decoding PEM body")
}

/// Accepts a fingerprint (`AB:CD:...`) or a path to a PEM or DER certificate.
pub async fn read_fingerprint(arg: &str) -> anyhow::Result<Fingerprint> {
    if let Ok(fp) = arg.parse::<Fingerprint>() {
        return Ok(fp);
    }
    let path = Path::new(arg);
    if !path.exists() {
        bail!("{:?} is neither a fingerprint nor a certificate file", arg);
    }
    let bytes = async_fs::read(path)
        .await
        .with_context(|| format!("reading certificate at {:?}", path))?;
    let der = match std::str::from_utf8(&bytes) {
        Ok(text) if text.contains(PEM_BEGIN) => pem_to_der(text)?,
        _ => bytes,
    };
    Ok(der.fingerprint())
}
