use std::fmt;

use anyhow::{bail, Context, Result};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, PKCS_RSA_SHA256};
use rsa::{
    pkcs8::{EncodePrivateKey, LineEnding},
    RsaPrivateKey,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_KEY_BITS: usize = 2048;
const MAX_KEY_BITS: usize = 8192;

/// Distinguished name placed in the certificate signing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[builder(on(String, into))]
pub struct CsrSubject {
    pub common_name: String,
    pub country: Option<String>,
    pub state: Option<String>,
    pub locality: Option<String>,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
}

impl CsrSubject {
    pub fn validate(&self) -> Result<()> {
        if self.common_name.trim().is_empty() {
            bail!("subject common name must not be empty");
        }
        if let Some(country) = non_empty(&self.country) {
            if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
                bail!("subject country must be a two letter code, got {country:?}");
            }
        }
        Ok(())
    }

    fn distinguished_name(&self) -> DistinguishedName {
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, self.common_name.trim());
        let optional = [
            (DnType::CountryName, &self.country),
            (DnType::StateOrProvinceName, &self.state),
            (DnType::LocalityName, &self.locality),
            (DnType::OrganizationName, &self.organization),
            (DnType::OrganizationalUnitName, &self.organizational_unit),
        ];
        for (ty, value) in optional {
            if let Some(value) = non_empty(value) {
                dn.push(ty, value);
            }
        }
        dn
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// A signing request together with the private key it was signed with.
#[derive(Clone)]
pub struct GeneratedCsr {
    pub csr_pem: String,
    pub key_pem: String,
}

impl fmt::Debug for GeneratedCsr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedCsr")
            .field("csr_pem", &self.csr_pem)
            .field("key_pem", &"<redacted>")
            .finish()
    }
}

/// Generate a fresh RSA key pair and a PEM encoded CSR for `subject`.
pub fn generate_csr(subject: &CsrSubject, key_bits: usize) -> Result<GeneratedCsr> {
    subject.validate()?;
    if !(DEFAULT_KEY_BITS..=MAX_KEY_BITS).contains(&key_bits) {
        bail!("key size must be between {DEFAULT_KEY_BITS} and {MAX_KEY_BITS} bits, got {key_bits}");
    }

    debug!(key_bits, "generating RSA key pair");
    let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), key_bits)
        .context("failed to generate RSA key")?;
    let key_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .context("failed to encode private key")?
        .to_string();
    let key = KeyPair::from_pem_and_sign_algo(&key_pem, &PKCS_RSA_SHA256)
        .context("failed to load private key")?;

    let common_name = subject.common_name.trim().to_string();
    let mut params = CertificateParams::new(vec![common_name])
        .context("failed to create certificate params")?;
    params.distinguished_name = subject.distinguished_name();
    let csr_pem = params
        .serialize_request(&key)
        .context("failed to serialize certificate request")?
        .pem()
        .context("failed to encode certificate request")?;
    Ok(GeneratedCsr { csr_pem, key_pem })
}
