// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Endorsement certificate chain parsing and trust validation.
//!
//! A chain is ordered leaf first: index 0 is the VCEK, the last entry is
//! the self-signed root (ARK). Validation fails closed: an empty chain or
//! any single unverifiable link invalidates the whole chain.

use openssl::pkey::{PKey, Public};
pub use openssl::x509::X509;
use thiserror::Error;

/// AMD's published root signing key for the Milan VCEK chain of trust.
pub const AMD_ROOT_PUBLIC_KEY_PEM: &str = "-----BEGIN PUBLIC KEY-----\n\
MIICIjANBgkqhkiG9w0BAQEFAAOCAg8AMIICCgKCAgEA0Ld52RJOdeiJlqK2JdsV\n\
mD7FktuotWwX1fNgW41XY9Xz1HEhSUmhLz9Cu9DHRlvgJSNxbeYYsnJfvyjx1MfU\n\
0V5tkKiU1EesNFta1kTA0szNisdYc9isqk7mXT5+KfGRbfc4V/9zRIcE8jlHN61S\n\
1ju8X93+6dxDUrG2SzxqJ4BhqyYmUDruPXJSX4vUc01P7j98MpqOS95rORdGHeI5\n\
2Naz5m2B+O+vjsC060d37jY9LFeuOP4Meri8qgfi2S5kKqg/aF6aPtuAZQVR7u3K\n\
FYXP59XmJgtcog05gmI0T/OitLhuzVvpZcLph0odh/1IPXqx3+MnjD97A7fXpqGd\n\
/y8KxX7jksTEzAOgbKAeam3lm+3yKIcTYMlsRMXPcjNbIvmsBykD//xSniusuHBk\n\
gnlENEWx1UcbQQrs+gVDkuVPhsnzIRNgYvM48Y+7LGiJYnrmE8xcrexekBxrva2V\n\
9TJQqnN3Q53kt5viQi3+gCfmkwC0F0tirIZbLkXPrPwzZ0M9eNxhIySb2npJfgnq\n\
z55I0u33wh4r0ZNQeTGfw03MBUtyuzGesGkcw+loqMaq1qR4tjGbPYxCvpCq7+Og\n\
pCCoMNit2uLo9M18fHz10lOMT8nWAUvRZFzteXCm+7PHdYPlmQwUw3LvenJ/ILXo\n\
QPHfbkH0CyPfhl1jWhJFZasCAwEAAQ==\n\
-----END PUBLIC KEY-----\n";

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("openssl error")]
    OpenSsl(#[from] openssl::error::ErrorStack),
    #[error("no certificate found in PEM input")]
    NoCertificate,
}

#[derive(Error, Debug)]
pub enum ValidateError {
    #[error("openssl error")]
    OpenSsl(#[from] openssl::error::ErrorStack),
    #[error("certificate chain is empty")]
    EmptyChain,
    #[error("certificate {0} is not signed by its issuer")]
    BrokenLink(usize),
    #[error("root certificate is not self-signed")]
    RootNotSelfSigned,
    #[error("root certificate is not signed by the trusted key")]
    RootKeyMismatch,
}

/// Load the fixed trusted AMD root public key.
pub fn amd_root_public_key() -> Result<PKey<Public>, ParseError> {
    let key = PKey::public_key_from_pem(AMD_ROOT_PUBLIC_KEY_PEM.as_bytes())?;
    Ok(key)
}

pub use crate::endorsements::unescape_pem;

/// An ordered certificate chain, leaf (VCEK) first, root last.
#[derive(Debug, Default)]
pub struct CertChain {
    certs: Vec<X509>,
}

impl CertChain {
    pub fn new() -> Self {
        Self { certs: Vec::new() }
    }

    /// Parse one PEM certificate (possibly JSON-escaped) and append it.
    pub fn add_pem(&mut self, pem: &str) -> Result<(), ParseError> {
        let unescaped = unescape_pem(pem);
        let cert = X509::from_pem(unescaped.as_bytes())?;
        self.certs.push(cert);
        Ok(())
    }

    /// Parse one or more concatenated PEM certificates (possibly
    /// JSON-escaped) and append them in order.
    pub fn add_pem_chain(&mut self, pem: &str) -> Result<(), ParseError> {
        let unescaped = unescape_pem(pem);
        let certs = X509::stack_from_pem(unescaped.as_bytes())?;
        if certs.is_empty() {
            return Err(ParseError::NoCertificate);
        }
        self.certs.extend(certs);
        Ok(())
    }

    /// Build a chain from an ordered list of PEM blocks, leaf first.
    pub fn from_pem_blocks(blocks: &[&str]) -> Result<Self, ParseError> {
        let mut chain = Self::new();
        for block in blocks {
            chain.add_pem(block)?;
        }
        Ok(chain)
    }

    pub fn from_certs(certs: Vec<X509>) -> Self {
        Self { certs }
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    /// The leaf (VCEK) certificate, if the chain is non-empty.
    pub fn leaf(&self) -> Option<&X509> {
        self.certs.first()
    }

    /// Check that every certificate is signed by the next one in the
    /// chain and that the last certificate is self-signed.
    pub fn validate(&self) -> Result<(), ValidateError> {
        if self.certs.is_empty() {
            return Err(ValidateError::EmptyChain);
        }
        for (i, pair) in self.certs.windows(2).enumerate() {
            let issuer_key = pair[1].public_key()?;
            if !pair[0].verify(&issuer_key)? {
                return Err(ValidateError::BrokenLink(i));
            }
        }
        let root = &self.certs[self.certs.len() - 1];
        let root_key = root.public_key()?;
        if !root.verify(&root_key)? {
            return Err(ValidateError::RootNotSelfSigned);
        }
        Ok(())
    }

    /// Check that the chain's root certificate is signed by the given
    /// out-of-band trusted key. Independent of [`validate`]; both must
    /// pass for the chain to be trusted.
    ///
    /// [`validate`]: CertChain::validate
    pub fn validate_root(&self, trusted_key: &PKey<Public>) -> Result<(), ValidateError> {
        let Some(root) = self.certs.last() else {
            return Err(ValidateError::EmptyChain);
        };
        if !root.verify(trusted_key)? {
            return Err(ValidateError::RootKeyMismatch);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_chain_fails_closed() {
        let chain = CertChain::new();
        assert!(matches!(chain.validate(), Err(ValidateError::EmptyChain)));
        let trusted = amd_root_public_key().unwrap();
        assert!(matches!(
            chain.validate_root(&trusted),
            Err(ValidateError::EmptyChain)
        ));
    }

    #[test]
    fn amd_root_key_loads() {
        let key = amd_root_public_key().unwrap();
        assert_eq!(key.bits(), 4096);
    }

    #[test]
    fn add_pem_rejects_garbage() {
        let mut chain = CertChain::new();
        assert!(chain.add_pem("not a certificate").is_err());
        assert!(chain.add_pem_chain("not a certificate").is_err());
    }
}
