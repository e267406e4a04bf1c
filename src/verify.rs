// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Report/endorsement correlation and the verification pipeline.

use crate::certs::{self, CertChain};
use crate::report::{ReportData, SnpReport, Validateable};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use openssl::pkey::{PKey, Public};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("certificate parse error")]
    CertificateParse(#[from] certs::ParseError),
    #[error("certificate chain validation failed")]
    Chain(#[source] certs::ValidateError),
    #[error("root of trust validation failed")]
    Root(#[source] certs::ValidateError),
    #[error("report signature is invalid")]
    SignatureInvalid,
    #[error("report_data does not match the expected nonce")]
    NonceMismatch,
    #[error("host_data does not match the security policy hash")]
    PolicyHashMismatch,
    #[error("base64 decode error")]
    Decode(#[from] base64::DecodeError),
}

/// Byte-exact comparison of the report's full 64-byte report_data field
/// against the expected nonce.
pub fn check_nonce(report: &SnpReport, expected: &ReportData) -> bool {
    report.report_data == *expected
}

/// Decode the base64 security policy document, hash it with SHA-256 and
/// compare against the report's 32-byte host_data field.
pub fn check_policy(report: &SnpReport, policy_b64: &str) -> Result<bool, base64::DecodeError> {
    let policy = BASE64.decode(policy_b64)?;
    let digest: [u8; 32] = Sha256::digest(&policy).into();
    Ok(digest == report.host_data)
}

/// Run the full verification pipeline, fail-fast:
///
/// 1. every chain link verifies and the root is self-signed,
/// 2. the root verifies under `trusted_key`,
/// 3. the report signature verifies under the chain's leaf (VCEK) key,
/// 4. report_data equals the expected nonce,
/// 5. host_data equals the SHA-256 of the security policy.
///
/// The first failing check aborts the rest and is the one reported.
pub fn verify_report(
    report: &SnpReport,
    chain: &CertChain,
    trusted_key: &PKey<Public>,
    nonce: &ReportData,
    policy_b64: &str,
) -> Result<(), VerifyError> {
    chain.validate().map_err(VerifyError::Chain)?;
    chain.validate_root(trusted_key).map_err(VerifyError::Root)?;

    let Some(vcek) = chain.leaf() else {
        return Err(VerifyError::Chain(certs::ValidateError::EmptyChain));
    };
    if !report.validate(vcek) {
        return Err(VerifyError::SignatureInvalid);
    }
    if !check_nonce(report, nonce) {
        return Err(VerifyError::NonceMismatch);
    }
    if !check_policy(report, policy_b64)? {
        return Err(VerifyError::PolicyHashMismatch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA256_EMPTY: [u8; 32] = [
        0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14, 0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f, 0xb9,
        0x24, 0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c, 0xa4, 0x95, 0x99, 0x1b, 0x78, 0x52,
        0xb8, 0x55,
    ];

    #[test]
    fn sha256_empty_vector() {
        let digest: [u8; 32] = Sha256::digest([]).into();
        assert_eq!(digest, SHA256_EMPTY);
    }

    #[test]
    fn nonce_requires_all_64_bytes() {
        let mut report = SnpReport::default();
        let mut nonce = [0u8; 64];
        nonce[17] = 0x5A;
        report.report_data = nonce;
        assert!(check_nonce(&report, &nonce));

        for i in 0..64 {
            let mut perturbed = nonce;
            perturbed[i] ^= 0x01;
            assert!(!check_nonce(&report, &perturbed));
        }
    }

    #[test]
    fn policy_hash_comparison() {
        let mut report = SnpReport::default();
        report.host_data = SHA256_EMPTY;
        assert!(check_policy(&report, "").unwrap());

        // a policy whose hash differs from host_data fails
        let other = BASE64.encode("{\"allow_all\":true}");
        assert!(!check_policy(&report, &other).unwrap());

        assert!(check_policy(&report, "not!base64").is_err());
    }

    #[test]
    fn empty_chain_fails_pipeline_first() {
        let report = SnpReport::default();
        let chain = CertChain::new();
        let trusted = certs::amd_root_public_key().unwrap();
        let err = verify_report(&report, &chain, &trusted, &[0u8; 64], "").unwrap_err();
        assert!(matches!(err, VerifyError::Chain(_)));
    }
}
